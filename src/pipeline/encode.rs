//! Text-safe payload encoding (standard base64, padded).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_payload(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded.trim())
}

/// Decoded length estimated from the encoded length: `floor(len * 3 / 4)`.
///
/// Padding is counted as data, so the estimate exceeds the true length by
/// at most 2 bytes. Good enough for a size threshold, never used to decode.
pub fn approx_decoded_size(encoded: &str) -> u64 {
    (encoded.len() as u64) * 3 / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_within_two_bytes() {
        for len in [0usize, 1, 2, 3, 4, 5, 1_000, 50_001, 899_999] {
            let bytes = vec![0xA5u8; len];
            let estimate = approx_decoded_size(&encode_payload(&bytes));
            assert!(estimate >= len as u64, "len {len}");
            assert!(estimate - len as u64 <= 2, "len {len}");
        }
    }

    #[test]
    fn whitespace_around_payload_tolerated() {
        let encoded = format!("  {}\n", encode_payload(b"%PDF-1.4"));
        assert_eq!(decode_payload(&encoded).unwrap(), b"%PDF-1.4");
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(decode_payload("not*base64!").is_err());
    }
}

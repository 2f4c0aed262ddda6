use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const SALT_LENGTH: usize = 16;
pub const HASH_LENGTH: usize = 32;
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Salted PBKDF2-HMAC-SHA256 hash of a password.
#[derive(Clone)]
pub struct PasswordHash {
    salt: [u8; SALT_LENGTH],
    hash: [u8; HASH_LENGTH],
    iterations: u32,
}

impl PasswordHash {
    /// Hash with a fresh random salt.
    pub fn create(password: &str, iterations: u32) -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::with_salt(password, salt, iterations)
    }

    fn with_salt(password: &str, salt: [u8; SALT_LENGTH], iterations: u32) -> Self {
        let mut hash = [0u8; HASH_LENGTH];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut hash);
        Self {
            salt,
            hash,
            iterations,
        }
    }

    /// Constant-time comparison against a candidate password.
    pub fn verify(&self, password: &str) -> bool {
        let candidate = Self::with_salt(password, self.salt, self.iterations);
        candidate.hash[..].ct_eq(&self.hash[..]).into()
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHash")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

/// Minimal shape check: one `@` with text on both sides and a dot in the domain.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: u32 = 10;

    #[test]
    fn verify_accepts_same_password() {
        let hash = PasswordHash::create("correct horse", FAST);
        assert!(hash.verify("correct horse"));
    }

    #[test]
    fn verify_rejects_other_password() {
        let hash = PasswordHash::create("correct horse", FAST);
        assert!(!hash.verify("battery staple"));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let a = PasswordHash::create("same", FAST);
        let b = PasswordHash::create("same", FAST);
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn debug_hides_material() {
        let hash = PasswordHash::create("secret", FAST);
        let shown = format!("{hash:?}");
        assert!(!shown.contains("salt"));
        assert!(shown.contains("iterations"));
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("doc@clinic.org"));
        assert!(is_valid_email("  doc@clinic.org "));
        assert!(!is_valid_email("doc@clinic"));
        assert!(!is_valid_email("doc.clinic.org"));
        assert!(!is_valid_email("@clinic.org"));
        assert!(!is_valid_email("d oc@clinic.org"));
    }
}

//! Patient identifier allocation.
//!
//! Candidates are 8 symbols drawn uniformly from `[A-Z0-9]` (about 41 bits
//! each). A candidate is taken when no record exists under its key. The
//! check is a plain read, not a reservation: two allocators racing on the
//! same free candidate can both return it.
//!
//! After [`PATIENT_ID_ATTEMPTS`] collisions the allocator degrades to a
//! timestamp identifier (`P` + last 7 base-36 digits of the epoch
//! milliseconds). That path is not random but always terminates, and within
//! one process it never repeats because the millisecond value is forced to
//! increase.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{PATIENT_ID_ATTEMPTS, PATIENT_ID_LENGTH};
use crate::error::PortalError;
use crate::models::PatientId;
use crate::store::{patient_path, ProfileStore};

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const FALLBACK_PREFIX: char = 'P';
const FALLBACK_DIGITS: usize = 7;

pub struct PatientIdAllocator {
    store: Arc<dyn ProfileStore>,
    rng: Mutex<StdRng>,
    last_fallback_ms: AtomicU64,
    clock: fn() -> u64,
}

impl PatientIdAllocator {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self::with_rng(store, StdRng::from_entropy())
    }

    /// Deterministic candidate sequence (tests, reproducible fixtures).
    pub fn with_seed(store: Arc<dyn ProfileStore>, seed: u64) -> Self {
        Self::with_rng(store, StdRng::seed_from_u64(seed))
    }

    fn with_rng(store: Arc<dyn ProfileStore>, rng: StdRng) -> Self {
        Self {
            store,
            rng: Mutex::new(rng),
            last_fallback_ms: AtomicU64::new(0),
            clock: epoch_millis,
        }
    }

    /// Allocate an identifier with no existing patient record.
    ///
    /// Fails only when the store cannot be read; nothing is retried beyond
    /// the candidate loop.
    pub async fn allocate(&self) -> Result<PatientId, PortalError> {
        for attempt in 1..=PATIENT_ID_ATTEMPTS {
            let candidate = self.candidate();
            if !self.store.exists(&patient_path(&candidate)).await? {
                tracing::debug!(patient_id = %candidate, attempt, "Allocated patient id");
                return Ok(candidate);
            }
            tracing::debug!(patient_id = %candidate, attempt, "Patient id collision");
        }

        let fallback = self.fallback();
        tracing::warn!(
            patient_id = %fallback,
            attempts = PATIENT_ID_ATTEMPTS,
            "Random patient ids exhausted, using timestamp id"
        );
        Ok(fallback)
    }

    fn candidate(&self) -> PatientId {
        // A panic mid-draw cannot leave the generator in a bad state.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        let id: String = (0..PATIENT_ID_LENGTH)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        PatientId::from_allocated(id)
    }

    fn fallback(&self) -> PatientId {
        let now = (self.clock)();
        // Strictly increasing even if the clock stalls or steps back.
        let mut prev = self.last_fallback_ms.load(Ordering::SeqCst);
        let ms = loop {
            let next = now.max(prev + 1);
            match self.last_fallback_ms.compare_exchange(
                prev,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break next,
                Err(actual) => prev = actual,
            }
        };
        PatientId::from_allocated(fallback_id(ms))
    }
}

/// `P` + last 7 base-36 digits (upper-case) of `millis`.
pub fn fallback_id(millis: u64) -> String {
    let digits = to_base36(millis);
    let tail = &digits[digits.len().saturating_sub(FALLBACK_DIGITS)..];
    format!("{FALLBACK_PREFIX}{tail}")
}

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        let d = (n % 36) as u8;
        out.push(if d < 10 { b'0' + d } else { b'A' + d - 10 });
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn epoch_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

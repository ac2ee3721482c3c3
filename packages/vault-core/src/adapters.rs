//! Host-supplied seams for testability (spec §5). Storage is NOT an
//! adapter here: the on-disk envelope format (§6) is concrete, so vault.rs
//! owns file I/O directly. Clock and entropy stay pluggable so tests can
//! pin time and randomness the way the teacher's fakes do.

pub trait ClockAdapter: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub trait EntropyAdapter: Send + Sync {
    fn random_bytes(&self, len: usize) -> Vec<u8>;
}

/// Real-clock adapter used outside tests.
pub struct SystemClock;

impl ClockAdapter for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as u64
    }
}

/// Real-entropy adapter used outside tests.
pub struct SystemEntropy;

impl EntropyAdapter for SystemEntropy {
    fn random_bytes(&self, len: usize) -> Vec<u8> {
        crate::crypto::random_bytes(len).expect("entropy source unavailable")
    }
}

#[cfg(test)]
pub mod fakes {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    pub struct FixedClock(pub AtomicU64);

    impl FixedClock {
        pub fn new(start_ms: u64) -> Self {
            Self(AtomicU64::new(start_ms))
        }

        pub fn advance(&self, delta_ms: u64) {
            self.0.fetch_add(delta_ms, Ordering::SeqCst);
        }
    }

    impl ClockAdapter for FixedClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    pub struct FixedEntropy;

    impl EntropyAdapter for FixedEntropy {
        fn random_bytes(&self, len: usize) -> Vec<u8> {
            crate::crypto::random_bytes(len).expect("entropy source unavailable")
        }
    }
}

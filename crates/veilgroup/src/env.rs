//! Ledger environment: the clock and entropy a registry sees.
//!
//! A real ledger supplies block time and block-level pseudo-randomness.
//! Both are public and weak; nothing here is suitable for keys that must
//! resist an observer of the ledger.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use veilgroup_core::derive_hash;

const ENTROPY_CONTEXT: &str = "veilgroup ledger entropy v1";

/// Time and entropy source for registry mutations.
pub trait LedgerEnv: Send + Sync + 'static {
    /// Current ledger time in Unix milliseconds.
    fn now_millis(&self) -> i64;

    /// Public pseudo-random bytes for the current block.
    fn block_entropy(&self) -> [u8; 32];
}

impl<T: LedgerEnv> LedgerEnv for Arc<T> {
    fn now_millis(&self) -> i64 {
        (**self).now_millis()
    }

    fn block_entropy(&self) -> [u8; 32] {
        (**self).block_entropy()
    }
}

/// Wall-clock environment. Every entropy request is treated as a new block.
#[derive(Debug, Default)]
pub struct SystemLedger {
    height: AtomicU64,
}

impl SystemLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerEnv for SystemLedger {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    fn block_entropy(&self) -> [u8; 32] {
        let height = self.height.fetch_add(1, Ordering::Relaxed);
        derive_hash(
            ENTROPY_CONTEXT,
            &[
                height.to_be_bytes().as_slice(),
                self.now_millis().to_be_bytes().as_slice(),
            ],
        )
    }
}

/// Environment driven by hand, for deterministic tests.
#[derive(Debug)]
pub struct ManualLedger {
    now: AtomicI64,
    entropy: [u8; 32],
}

impl ManualLedger {
    /// Start at `start_millis` with fixed block entropy.
    pub fn new(start_millis: i64, entropy: [u8; 32]) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
            entropy,
        }
    }

    /// Move the clock forward by `millis`.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }

    /// Set the clock. May move it backwards.
    pub fn set_time(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl LedgerEnv for ManualLedger {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn block_entropy(&self) -> [u8; 32] {
        self.entropy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_entropy_changes_per_block() {
        let env = SystemLedger::new();
        assert_ne!(env.block_entropy(), env.block_entropy());
        assert!(env.now_millis() > 0);
    }

    #[test]
    fn test_manual_clock() {
        let env = Arc::new(ManualLedger::new(1_000, [7; 32]));
        env.advance(250);
        assert_eq!(env.now_millis(), 1_250);
        env.set_time(10);
        assert_eq!(LedgerEnv::now_millis(&env), 10);
        assert_eq!(env.block_entropy(), [7; 32]);
    }
}

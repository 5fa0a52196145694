// Copyright (c) 2024 Botho Foundation

//! Proof-of-work search on a dedicated thread.
//!
//! The search runs without holding the ledger lock. The caller takes a
//! [`SealTarget`] under a read lock, starts a [`Sealer`], and commits the
//! proof under the write lock only if the tip has not moved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info};

use crate::block::pow;
use crate::ledger::SealTarget;

/// A running proof search
pub struct Sealer {
    target: SealTarget,
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<Option<u64>>,
    started: Instant,
}

impl Sealer {
    /// Start searching for a proof against `target`.
    ///
    /// `shutdown` is shared with the caller (for example a Ctrl-C handler);
    /// setting it stops the search at the next batch boundary.
    pub fn start(target: SealTarget, shutdown: Arc<AtomicBool>) -> Self {
        let cancel = shutdown;
        let thread_cancel = cancel.clone();
        let last_proof = target.last_proof;

        debug!(
            tip = target.tip_index,
            tip_hash = %target.tip_hash.short(),
            "Starting proof search"
        );
        let handle = thread::spawn(move || pow::solve_cancellable(last_proof, &thread_cancel));

        Self {
            target,
            cancel,
            handle,
            started: Instant::now(),
        }
    }

    /// Ask the search to stop.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Wait for the search. `None` if it was cancelled or the worker died.
    pub fn wait(self) -> Option<u64> {
        let proof = self.handle.join().ok().flatten();
        match proof {
            Some(proof) => info!(
                tip = self.target.tip_index,
                proof,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "Proof found"
            ),
            None => debug!(tip = self.target.tip_index, "Proof search cancelled"),
        }
        proof
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::GENESIS_PROOF;
    use crate::hashing::Hash256;

    fn target(last_proof: u64) -> SealTarget {
        SealTarget {
            tip_index: 1,
            tip_hash: Hash256::ZERO,
            last_proof,
        }
    }

    #[test]
    fn test_sealer_finds_same_proof_as_solve() {
        let sealer = Sealer::start(target(GENESIS_PROOF), Arc::new(AtomicBool::new(false)));
        assert_eq!(sealer.wait(), Some(pow::solve(GENESIS_PROOF)));
    }

    #[test]
    fn test_sealer_cancelled_before_start_returns_none() {
        let last = (0..1_000u64)
            .find(|q| pow::solve(*q) >= 10_000)
            .expect("some last proof needs more than one batch");
        let sealer = Sealer::start(target(last), Arc::new(AtomicBool::new(true)));
        assert_eq!(sealer.wait(), None);
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let sealer = Sealer::start(target(GENESIS_PROOF), shutdown.clone());
        sealer.cancel();
        assert!(shutdown.load(Ordering::Relaxed));
        // Either outcome is fine; the search must simply terminate.
        let _ = sealer.wait();
    }
}

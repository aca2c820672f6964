//! Escalation governor: stops the hook from blocking forever on one problem.
//!
//! Every block reason is reduced to a short fingerprint and appended to a
//! persisted history. When the last `N` fingerprints are all the same, the
//! agent has evidently been unable to fix the problem, so the history is
//! cleared and the block is turned into an allow.

pub mod persistence;

pub use persistence::{FileHistoryStore, HistoryStore, MemoryHistoryStore};

use std::sync::Arc;
use tracing::{debug, warn};

/// Length of a reason fingerprint in hex characters.
pub const FINGERPRINT_LEN: usize = 16;

/// Short stable hash of a block reason's text.
#[must_use]
pub fn fingerprint(reason: &str) -> String {
    let mut digest = format!("{:x}", md5::compute(reason.as_bytes()));
    digest.truncate(FINGERPRINT_LEN);
    digest
}

/// Decides when a repeated block should be suppressed.
#[derive(Clone)]
pub struct EscalationGovernor {
    store: Arc<dyn HistoryStore>,
    capacity: usize,
}

impl std::fmt::Debug for EscalationGovernor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationGovernor")
            .field("store", &self.store.location())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl EscalationGovernor {
    /// `capacity` is the number of identical consecutive blocks tolerated.
    #[must_use]
    pub fn new(store: Arc<dyn HistoryStore>, capacity: usize) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
        }
    }

    /// Record `reason` and report whether the block should be turned into an allow.
    ///
    /// Store failures never force an allow: an unreadable history counts as
    /// empty and a failed write is logged and ignored.
    pub fn should_force_allow(&self, reason: &str) -> bool {
        let mut history = self.store.load().unwrap_or_else(|e| {
            warn!("Could not read block history: {e}");
            Vec::new()
        });

        history.push(fingerprint(reason));
        if history.len() > self.capacity {
            history.drain(..history.len() - self.capacity);
        }

        let repeated = history.len() >= self.capacity
            && history.iter().all(|entry| entry == &history[0]);

        if repeated {
            warn!(
                "Same block reason repeated {} times. Giving up.",
                self.capacity
            );
            if let Err(e) = self.store.clear() {
                warn!("Could not clear block history: {e}");
            }
            return true;
        }

        debug!(
            "Block history at {}: {} entries",
            self.store.location(),
            history.len()
        );
        if let Err(e) = self.store.save(&history) {
            warn!("Could not save block history: {e}");
        }
        false
    }

    /// Recorded fingerprints, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the history cannot be read.
    pub fn history(&self) -> crate::Result<Vec<String>> {
        self.store.load()
    }

    /// Forget all recorded blocks.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the history cannot be removed.
    pub fn reset(&self) -> crate::Result<()> {
        self.store.clear()
    }

    #[must_use]
    pub fn location(&self) -> String {
        self.store.location()
    }
}

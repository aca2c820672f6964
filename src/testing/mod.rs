//! Testing infrastructure for the review loop.
//!
//! # Architecture
//!
//! - **Traits**: Abstractions for external collaborators (git, the review
//!   service, wall-clock time)
//! - **Mocks**: Test doubles implementing the traits with controllable behavior
//!
//! The in-memory escalation store lives in [`crate::escalation`] and is
//! re-exported here so tests can pull every double from one place.
//!
//! # Example
//!
//! ```rust,ignore
//! use review_loop::testing::{ManualClock, MockGitOperations, MockReviewService};
//!
//! let git = MockGitOperations::new()
//!     .with_branch("feature")
//!     .with_status("?? notes.txt");
//!
//! let service = MockReviewService::new().with_state("merged");
//! let clock = ManualClock::new();
//! ```

pub mod mocks;
pub mod traits;

// Re-export commonly used types
pub use crate::escalation::MemoryHistoryStore;
pub use mocks::*;
pub use traits::*;

//! review-loop - stop hook that keeps a coding agent on its pull request
//!
//! When an agent tries to end its turn, the hook inspects the git working
//! copy and the review service, and either lets the agent stop or hands it
//! the next concrete thing to do: create a session, resolve conflicts,
//! commit, push, address review comments, fix CI, or end the session once
//! the PR is merged or closed.
//!
//! # Architecture
//!
//! - [`repo`] - Git working copy inspection with named fallbacks
//! - [`session`] - Review service client, session resolution and feedback
//! - [`decision`] - Pure priority-ordered gating and poll tick evaluation
//! - [`escalation`] - Suppresses blocks the agent keeps failing to clear
//! - [`driver`] - One hook invocation from input to decision
//! - [`hook`] - Stdin/stdout wire format
//! - [`config`] - Settings file and environment configuration
//! - [`error`] - Custom error types
//! - [`testing`] - Trait seams and mocks
//!
//! # Example
//!
//! ```rust,ignore
//! use review_loop::config::LoopConfig;
//! use review_loop::driver::{DriverDependencies, PollDriver};
//!
//! let config = LoopConfig::load(project_dir)?;
//! let mut driver = PollDriver::new(config.clone(), DriverDependencies::real(&config)?);
//! match driver.run(project_dir).await {
//!     Decision::Block(reason) => println!("{}", HookOutput::block(&reason).to_json()?),
//!     Decision::Allow => {}
//!     Decision::Terminate => std::process::exit(1),
//! }
//! ```

pub mod config;
pub mod decision;
pub mod driver;
pub mod error;
pub mod escalation;
pub mod hook;
pub mod instructions;
pub mod repo;
pub mod session;
pub mod testing;

// Re-export commonly used types
pub use error::{Result, ReviewLoopError};

pub use config::LoopConfig;
pub use decision::{BlockReason, Decision, ReasonClass};
pub use driver::{DriverDependencies, DriverState, PollDriver};
pub use escalation::{EscalationGovernor, FileHistoryStore, HistoryStore};
pub use hook::{HookInput, HookOutput};
pub use repo::{RepoInspector, RepoState};
pub use session::{Feedback, LifecycleState, Session, SessionType};

// Re-export testing types for convenience
pub use testing::{Clock, GitOperations, MockGitOperations, MockReviewService, ReviewService};

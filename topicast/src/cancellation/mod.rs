//! Cooperative cancellation of a pipeline run.
//!
//! The binary's Ctrl-C handler cancels the orchestrator's
//! [`CancellationToken`]. Each run works under a child of it, which the run
//! timeout timer cancels without touching later runs.

mod token;

pub use token::CancellationToken;

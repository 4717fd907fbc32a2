//! Proof-of-work process management.
//!
//! - `slot`: the single process handle, bound to a round index
//! - `runner`: spawn the pow program, stream its output, parse the result
//! - `output`: result line parsing

pub mod output;
pub mod runner;
pub mod slot;

pub use output::{leading_zeros, parse_solution};
pub use runner::{ProofOfWorkRunner, RunOutcome};
pub use slot::ProcessSlot;

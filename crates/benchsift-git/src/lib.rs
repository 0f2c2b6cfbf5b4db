//! Git plumbing for benchsift.
//!
//! Local object probes go through git2; anything that touches the network
//! or the working tree shells out to the `git` CLI under a timeout. The
//! [`WorkingTree`](worktree::WorkingTree) handle serializes checkouts and
//! guarantees the original ref is restored.

pub mod backend;
pub mod command;
pub mod repo;
pub mod worktree;

pub use backend::{GitBackend, GitCli};
pub use command::{GitCommand, GitOutput};
pub use repo::OriginalRef;
pub use worktree::{TreeLease, WorkingTree};

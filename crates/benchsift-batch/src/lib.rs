//! Batch evaluation of a repository's merged pull requests.
//!
//! [`BatchEvaluator`] pages through a [`benchsift_forge::Forge`], runs every
//! candidate through the eligibility chain, hands accepted ones to the
//! regression oracle and optional judge, and aggregates a deterministic
//! [`BatchReport`].

mod evaluator;
mod report;

pub use evaluator::{BatchEvaluator, OracleSetup};
pub use report::{BatchReport, CandidateRecord, ReasonCount};

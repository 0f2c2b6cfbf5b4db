//! Core types, configuration, and error handling for benchsift.
//!
//! This crate provides the shared foundation used by all other benchsift crates:
//! - [`BenchsiftError`]: unified error type using `thiserror` and `miette`
//! - [`BenchsiftConfig`]: configuration loaded from `.benchsift.toml`
//! - [`LanguageProfile`]: per-language file classification rules
//! - [`scope`]: retry with backoff and always-run cleanup
//! - Shared types: [`PullRequestCandidate`], [`EligibilityVerdict`],
//!   [`RegressionResult`], [`TestId`], [`TestOutcome`]

mod config;
mod error;
pub mod language;
pub mod scope;
mod types;

pub use config::{
    BatchConfig, BenchsiftConfig, FilterConfig, ForgeConfig, JudgeConfig, OracleConfig,
};
pub use error::BenchsiftError;
pub use language::LanguageProfile;
pub use types::{
    Author, ChangeKind, ChangedFile, Checkout, EligibilityVerdict, LinkedIssue, OracleCode,
    PullRequestCandidate, RegressionResult, RegressionVerdict, RejectionReason, TestId,
    TestOutcome, TestStatus, VerdictStatus,
};

/// A convenience `Result` type for benchsift operations.
pub type Result<T> = std::result::Result<T, BenchsiftError>;

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".benchsift.toml";

//! Regression oracle: run a candidate's tests at base and head and decide
//! whether they separate the broken code from the fixed code.
//!
//! - [`TestRunner`]: one language's test tool, behind a trait
//! - [`RunnerRegistry`]: picks a runner from project marker files
//! - [`classify`](classify::classify): F2P / P2P / errored sets from two runs
//! - [`RegressionOracle`]: checkout, dual run, timeout and restore

pub mod classify;
pub mod exec;
pub mod oracle;
pub mod registry;
pub mod runner;
pub mod runners;

pub use classify::{classify, Classification};
pub use oracle::RegressionOracle;
pub use registry::RunnerRegistry;
pub use runner::{RunReport, SuiteStatus, TestRunner};

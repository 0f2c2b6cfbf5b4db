//! Eligibility filtering for merged pull requests.
//!
//! A [`FilterChain`] runs ordered [`EligibilityFilter`]s over one candidate
//! and stops at the first rejection. The only expensive input, the diff,
//! comes from a [`PatchRetriever`] and is fetched at most once per
//! candidate, after every metadata filter has passed.

pub mod chain;
pub mod english;
pub mod filters;
pub mod patch;

pub use chain::FilterChain;
pub use filters::{EligibilityFilter, FilterContext, FilterOutcome};
pub use patch::PatchRetriever;

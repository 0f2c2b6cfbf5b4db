//! Diff parsing, file classification, and patch-volume analysis.
//!
//! Turns the unified diff of a candidate into per-file hunks, sorts changed
//! paths into test / asset / data buckets using a [`LanguageProfile`], and
//! measures how much source code a patch touches.
//!
//! [`LanguageProfile`]: benchsift_core::LanguageProfile

pub mod classify;
pub mod parser;
pub mod volume;

//! Picking a test runner from project marker files.

use std::path::Path;
use std::sync::Arc;

use benchsift_core::language::canonical_name;

use crate::runner::TestRunner;
use crate::runners::{CargoRunner, GoRunner, JestRunner, PytestRunner};

/// Ordered set of runners, consulted by marker files.
///
/// # Examples
///
/// ```
/// use benchsift_oracle::RunnerRegistry;
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("go.mod"), "module example.com/shop\n").unwrap();
///
/// let registry = RunnerRegistry::with_defaults();
/// let runner = registry.select(dir.path(), None).unwrap();
/// assert_eq!(runner.name(), "go");
/// ```
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    runners: Vec<Arc<dyn TestRunner>>,
}

impl RunnerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// pytest, cargo, jest and go.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PytestRunner::default()));
        registry.register(Arc::new(CargoRunner));
        registry.register(Arc::new(JestRunner));
        registry.register(Arc::new(GoRunner));
        registry
    }

    /// Add a runner after the existing ones.
    pub fn register(&mut self, runner: Arc<dyn TestRunner>) {
        self.runners.push(runner);
    }

    /// Registered runner names, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.runners.iter().map(|r| r.name()).collect()
    }

    /// The runner for the project at `dir`.
    ///
    /// Only runners with a marker file present are considered. Among those,
    /// one serving `language` wins; otherwise the first registered match.
    pub fn select(&self, dir: &Path, language: Option<&str>) -> Option<Arc<dyn TestRunner>> {
        let matching: Vec<&Arc<dyn TestRunner>> = self
            .runners
            .iter()
            .filter(|r| r.markers().iter().any(|m| dir.join(m).exists()))
            .collect();

        language
            .and_then(|lang| {
                matching
                    .iter()
                    .find(|r| serves(r.language(), lang))
                    .copied()
            })
            .or_else(|| matching.first().copied())
            .cloned()
    }
}

fn serves(runner_language: &str, language: &str) -> bool {
    let language = canonical_name(language);
    runner_language == language || (runner_language == "JavaScript" && language == "TypeScript")
}

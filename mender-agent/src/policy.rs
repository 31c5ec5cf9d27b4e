//! Output policy - how runtime output is interpreted
//!
//! Two string protocols are matched here and nowhere else: the missing
//! dependency message a runtime prints, and the failure marker a generated
//! test harness prints. Sandboxes with different output can swap either.

use crate::error::{Error, ErrorKind, Result};
use regex::Regex;

/// Marker a generated test harness prints for a failing case.
pub const DEFAULT_FAILURE_MARKER: &str = "Fail";

/// Missing dependency messages; the first capture group is the module name.
pub const DEFAULT_MISSING_DEPENDENCY: &str =
    r"Cannot find (?:package|module) '([^']+)'";

/// What a failed execution means for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnosis {
    /// Install the named module and retry the same code
    MissingDependency(String),
    /// Anything else; regenerate with the error as context
    Generic,
}

/// Result of judging a test run's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub output: String,
    pub contains_failure_marker: bool,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        !self.contains_failure_marker
    }
}

#[derive(Debug, Clone)]
pub struct OutputPolicy {
    failure_marker: String,
    missing_dependency: Regex,
}

impl OutputPolicy {
    pub fn new(failure_marker: impl Into<String>, missing_dependency: &str) -> Result<Self> {
        let failure_marker = failure_marker.into();
        if failure_marker.is_empty() {
            return Err(Error::config_invalid("failure marker must not be empty")
                .with_operation("policy::new"));
        }

        let missing_dependency = Regex::new(missing_dependency).map_err(|e| {
            Error::new(ErrorKind::ConfigInvalid, format!("invalid dependency pattern: {}", e))
                .with_operation("policy::new")
                .with_context("pattern", missing_dependency)
                .set_source(e)
        })?;

        if missing_dependency.captures_len() < 2 {
            return Err(Error::config_invalid(
                "dependency pattern needs a capture group for the module name",
            )
            .with_operation("policy::new")
            .with_context("pattern", missing_dependency.as_str()));
        }

        Ok(Self {
            failure_marker,
            missing_dependency,
        })
    }

    pub fn with_failure_marker(mut self, marker: impl Into<String>) -> Result<Self> {
        let marker = marker.into();
        if marker.is_empty() {
            return Err(Error::config_invalid("failure marker must not be empty")
                .with_operation("policy::with_failure_marker"));
        }
        self.failure_marker = marker;
        Ok(self)
    }

    pub fn failure_marker(&self) -> &str {
        &self.failure_marker
    }

    /// Classify an execution error's text.
    pub fn diagnose(&self, error_detail: &str) -> Diagnosis {
        self.missing_module(error_detail)
            .map(Diagnosis::MissingDependency)
            .unwrap_or(Diagnosis::Generic)
    }

    /// Extract the quoted module name from a missing dependency message.
    ///
    /// File paths are not installable packages; a missing local file is a
    /// code error, so those yield `None`.
    pub fn missing_module(&self, error_detail: &str) -> Option<String> {
        self.missing_dependency
            .captures(error_detail)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|name| !name.is_empty() && !is_path_like(name))
    }

    /// Judge test output by the failure marker alone.
    pub fn judge(&self, output: impl Into<String>) -> TestOutcome {
        let output = output.into();
        let contains_failure_marker = output.contains(&self.failure_marker);
        TestOutcome {
            output,
            contains_failure_marker,
        }
    }
}

fn is_path_like(name: &str) -> bool {
    name.starts_with('.')
        || name.starts_with('/')
        || name.starts_with('\\')
        || name.starts_with("file:")
        || name.contains(":\\")
        || name.contains(":/")
}

impl Default for OutputPolicy {
    fn default() -> Self {
        Self {
            failure_marker: DEFAULT_FAILURE_MARKER.to_string(),
            missing_dependency: Regex::new(DEFAULT_MISSING_DEPENDENCY)
                .expect("default dependency pattern is valid"),
        }
    }
}

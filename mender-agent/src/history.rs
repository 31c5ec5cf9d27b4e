//! Attempt history for one orchestration run

use serde::Serialize;

/// One generate/execute cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeAttempt {
    pub code: String,
    pub error: Option<String>,
}

impl CodeAttempt {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            error: None,
        }
    }
}

/// Append-only, ordered record of every attempt in a run.
#[derive(Debug, Clone, Default)]
pub struct AttemptHistory {
    attempts: Vec<CodeAttempt>,
}

impl AttemptHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new attempt with freshly generated code.
    pub fn push(&mut self, code: impl Into<String>) {
        self.attempts.push(CodeAttempt::new(code));
    }

    /// Record why the latest attempt failed.
    ///
    /// A second failure of the same attempt (e.g. code ran, then its tests
    /// failed) replaces the first; the latest cause is the useful context.
    pub fn fail_current(&mut self, error: impl Into<String>) {
        if let Some(current) = self.attempts.last_mut() {
            current.error = Some(error.into());
        }
    }

    pub fn current(&self) -> Option<&CodeAttempt> {
        self.attempts.last()
    }

    /// Every attempt before the current one, oldest first.
    pub fn previous(&self) -> &[CodeAttempt] {
        match self.attempts.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn into_attempts(self) -> Vec<CodeAttempt> {
        self.attempts
    }

    /// Render all previous attempts as line comments, oldest first.
    pub fn render_commentary(&self) -> String {
        let mut out = String::new();
        for (i, attempt) in self.previous().iter().enumerate() {
            out.push_str(&format!("// Previous Code {}:\n", i + 1));
            out.push_str(&comment_out(&attempt.code));
            out.push_str("\n\n");
            if let Some(error) = &attempt.error {
                out.push_str(&format!("// Previous Error {}:\n", i + 1));
                out.push_str(&comment_out(error));
                out.push_str("\n\n");
            }
        }
        out
    }
}

fn comment_out(text: &str) -> String {
    text.lines()
        .map(|line| format!("// {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

//! # mender agent
//!
//! The orchestrator drives a self-healing code loop:
//! 1. User provides an instruction
//! 2. A completion backend generates code for it
//! 3. The executor runs the code
//! 4. A missing dependency is installed and the same code is retried
//! 5. Any other failure regenerates the code, with every earlier attempt as context
//! 6. Code that runs cleanly gets a generated test harness; failing tests regenerate again
//! 7. Done when the code runs and its tests pass, or a limit is reached
//!
//! Completions, execution, and installation are traits, so the loop runs
//! against fakes in tests and against real processes from the CLI.

pub mod error;
pub mod executor;
pub mod history;
pub mod orchestrator;
pub mod policy;
pub mod prompt;

pub use error::{Error, ErrorKind, ErrorStatus, Result};
pub use executor::{
    CommandInstaller, ExecutionOutcome, Executor, FailureKind, Installer, ScriptExecutor,
};
pub use history::{AttemptHistory, CodeAttempt};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunLimits, RunReport};
pub use policy::{Diagnosis, OutputPolicy, TestOutcome};

//! Execution collaborators
//!
//! The orchestrator never touches processes directly. An [`Executor`] runs
//! program text and reports what happened; an [`Installer`] makes a missing
//! module resolvable for later runs. [`ScriptExecutor`] and
//! [`CommandInstaller`] are the process-backed implementations used by the
//! CLI. Neither isolates the generated program; run them inside a sandbox.

use crate::error::{Error, ErrorKind, Result};
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

/// Why an execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The program ran cleanly
    None,
    /// The program exited unsuccessfully
    Runtime,
    /// The runtime reported an unresolvable import
    ModuleNotFound,
}

/// What one execution produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub succeeded: bool,
    pub output: String,
    pub error_kind: FailureKind,
    pub error_detail: String,
}

impl ExecutionOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            succeeded: true,
            output: output.into(),
            error_kind: FailureKind::None,
            error_detail: String::new(),
        }
    }

    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            output: String::new(),
            error_kind: kind,
            error_detail: detail.into(),
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }
}

/// Runs program text in an external runtime.
///
/// `Err` is reserved for failures to run at all (the runtime could not be
/// started); a program that runs and fails is an `Ok` outcome.
#[allow(async_fn_in_trait)]
pub trait Executor: Send + Sync {
    async fn execute(&self, program: &str) -> Result<ExecutionOutcome>;
}

/// Makes a module resolvable for subsequent executions.
#[allow(async_fn_in_trait)]
pub trait Installer: Send + Sync {
    async fn install(&self, module: &str) -> Result<()>;
}

// ============================================================================
// Process-backed implementations
// ============================================================================

/// Writes the program to a fixed script file and runs a runtime on it.
#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    work_dir: PathBuf,
    script_name: String,
    program: String,
    args: Vec<String>,
}

impl ScriptExecutor {
    /// `node <work_dir>/temp.mjs`
    pub fn node(work_dir: impl Into<PathBuf>) -> Self {
        Self::new(work_dir, "temp.mjs", "node")
    }

    pub fn new(
        work_dir: impl Into<PathBuf>,
        script_name: impl Into<String>,
        program: impl Into<String>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            script_name: script_name.into(),
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Arguments placed before the script path.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn script_path(&self) -> PathBuf {
        self.work_dir.join(&self.script_name)
    }
}

impl Executor for ScriptExecutor {
    async fn execute(&self, program: &str) -> Result<ExecutionOutcome> {
        let script = self.script_path();

        // Overwrites any previous attempt's script.
        tokio::fs::write(&script, program).await.map_err(|e| {
            Error::from(e)
                .with_operation("executor::write_script")
                .with_context("path", script.display().to_string())
        })?;

        tracing::debug!(
            program = %self.program,
            script = %script.display(),
            bytes = program.len(),
            "executing script"
        );

        // `output()` waits for the child to exit before the next attempt can start.
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&script)
            .current_dir(&self.work_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_failed(&self.program, e, "executor::execute"))?;

        Ok(outcome_from(output))
    }
}

fn outcome_from(output: Output) -> ExecutionOutcome {
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if output.status.success() {
        return ExecutionOutcome::success(stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let detail = if stderr.trim().is_empty() {
        format!("{}\n{}", output.status, stdout)
    } else {
        stderr
    };

    let kind = if reports_missing_module(&detail) {
        FailureKind::ModuleNotFound
    } else {
        FailureKind::Runtime
    };

    ExecutionOutcome::failure(kind, detail).with_output(stdout)
}

fn reports_missing_module(detail: &str) -> bool {
    detail.contains("ERR_MODULE_NOT_FOUND")
        || detail.contains("Cannot find package")
        || detail.contains("Cannot find module")
}

/// A program with leading arguments; the module name is appended when run.
#[derive(Debug, Clone)]
struct ModuleCommand {
    program: String,
    args: Vec<String>,
}

impl ModuleCommand {
    fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    async fn run(&self, work_dir: &Path, module: &str, operation: &'static str) -> Result<Output> {
        Command::new(&self.program)
            .args(&self.args)
            .arg(module)
            .current_dir(work_dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_failed(&self.program, e, operation).with_context("module", module))
    }
}

/// Runs `<program> <args..> <module>` to install a dependency, then
/// optionally checks that the module now resolves.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    work_dir: PathBuf,
    install: ModuleCommand,
    verify: Option<ModuleCommand>,
}

impl CommandInstaller {
    /// `npm install <module>` in `work_dir`, verified with a dynamic `import()` under node
    pub fn npm(work_dir: impl Into<PathBuf>) -> Self {
        Self::new(work_dir, "npm", vec!["install".into()]).with_verify(
            "node",
            vec![
                "--input-type=module".into(),
                "-e".into(),
                "await import(process.argv[1])".into(),
            ],
        )
    }

    pub fn new(work_dir: impl Into<PathBuf>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            install: ModuleCommand::new(program, args),
            verify: None,
        }
    }

    /// Command run as `<program> <args..> <module>` after a successful install;
    /// a non-zero exit means the module still does not resolve.
    pub fn with_verify(mut self, program: impl Into<String>, args: Vec<String>) -> Self {
        self.verify = Some(ModuleCommand::new(program, args));
        self
    }
}

impl Installer for CommandInstaller {
    async fn install(&self, module: &str) -> Result<()> {
        tracing::info!(program = %self.install.program, module, "installing missing module");

        let output = self
            .install
            .run(&self.work_dir, module, "installer::install")
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::install_failed(
                module,
                format!("{} exited with {}: {}", self.install.program, output.status, stderr.trim()),
            )
            .with_operation("installer::install"));
        }

        if let Some(verify) = &self.verify {
            let output = verify.run(&self.work_dir, module, "installer::verify").await?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(Error::install_failed(
                    module,
                    format!("installed but still not resolvable: {}", stderr.trim()),
                )
                .with_operation("installer::verify"));
            }
        }

        tracing::info!(module, "module installed");
        Ok(())
    }
}

fn spawn_failed(program: &str, err: std::io::Error, operation: &'static str) -> Error {
    Error::new(ErrorKind::IoFailed, format!("failed to start '{}': {}", program, err))
        .with_operation(operation)
        .with_context("program", program)
        .set_source(err)
}

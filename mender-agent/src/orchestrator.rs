//! Self-healing orchestrator - drives the generate/execute/repair/test loop

use crate::error::{Error, Result};
use crate::executor::{Executor, Installer};
use crate::history::{AttemptHistory, CodeAttempt};
use crate::policy::{Diagnosis, OutputPolicy};
use crate::prompt;
use mender_client::CompletionSource;
use serde::Serialize;

/// Ceilings that guarantee a run terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Completion calls that rewrite failing code
    pub max_regenerations: usize,
    /// Installer invocations across the whole run
    pub max_install_retries: usize,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_regenerations: 10,
            max_install_retries: 5,
        }
    }
}

/// Configuration for the orchestrator
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    pub limits: RunLimits,
    pub policy: OutputPolicy,
}

/// Result of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Code that ran cleanly and passed its generated tests
    pub code: String,
    /// Test harness the final code passed
    pub harness: String,
    /// Every attempt of the run, oldest first
    pub attempts: Vec<CodeAttempt>,
    pub regenerations: usize,
    pub installs: usize,
}

/// Which run a failure came from; an install retry resumes the same one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Execute,
    TestExecute,
}

#[derive(Debug)]
enum State {
    Generate,
    Execute,
    Diagnose { detail: String, phase: Phase },
    InstallRetry { module: String, phase: Phase },
    Regenerate,
    TestGenerate,
    TestExecute,
    Done,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::Generate => "GENERATE",
            State::Execute => "EXECUTE",
            State::Diagnose { .. } => "DIAGNOSE",
            State::InstallRetry { .. } => "INSTALL_RETRY",
            State::Regenerate => "REGENERATE",
            State::TestGenerate => "TEST_GENERATE",
            State::TestExecute => "TEST_EXECUTE",
            State::Done => "DONE",
        }
    }
}

/// Everything one run owns. Dropped when the run ends.
struct RunContext<'a> {
    instructions: &'a str,
    history: AttemptHistory,
    harness: Option<String>,
    regenerations: usize,
    installs: usize,
}

impl<'a> RunContext<'a> {
    fn new(instructions: &'a str) -> Self {
        Self {
            instructions,
            history: AttemptHistory::new(),
            harness: None,
            regenerations: 0,
            installs: 0,
        }
    }

    fn current_code(&self) -> Result<&str> {
        self.history
            .current()
            .map(|attempt| attempt.code.as_str())
            .ok_or_else(|| Error::unexpected("no code attempt in progress"))
    }
}

/// The orchestrator - one completion source, one executor, one installer.
///
/// `run` keeps all per-run state in a local context, so a single orchestrator
/// can serve several runs without them sharing history.
pub struct Orchestrator<C, E, I> {
    client: C,
    executor: E,
    installer: I,
    config: OrchestratorConfig,
}

impl<C, E, I> Orchestrator<C, E, I>
where
    C: CompletionSource,
    E: Executor,
    I: Installer,
{
    pub fn new(client: C, executor: E, installer: I) -> Self {
        Self::with_config(client, executor, installer, OrchestratorConfig::default())
    }

    pub fn with_config(client: C, executor: E, installer: I, config: OrchestratorConfig) -> Self {
        Self {
            client,
            executor,
            installer,
            config,
        }
    }

    /// Run until the code passes its own tests or a fatal error occurs.
    pub async fn run(&self, instructions: &str) -> Result<RunReport> {
        let mut ctx = RunContext::new(instructions);
        let mut state = State::Generate;

        tracing::info!(
            instructions,
            failure_marker = self.config.policy.failure_marker(),
            "starting run"
        );

        loop {
            tracing::debug!(
                state = state.name(),
                attempt = ctx.history.len(),
                regenerations = ctx.regenerations,
                installs = ctx.installs,
                "transition"
            );

            state = match state {
                State::Generate => {
                    let code = self.complete(&prompt::generate(ctx.instructions)).await?;
                    ctx.history.push(code);
                    State::Execute
                }

                State::Execute => {
                    let outcome = self.executor.execute(ctx.current_code()?).await?;
                    if !outcome.succeeded {
                        tracing::info!(
                            attempt = ctx.history.len(),
                            kind = ?outcome.error_kind,
                            "execution failed"
                        );
                        State::Diagnose {
                            detail: outcome.error_detail,
                            phase: Phase::Execute,
                        }
                    } else if ctx.harness.is_some() {
                        State::TestExecute
                    } else {
                        State::TestGenerate
                    }
                }

                State::Diagnose { detail, phase } => match self.config.policy.diagnose(&detail) {
                    Diagnosis::MissingDependency(module) => State::InstallRetry { module, phase },
                    Diagnosis::Generic => {
                        let context = match (phase, ctx.harness.as_deref()) {
                            (Phase::TestExecute, Some(harness)) => {
                                prompt::test_failure_context(harness, &detail)
                            }
                            _ => detail,
                        };
                        ctx.history.fail_current(context);
                        State::Regenerate
                    }
                },

                State::InstallRetry { module, phase } => {
                    let max = self.config.limits.max_install_retries;
                    if ctx.installs >= max {
                        return Err(Error::retries_exhausted("install retries", max)
                            .with_operation("orchestrator::install_retry")
                            .with_context("module", module));
                    }
                    ctx.installs += 1;

                    tracing::info!(module = %module, install = ctx.installs, "installing missing dependency");
                    self.installer
                        .install(&module)
                        .await
                        .map_err(|e| e.with_operation("orchestrator::install_retry"))?;

                    match phase {
                        Phase::Execute => State::Execute,
                        Phase::TestExecute => State::TestExecute,
                    }
                }

                State::Regenerate => {
                    let max = self.config.limits.max_regenerations;
                    if ctx.regenerations >= max {
                        return Err(Error::retries_exhausted("regenerations", max)
                            .with_operation("orchestrator::regenerate"));
                    }
                    ctx.regenerations += 1;

                    let prompt = {
                        let current = ctx
                            .history
                            .current()
                            .ok_or_else(|| Error::unexpected("no code attempt to regenerate"))?;
                        prompt::regenerate(
                            ctx.instructions,
                            &ctx.history,
                            &current.code,
                            current.error.as_deref().unwrap_or_default(),
                        )
                    };

                    let code = self.complete(&prompt).await?;
                    ctx.history.push(code);
                    tracing::info!(
                        regeneration = ctx.regenerations,
                        attempt = ctx.history.len(),
                        "regenerated code"
                    );
                    State::Execute
                }

                State::TestGenerate => {
                    let prompt = prompt::test_harness(ctx.instructions, ctx.current_code()?);
                    let harness = self.complete(&prompt).await?;
                    ctx.harness = Some(harness);
                    State::TestExecute
                }

                State::TestExecute => match ctx.harness.as_deref() {
                    None => State::TestGenerate,
                    Some(harness) => {
                        let program = format!("{}\n{}", ctx.current_code()?, harness);
                        let outcome = self.executor.execute(&program).await?;

                        if !outcome.succeeded {
                            State::Diagnose {
                                detail: outcome.error_detail,
                                phase: Phase::TestExecute,
                            }
                        } else {
                            let verdict = self.config.policy.judge(outcome.output);
                            if verdict.passed() {
                                State::Done
                            } else {
                                tracing::info!(attempt = ctx.history.len(), "generated tests failed");
                                let context = prompt::test_failure_context(harness, &verdict.output);
                                ctx.history.fail_current(context);
                                State::Regenerate
                            }
                        }
                    }
                },

                State::Done => {
                    let code = ctx.current_code()?.to_string();
                    tracing::info!(
                        attempts = ctx.history.len(),
                        regenerations = ctx.regenerations,
                        installs = ctx.installs,
                        "run complete"
                    );
                    return Ok(RunReport {
                        code,
                        harness: ctx.harness.unwrap_or_default(),
                        attempts: ctx.history.into_attempts(),
                        regenerations: ctx.regenerations,
                        installs: ctx.installs,
                    });
                }
            };
        }
    }

    /// Request a completion and accumulate the whole stream.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let tokens = self
            .client
            .request_completion(prompt)
            .await
            .map_err(|e| e.with_operation("orchestrator::complete"))?;

        let served_by = tokens.served_by();
        let text = tokens
            .collect_text()
            .await
            .map_err(|e| e.with_operation("orchestrator::complete"))?;

        tracing::debug!(backend = served_by.as_str(), chars = text.len(), "completion received");
        Ok(strip_code_fences(&text).to_string())
    }
}

/// Unwrap a fenced code block if the model ignored the plain-text request.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return content;
    };

    // Drop the info string (```js) on the opening line.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.split("```").next().unwrap_or(body).trim_end()
}

//! Pipeline orchestration
//!
//! The engine resolves every pipeline record once at construction,
//! then drives the entry pipeline through each matrix variant in
//! order. Failure semantics are layered: a step failure abandons the
//! rest of its pipeline, a pipeline failure fails the variant, and a
//! failed variant stops matrix iteration after the failure hooks ran.
//!
//! Two clocks bound execution. Each pipeline may declare a watchdog
//! over its own step sequence; an invoked pipeline runs under the
//! tighter of its own watchdog and the caller's remaining budget. The
//! global timeout wraps one whole variant and fires through a
//! cancellation token so the in-flight step can tear down its process
//! group before the variant is reported as timed out.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::core::config::HookConfig;
use crate::core::{
    EngineError, MatrixAssignment, MatrixSpec, PipelineDefinition, PipelineInstance,
    PipelineStatus, ProjectConfig, RunSummary, StepDefinition, SubstContext, TemplateResolver,
    VariantOutcome,
};
use crate::execution::executor::Executor;
use crate::execution::process::{self, ScriptError};
use crate::vcs::VcsClient;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(?:https?|ftp)://)?[\w/\-?=%.]+\.[\w/\-?=%.]+").expect("url pattern")
});

/// How long a cancelled variant gets to tear down before the timeout
/// is reported anyway
const CANCEL_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Replace anything URL-shaped with `***url***`
pub fn sanitize_urls(text: &str) -> String {
    URL_PATTERN.replace_all(text, "***url***").into_owned()
}

/// An absolute deadline plus the watchdog budget that produced it,
/// kept together so timeout errors can report the configured duration
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn tighter(a: Option<Deadline>, b: Option<Deadline>) -> Option<Deadline> {
        match (a, b) {
            (Some(a), Some(b)) => Some(if a.at <= b.at { a } else { b }),
            (a, b) => a.or(b),
        }
    }
}

/// Drives resolved pipelines across matrix variants
pub struct Engine {
    pipelines: HashMap<String, Arc<PipelineDefinition>>,
    matrix: MatrixSpec,
    prefix: String,
    interpreter: String,
    executor: Executor,
    vcs: Arc<dyn VcsClient>,
    on_success: Vec<HookConfig>,
    on_failure: Vec<HookConfig>,
    hide_links: bool,
    global_timeout: Option<Duration>,
}

impl Engine {
    /// Resolve every pipeline record and build the engine
    pub fn new(
        config: &ProjectConfig,
        executor: Executor,
        vcs: Arc<dyn VcsClient>,
    ) -> Result<Self, EngineError> {
        let resolver = TemplateResolver::new(&config.templates);
        let mut pipelines = HashMap::new();
        for record in &config.pipelines {
            let resolved = resolver.resolve(record)?;
            let definition = PipelineDefinition::from_value(&resolved)?;
            debug!(pipeline = %definition.name, steps = definition.steps.len(), "resolved pipeline");
            pipelines.insert(definition.name.clone(), Arc::new(definition));
        }

        Ok(Self {
            pipelines,
            matrix: config.matrix_spec(),
            prefix: config.prefix.clone(),
            interpreter: config.script_executor.clone(),
            executor,
            vcs,
            on_success: config.on_success.clone(),
            on_failure: config.on_failure.clone(),
            hide_links: config.security_options.hide_links,
            global_timeout: config.timeout.map(Duration::from_secs),
        })
    }

    /// Replace a pipeline's watchdog, for the CLI override
    pub fn override_watchdog(
        &mut self,
        name: &str,
        watchdog: Option<Duration>,
    ) -> Result<(), EngineError> {
        let definition = self.pipeline(name)?.as_ref().clone();
        self.pipelines.insert(
            name.to_string(),
            Arc::new(PipelineDefinition {
                watchdog,
                ..definition
            }),
        );
        Ok(())
    }

    pub fn pipeline(&self, name: &str) -> Result<&Arc<PipelineDefinition>, EngineError> {
        self.pipelines
            .get(name)
            .ok_or_else(|| EngineError::PipelineNotFound(name.to_string()))
    }

    /// Run the entry pipeline once per matrix variant, fail-fast
    pub async fn execute_entrypoint(&self, name: &str) -> Result<RunSummary, EngineError> {
        let definition = self.pipeline(name)?.clone();
        let workspace = tempfile::tempdir()?;
        let started_at = Utc::now();
        let mut outcomes = Vec::new();

        let total = self.matrix.variant_count();
        for (index, assignment) in self.matrix.assignments().enumerate() {
            info!(
                pipeline = %definition.name,
                variant = index + 1,
                total,
                ?assignment,
                "starting matrix variant"
            );
            let variant_started = Utc::now();
            let variant_dir = workspace.path().join(format!("variant-{index}"));
            tokio::fs::create_dir_all(&variant_dir).await?;

            let (instance, result) = self
                .run_variant(&definition, &assignment, &variant_dir)
                .await;

            let outcome_error = match result {
                Ok(()) => {
                    let mut success_info = instance.success_info.clone();
                    if self.hide_links {
                        success_info = sanitize_urls(&success_info);
                    }
                    self.run_success_hooks(&instance, &assignment, &success_info, &variant_dir)
                        .await
                        .err()
                }
                Err(e) => {
                    error!(
                        pipeline = %definition.name,
                        ?assignment,
                        cause = %e,
                        "matrix variant failed"
                    );
                    if let Err(hook_error) = self
                        .run_failure_hooks(&instance, &assignment, &e, &variant_dir)
                        .await
                    {
                        error!(cause = %hook_error, "failure hooks aborted");
                    }
                    Some(e)
                }
            };

            let failed = outcome_error.is_some();
            let status = match &outcome_error {
                None => PipelineStatus::Succeeded,
                Some(e) if e.is_timeout() => PipelineStatus::TimedOut,
                Some(_) => PipelineStatus::Failed,
            };
            outcomes.push(VariantOutcome {
                assignment: assignment.clone(),
                status,
                error: outcome_error.map(|e| e.to_string()),
                started_at: variant_started,
                finished_at: Utc::now(),
            });

            if failed {
                break;
            }
        }

        Ok(RunSummary {
            pipeline_name: definition.name.clone(),
            outcomes,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Run a single named step of a pipeline, once per matrix variant
    ///
    /// Debugging aid: no checkout, no hooks, no global timeout.
    pub async fn execute_step(&self, pipeline: &str, step_name: &str) -> Result<(), EngineError> {
        let definition = self.pipeline(pipeline)?.clone();
        let step = definition
            .steps
            .iter()
            .find(|s| s.name() == step_name)
            .ok_or_else(|| {
                EngineError::Config(format!(
                    "pipeline '{pipeline}' has no step '{step_name}'"
                ))
            })?
            .clone();

        let workspace = tempfile::tempdir()?;
        let cancel = CancellationToken::new();
        for assignment in self.matrix.assignments() {
            let instance =
                PipelineInstance::new(definition.clone(), workspace.path().to_path_buf());
            match &step {
                StepDefinition::Run { name, script } => {
                    self.run_script_step(&instance, name, script, &assignment, None, &cancel)
                        .await?;
                }
                StepDefinition::Invoke { pipeline, .. } => {
                    let target = self.pipeline(pipeline)?.clone();
                    let mut inner =
                        PipelineInstance::new(target, workspace.path().to_path_buf());
                    self.run_pipeline(&mut inner, &assignment, workspace.path(), None, &cancel)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Release executor resources at end of run
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.executor.shutdown().await
    }

    /// One variant of the entry pipeline under the global timeout
    async fn run_variant(
        &self,
        definition: &Arc<PipelineDefinition>,
        assignment: &MatrixAssignment,
        workspace: &Path,
    ) -> (PipelineInstance, Result<(), EngineError>) {
        let mut instance = PipelineInstance::new(definition.clone(), workspace.to_path_buf());
        let cancel = CancellationToken::new();

        let result = {
            let fut = self.run_pipeline(&mut instance, assignment, workspace, None, &cancel);
            tokio::pin!(fut);

            match self.global_timeout {
                Some(limit) => tokio::select! {
                    result = &mut fut => result,
                    _ = tokio::time::sleep(limit) => {
                        info!(pipeline = %definition.name, ?limit, "global timeout, cancelling variant");
                        cancel.cancel();
                        // Let the in-flight step tear its process group
                        // down, but only for so long: a collaborator
                        // that ignores the token must not stall the
                        // timeout report. Dropping the future kills
                        // any remaining kill_on_drop children.
                        tokio::select! {
                            _ = &mut fut => {}
                            _ = tokio::time::sleep(CANCEL_DRAIN_GRACE) => {}
                        }
                        Err(EngineError::GlobalTimeout(limit))
                    }
                },
                None => fut.await,
            }
        };

        (instance, result)
    }

    /// Execute a pipeline instance: checkout, then steps in order
    ///
    /// Boxed because `run_pipeline` recurses through invoke steps.
    fn run_pipeline<'a>(
        &'a self,
        instance: &'a mut PipelineInstance,
        assignment: &'a MatrixAssignment,
        workspace: &'a Path,
        deadline: Option<Deadline>,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<(), EngineError>> + Send + 'a>> {
        Box::pin(async move {
            let result = self
                .run_pipeline_inner(instance, assignment, workspace, deadline, cancel)
                .await;
            instance.status = match &result {
                Ok(()) => PipelineStatus::Succeeded,
                Err(e) if e.is_timeout() => PipelineStatus::TimedOut,
                Err(_) => PipelineStatus::Failed,
            };
            result
        })
    }

    async fn run_pipeline_inner(
        &self,
        instance: &mut PipelineInstance,
        assignment: &MatrixAssignment,
        workspace: &Path,
        inherited: Option<Deadline>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        if let Some(git) = instance.definition.git.clone() {
            info!(pipeline = %instance.definition.name, url = %git.url, "checking out source");
            let checkout = self.vcs.checkout(&git, workspace, cancel).await?;
            instance.record_checkout(
                workspace.join(&git.checkout_name),
                checkout.commit_hash,
                checkout.commit_message,
            );
        }
        instance.status = PipelineStatus::Running;

        let own = instance.definition.watchdog.map(|budget| Deadline {
            at: Instant::now() + budget,
            budget,
        });
        let deadline = Deadline::tighter(inherited, own);

        let steps = instance.definition.steps.clone();
        for step in &steps {
            info!(pipeline = %instance.definition.name, step = step.name(), "running step");
            match step {
                StepDefinition::Run { name, script } => {
                    self.run_script_step(instance, name, script, assignment, deadline, cancel)
                        .await?;
                }
                StepDefinition::Invoke { pipeline, .. } => {
                    // Missing targets fail before anything is spawned
                    let target = self.pipeline(pipeline)?.clone();
                    let mut inner = PipelineInstance::new(target, workspace.to_path_buf());
                    self.run_pipeline(&mut inner, assignment, workspace, deadline, cancel)
                        .await?;
                }
            }
        }

        if let Some(template) = &instance.definition.success_info_template {
            let mut ctx = SubstContext::with_base(instance.pipeline_subst.clone());
            ctx.push(assignment_layer(assignment));
            ctx.push(HashMap::from([(
                "success_info".to_string(),
                String::new(),
            )]));
            instance.success_info = ctx.render(template)?;
        }

        Ok(())
    }

    /// Render a run step's script and execute it on the target
    async fn run_script_step(
        &self,
        instance: &PipelineInstance,
        step_name: &str,
        script: &str,
        assignment: &MatrixAssignment,
        deadline: Option<Deadline>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let mut ctx = SubstContext::with_base(instance.pipeline_subst.clone());
        ctx.push(assignment_layer(assignment));
        let body = ctx.render_lines(script)?;

        self.run_script(step_name, &body, &instance.workdir, deadline, cancel)
            .await
    }

    /// Write a rendered body to a scratch file and run it
    async fn run_script(
        &self,
        step_name: &str,
        body: &str,
        workdir: &Path,
        deadline: Option<Deadline>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let scratch = std::env::temp_dir().join(format!("conveyor-{}.sh", Uuid::new_v4()));
        let script = format!(
            "#!{}\nset -ex\n{}\n{}\n",
            self.interpreter, self.prefix, body
        );
        debug!(step = step_name, scratch = %scratch.display(), "rendered script");
        tokio::fs::write(&scratch, script).await?;

        let result = async {
            self.executor.upload_file(&scratch).await?;
            let command = self.executor.render_command(&scratch);
            process::run_streaming(&command, workdir, deadline.map(|d| d.at), cancel)
                .await
                .map_err(|e| match e {
                    ScriptError::Spawn(e) => EngineError::Io(e),
                    ScriptError::NonZero { code, tail } => EngineError::Execution {
                        step: step_name.to_string(),
                        code,
                        tail,
                    },
                    ScriptError::DeadlineElapsed => EngineError::Watchdog(
                        deadline.map(|d| d.budget).unwrap_or_default(),
                    ),
                    ScriptError::Cancelled => {
                        EngineError::GlobalTimeout(self.global_timeout.unwrap_or_default())
                    }
                })
        }
        .await;

        let _ = tokio::fs::remove_file(&scratch).await;
        result
    }

    async fn run_success_hooks(
        &self,
        instance: &PipelineInstance,
        assignment: &MatrixAssignment,
        success_info: &str,
        workspace: &Path,
    ) -> Result<(), EngineError> {
        let mut hook_layer = HashMap::new();
        hook_layer.insert(
            "pipeline_name".to_string(),
            instance.definition.name.clone(),
        );
        hook_layer.insert("success_info".to_string(), success_info.to_string());
        self.run_hooks(&self.on_success, instance, assignment, hook_layer, workspace)
            .await
    }

    async fn run_failure_hooks(
        &self,
        instance: &PipelineInstance,
        assignment: &MatrixAssignment,
        cause: &EngineError,
        workspace: &Path,
    ) -> Result<(), EngineError> {
        let mut hook_layer = HashMap::new();
        hook_layer.insert(
            "pipeline_name".to_string(),
            instance.definition.name.clone(),
        );
        hook_layer.insert("error_message".to_string(), cause.to_string());
        self.run_hooks(&self.on_failure, instance, assignment, hook_layer, workspace)
            .await
    }

    /// Run a hook list; the first failing hook aborts the rest
    async fn run_hooks(
        &self,
        hooks: &[HookConfig],
        instance: &PipelineInstance,
        assignment: &MatrixAssignment,
        hook_layer: HashMap<String, String>,
        workspace: &Path,
    ) -> Result<(), EngineError> {
        if hooks.is_empty() {
            return Ok(());
        }

        let mut ctx = SubstContext::with_base(instance.pipeline_subst.clone());
        ctx.push(assignment_layer(assignment));
        ctx.push(hook_layer);

        let cancel = CancellationToken::new();
        for hook in hooks {
            info!(hook = %hook.name, "running hook");
            let result = async {
                let body = ctx.render_lines(&hook.run)?;
                self.run_script(&hook.name, &body, workspace, None, &cancel)
                    .await
            }
            .await;
            if let Err(e) = result {
                return Err(EngineError::Hook {
                    name: hook.name.clone(),
                    source: Box::new(e),
                });
            }
        }
        Ok(())
    }
}

fn assignment_layer(assignment: &MatrixAssignment) -> HashMap<String, String> {
    assignment
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

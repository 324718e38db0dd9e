//! Concrete pipeline definitions
//!
//! A [`PipelineDefinition`] is parsed from a fully resolved YAML record
//! (templates already expanded) and is immutable for the rest of the
//! run. Per-variant execution state lives in
//! [`PipelineInstance`](crate::core::PipelineInstance).

use serde::Deserialize;
use serde_yaml::Value;
use std::time::Duration;

use crate::core::EngineError;

/// Default success message for pipelines with a checkout but no
/// explicit `success_info`
const DEFAULT_GIT_SUCCESS_INFO: &str = "Pipeline {pipeline_name} has been successfully executed.\n\
Commit hash: {commit_hash}\n\
Commit message: {commit_message}\n";

/// One step of a pipeline: a shell script or a nested pipeline call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepDefinition {
    /// Render `script` and run it on the executor
    Run { name: String, script: String },
    /// Execute another pipeline by name
    Invoke { name: String, pipeline: String },
}

impl StepDefinition {
    pub fn name(&self) -> &str {
        match self {
            StepDefinition::Run { name, .. } => name,
            StepDefinition::Invoke { name, .. } => name,
        }
    }
}

/// Source checkout for a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSpec {
    pub url: String,
    pub branch: Option<String>,
    pub commit: Option<String>,
    /// Directory name the checkout lands in under the workspace
    pub checkout_name: String,
}

/// A named, ordered step sequence with optional checkout and watchdog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDefinition {
    pub name: String,
    pub steps: Vec<StepDefinition>,
    /// Wall-clock bound over the whole step sequence
    pub watchdog: Option<Duration>,
    pub success_info_template: Option<String>,
    pub git: Option<GitSpec>,
}

#[derive(Debug, Deserialize)]
struct PipelineRecord {
    name: String,
    #[serde(default)]
    steps: Vec<StepRecord>,
    #[serde(default)]
    watchdog: Option<u64>,
    #[serde(default)]
    success_info: Option<String>,
    #[serde(default)]
    git: Option<GitRecord>,
}

#[derive(Debug, Deserialize)]
struct StepRecord {
    name: String,
    #[serde(default)]
    run: Option<String>,
    #[serde(default)]
    run_pipeline: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitRecord {
    url: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    commit: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl PipelineDefinition {
    /// Parse a resolved record; shape errors are configuration errors
    pub fn from_value(record: &Value) -> Result<Self, EngineError> {
        let record: PipelineRecord = serde_yaml::from_value(record.clone())
            .map_err(|e| EngineError::Config(format!("malformed pipeline record: {e}")))?;

        let mut steps = Vec::with_capacity(record.steps.len());
        for step in record.steps {
            steps.push(parse_step(&record.name, step)?);
        }

        let git = record.git.map(|g| {
            let checkout_name = g.name.unwrap_or_else(|| checkout_name_from_url(&g.url));
            GitSpec {
                url: g.url,
                branch: g.branch,
                commit: g.commit,
                checkout_name,
            }
        });

        // Checked-out pipelines report the commit by default
        let success_info_template = record
            .success_info
            .or_else(|| git.as_ref().map(|_| DEFAULT_GIT_SUCCESS_INFO.to_string()));

        Ok(Self {
            name: record.name,
            steps,
            watchdog: record
                .watchdog
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs),
            success_info_template,
            git,
        })
    }
}

fn parse_step(pipeline: &str, step: StepRecord) -> Result<StepDefinition, EngineError> {
    match (step.run, step.run_pipeline) {
        (Some(script), None) => Ok(StepDefinition::Run {
            name: step.name,
            script,
        }),
        (None, Some(target)) => Ok(StepDefinition::Invoke {
            name: step.name,
            pipeline: target,
        }),
        (Some(_), Some(_)) => Err(EngineError::Config(format!(
            "step '{}' of pipeline '{}' has both 'run' and 'run_pipeline'",
            step.name, pipeline
        ))),
        (None, None) => Err(EngineError::Config(format!(
            "step '{}' of pipeline '{}' has neither 'run' nor 'run_pipeline'",
            step.name, pipeline
        ))),
    }
}

/// Last path segment of the URL, minus a trailing `.git`
fn checkout_name_from_url(url: &str) -> String {
    let tail = url.trim_end_matches('/').rsplit('/').next().unwrap_or(url);
    tail.strip_suffix(".git").unwrap_or(tail).to_string()
}

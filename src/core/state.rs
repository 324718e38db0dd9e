//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::{MatrixAssignment, PipelineDefinition};

/// Lifecycle of one pipeline execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    /// Not started
    Pending,
    /// Source checkout completed
    CheckedOut,
    /// Steps are executing
    Running,
    /// Every step exited zero
    Succeeded,
    /// A step failed or a resolution error surfaced mid-run
    Failed,
    /// The watchdog or global timeout fired
    TimedOut,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Succeeded | PipelineStatus::Failed | PipelineStatus::TimedOut
        )
    }
}

/// Mutable per-execution state of a pipeline
///
/// Created fresh for every matrix variant and every nested invocation;
/// the underlying [`PipelineDefinition`] is shared read-only.
#[derive(Debug)]
pub struct PipelineInstance {
    pub definition: Arc<PipelineDefinition>,
    pub status: PipelineStatus,
    /// Variables accumulated during execution (commit hash, etc.),
    /// visible to later steps and to hooks
    pub pipeline_subst: HashMap<String, String>,
    /// Rendered success message, populated on success
    pub success_info: String,
    /// Directory steps run in; moves into the checkout if one happens
    pub workdir: PathBuf,
}

impl PipelineInstance {
    pub fn new(definition: Arc<PipelineDefinition>, workdir: PathBuf) -> Self {
        let mut pipeline_subst = HashMap::new();
        pipeline_subst.insert("pipeline_name".to_string(), definition.name.clone());
        Self {
            definition,
            status: PipelineStatus::Pending,
            pipeline_subst,
            success_info: String::new(),
            workdir,
        }
    }

    /// Record a completed checkout and move the working directory into it
    pub fn record_checkout(&mut self, workdir: PathBuf, hash: String, message: String) {
        self.pipeline_subst.insert("commit_hash".to_string(), hash);
        self.pipeline_subst
            .insert("commit_message".to_string(), message);
        self.workdir = workdir;
        self.status = PipelineStatus::CheckedOut;
    }
}

/// Terminal result of one matrix variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantOutcome {
    pub assignment: MatrixAssignment,
    pub status: PipelineStatus,
    /// Failure cause, if any
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// End-of-run report over all attempted matrix variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub pipeline_name: String,
    pub outcomes: Vec<VariantOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| o.status == PipelineStatus::Succeeded)
    }

    pub fn variants_attempted(&self) -> usize {
        self.outcomes.len()
    }
}

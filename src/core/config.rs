//! Project configuration from YAML

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::core::{EngineError, MatrixSpec};

/// Top-level project file
///
/// Pipelines and templates stay as raw YAML records here: a record may
/// still carry `use_template`/`args` and only becomes a concrete
/// [`PipelineDefinition`](crate::core::PipelineDefinition) after the
/// resolver has run over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Name of the entry pipeline to execute
    pub pipeline_name: String,

    /// Pipeline records, concrete or template-referencing
    #[serde(default)]
    pub pipelines: Vec<Value>,

    /// Pipeline templates, only ever used as resolution sources
    #[serde(default)]
    pub templates: Vec<Value>,

    /// Build matrix dimensions
    #[serde(default)]
    pub matrix: BTreeMap<String, Vec<String>>,

    /// Text prepended to every rendered script after the preamble
    #[serde(default)]
    pub prefix: String,

    /// Interpreter for rendered scripts
    #[serde(default = "default_script_executor")]
    pub script_executor: String,

    /// Container execution target; absent means local execution
    #[serde(rename = "runs-on-docker", default)]
    pub runs_on_docker: Option<DockerTarget>,

    /// Hooks run after a matrix variant succeeds
    #[serde(default)]
    pub on_success: Vec<HookConfig>,

    /// Hooks run after a variant fails or times out
    #[serde(default)]
    pub on_failure: Vec<HookConfig>,

    #[serde(default)]
    pub security_options: SecurityOptions,

    /// Global per-matrix-variant timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

fn default_script_executor() -> String {
    "/bin/sh".to_string()
}

/// Container image plus files to seed into it at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerTarget {
    pub image: String,

    /// Files copied into the container before any step runs
    #[serde(default)]
    pub add: Vec<FileMapping>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMapping {
    pub src: String,
    pub dst: String,
}

/// A hook is a named script, same shape as a run step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookConfig {
    pub name: String,
    pub run: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityOptions {
    /// Redact URLs from success messages before hooks see them
    #[serde(default)]
    pub hide_links: bool,
}

impl ProjectConfig {
    /// Load and validate a project file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a project definition from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, EngineError> {
        let config: ProjectConfig =
            serde_yaml::from_str(yaml).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that don't need template resolution
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.pipeline_name.is_empty() {
            return Err(EngineError::Config("pipeline_name is empty".into()));
        }

        let mut pipeline_names = std::collections::HashSet::new();
        for record in &self.pipelines {
            let name = record_name(record, "pipeline")?;
            if !pipeline_names.insert(name.to_string()) {
                return Err(EngineError::Config(format!(
                    "duplicate pipeline name: '{name}'"
                )));
            }
        }
        if !pipeline_names.contains(&self.pipeline_name) {
            return Err(EngineError::Config(format!(
                "entry pipeline '{}' is not defined",
                self.pipeline_name
            )));
        }

        let mut template_names = std::collections::HashSet::new();
        for record in &self.templates {
            let name = record_name(record, "template")?;
            if !template_names.insert(name.to_string()) {
                return Err(EngineError::Config(format!(
                    "duplicate template name: '{name}'"
                )));
            }
        }

        Ok(())
    }

    pub fn matrix_spec(&self) -> MatrixSpec {
        MatrixSpec::new(self.matrix.clone())
    }
}

/// Pull the mandatory string `name` out of a raw record
pub fn record_name<'a>(record: &'a Value, kind: &str) -> Result<&'a str, EngineError> {
    record
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::Config(format!("{kind} record has no string 'name' field")))
}

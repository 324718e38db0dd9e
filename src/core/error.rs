//! Error taxonomy for the pipeline engine

use std::time::Duration;
use thiserror::Error;

/// Errors produced while resolving or executing a project
#[derive(Debug, Error)]
pub enum EngineError {
    /// The project file is structurally invalid
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A `run_pipeline` step or the entrypoint named an unknown pipeline
    #[error("pipeline not found: '{0}'")]
    PipelineNotFound(String),

    /// A `use_template` reference named an unknown template
    #[error("template not found: '{0}'")]
    TemplateNotFound(String),

    /// Template instantiation failed (cycle, bad arguments, malformed record)
    #[error("template resolution failed: {0}")]
    Resolution(String),

    /// A placeholder referenced a key absent from every substitution layer
    #[error("no substitution value for key '{0}'")]
    MissingKey(String),

    /// A script exited non-zero; `tail` holds the last lines of its output
    #[error("script for step '{step}' exited with code {code}")]
    Execution {
        step: String,
        code: i32,
        tail: String,
    },

    /// A pipeline overran its watchdog
    #[error("pipeline watchdog elapsed after {0:?}")]
    Watchdog(Duration),

    /// A matrix variant overran the global timeout
    #[error("global timeout of {0:?} exceeded")]
    GlobalTimeout(Duration),

    /// Fetching or checking out the source repository failed
    #[error("checkout failed: {0}")]
    Checkout(String),

    /// The container runtime refused or lost the execution target
    #[error("container runtime error: {0}")]
    Container(String),

    /// A hook script failed
    #[error("hook '{name}' failed: {source}")]
    Hook {
        name: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// True for the two timeout-shaped failures
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            EngineError::Watchdog(_) | EngineError::GlobalTimeout(_)
        )
    }
}

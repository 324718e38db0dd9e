//! conveyor - a declarative build pipeline runner
//!
//! Projects are YAML files describing pipelines of shell steps,
//! expanded over a build matrix and executed locally or inside a
//! docker container, with success/failure hooks at the end.

pub mod cli;
pub mod core;
pub mod execution;
pub mod vcs;

// Re-export commonly used types
pub use crate::core::{
    EngineError, MatrixAssignment, MatrixSpec, PipelineDefinition, PipelineInstance,
    PipelineStatus, ProjectConfig, RunSummary, StepDefinition, SubstContext,
};
pub use crate::execution::{ContainerRuntime, DockerCli, Engine, Executor};
pub use crate::vcs::{GitClient, VcsClient};

//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod process;

pub use engine::{sanitize_urls, Engine};
pub use executor::{ContainerError, ContainerRuntime, DockerCli, Executor};
pub use process::{run_streaming, ScriptError};

//! Execution targets for rendered scripts
//!
//! An [`Executor`] decides where a rendered script runs: directly on
//! the host, or inside a long-lived container started for the duration
//! of the run. The container side talks to a [`ContainerRuntime`],
//! with [`DockerCli`] driving the `docker` binary.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::config::DockerTarget;
use crate::core::EngineError;

/// Failures from the container runtime
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to invoke docker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("docker {command} failed: {stderr}")]
    Command { command: String, stderr: String },
}

impl From<ContainerError> for EngineError {
    fn from(e: ContainerError) -> Self {
        EngineError::Container(e.to_string())
    }
}

/// Narrow interface over a container engine
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a long-lived container and return its handle
    async fn start(&self, image: &str) -> Result<String, ContainerError>;

    /// Copy a host file into the container
    async fn upload(&self, container: &str, src: &Path, dst: &str) -> Result<(), ContainerError>;

    /// Command line that runs a script inside the container
    fn exec_command(&self, container: &str, interpreter: &str, script: &Path) -> String;

    /// Tear the container down
    async fn remove(&self, container: &str) -> Result<(), ContainerError>;
}

/// [`ContainerRuntime`] backed by the `docker` CLI
pub struct DockerCli;

impl DockerCli {
    async fn docker(&self, args: &[&str]) -> Result<String, ContainerError> {
        debug!(?args, "running docker");
        let output = Command::new("docker").args(args).output().await?;
        if !output.status.success() {
            return Err(ContainerError::Command {
                command: args.first().unwrap_or(&"").to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn start(&self, image: &str) -> Result<String, ContainerError> {
        let name = format!("conveyor-{}", Uuid::new_v4().simple());
        self.docker(&[
            "run",
            "-d",
            "--name",
            &name,
            image,
            "tail",
            "-f",
            "/dev/null",
        ])
        .await?;
        info!(container = %name, %image, "container started");
        Ok(name)
    }

    async fn upload(&self, container: &str, src: &Path, dst: &str) -> Result<(), ContainerError> {
        let src = src.to_string_lossy();
        let target = format!("{container}:{dst}");
        self.docker(&["cp", &src, &target]).await?;
        Ok(())
    }

    fn exec_command(&self, container: &str, interpreter: &str, script: &Path) -> String {
        format!("docker exec {container} {interpreter} {}", script.display())
    }

    async fn remove(&self, container: &str) -> Result<(), ContainerError> {
        self.docker(&["rm", "-f", container]).await?;
        info!(%container, "container removed");
        Ok(())
    }
}

/// Where rendered scripts run, fixed once per run
pub enum Executor {
    /// Scripts run as host processes
    Local { interpreter: String },
    /// Scripts run inside a container started at construction
    Container {
        interpreter: String,
        container: String,
        runtime: Arc<dyn ContainerRuntime>,
    },
}

impl Executor {
    pub fn local(interpreter: impl Into<String>) -> Self {
        Executor::Local {
            interpreter: interpreter.into(),
        }
    }

    /// Start the container and seed it with the configured files
    pub async fn container(
        runtime: Arc<dyn ContainerRuntime>,
        target: &DockerTarget,
        interpreter: impl Into<String>,
    ) -> Result<Self, EngineError> {
        let container = runtime.start(&target.image).await?;
        for mapping in &target.add {
            runtime
                .upload(&container, Path::new(&mapping.src), &mapping.dst)
                .await?;
        }
        Ok(Executor::Container {
            interpreter: interpreter.into(),
            container,
            runtime,
        })
    }

    pub fn interpreter(&self) -> &str {
        match self {
            Executor::Local { interpreter } => interpreter,
            Executor::Container { interpreter, .. } => interpreter,
        }
    }

    /// Make a scratch script reachable on the execution target
    pub async fn upload_file(&self, path: &Path) -> Result<(), EngineError> {
        match self {
            Executor::Local { .. } => Ok(()),
            Executor::Container {
                container, runtime, ..
            } => {
                let dst = path.to_string_lossy();
                runtime.upload(container, path, &dst).await?;
                Ok(())
            }
        }
    }

    /// Command line that executes an uploaded script on the target
    pub fn render_command(&self, script: &Path) -> String {
        match self {
            Executor::Local { interpreter } => {
                format!("{interpreter} {}", script.display())
            }
            Executor::Container {
                interpreter,
                container,
                runtime,
            } => runtime.exec_command(container, interpreter, script),
        }
    }

    /// Release target resources at end of run
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        if let Executor::Container {
            container, runtime, ..
        } = self
        {
            runtime.remove(container).await?;
        }
        Ok(())
    }
}

//! Source checkout through the git CLI

use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::{EngineError, GitSpec};

/// What a completed checkout reports back into the pipeline context
#[derive(Debug, Clone)]
pub struct CheckoutInfo {
    pub commit_hash: String,
    pub commit_message: String,
}

/// Version-control collaborator used by pipelines with a `git` block
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Materialize `spec.checkout_name` under `base`
    ///
    /// `cancel` fires on a run-wide abort; implementations must stop
    /// promptly and kill any subprocess they spawned.
    async fn checkout(
        &self,
        spec: &GitSpec,
        base: &Path,
        cancel: &CancellationToken,
    ) -> Result<CheckoutInfo, EngineError>;
}

/// [`VcsClient`] shelling out to `git`
pub struct GitClient;

impl GitClient {
    async fn git(
        &self,
        args: &[&str],
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        let mut command = Command::new("git");
        command.args(args).current_dir(dir).kill_on_drop(true);
        // Dropping the output future on cancellation kills the child
        let output = tokio::select! {
            output = command.output() => output
                .map_err(|e| EngineError::Checkout(format!("failed to invoke git: {e}")))?,
            _ = cancel.cancelled() => {
                return Err(EngineError::Checkout(format!(
                    "git {} cancelled",
                    args.first().unwrap_or(&"")
                )));
            }
        };
        if !output.status.success() {
            return Err(EngineError::Checkout(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl VcsClient for GitClient {
    async fn checkout(
        &self,
        spec: &GitSpec,
        base: &Path,
        cancel: &CancellationToken,
    ) -> Result<CheckoutInfo, EngineError> {
        let mut args = vec!["clone"];
        if let Some(branch) = &spec.branch {
            args.push("--branch");
            args.push(branch);
        }
        args.push(&spec.url);
        args.push(&spec.checkout_name);
        self.git(&args, base, cancel).await?;

        let checkout_dir = base.join(&spec.checkout_name);
        if let Some(commit) = &spec.commit {
            self.git(&["checkout", commit], &checkout_dir, cancel).await?;
        }

        let commit_hash = self
            .git(&["log", "-1", "--format=%H"], &checkout_dir, cancel)
            .await?;
        let commit_message = self
            .git(&["log", "-1", "--format=%s"], &checkout_dir, cancel)
            .await?;
        info!(url = %spec.url, commit = %commit_hash, "checkout complete");

        Ok(CheckoutInfo {
            commit_hash,
            commit_message,
        })
    }
}

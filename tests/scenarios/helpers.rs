//! Test utilities shared by the scenario tests

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use conveyor::core::{EngineError, GitSpec, ProjectConfig, RunSummary};
use conveyor::execution::{Engine, Executor};
use conveyor::vcs::{CheckoutInfo, VcsClient};
use tokio_util::sync::CancellationToken;

pub const FAKE_COMMIT_HASH: &str = "deadbeefdeadbeefdeadbeefdeadbeefdeadbeef";
pub const FAKE_COMMIT_MESSAGE: &str = "add widget support";

/// VCS stub that materializes an empty checkout directory
pub struct FakeVcs;

#[async_trait]
impl VcsClient for FakeVcs {
    async fn checkout(
        &self,
        spec: &GitSpec,
        base: &Path,
        _cancel: &CancellationToken,
    ) -> Result<CheckoutInfo, EngineError> {
        tokio::fs::create_dir_all(base.join(&spec.checkout_name)).await?;
        Ok(CheckoutInfo {
            commit_hash: FAKE_COMMIT_HASH.to_string(),
            commit_message: FAKE_COMMIT_MESSAGE.to_string(),
        })
    }
}

/// Build an engine over a local executor and the VCS stub
pub fn engine_for(yaml: &str) -> (ProjectConfig, Engine) {
    let config = ProjectConfig::from_yaml(yaml).expect("project should parse");
    let executor = Executor::local(config.script_executor.clone());
    let engine =
        Engine::new(&config, executor, Arc::new(FakeVcs)).expect("project should resolve");
    (config, engine)
}

/// Run a project to completion and return the summary
pub async fn run_project(yaml: &str) -> RunSummary {
    let (config, engine) = engine_for(yaml);
    engine
        .execute_entrypoint(&config.pipeline_name)
        .await
        .expect("run should produce a summary")
}

/// Read a marker file written by test scripts, empty if absent
pub fn read_marker(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

/// Lines of a marker file
pub fn marker_lines(path: &Path) -> Vec<String> {
    read_marker(path).lines().map(String::from).collect()
}

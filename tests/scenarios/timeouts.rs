//! Watchdog and global timeout enforcement

use crate::helpers::{marker_lines, run_project};
use async_trait::async_trait;
use conveyor::core::{EngineError, GitSpec, PipelineStatus, ProjectConfig};
use conveyor::execution::{Engine, Executor};
use conveyor::vcs::{CheckoutInfo, VcsClient};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// True while the process is still running; a dead-but-unreaped zombie
/// counts as terminated (orphans reparent to a PID 1 that may reap lazily)
fn process_alive(pid: &str) -> bool {
    let stat = match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat,
        Err(_) => return false,
    };
    // state is the first field after the parenthesized comm
    let state = stat
        .rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next());
    !matches!(state, Some('Z') | Some('X') | None)
}

#[tokio::test]
async fn test_watchdog_kills_overrunning_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("sleep.pid");

    let yaml = format!(
        r#"
pipeline_name: slow
pipelines:
  - name: slow
    watchdog: 1
    steps:
      - name: sleep-forever
        run: |
          sleep 30 &
          echo $! >> {pid_file}
          wait $!
"#,
        pid_file = pid_file.display()
    );

    let started = Instant::now();
    let summary = run_project(&yaml).await;

    assert!(!summary.succeeded());
    assert_eq!(summary.outcomes[0].status, PipelineStatus::TimedOut);
    assert!(summary.outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("watchdog"));
    // terminated promptly, not after the sleep ran its course
    assert!(started.elapsed() < Duration::from_secs(15));

    // the whole process subtree is gone, not just the shell
    let pids = marker_lines(&pid_file);
    assert_eq!(pids.len(), 1);
    assert!(!process_alive(&pids[0]));
}

#[tokio::test]
async fn test_watchdog_spans_the_whole_step_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("steps.txt");

    // Each step is fast, but together they overrun the watchdog
    let yaml = format!(
        r#"
pipeline_name: creeping
pipelines:
  - name: creeping
    watchdog: 1
    steps:
      - name: first
        run: |
          echo first >> {marker}
          sleep 3
      - name: second
        run: echo second >> {marker}
"#,
        marker = marker.display()
    );

    let summary = run_project(&yaml).await;
    assert!(!summary.succeeded());
    assert_eq!(summary.outcomes[0].status, PipelineStatus::TimedOut);
    assert_eq!(marker_lines(&marker), vec!["first"]);
}

#[tokio::test]
async fn test_outer_watchdog_bounds_invoked_pipeline() {
    let yaml = r#"
pipeline_name: outer
pipelines:
  - name: outer
    watchdog: 1
    steps:
      - name: call-inner
        run_pipeline: inner
  - name: inner
    steps:
      - name: sleep-forever
        run: sleep 30
"#;

    let started = Instant::now();
    let summary = run_project(yaml).await;

    assert!(!summary.succeeded());
    assert_eq!(summary.outcomes[0].status, PipelineStatus::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(15));
}

#[tokio::test]
async fn test_global_timeout_stops_matrix_and_runs_failure_hooks_once() {
    let dir = tempfile::tempdir().unwrap();
    let attempts = dir.path().join("attempts.txt");
    let hook_marker = dir.path().join("hooks.txt");

    let yaml = format!(
        r#"
pipeline_name: build
timeout: 1
matrix:
  v: [a, b, c]
on_failure:
  - name: alert
    run: echo hook >> {hook_marker}
pipelines:
  - name: build
    steps:
      - name: maybe-hang
        run: |
          echo {{v}} >> {attempts}
          if [ "{{v}}" = "b" ]; then sleep 30; fi
"#,
        attempts = attempts.display(),
        hook_marker = hook_marker.display()
    );

    let started = Instant::now();
    let summary = run_project(&yaml).await;

    assert!(!summary.succeeded());
    assert_eq!(summary.variants_attempted(), 2);
    assert_eq!(summary.outcomes[0].status, PipelineStatus::Succeeded);
    assert_eq!(summary.outcomes[1].status, PipelineStatus::TimedOut);
    assert!(summary.outcomes[1]
        .error
        .as_deref()
        .unwrap()
        .contains("global timeout"));

    // variant c never started, and the failure hooks ran exactly once
    assert_eq!(marker_lines(&attempts), vec!["a", "b"]);
    assert_eq!(marker_lines(&hook_marker), vec!["hook"]);
    assert!(started.elapsed() < Duration::from_secs(20));
}

/// VCS stub that hangs without ever looking at the cancellation token
struct StallingVcs;

#[async_trait]
impl VcsClient for StallingVcs {
    async fn checkout(
        &self,
        _spec: &GitSpec,
        _base: &Path,
        _cancel: &CancellationToken,
    ) -> Result<CheckoutInfo, EngineError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(CheckoutInfo {
            commit_hash: "never".to_string(),
            commit_message: "never".to_string(),
        })
    }
}

#[tokio::test]
async fn test_global_timeout_holds_while_checkout_hangs() {
    let yaml = r#"
pipeline_name: build
timeout: 1
pipelines:
  - name: build
    git:
      url: https://example.com/widget.git
    steps:
      - name: noop
        run: "true"
"#;

    let config = ProjectConfig::from_yaml(yaml).unwrap();
    let executor = Executor::local(config.script_executor.clone());
    let engine = Engine::new(&config, executor, Arc::new(StallingVcs)).unwrap();

    let started = Instant::now();
    let summary = engine
        .execute_entrypoint(&config.pipeline_name)
        .await
        .unwrap();

    assert!(!summary.succeeded());
    assert_eq!(summary.outcomes[0].status, PipelineStatus::TimedOut);
    assert!(summary.outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("global timeout"));
    // timeout plus the teardown grace, nowhere near the 30s hang
    assert!(started.elapsed() < Duration::from_secs(10));
}

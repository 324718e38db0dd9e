//! Step failure propagation and fail-fast matrix iteration

use crate::helpers::{marker_lines, run_project};
use conveyor::core::PipelineStatus;

#[tokio::test]
async fn test_failing_step_abandons_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("steps.txt");

    let yaml = format!(
        r#"
pipeline_name: build
pipelines:
  - name: build
    steps:
      - name: first
        run: echo first >> {marker}
      - name: second
        run: exit 1
      - name: third
        run: echo third >> {marker}
"#,
        marker = marker.display()
    );

    let summary = run_project(&yaml).await;
    assert!(!summary.succeeded());
    assert_eq!(summary.outcomes[0].status, PipelineStatus::Failed);

    let error = summary.outcomes[0].error.as_deref().unwrap();
    assert!(error.contains("second"));
    assert!(error.contains("exited with code 1"));

    // third never ran
    assert_eq!(marker_lines(&marker), vec!["first"]);
}

#[tokio::test]
async fn test_matrix_iteration_stops_at_first_failing_variant() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("attempts.txt");

    let yaml = format!(
        r#"
pipeline_name: build
matrix:
  v: ["1", "2", "3"]
pipelines:
  - name: build
    steps:
      - name: maybe-fail
        run: |
          echo {{v}} >> {marker}
          if [ "{{v}}" = "2" ]; then exit 5; fi
"#,
        marker = marker.display()
    );

    let summary = run_project(&yaml).await;
    assert!(!summary.succeeded());
    assert_eq!(summary.variants_attempted(), 2);
    assert_eq!(summary.outcomes[0].status, PipelineStatus::Succeeded);
    assert_eq!(summary.outcomes[1].status, PipelineStatus::Failed);

    // variant 3 was never attempted
    assert_eq!(marker_lines(&marker), vec!["1", "2"]);
}

#[tokio::test]
async fn test_failed_invocation_fails_the_outer_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("outer.txt");

    let yaml = format!(
        r#"
pipeline_name: outer
pipelines:
  - name: outer
    steps:
      - name: call-inner
        run_pipeline: inner
      - name: after
        run: echo after >> {marker}
  - name: inner
    steps:
      - name: explode
        run: exit 9
"#,
        marker = marker.display()
    );

    let summary = run_project(&yaml).await;
    assert!(!summary.succeeded());
    assert_eq!(summary.outcomes[0].status, PipelineStatus::Failed);
    assert!(summary.outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("exited with code 9"));

    // the step after the invocation never ran
    assert!(marker_lines(&marker).is_empty());
}

#[tokio::test]
async fn test_unknown_invocation_target_fails_before_running_anything() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("steps.txt");

    let yaml = format!(
        r#"
pipeline_name: outer
pipelines:
  - name: outer
    steps:
      - name: call-missing
        run_pipeline: nonexistent
      - name: after
        run: echo after >> {marker}
"#,
        marker = marker.display()
    );

    let summary = run_project(&yaml).await;
    assert!(!summary.succeeded());
    assert!(summary.outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("pipeline not found"));
    assert!(marker_lines(&marker).is_empty());
}

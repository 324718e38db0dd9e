//! Matrix expansion order and per-variant substitution

use crate::helpers::{marker_lines, run_project};
use conveyor::core::PipelineStatus;

#[tokio::test]
async fn test_every_variant_runs_in_matrix_order() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("variants.txt");

    let yaml = format!(
        r#"
pipeline_name: build
matrix:
  arch: [x86, arm]
  cc: [gcc, clang]
pipelines:
  - name: build
    steps:
      - name: record
        run: echo "{{arch}}-{{cc}}" >> {marker}
"#,
        marker = marker.display()
    );

    let summary = run_project(&yaml).await;
    assert!(summary.succeeded());
    assert_eq!(summary.variants_attempted(), 4);

    // Dimensions sort to [arch, cc]; cc varies fastest
    assert_eq!(
        marker_lines(&marker),
        vec!["x86-gcc", "x86-clang", "arm-gcc", "arm-clang"]
    );
}

#[tokio::test]
async fn test_no_matrix_means_single_variant() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran.txt");

    let yaml = format!(
        r#"
pipeline_name: solo
pipelines:
  - name: solo
    steps:
      - name: record
        run: echo once >> {marker}
"#,
        marker = marker.display()
    );

    let summary = run_project(&yaml).await;
    assert!(summary.succeeded());
    assert_eq!(summary.variants_attempted(), 1);
    assert!(summary.outcomes[0].assignment.is_empty());
    assert_eq!(marker_lines(&marker), vec!["once"]);
}

#[tokio::test]
async fn test_missing_substitution_key_fails_variant() {
    let yaml = r#"
pipeline_name: broken
pipelines:
  - name: broken
    steps:
      - name: bad
        run: echo {never_defined}
"#;

    let summary = run_project(yaml).await;
    assert!(!summary.succeeded());
    assert_eq!(summary.outcomes[0].status, PipelineStatus::Failed);
    assert!(summary.outcomes[0]
        .error
        .as_deref()
        .unwrap()
        .contains("never_defined"));
}

#[tokio::test]
async fn test_prefix_is_prepended_to_scripts() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("prefix.txt");

    let yaml = format!(
        r#"
pipeline_name: prefixed
prefix: "GREETING=hello"
pipelines:
  - name: prefixed
    steps:
      - name: use-prefix
        run: echo "$GREETING" >> {marker}
"#,
        marker = marker.display()
    );

    let summary = run_project(&yaml).await;
    assert!(summary.succeeded());
    assert_eq!(marker_lines(&marker), vec!["hello"]);
}

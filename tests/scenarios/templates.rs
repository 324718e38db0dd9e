//! Template-driven pipeline definitions

use crate::helpers::{engine_for, marker_lines, run_project};

#[tokio::test]
async fn test_templated_pipelines_run_with_their_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("compilers.txt");

    let yaml = format!(
        r#"
pipeline_name: all
templates:
  - name: compile_template
    steps:
      - name: compile
        run: echo "built with {{compiler}}" >> {marker}
pipelines:
  - name: all
    steps:
      - name: gcc-build
        run_pipeline: build_gcc
      - name: clang-build
        run_pipeline: build_clang
  - name: build_gcc
    use_template: compile_template
    args:
      compiler: gcc
  - name: build_clang
    use_template: compile_template
    args:
      compiler: clang
"#,
        marker = marker.display()
    );

    let summary = run_project(&yaml).await;
    assert!(summary.succeeded());
    assert_eq!(
        marker_lines(&marker),
        vec!["built with gcc", "built with clang"]
    );
}

#[tokio::test]
async fn test_template_body_can_defer_to_runtime_variables() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("runtime.txt");

    // {{arch}} in the template escapes instantiation and renders from
    // the matrix assignment at run time
    let yaml = format!(
        r#"
pipeline_name: build
matrix:
  arch: [riscv]
templates:
  - name: t
    steps:
      - name: record
        run: echo "{{compiler}}-{{{{arch}}}}" >> {marker}
pipelines:
  - name: build
    use_template: t
    args:
      compiler: gcc
"#,
        marker = marker.display()
    );

    let summary = run_project(&yaml).await;
    assert!(summary.succeeded());
    assert_eq!(marker_lines(&marker), vec!["gcc-riscv"]);
}

#[tokio::test]
async fn test_missing_template_is_a_resolution_failure() {
    let yaml = r#"
pipeline_name: p
pipelines:
  - name: p
    use_template: ghost
    args: {}
"#;
    let config = conveyor::core::ProjectConfig::from_yaml(yaml).unwrap();
    let executor = conveyor::execution::Executor::local("/bin/sh");
    let result = conveyor::execution::Engine::new(
        &config,
        executor,
        std::sync::Arc::new(crate::helpers::FakeVcs),
    );
    match result.err() {
        Some(conveyor::core::EngineError::TemplateNotFound(name)) => assert_eq!(name, "ghost"),
        other => panic!("expected TemplateNotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_entry_pipeline_can_come_from_template() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("entry.txt");

    let yaml = format!(
        r#"
pipeline_name: main
templates:
  - name: t
    steps:
      - name: record
        run: echo "{{what}}" >> {marker}
pipelines:
  - name: main
    use_template: t
    args:
      what: hello
"#,
        marker = marker.display()
    );

    let (config, engine) = engine_for(&yaml);
    let summary = engine.execute_entrypoint(&config.pipeline_name).await.unwrap();
    assert!(summary.succeeded());
    assert_eq!(marker_lines(&marker), vec!["hello"]);
}

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use conveyor::cli::commands::{RunCommand, ValidateCommand};
use conveyor::cli::output::*;
use conveyor::cli::{Cli, Command};
use conveyor::core::{PipelineDefinition, ProjectConfig, TemplateResolver};
use conveyor::execution::{DockerCli, Engine, Executor};
use conveyor::vcs::GitClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_project(cmd).await?,
        Command::Validate(cmd) => validate_project(cmd)?,
    }

    Ok(())
}

async fn run_project(cmd: &RunCommand) -> Result<()> {
    let config =
        ProjectConfig::from_file(&cmd.file).context("Failed to load project config")?;

    println!(
        "{} Loaded project: {}",
        INFO,
        style(&config.pipeline_name).bold()
    );

    let executor = match &config.runs_on_docker {
        Some(target) => {
            println!(
                "{} Starting container from {}",
                INFO,
                style(&target.image).cyan()
            );
            Executor::container(Arc::new(DockerCli), target, config.script_executor.clone())
                .await
                .context("Failed to start execution container")?
        }
        None => Executor::local(config.script_executor.clone()),
    };

    let mut engine = Engine::new(&config, executor, Arc::new(GitClient))
        .context("Failed to resolve pipelines")?;

    if let Some(secs) = cmd.watchdog {
        engine.override_watchdog(&config.pipeline_name, Some(Duration::from_secs(secs)))?;
    }

    // Single-step mode skips checkout, hooks, and the global timeout
    if let Some(step) = &cmd.step {
        println!("{} Running single step {}", ROCKET, style(step).cyan());
        let result = engine.execute_step(&config.pipeline_name, step).await;
        shutdown(&engine).await;
        return match result {
            Ok(()) => {
                println!("{} Step {} completed", CHECK, style(step).bold());
                Ok(())
            }
            Err(e) => {
                println!("{} Step {} {}", CROSS, style(step).bold(), style("failed").red());
                error!("{e}");
                std::process::exit(1);
            }
        };
    }

    println!(
        "{} Starting pipeline {}",
        ROCKET,
        style(&config.pipeline_name).bold()
    );
    println!();

    let result = engine.execute_entrypoint(&config.pipeline_name).await;
    shutdown(&engine).await;

    match result {
        Ok(summary) => {
            println!("\n{}", format_summary(&summary));
            if let Ok(elapsed) = summary
                .finished_at
                .signed_duration_since(summary.started_at)
                .to_std()
            {
                println!("{} Finished in {}", INFO, style(format_duration(elapsed)).dim());
            }
            if !summary.succeeded() {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&config.pipeline_name).bold(),
                style("failed").red()
            );
            error!("{e}");
            std::process::exit(1);
        }
    }
}

async fn shutdown(engine: &Engine) {
    if let Err(e) = engine.shutdown().await {
        error!("failed to release executor: {e}");
    }
}

fn validate_project(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating project...", INFO);

    let result = ProjectConfig::from_file(&cmd.file).and_then(|config| {
        // Resolve every pipeline so template and step-shape errors
        // surface here rather than at run time
        let resolver = TemplateResolver::new(&config.templates);
        for record in &config.pipelines {
            let resolved = resolver.resolve(record)?;
            PipelineDefinition::from_value(&resolved)?;
        }
        Ok(config)
    });

    match result {
        Ok(config) => {
            println!("{} Project configuration is valid!", CHECK);
            println!("  Entry pipeline: {}", style(&config.pipeline_name).bold());
            println!("  Pipelines: {}", style(config.pipelines.len()).cyan());
            println!("  Templates: {}", style(config.templates.len()).cyan());
            println!(
                "  Matrix variants: {}",
                style(config.matrix_spec().variant_count()).cyan()
            );

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(e).red());
            std::process::exit(1);
        }
    }
}

//! CLI command definitions

use clap::Args;

/// Run the entry pipeline of a project file
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to the project YAML file
    #[arg(short, long)]
    pub file: String,

    /// Run only this step of the entry pipeline (debugging aid)
    #[arg(long)]
    pub step: Option<String>,

    /// Override the entry pipeline's watchdog, in seconds
    #[arg(long)]
    pub watchdog: Option<u64>,
}

/// Validate a project file
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to the project YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output the parsed configuration as JSON
    #[arg(long)]
    pub json: bool,
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_DB_NAME: &str = "pflanzenschutz.sqlite";

#[derive(Parser, Debug)]
#[command(
    name = "bvl-sync",
    version,
    about = "Sync the BVL plant-protection register into a packaged SQLite export"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch, load, enrich, validate and package the export.
    Sync(SyncArgs),
    /// Check an existing export without modifying it.
    Validate(ValidateArgs),
    /// Summarize the last build from its manifest and database.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    #[arg(long, default_value = "configs/endpoints.yaml")]
    pub config: PathBuf,

    #[arg(long, default_value = "configs/enrichments.yaml")]
    pub enrichments_config: PathBuf,

    /// Schema file to apply instead of the built-in one.
    #[arg(long)]
    pub schema: Option<PathBuf>,

    #[arg(long, default_value = "data/output")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_DB_NAME)]
    pub db_name: String,

    /// Skip the API fetch and rebuild from what is already stored.
    #[arg(long, default_value_t = false)]
    pub skip_raw: bool,

    #[arg(long = "endpoint")]
    pub endpoints: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(long)]
    pub db_path: PathBuf,

    /// Endpoints config whose `validation` block overrides the defaults.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "data/output")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_DB_NAME)]
    pub db_name: String,
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mixin-kit")]
#[command(about = "Run and inspect configured middleware pipelines", long_about = None)]
pub struct Cli {
    /// Configuration file (overrides MIXIN_KIT_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispatch a JSON context through the configured pipeline
    Run(RunArgs),
    /// Resolve the configured stack and print the handler order
    Check,
    /// Print a setting by dotted path
    Get(GetArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// JSON object handed to the handlers
    #[arg(long, default_value = "{}")]
    pub context: String,
}

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Dotted setting path, e.g. `server.port`
    pub path: String,
}

//! Layercut CLI: headless background cutout and composition.
//!
//! Usage:
//!   layercut compose <INPUT> [OPTIONS]         Cut out one image and export a PNG
//!   layercut batch <INPUT>... --out-dir DIR    Process many images with one style
//!   layercut info <INPUT>                      Show dimensions and alpha coverage

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use layercut_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "layercut",
    about = "Remove photo backgrounds, add backdrops and text behind the subject",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the per-user location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cut out one image and export the composition as PNG
    Compose(commands::compose::ComposeArgs),

    /// Cut out many images with the same backdrop
    Batch(commands::batch::BatchArgs),

    /// Show image information
    Info {
        /// Image to inspect
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    layercut_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Compose(args) => commands::compose::run(&config, args).await,
        Commands::Batch(args) => commands::batch::run(&config, args).await,
        Commands::Info { path } => commands::info::run(path),
    }
}

//! kiln CLI - static site builder with a watch, rebuild and serve loop.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Static site builder with a watch, rebuild and serve loop")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to kiln.toml config file
    #[arg(short, long, global = true, default_value = kiln_static::CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the site once
    Build {
        /// Output directory (defaults to config or "target")
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Build, watch for changes and serve the output
    Dev {
        /// Port to listen on (overrides PORT and the config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Accept connections before the initial build finishes
        #[arg(long)]
        serve_immediately: bool,

        /// Open browser once serving
        #[arg(long)]
        open: bool,
    },

    /// Serve an already built site
    Serve {
        /// Port to listen on (overrides PORT and the config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory to serve (defaults to the configured destination)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    fmt().with_env_filter(filter).with_target(false).init();

    // Execute command
    let result = match cli.command {
        Commands::Build { output } => commands::build::run(&cli.config, output).await,
        Commands::Dev {
            port,
            host,
            serve_immediately,
            open,
        } => {
            let options = commands::dev::DevOptions {
                port,
                host,
                serve_immediately,
                open,
            };
            commands::dev::run(&cli.config, options).await
        }
        Commands::Serve { port, dir } => commands::serve::run(&cli.config, port, dir).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

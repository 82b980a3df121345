//! Lockstep CLI - inspect job processors and run the lock scenario locally.
//!
//! Provides commands for job status, processor health and an in-process demo.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{demo, health, status};
use output::OutputFormat;

/// Lockstep - quorum-locked background jobs
#[derive(Parser)]
#[command(
    name = "lockstep",
    version,
    about = "Lockstep - quorum-locked background jobs",
    long_about = "CLI tool for inspecting lockstep job processors and exercising the lock flow.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Status server URL
    #[arg(
        long,
        global = true,
        env = "LOCKSTEP_URL",
        default_value = "http://localhost:8080"
    )]
    url: String,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show tracked job statuses
    Status(status::StatusArgs),

    /// Check processor health
    Health(health::HealthArgs),

    /// Run the enqueue, dedup and process scenario in-process
    Demo(demo::DemoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let format = cli.output;

    match cli.command {
        Commands::Status(args) => {
            let client = client::ApiClient::new(&cli.url)?;
            status::execute(args, &client, format).await
        }
        Commands::Health(args) => {
            let client = client::ApiClient::new(&cli.url)?;
            health::execute(args, &client, format).await
        }
        Commands::Demo(args) => demo::execute(args, format).await,
    }
}

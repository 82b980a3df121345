//! Health check command.
//!
//! Queries the `/health` endpoint and displays processor status.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Include processor counters
    #[arg(short, long)]
    detailed: bool,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Table => {
            output::print_header("Processor Health");
            output::print_detail("Status", &health.status);
            output::print_detail("API URL", client.base_url());
            output::print_detail("Version", &health.version);
            output::print_detail("Processor", &health.processor.name);
            output::print_detail("Queue depth", &health.queue_depth.to_string());
            output::print_detail("Timestamp", &health.timestamp);

            if args.detailed {
                let p = &health.processor;
                output::print_header("Counters");
                output::print_detail("Processed", &p.processed.to_string());
                output::print_detail("Succeeded", &p.succeeded.to_string());
                output::print_detail("Failed", &p.failed.to_string());
                output::print_detail("Lock not acquired", &p.not_acquired.to_string());
                output::print_detail("Loop errors", &p.loop_errors.to_string());
            }

            match health.status.as_str() {
                "healthy" => output::print_success("Processor running"),
                "starting" => output::print_info("Processor not started yet"),
                other => output::print_error(&format!("Processor status: {}", other)),
            }
            Ok(())
        }
        _ => output::print_item(&health, format),
    }
}

//! Job status command.
//!
//! Lists tracked jobs via `/jobs`, or shows one job via `/jobs/:id`.

use anyhow::Result;
use clap::Args;
use lockstep_core::jobs::{JobStatus, StatusSummary};

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct StatusArgs {
    /// Show a single job by id
    pub id: Option<String>,

    /// Only list jobs in this state (pending, running, completed, failed)
    #[arg(short, long)]
    pub state: Option<String>,

    /// Print per-state counts after the table
    #[arg(long)]
    pub summary: bool,
}

pub async fn execute(args: StatusArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    if let Some(id) = &args.id {
        let job: JobStatus = client.get(&format!("/jobs/{}", id)).await?;
        return output::print_jobs(std::slice::from_ref(&job), format);
    }

    let path = match &args.state {
        Some(state) => format!("/jobs?state={}", state),
        None => "/jobs".to_string(),
    };
    let jobs: Vec<JobStatus> = client.get(&path).await?;
    output::print_jobs(&jobs, format)?;

    if args.summary {
        let summary: StatusSummary = client.get("/jobs/summary").await?;
        match format {
            OutputFormat::Table => print_summary(&summary),
            _ => output::print_item(&summary, format)?,
        }
    }

    Ok(())
}

fn print_summary(summary: &StatusSummary) {
    output::print_header("Summary");
    output::print_detail("Running", &summary.running.to_string());
    output::print_detail("Completed", &summary.completed.to_string());
    output::print_detail("Failed", &summary.failed.to_string());
    output::print_detail("Total", &summary.total().to_string());
}

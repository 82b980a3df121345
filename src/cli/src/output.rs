//! Output formatting utilities for the lockstep CLI.
//!
//! Supports table, JSON, and YAML output formats.

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use lockstep_core::jobs::{JobState, JobStatus};
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Modify, Style},
    Table, Tabled,
};

/// Output format selection.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    /// Render as a formatted table
    #[default]
    Table,
    /// Render as JSON
    Json,
    /// Render as YAML
    Yaml,
}

/// Print a success message to stdout.
pub fn print_success(msg: &str) {
    println!("{} {}", "[OK]".green().bold(), msg);
}

/// Print an error message to stderr.
pub fn print_error(msg: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), msg);
}

/// Print an informational message to stdout.
pub fn print_info(msg: &str) {
    println!("{} {}", "[INFO]".blue().bold(), msg);
}

/// One row of the job status table.
#[derive(Debug, Tabled)]
pub struct JobRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Started")]
    pub started: String,
    #[tabled(rename = "Duration")]
    pub duration: String,
    #[tabled(rename = "Error")]
    pub error: String,
}

impl From<&JobStatus> for JobRow {
    fn from(status: &JobStatus) -> Self {
        let state = match status.state {
            JobState::Completed => status.state.to_string().green().to_string(),
            JobState::Failed => status.state.to_string().red().to_string(),
            JobState::Running => status.state.to_string().yellow().to_string(),
            JobState::Pending => status.state.to_string(),
        };

        Self {
            id: status.id.clone(),
            state,
            started: status
                .started_at
                .map(|t| t.format("%H:%M:%S%.3f").to_string())
                .unwrap_or_else(|| "-".into()),
            duration: status
                .duration()
                .map(|d| format!("{}ms", d.num_milliseconds()))
                .unwrap_or_else(|| "-".into()),
            error: status.error.clone().unwrap_or_default(),
        }
    }
}

/// Render rows as a rounded table.
pub fn render_table<T: Tabled>(items: &[T]) -> String {
    Table::new(items)
        .with(Style::rounded())
        .with(Modify::new(Columns::first()).with(Alignment::left()))
        .to_string()
}

/// Print a single serializable value as JSON or YAML.
pub fn print_item<T: Serialize>(item: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table | OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(item)?);
        }
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(item)?),
    }
    Ok(())
}

/// Print job statuses in the requested format.
pub fn print_jobs(jobs: &[JobStatus], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            if jobs.is_empty() {
                println!("{}", "No jobs tracked.".dimmed());
                return Ok(());
            }
            let rows: Vec<JobRow> = jobs.iter().map(JobRow::from).collect();
            println!("{}", render_table(&rows));
            Ok(())
        }
        _ => print_item(&jobs, format),
    }
}

/// Print key-value details to the terminal (non-JSON/YAML output).
pub fn print_detail(key: &str, value: &str) {
    println!("  {}: {}", key.cyan(), value);
}

/// Print a section header.
pub fn print_header(title: &str) {
    println!();
    println!("{}", title.bold().underline());
    println!();
}

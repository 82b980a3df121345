//! Job lifecycle tracking.
//!
//! `Start` creates (or resets) an entry in `Running`; exactly one of
//! `Complete`/`Fail` may follow. Terminal states are sticky until the next
//! `Start` for the same id.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LockstepError;

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting in the queue
    Pending,
    /// Job is currently being executed
    Running,
    /// Job completed successfully
    Completed,
    /// Job failed (lock not acquired, timed out or action error)
    Failed,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobState {
    type Err = LockstepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(LockstepError::validation(format!(
                "Unknown job state '{}'; expected pending, running, completed or failed",
                s
            ))),
        }
    }
}

/// Observable status of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub id: String,
    pub state: JobState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl JobStatus {
    fn running(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: JobState::Running,
            started_at: Some(Utc::now()),
            completed_at: None,
            error: None,
        }
    }

    /// Wall-clock time between start and completion, if finished.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    fn finish(&mut self, state: JobState, error: Option<String>) {
        let now = Utc::now();
        // Keep started_at <= completed_at even if the wall clock stepped back.
        let completed_at = match self.started_at {
            Some(started) if started > now => started,
            _ => now,
        };
        self.state = state;
        self.completed_at = Some(completed_at);
        self.error = error;
    }
}

/// Count of tracked jobs per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusSummary {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed
    }
}

/// Concurrent map from job id to lifecycle status.
///
/// Entries are never removed here; retention is left to whoever reads
/// [`StatusTracker::get_all`].
#[derive(Debug, Default)]
pub struct StatusTracker {
    statuses: DashMap<String, JobStatus>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a job as running, replacing any previous entry for the id.
    pub fn start(&self, id: &str) {
        self.statuses.insert(id.to_string(), JobStatus::running(id));
    }

    /// Mark a running job as completed.
    ///
    /// Unknown ids and jobs that already finished are left untouched.
    /// Returns whether the entry changed.
    pub fn complete(&self, id: &str) -> bool {
        self.finish(id, JobState::Completed, None)
    }

    /// Mark a running job as failed with an error message.
    ///
    /// Unknown ids and jobs that already finished are left untouched.
    /// Returns whether the entry changed.
    pub fn fail(&self, id: &str, error: impl Into<String>) -> bool {
        self.finish(id, JobState::Failed, Some(error.into()))
    }

    fn finish(&self, id: &str, state: JobState, error: Option<String>) -> bool {
        let Some(mut entry) = self.statuses.get_mut(id) else {
            return false;
        };
        if entry.state.is_terminal() {
            tracing::debug!(
                job_id = id,
                current = %entry.state,
                requested = %state,
                "Ignoring transition out of terminal state"
            );
            return false;
        }
        entry.finish(state, error);
        true
    }

    /// Snapshot of every tracked job, ordered by start time.
    pub fn get_all(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self
            .statuses
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Status of a single job.
    pub fn get(&self, id: &str) -> Option<JobStatus> {
        self.statuses.get(id).map(|entry| entry.value().clone())
    }

    /// Per-state counts.
    pub fn summary(&self) -> StatusSummary {
        let mut summary = StatusSummary::default();
        for entry in self.statuses.iter() {
            match entry.state {
                JobState::Pending => summary.pending += 1,
                JobState::Running => summary.running += 1,
                JobState::Completed => summary.completed += 1,
                JobState::Failed => summary.failed += 1,
            }
        }
        summary
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_sets_running() {
        let tracker = StatusTracker::new();
        tracker.start("test-job");

        let status = tracker.get("test-job").unwrap();
        assert_eq!(status.id, "test-job");
        assert_eq!(status.state, JobState::Running);
        assert!(status.started_at.is_some());
        assert!(status.completed_at.is_none());
        assert!(status.error.is_none());
    }

    #[test]
    fn test_complete_updates_status() {
        let tracker = StatusTracker::new();
        tracker.start("test-job");
        assert!(tracker.complete("test-job"));

        let status = tracker.get("test-job").unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert!(status.completed_at.is_some());
        assert!(status.error.is_none());
        assert!(status.started_at <= status.completed_at);
    }

    #[test]
    fn test_fail_records_error() {
        let tracker = StatusTracker::new();
        tracker.start("test-job");
        assert!(tracker.fail("test-job", "Test error"));

        let status = tracker.get("test-job").unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.error.as_deref(), Some("Test error"));
        assert!(status.completed_at.is_some());
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let tracker = StatusTracker::new();
        assert!(!tracker.complete("non-existent"));
        assert!(!tracker.fail("non-existent", "error"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_parse_state() {
        assert_eq!("failed".parse::<JobState>().unwrap(), JobState::Failed);
        assert_eq!("Running".parse::<JobState>().unwrap(), JobState::Running);

        let err = "done".parse::<JobState>().unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ValidationError);
    }

    #[test]
    fn test_terminal_state_is_sticky() {
        let tracker = StatusTracker::new();
        tracker.start("job1");
        tracker.complete("job1");
        let first = tracker.get("job1").unwrap();

        assert!(!tracker.fail("job1", "late failure"));
        assert!(!tracker.complete("job1"));
        assert_eq!(tracker.get("job1").unwrap(), first);
    }

    #[test]
    fn test_restart_resets_entry() {
        let tracker = StatusTracker::new();
        tracker.start("job1");
        tracker.fail("job1", "Lock not acquired");

        tracker.start("job1");
        let status = tracker.get("job1").unwrap();
        assert_eq!(status.state, JobState::Running);
        assert!(status.error.is_none());
        assert!(status.completed_at.is_none());
    }

    #[test]
    fn test_get_all_is_snapshot() {
        let tracker = StatusTracker::new();
        tracker.start("job1");
        tracker.start("job2");
        tracker.complete("job1");
        tracker.fail("job2", "error");

        let all = tracker.get_all();
        tracker.start("job3");

        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|j| j.id == "job1" && j.state == JobState::Completed));
        assert!(all.iter().any(|j| j.id == "job2" && j.state == JobState::Failed));
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_summary_counts() {
        let tracker = StatusTracker::new();
        tracker.start("a");
        tracker.start("b");
        tracker.start("c");
        tracker.complete("a");
        tracker.fail("b", "boom");

        let summary = tracker.summary();
        assert_eq!(summary.running, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&JobState::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }
}

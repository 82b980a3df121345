//! Deduplicating FIFO work queue.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

use super::Job;

/// Ordered jobs plus the set of their ids.
///
/// Every id in `ids` appears exactly once in `jobs` and vice versa.
#[derive(Debug, Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    ids: HashSet<String>,
}

/// Ordered, deduplicating holding area for pending jobs.
///
/// All operations take the same internal lock, so they are atomic with
/// respect to each other under any number of producers and consumers.
#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
}

impl WorkQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the tail unless a job with the same id is still queued.
    ///
    /// Returns `true` when the job was inserted. A duplicate is dropped
    /// silently; it is not an error.
    pub fn enqueue(&self, job: Job) -> bool {
        let mut state = self.state.lock();
        if state.ids.contains(job.id()) {
            tracing::debug!(job_id = %job.id(), "Duplicate job ignored");
            return false;
        }
        state.ids.insert(job.id().to_string());
        state.jobs.push_back(job);
        metrics::gauge!("lockstep_queue_depth").set(state.jobs.len() as f64);
        true
    }

    /// Remove and return the head of the queue.
    ///
    /// The id leaves the membership set, so the same id may be enqueued again.
    pub fn try_dequeue(&self) -> Option<Job> {
        let mut state = self.state.lock();
        let job = state.jobs.pop_front()?;
        state.ids.remove(job.id());
        metrics::gauge!("lockstep_queue_depth").set(state.jobs.len() as f64);
        Some(job)
    }

    /// Whether a job with this id is queued and not yet dequeued.
    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().ids.contains(id)
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of queued jobs, head first.
    pub fn pending_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .jobs
            .iter()
            .map(|job| job.id().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(id: &str) -> Job {
        Job::from_fn(id, || async { Ok(()) })
    }

    #[test]
    fn test_enqueue_adds_job() {
        let queue = WorkQueue::new();
        assert!(queue.enqueue(noop("test-job")));
        assert!(queue.contains("test-job"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_duplicate_id_is_ignored() {
        let queue = WorkQueue::new();
        assert!(queue.enqueue(noop("job1")));
        assert!(!queue.enqueue(noop("job1")));

        assert_eq!(queue.len(), 1);
        assert!(queue.contains("job1"));
        assert!(queue.try_dequeue().is_some());
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn test_empty_dequeue() {
        let queue = WorkQueue::new();
        assert!(queue.try_dequeue().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_order() {
        let queue = WorkQueue::new();
        for id in ["A", "B", "C"] {
            queue.enqueue(noop(id));
        }

        assert_eq!(queue.pending_ids(), vec!["A", "B", "C"]);
        assert_eq!(queue.try_dequeue().unwrap().id(), "A");
        assert_eq!(queue.try_dequeue().unwrap().id(), "B");
        assert_eq!(queue.try_dequeue().unwrap().id(), "C");
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn test_dequeue_frees_id() {
        let queue = WorkQueue::new();
        queue.enqueue(noop("job1"));
        queue.enqueue(noop("job2"));

        let head = queue.try_dequeue().unwrap();
        assert_eq!(head.id(), "job1");
        assert!(!queue.contains("job1"));
        assert!(queue.contains("job2"));

        assert!(queue.enqueue(noop("job1")));
        assert_eq!(queue.pending_ids(), vec!["job2", "job1"]);
    }
}

//! In-memory job table.
//!
//! Jobs are indexed by id. A FIFO of pending ids serves workers in
//! submission order and a min-heap of completion times drives retention
//! purging without scanning the whole table.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use super::job::{Job, JobStatus, ProcessingResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub active_workers: usize,
}

#[derive(Default)]
pub struct JobTable {
    jobs: HashMap<String, Job>,
    /// Exactly the ids of PENDING jobs, oldest first.
    pending: VecDeque<String>,
    /// Completion time of terminal jobs. Entries left behind by a retry are
    /// skipped when popped.
    expiry: BinaryHeap<Reverse<(DateTime<Utc>, String)>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, job: Job) {
        debug_assert_eq!(job.status, JobStatus::Pending);
        self.pending.push_back(job.id.clone());
        self.jobs.insert(job.id.clone(), job);
    }

    pub fn get(&self, id: &str) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Claims the oldest PENDING job, marking it PROCESSING.
    pub fn claim_next(&mut self) -> Option<Job> {
        while let Some(id) = self.pending.pop_front() {
            if let Some(job) = self.jobs.get_mut(&id) {
                job.start();
                return Some(job.clone());
            }
        }
        None
    }

    pub fn advance(&mut self, id: &str, progress: u8) {
        if let Some(job) = self.jobs.get_mut(id) {
            job.advance(progress);
        }
    }

    pub fn complete(&mut self, id: &str, result: ProcessingResult) {
        if let Some(job) = self.jobs.get_mut(id) {
            job.complete(result);
            Self::schedule_expiry(&mut self.expiry, job);
        }
    }

    pub fn fail(&mut self, id: &str, reason: &str) {
        if let Some(job) = self.jobs.get_mut(id) {
            job.fail(reason);
            Self::schedule_expiry(&mut self.expiry, job);
        }
    }

    /// Cancels a PENDING job. Returns the cancelled job.
    pub fn cancel(&mut self, id: &str) -> Option<Job> {
        let job = self.jobs.get_mut(id)?;
        if !job.cancel() {
            return None;
        }
        self.pending.retain(|p| p != id);
        Self::schedule_expiry(&mut self.expiry, job);
        Some(job.clone())
    }

    /// Puts a FAILED job back at the end of the queue.
    pub fn retry(&mut self, id: &str) -> Option<Job> {
        let job = self.jobs.get_mut(id)?;
        if !job.reset() {
            return None;
        }
        self.pending.push_back(id.to_string());
        Some(job.clone())
    }

    /// Jobs of one owner, oldest first.
    pub fn jobs_for(&self, owner: &str) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .values()
            .filter(|j| j.owner == owner)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats {
            total: self.jobs.len(),
            ..Default::default()
        };
        for job in self.jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Processing => stats.processing += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Removes terminal jobs that completed more than `retention` before
    /// `now`. PENDING and PROCESSING jobs are never removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>, retention: std::time::Duration) -> Vec<Job> {
        let retention = ChronoDuration::from_std(retention).unwrap_or(ChronoDuration::MAX);
        let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let mut purged = Vec::new();

        while let Some(Reverse((completed_at, _))) = self.expiry.peek() {
            if *completed_at > cutoff {
                break;
            }
            let Some(Reverse((completed_at, id))) = self.expiry.pop() else {
                break;
            };
            let expired = self
                .jobs
                .get(&id)
                .is_some_and(|j| j.status.is_terminal() && j.completed_at == Some(completed_at));
            if expired {
                if let Some(job) = self.jobs.remove(&id) {
                    purged.push(job);
                }
            }
        }

        purged
    }

    fn schedule_expiry(expiry: &mut BinaryHeap<Reverse<(DateTime<Utc>, String)>>, job: &Job) {
        if let Some(completed_at) = job.completed_at {
            expiry.push(Reverse((completed_at, job.id.clone())));
        }
    }
}

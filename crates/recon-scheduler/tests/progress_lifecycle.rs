//! End-to-end exercise of job bookkeeping across `JobStore`, `progress_io`,
//! and the stage graph, without depending on the external photogrammetry
//! toolchain or `ffprobe` — those pieces are exercised in their own
//! crates' unit tests.

use recon_layout::JobLayout;
use recon_models::{base_table, Job, JobId, QualityTag, ReconError, StageKind, StageStatus};
use recon_scheduler::progress_io::{cancel_on_disk, delete_on_disk, read_progress, write_progress};
use recon_scheduler::store::JobStore;

fn layout_in(dir: &std::path::Path, id: &JobId) -> JobLayout {
    JobLayout::new(dir, id.clone())
}

#[test]
fn a_job_progresses_through_every_stage_and_completes() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(8);
    let id = store.submit(Job::new("clip.mp4", QualityTag::Fast, base_table(QualityTag::Fast))).unwrap();
    let layout = layout_in(dir.path(), &id);

    assert_eq!(store.take_next(), id);

    for stage in StageKind::ORDER {
        store.update(&id, |job| job.mark_running()).unwrap();
        store.update(&id, |job| job.stages.get_mut(stage).start()).unwrap();
        store.update(&id, |job| job.stages.get_mut(stage).set_progress(0.5, "working")).unwrap();
        store.update(&id, |job| job.stages.get_mut(stage).complete(vec![])).unwrap();
        write_progress(&layout, &store.get(&id).unwrap()).unwrap();
    }
    store.update(&id, |job| job.mark_completed()).unwrap();
    write_progress(&layout, &store.get(&id).unwrap()).unwrap();

    let document = read_progress(&layout).unwrap();
    assert_eq!(document.state, "completed");
    assert!(document.stages.values().all(|s| s.status == StageStatus::Completed));

    let job = store.get(&id).unwrap();
    assert!((job.stages.overall_progress() - 1.0).abs() < 1e-9);
}

#[test]
fn cancelling_a_running_job_persists_and_then_deletes_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(8);
    let id = store.submit(Job::new("clip.mp4", QualityTag::Medium, base_table(QualityTag::Medium))).unwrap();
    let layout = layout_in(dir.path(), &id);

    assert_eq!(store.take_next(), id);
    store.update(&id, |job| job.mark_running()).unwrap();
    store.update(&id, |job| job.stages.get_mut(StageKind::Features).start()).unwrap();
    write_progress(&layout, &store.get(&id).unwrap()).unwrap();

    // A separate CLI-style invocation cancels by mutating the file directly.
    cancel_on_disk(&layout).unwrap();
    let document = read_progress(&layout).unwrap();
    assert_eq!(document.state, "cancelled");
    assert_eq!(document.stages["FEATURES"].status, StageStatus::Cancelled);
    // Stages that never started are cancelled too, not left pending forever.
    assert_eq!(document.stages["EXPORT"].status, StageStatus::Cancelled);

    delete_on_disk(&layout).unwrap();
    assert!(!layout.job_dir().exists());
}

#[test]
fn deleting_a_pending_job_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let store = JobStore::new(8);
    let id = store.submit(Job::new("clip.mp4", QualityTag::High, base_table(QualityTag::High))).unwrap();
    let layout = layout_in(dir.path(), &id);
    write_progress(&layout, &store.get(&id).unwrap()).unwrap();

    let result = delete_on_disk(&layout);
    assert!(matches!(result, Err(ReconError::JobNotTerminal(_))));
}

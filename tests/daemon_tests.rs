//! The daemon loop: the scheduler driving incremental sync passes.

mod common;

use common::{engine, listen, MemoryStore, ScriptedFeed};
use scrobble_mirror::background_jobs::{
    create_scheduler, jobs::ScrobbleSyncJob, JobError, JobRun, JobRunStatus, SchedulerHandle,
    Trigger,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const JOB_ID: &str = "scrobble_sync";

async fn wait_for_runs(handle: &SchedulerHandle, count: usize) -> Vec<JobRun> {
    for _ in 0..500 {
        let history = handle.get_job_history(JOB_ID, 100).await;
        if history.len() >= count && !handle.is_job_running(JOB_ID).await {
            return history;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for {} runs of {}", count, JOB_ID);
}

async fn trigger(handle: &SchedulerHandle) {
    for _ in 0..500 {
        match handle.trigger_job(JOB_ID).await {
            Ok(()) => return,
            Err(JobError::AlreadyRunning) => {
                tokio::time::sleep(Duration::from_millis(10)).await
            }
            Err(e) => panic!("Unexpected trigger error: {}", e),
        }
    }
    panic!("{} never became idle", JOB_ID);
}

#[tokio::test]
async fn test_daemon_syncs_on_startup_and_on_trigger() {
    let feed = ScriptedFeed::new(vec![
        listen("Arthur Russell", "World of Echo", "Tower of Meaning", 0),
        listen("Arthur Russell", "World of Echo", "Soon-to-Be Innocent Fun", 6),
    ]);
    let store = MemoryStore::new();
    let sync_engine = Arc::new(engine(&feed, &store, 50));

    let shutdown = CancellationToken::new();
    let (mut scheduler, handle) = create_scheduler(shutdown.clone());
    scheduler
        .register_job(Arc::new(ScrobbleSyncJob::new(
            sync_engine,
            Duration::from_secs(3600),
        )))
        .await;
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    let runs = wait_for_runs(&handle, 1).await;
    assert_eq!(runs[0].status, JobRunStatus::Completed);
    assert_eq!(store.tracks().len(), 2);

    feed.scrobble(listen("Arthur Russell", "Calling Out of Context", "That's Us/Wild Combination", 12));
    trigger(&handle).await;
    let runs = wait_for_runs(&handle, 2).await;
    assert_eq!(runs[0].status, JobRunStatus::Completed);
    assert_eq!(runs[0].triggered_by, Trigger::Manual);
    assert_eq!(store.tracks().len(), 3);
    assert_eq!(store.titles()[2], "That's Us/Wild Combination");

    shutdown.cancel();
    scheduler_task.await.unwrap();
}

#[tokio::test]
async fn test_failed_pass_is_logged_and_next_run_recovers() {
    let feed = ScriptedFeed::new(vec![listen("Julee Cruise", "Floating into the Night", "Falling", 2)]);
    let store = MemoryStore::new();
    store.fail_checkpoint("played_at is not an integer");
    let sync_engine = Arc::new(engine(&feed, &store, 50));

    let shutdown = CancellationToken::new();
    let (mut scheduler, handle) = create_scheduler(shutdown.clone());
    scheduler
        .register_job(Arc::new(ScrobbleSyncJob::new(
            sync_engine,
            Duration::from_secs(3600),
        )))
        .await;
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    let runs = wait_for_runs(&handle, 1).await;
    assert_eq!(runs[0].status, JobRunStatus::Failed);
    assert!(runs[0]
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("played_at is not an integer"));
    assert!(store.tracks().is_empty());

    // The scheduler keeps going after a failure
    store.heal();
    trigger(&handle).await;
    let runs = wait_for_runs(&handle, 2).await;
    assert_eq!(runs[0].status, JobRunStatus::Completed);
    assert_eq!(store.titles(), vec!["Falling"]);

    shutdown.cancel();
    scheduler_task.await.unwrap();
}

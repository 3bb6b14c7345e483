//! Recurring incremental sync of the daemon.
//!
//! Runs once on startup and then on every interval tick. A failed pass is
//! reported to the scheduler and the next tick tries again.

use crate::background_jobs::{BackgroundJob, HookEvent, JobContext, JobError, JobSchedule};
use crate::sync::{SyncEngine, SyncError};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct ScrobbleSyncJob {
    engine: Arc<SyncEngine>,
    interval: Duration,
}

impl ScrobbleSyncJob {
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

impl BackgroundJob for ScrobbleSyncJob {
    fn id(&self) -> &'static str {
        "scrobble_sync"
    }

    fn name(&self) -> &'static str {
        "Scrobble Sync"
    }

    fn description(&self) -> &'static str {
        "Mirror new Last.fm scrobbles into the local store"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Combined {
            interval: Some(self.interval),
            hooks: vec![HookEvent::OnStartup],
        }
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        match self.engine.update(&ctx.cancellation_token) {
            Ok(report) => {
                if report.tracks_created > 0 {
                    info!(
                        "Synced {} new scrobbles for {}",
                        report.tracks_created,
                        self.engine.settings().username
                    );
                }
                Ok(())
            }
            Err(SyncError::Cancelled) => Err(JobError::Cancelled),
            Err(e) => Err(JobError::ExecutionFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{FeedError, FeedPage, ListenRecord, MockRecentTracksFeed, PageCount};
    use crate::scrobble_store::SqliteScrobbleStore;
    use crate::sync::{RetryPolicy, SyncSettings};
    use tokio_util::sync::CancellationToken;

    fn make_job(feed: MockRecentTracksFeed, store: Arc<SqliteScrobbleStore>) -> ScrobbleSyncJob {
        let settings = SyncSettings {
            username: "rj".into(),
            api_key: "key".into(),
            page_size: 150,
        };
        let engine = SyncEngine::new(Arc::new(feed), store.clone(), store, settings)
            .with_retry_policy(RetryPolicy::none());
        ScrobbleSyncJob::new(Arc::new(engine), Duration::from_secs(60))
    }

    #[test]
    fn test_schedule_runs_on_startup_and_interval() {
        let job = make_job(
            MockRecentTracksFeed::new(),
            Arc::new(SqliteScrobbleStore::in_memory().unwrap()),
        );
        let schedule = job.schedule();
        assert_eq!(schedule.interval(), Some(Duration::from_secs(60)));
        assert!(schedule.listens_to(HookEvent::OnStartup));
    }

    #[test]
    fn test_execute_stores_new_scrobbles() {
        let store = Arc::new(SqliteScrobbleStore::in_memory().unwrap());
        let mut feed = MockRecentTracksFeed::new();
        feed.expect_total_pages().returning(|_| {
            Ok(PageCount {
                total_pages: 1,
                total_records: 2,
            })
        });
        feed.expect_fetch_page().returning(|_| {
            Ok(FeedPage {
                records: vec![
                    ListenRecord {
                        artist_name: "Yo La Tengo".into(),
                        album_name: "Painful".into(),
                        track_title: "Big Day Coming".into(),
                        timestamp_text: String::new(),
                        is_now_playing: true,
                    },
                    ListenRecord {
                        artist_name: "Yo La Tengo".into(),
                        album_name: "Painful".into(),
                        track_title: "From a Motel 6".into(),
                        timestamp_text: "05 Apr 2024, 09:30".into(),
                        is_now_playing: false,
                    },
                ],
                page: 1,
                total_pages: 1,
                total_records: 2,
            })
        });

        let job = make_job(feed, store.clone());
        job.execute(&JobContext::new(CancellationToken::new()))
            .unwrap();

        let tracks = store.list_tracks().unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "From a Motel 6");
    }

    #[test]
    fn test_execute_maps_failures() {
        let store = Arc::new(SqliteScrobbleStore::in_memory().unwrap());
        let mut feed = MockRecentTracksFeed::new();
        feed.expect_total_pages()
            .returning(|_| Err(FeedError::Transport("connection refused".into())));

        let job = make_job(feed, store);
        match job.execute(&JobContext::new(CancellationToken::new())) {
            Err(JobError::ExecutionFailed(msg)) => assert!(msg.contains("connection refused")),
            other => panic!("Expected ExecutionFailed, got {:?}", other),
        }

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert!(matches!(
            job.execute(&JobContext::new(cancelled)),
            Err(JobError::Cancelled)
        ));
    }
}

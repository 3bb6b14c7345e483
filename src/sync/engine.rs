//! The sync engine: walks the remote feed oldest page first and stores every
//! listen exactly once.

use super::normalize::{classify, RecordDisposition};
use super::report::{NullReporter, PassOutcome, SyncMode, SyncReport, SyncReporter};
use super::retry::RetryPolicy;
use crate::feed::{FeedError, FeedPage, PageCount, PageQuery, RecentTracksFeed};
use crate::scrobble_store::{Checkpoint, CheckpointError, ScrobbleStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Account settings a pass queries the feed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub username: String,
    pub api_key: String,
    pub page_size: u32,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Store error: {0:#}")]
    Store(anyhow::Error),

    #[error("Sync pass cancelled")]
    Cancelled,
}

/// Position of a pass in the feed. Pages are visited from `last_page` down to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    /// Next page to visit, 0 once page 1 has been visited.
    pub current_page: u32,
    pub last_page: u32,
    pub lower_bound: Option<DateTime<Utc>>,
}

impl SyncCursor {
    pub fn new(last_page: u32, lower_bound: Option<DateTime<Utc>>) -> Self {
        Self {
            current_page: last_page,
            last_page,
            lower_bound,
        }
    }

    /// Moves to the next (newer) page, `None` once page 1 has been visited.
    pub fn advance(&mut self) -> Option<u32> {
        if self.current_page == 0 {
            return None;
        }
        let page = self.current_page;
        self.current_page -= 1;
        Some(page)
    }
}

pub struct SyncEngine {
    feed: Arc<dyn RecentTracksFeed>,
    store: Arc<dyn ScrobbleStore>,
    checkpoint: Arc<dyn Checkpoint>,
    settings: SyncSettings,
    retry_policy: RetryPolicy,
    reporter: Arc<dyn SyncReporter>,
}

impl SyncEngine {
    pub fn new(
        feed: Arc<dyn RecentTracksFeed>,
        store: Arc<dyn ScrobbleStore>,
        checkpoint: Arc<dyn Checkpoint>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            feed,
            store,
            checkpoint,
            settings,
            retry_policy: RetryPolicy::default(),
            reporter: Arc::new(NullReporter),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn SyncReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Mirrors the whole history. Now-playing records are skipped.
    pub fn import(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        self.run_pass(SyncMode::Import, None, cancel)
    }

    /// Mirrors everything since the newest stored listen. The pass stops at
    /// the first now-playing record.
    pub fn update(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let lower_bound = self.checkpoint.last_listen_timestamp()?;
        self.run_pass(SyncMode::Update, lower_bound, cancel)
    }

    fn query(&self, lower_bound: Option<DateTime<Utc>>) -> PageQuery {
        PageQuery {
            user: self.settings.username.clone(),
            api_key: self.settings.api_key.clone(),
            page: 1,
            limit: self.settings.page_size,
            from: lower_bound.map(|t| t.timestamp()),
        }
    }

    fn count_pages(
        &self,
        query: &PageQuery,
        cancel: &CancellationToken,
    ) -> Result<PageCount, FeedError> {
        self.retry_policy
            .run(cancel, "Page count", || self.feed.total_pages(query))
    }

    fn fetch_page(
        &self,
        query: &PageQuery,
        cancel: &CancellationToken,
    ) -> Result<FeedPage, FeedError> {
        let what = format!("Page {}", query.page);
        self.retry_policy
            .run(cancel, &what, || self.feed.fetch_page(query))
    }

    fn run_pass(
        &self,
        mode: SyncMode,
        lower_bound: Option<DateTime<Utc>>,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let query = self.query(lower_bound);
        let count = self.count_pages(&query, cancel)?;
        let mut cursor = SyncCursor::new(count.total_pages, lower_bound);
        let mut report = SyncReport::new(mode, lower_bound, count);

        info!(
            "Starting {} for {}: {} pages, {} records (from={:?})",
            mode, self.settings.username, count.total_pages, count.total_records, query.from
        );
        self.reporter.pass_started(mode, count);

        'pages: while let Some(page) = cursor.advance() {
            if cancel.is_cancelled() {
                info!(
                    "{} cancelled before page {}/{}, {} tracks stored",
                    mode, page, cursor.last_page, report.tracks_created
                );
                return Err(SyncError::Cancelled);
            }

            let feed_page = self.fetch_page(&query.with_page(page), cancel)?;
            report.pages_fetched += 1;
            debug!(
                "Processing page {}/{} ({} records)",
                page,
                cursor.last_page,
                feed_page.records.len()
            );

            // Pages are newest first, walk them backwards
            for record in feed_page.records.iter().rev() {
                report.records_seen += 1;
                match classify(record) {
                    RecordDisposition::NowPlaying => {
                        report.skipped_now_playing += 1;
                        if mode == SyncMode::Update {
                            debug!(
                                "Reached now playing {} - {}, ending pass",
                                record.artist_name, record.track_title
                            );
                            report.outcome = PassOutcome::StoppedAtNowPlaying;
                            break 'pages;
                        }
                    }
                    RecordDisposition::BadTimestamp(e) => {
                        warn!(
                            "Skipping {} - {}: {}",
                            record.artist_name, record.track_title, e
                        );
                        report.skipped_bad_timestamp += 1;
                    }
                    RecordDisposition::Commit(track) => {
                        let artist = self
                            .store
                            .ensure_artist(&track.artist_name)
                            .map_err(SyncError::Store)?;
                        if artist.is_created() {
                            report.artists_created += 1;
                        }

                        let inserted = self
                            .store
                            .ensure_track(&track)
                            .map_err(SyncError::Store)?;
                        if inserted.is_created() {
                            report.tracks_created += 1;
                            self.reporter.track_created(
                                report.tracks_created,
                                report.total_records,
                                &track,
                            );
                        } else {
                            report.duplicates += 1;
                        }
                    }
                }
            }
        }

        info!(
            "Finished {} for {}: {} new tracks, {} new artists, {} already stored, {} skipped",
            mode,
            self.settings.username,
            report.tracks_created,
            report.artists_created,
            report.duplicates,
            report.skipped_now_playing + report.skipped_bad_timestamp
        );
        self.reporter.pass_finished(&report);

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{ListenRecord, MockRecentTracksFeed};
    use crate::scrobble_store::{NewTrack, SqliteScrobbleStore};
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn settings() -> SyncSettings {
        SyncSettings {
            username: "rj".into(),
            api_key: "secret".into(),
            page_size: 3,
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            backoff_multiplier: 1.0,
        }
    }

    fn listen(artist: &str, title: &str, timestamp_text: &str) -> ListenRecord {
        ListenRecord {
            artist_name: artist.into(),
            album_name: "Album".into(),
            track_title: title.into(),
            timestamp_text: timestamp_text.into(),
            is_now_playing: false,
        }
    }

    fn single_page(records: Vec<ListenRecord>) -> FeedPage {
        FeedPage {
            total_records: records.len() as u64,
            records,
            page: 1,
            total_pages: 1,
        }
    }

    fn engine(feed: MockRecentTracksFeed, store: Arc<SqliteScrobbleStore>) -> SyncEngine {
        SyncEngine::new(Arc::new(feed), store.clone(), store, settings())
            .with_retry_policy(fast_retry())
    }

    #[test]
    fn test_cursor_walks_pages_backwards() {
        let mut cursor = SyncCursor::new(3, None);
        assert_eq!(cursor.advance(), Some(3));
        assert_eq!(cursor.advance(), Some(2));
        assert_eq!(cursor.advance(), Some(1));
        assert_eq!(cursor.advance(), None);

        let mut empty = SyncCursor::new(0, None);
        assert_eq!(empty.advance(), None);
    }

    #[test]
    fn test_cursor_visits_the_highest_page() {
        let mut cursor = SyncCursor::new(u32::MAX, None);
        assert_eq!(cursor.advance(), Some(u32::MAX));
        assert_eq!(cursor.advance(), Some(u32::MAX - 1));

        cursor.current_page = 1;
        assert_eq!(cursor.advance(), Some(1));
        assert_eq!(cursor.advance(), None);
        assert_eq!(cursor.advance(), None);
    }

    #[test]
    fn test_update_queries_from_checkpoint() {
        let store = Arc::new(SqliteScrobbleStore::in_memory().unwrap());
        let checkpoint = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        store
            .ensure_track(&NewTrack {
                artist_name: "Low".into(),
                album_name: "Album".into(),
                title: "Words".into(),
                played_at: checkpoint,
            })
            .unwrap();

        let mut feed = MockRecentTracksFeed::new();
        feed.expect_total_pages()
            .withf(move |q| q.from == Some(checkpoint.timestamp()) && q.limit == 3)
            .times(1)
            .returning(|_| {
                Ok(PageCount {
                    total_pages: 1,
                    total_records: 2,
                })
            });
        feed.expect_fetch_page()
            .withf(move |q| q.page == 1 && q.from == Some(checkpoint.timestamp()))
            .times(1)
            .returning(|_| {
                Ok(single_page(vec![
                    listen("Low", "Lazy", "01 Mar 2024, 20:05"),
                    listen("Low", "Words", "01 Mar 2024, 20:00"),
                ]))
            });

        let report = engine(feed, store.clone())
            .update(&CancellationToken::new())
            .unwrap();

        assert_eq!(report.lower_bound, Some(checkpoint));
        assert_eq!(report.tracks_created, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.artists_created, 0);
        assert_eq!(store.list_tracks().unwrap().len(), 2);
    }

    #[test]
    fn test_update_without_checkpoint_is_unbounded() {
        let store = Arc::new(SqliteScrobbleStore::in_memory().unwrap());
        let mut feed = MockRecentTracksFeed::new();
        feed.expect_total_pages()
            .withf(|q| q.from.is_none())
            .times(1)
            .returning(|_| Ok(PageCount::default()));
        feed.expect_fetch_page().never();

        let report = engine(feed, store).update(&CancellationToken::new()).unwrap();
        assert_eq!(report.lower_bound, None);
        assert_eq!(report.pages_fetched, 0);
        assert_eq!(report.outcome, PassOutcome::Completed);
    }

    #[test]
    fn test_transport_failure_is_retried() {
        let store = Arc::new(SqliteScrobbleStore::in_memory().unwrap());
        let mut feed = MockRecentTracksFeed::new();
        feed.expect_total_pages().returning(|_| {
            Ok(PageCount {
                total_pages: 1,
                total_records: 1,
            })
        });
        let mut calls = 0;
        feed.expect_fetch_page().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(FeedError::Transport("connection reset".into()))
            } else {
                Ok(single_page(vec![listen("Low", "Lullaby", "01 Mar 2024, 21:00")]))
            }
        });

        let report = engine(feed, store).import(&CancellationToken::new()).unwrap();
        assert_eq!(report.tracks_created, 1);
    }

    #[test]
    fn test_decode_failure_is_fatal() {
        let store = Arc::new(SqliteScrobbleStore::in_memory().unwrap());
        let mut feed = MockRecentTracksFeed::new();
        feed.expect_total_pages().returning(|_| {
            Ok(PageCount {
                total_pages: 2,
                total_records: 6,
            })
        });
        feed.expect_fetch_page()
            .times(1)
            .returning(|_| Err(FeedError::Decode("unexpected end of input".into())));

        let err = engine(feed, store.clone())
            .import(&CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, SyncError::Feed(FeedError::Decode(_))));
        assert!(store.list_tracks().unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_pass_touches_nothing() {
        let store = Arc::new(SqliteScrobbleStore::in_memory().unwrap());
        let mut feed = MockRecentTracksFeed::new();
        feed.expect_total_pages().never();
        feed.expect_fetch_page().never();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let engine = engine(feed, store);
        assert!(matches!(engine.import(&cancel), Err(SyncError::Cancelled)));
        assert!(matches!(engine.update(&cancel), Err(SyncError::Cancelled)));
    }

    struct RecordingReporter {
        lines: Mutex<Vec<String>>,
    }

    impl SyncReporter for RecordingReporter {
        fn track_created(&self, sequence: u64, total: u64, track: &NewTrack) {
            self.lines.lock().unwrap().push(format!(
                "{}/{} {} / {} - {}",
                sequence, total, track.artist_name, track.album_name, track.title
            ));
        }
    }

    #[test]
    fn test_reporter_sees_each_new_track() {
        let store = Arc::new(SqliteScrobbleStore::in_memory().unwrap());
        let mut feed = MockRecentTracksFeed::new();
        feed.expect_total_pages().returning(|_| {
            Ok(PageCount {
                total_pages: 1,
                total_records: 2,
            })
        });
        feed.expect_fetch_page().returning(|_| {
            Ok(single_page(vec![
                listen("Galaxie 500", "Tugboat", "01 Mar 2024, 20:07"),
                listen("Galaxie 500", "Blue Thunder", "01 Mar 2024, 20:02"),
            ]))
        });
        let reporter = Arc::new(RecordingReporter {
            lines: Mutex::new(Vec::new()),
        });

        engine(feed, store)
            .with_reporter(reporter.clone())
            .import(&CancellationToken::new())
            .unwrap();

        assert_eq!(
            *reporter.lines.lock().unwrap(),
            vec![
                "1/2 Galaxie 500 / Album - Blue Thunder",
                "2/2 Galaxie 500 / Album - Tugboat"
            ]
        );
    }
}

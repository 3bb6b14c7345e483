use chrono::{DateTime, Utc};
use scrobble_mirror::feed::{FeedError, FeedPage, ListenRecord, PageCount, PageQuery};
use scrobble_mirror::scrobble_store::{CheckpointError, Insertion, NewTrack};
use scrobble_mirror::sync::parse_listen_timestamp;
use scrobble_mirror::{Checkpoint, RecentTracksFeed, ScrobbleStore};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Feed
// =============================================================================

#[derive(Default)]
struct FeedState {
    /// Finished listens, newest first.
    history: Vec<ListenRecord>,
    now_playing: Option<ListenRecord>,
    count_queries: Vec<PageQuery>,
    page_queries: Vec<PageQuery>,
    failures: HashMap<u32, VecDeque<FeedError>>,
    /// Cancelled once the page is served.
    cancel_on_page: Option<(u32, CancellationToken)>,
}

impl FeedState {
    fn visible(&self, from: Option<i64>) -> Vec<ListenRecord> {
        self.history
            .iter()
            .filter(|record| match parse_listen_timestamp(&record.timestamp_text) {
                Ok(played_at) => from.map_or(true, |bound| played_at.timestamp() > bound),
                Err(_) => from.is_none(),
            })
            .cloned()
            .collect()
    }

    fn page(&self, query: &PageQuery) -> FeedPage {
        let visible = self.visible(query.from);
        let limit = query.limit.max(1) as usize;
        let total_pages = visible.len().div_ceil(limit) as u32;
        let start = query.page.saturating_sub(1) as usize * limit;

        let mut records: Vec<ListenRecord> =
            visible.iter().skip(start).take(limit).cloned().collect();
        // Last.fm puts the playing track on top of page 1, on top of the limit
        if query.page == 1 {
            if let Some(playing) = &self.now_playing {
                records.insert(0, playing.clone());
            }
        }

        FeedPage {
            records,
            page: query.page,
            total_pages,
            total_records: visible.len() as u64,
        }
    }
}

/// An in-memory listening history served the way the recent tracks feed
/// serves it: newest first, paginated, optionally bounded by `from`.
pub struct ScriptedFeed {
    state: Mutex<FeedState>,
}

impl ScriptedFeed {
    /// `history` is given oldest first, like a listening session reads.
    pub fn new(mut history: Vec<ListenRecord>) -> Arc<Self> {
        history.reverse();
        Arc::new(Self {
            state: Mutex::new(FeedState {
                history,
                ..Default::default()
            }),
        })
    }

    /// Appends a newer finished listen.
    pub fn scrobble(&self, record: ListenRecord) {
        self.state.lock().unwrap().history.insert(0, record);
    }

    pub fn set_now_playing(&self, record: Option<ListenRecord>) {
        self.state.lock().unwrap().now_playing = record;
    }

    /// Makes the next fetch of `page` fail with `error`.
    pub fn fail_page(&self, page: u32, error: FeedError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(page)
            .or_default()
            .push_back(error);
    }

    /// Cancels `token` right after `page` has been served, so the pass stops
    /// before fetching the next one.
    pub fn cancel_after_page(&self, page: u32, token: CancellationToken) {
        self.state.lock().unwrap().cancel_on_page = Some((page, token));
    }

    /// Page numbers passed to `fetch_page`, in call order.
    pub fn fetched_pages(&self) -> Vec<u32> {
        self.state
            .lock()
            .unwrap()
            .page_queries
            .iter()
            .map(|q| q.page)
            .collect()
    }

    /// Every query seen, page counts included.
    pub fn all_queries(&self) -> Vec<PageQuery> {
        let state = self.state.lock().unwrap();
        state
            .count_queries
            .iter()
            .chain(state.page_queries.iter())
            .cloned()
            .collect()
    }

    pub fn clear_queries(&self) {
        let mut state = self.state.lock().unwrap();
        state.count_queries.clear();
        state.page_queries.clear();
    }
}

impl RecentTracksFeed for ScriptedFeed {
    fn fetch_page(&self, query: &PageQuery) -> Result<FeedPage, FeedError> {
        let mut state = self.state.lock().unwrap();
        state.page_queries.push(query.clone());
        if let Some(error) = state
            .failures
            .get_mut(&query.page)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }
        if let Some((_, token)) = state
            .cancel_on_page
            .as_ref()
            .filter(|(page, _)| *page == query.page)
        {
            token.cancel();
        }
        Ok(state.page(query))
    }

    fn total_pages(&self, query: &PageQuery) -> Result<PageCount, FeedError> {
        let mut state = self.state.lock().unwrap();
        state.count_queries.push(query.clone());
        Ok(state.page(&query.with_page(1)).count())
    }
}

// =============================================================================
// Store
// =============================================================================

#[derive(Default)]
struct StoreState {
    artists: Vec<String>,
    /// Insertion order.
    tracks: Vec<NewTrack>,
    checkpoint_failure: Option<String>,
    /// Remaining successful track writes before every write fails.
    writes_left: Option<usize>,
}

/// Artists and tracks kept in vectors, with the same insert-if-absent
/// semantics as the SQLite store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Tracks in the order they were written.
    pub fn tracks(&self) -> Vec<NewTrack> {
        self.state.lock().unwrap().tracks.clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.tracks().into_iter().map(|t| t.title).collect()
    }

    pub fn artists(&self) -> Vec<String> {
        self.state.lock().unwrap().artists.clone()
    }

    pub fn fail_checkpoint(&self, message: &str) {
        self.state.lock().unwrap().checkpoint_failure = Some(message.to_string());
    }

    /// Lets `count` more tracks through, then fails every write.
    pub fn fail_writes_after(&self, count: usize) {
        self.state.lock().unwrap().writes_left = Some(count);
    }

    pub fn heal(&self) {
        let mut state = self.state.lock().unwrap();
        state.writes_left = None;
        state.checkpoint_failure = None;
    }
}

impl Checkpoint for MemoryStore {
    fn last_listen_timestamp(&self) -> Result<Option<DateTime<Utc>>, CheckpointError> {
        let state = self.state.lock().unwrap();
        if let Some(message) = &state.checkpoint_failure {
            return Err(CheckpointError::Malformed(message.clone()));
        }
        Ok(state.tracks.iter().map(|t| t.played_at).max())
    }
}

impl ScrobbleStore for MemoryStore {
    fn ensure_artist(&self, name: &str) -> anyhow::Result<Insertion> {
        let mut state = self.state.lock().unwrap();
        if state.artists.iter().any(|a| a == name) {
            return Ok(Insertion::Existing);
        }
        state.artists.push(name.to_string());
        Ok(Insertion::Created)
    }

    fn ensure_track(&self, track: &NewTrack) -> anyhow::Result<Insertion> {
        let mut state = self.state.lock().unwrap();
        if state.tracks.iter().any(|t| t.played_at == track.played_at) {
            return Ok(Insertion::Existing);
        }
        if let Some(left) = state.writes_left.as_mut() {
            if *left == 0 {
                anyhow::bail!("disk I/O error");
            }
            *left -= 1;
        }
        state.tracks.push(track.clone());
        Ok(Insertion::Created)
    }
}

//! Paginated access to a user's remote listening history.

mod lastfm;

pub use lastfm::{parse_recent_tracks, LastFmClient, LASTFM_MAX_PAGE_SIZE};

use thiserror::Error;

/// One page request against the recent tracks feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub user: String,
    pub api_key: String,
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
    /// Only return listens strictly after this epoch second.
    pub from: Option<i64>,
}

impl PageQuery {
    pub fn with_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }
}

/// A listen as the remote feed reports it, before any normalization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListenRecord {
    pub artist_name: String,
    pub album_name: String,
    pub track_title: String,
    pub timestamp_text: String,
    pub is_now_playing: bool,
}

/// Size of a query's result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageCount {
    pub total_pages: u32,
    pub total_records: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedPage {
    /// Newest first, as served.
    pub records: Vec<ListenRecord>,
    pub page: u32,
    pub total_pages: u32,
    pub total_records: u64,
}

impl FeedPage {
    pub fn count(&self) -> PageCount {
        PageCount {
            total_pages: self.total_pages,
            total_records: self.total_records,
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Could not decode response: {0}")]
    Decode(String),

    #[error("Last.fm error {code}: {message}")]
    Api { code: i64, message: String },
}

impl FeedError {
    /// Whether the same request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::Transport(_) | FeedError::Timeout(_))
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait RecentTracksFeed: Send + Sync {
    fn fetch_page(&self, query: &PageQuery) -> Result<FeedPage, FeedError>;

    /// Sizes a traversal by fetching the first page of `query`.
    fn total_pages(&self, query: &PageQuery) -> Result<PageCount, FeedError> {
        Ok(self.fetch_page(&query.with_page(1))?.count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(FeedError::Transport("connection reset".into()).is_retryable());
        assert!(FeedError::Timeout("30s".into()).is_retryable());
        assert!(!FeedError::Decode("missing recenttracks".into()).is_retryable());
        assert!(!FeedError::Api {
            code: 6,
            message: "User not found".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_with_page_keeps_bound() {
        let query = PageQuery {
            user: "rj".into(),
            api_key: "key".into(),
            page: 4,
            limit: 150,
            from: Some(1_700_000_000),
        };
        let first = query.with_page(1);
        assert_eq!(first.page, 1);
        assert_eq!(first.from, Some(1_700_000_000));
        assert_eq!(first.limit, 150);
    }
}

//! Last.fm `user.getrecenttracks` client.
//!
//! Rate limited to 5 requests per second per Last.fm API guidelines.

use super::{FeedError, FeedPage, ListenRecord, PageQuery, RecentTracksFeed};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";
const RATE_LIMIT_INTERVAL: Duration = Duration::from_millis(200); // 5 req/sec

/// Largest `limit` the recent tracks method accepts.
pub const LASTFM_MAX_PAGE_SIZE: u32 = 200;

pub struct LastFmClient {
    client: Client,
    base_url: String,
    last_request: Mutex<Instant>,
}

#[derive(Deserialize)]
struct RecentTracksResponse {
    recenttracks: RecentTracksContainer,
}

#[derive(Deserialize)]
struct RecentTracksContainer {
    #[serde(default)]
    track: Option<OneOrMany<LastFmTrack>>,
    #[serde(rename = "@attr")]
    attr: PageAttr,
}

/// Last.fm collapses a one-element list into a bare object.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(t) => vec![t],
        }
    }
}

#[derive(Deserialize)]
struct PageAttr {
    page: String,
    #[serde(rename = "totalPages")]
    total_pages: String,
    total: String,
}

#[derive(Deserialize)]
struct LastFmTrack {
    #[serde(default)]
    artist: TextField,
    #[serde(default)]
    album: TextField,
    #[serde(default)]
    name: String,
    #[serde(default)]
    date: Option<TextField>,
    #[serde(rename = "@attr", default)]
    attr: Option<TrackAttr>,
}

#[derive(Deserialize, Default)]
struct TextField {
    #[serde(rename = "#text", default)]
    text: String,
}

#[derive(Deserialize)]
struct TrackAttr {
    nowplaying: Option<String>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    error: i64,
    #[serde(default)]
    message: String,
}

impl From<LastFmTrack> for ListenRecord {
    fn from(track: LastFmTrack) -> Self {
        let is_now_playing = track
            .attr
            .and_then(|a| a.nowplaying)
            .is_some_and(|v| v == "true");
        ListenRecord {
            artist_name: track.artist.text,
            album_name: track.album.text,
            track_title: track.name,
            timestamp_text: track.date.map(|d| d.text).unwrap_or_default(),
            is_now_playing,
        }
    }
}

fn parse_count<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, FeedError> {
    value
        .trim()
        .parse()
        .map_err(|_| FeedError::Decode(format!("{} is not a number: {:?}", field, value)))
}

/// Decodes a `user.getrecenttracks` JSON body into a page of records.
pub fn parse_recent_tracks(body: &str) -> Result<FeedPage, FeedError> {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        return Err(FeedError::Api {
            code: payload.error,
            message: payload.message,
        });
    }

    let response: RecentTracksResponse =
        serde_json::from_str(body).map_err(|e| FeedError::Decode(e.to_string()))?;
    let container = response.recenttracks;

    let records = container
        .track
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .into_iter()
        .map(ListenRecord::from)
        .collect();

    Ok(FeedPage {
        records,
        page: parse_count("page", &container.attr.page)?,
        total_pages: parse_count("totalPages", &container.attr.total_pages)?,
        total_records: parse_count("total", &container.attr.total)?,
    })
}

impl LastFmClient {
    pub fn new(request_timeout: Duration) -> Result<Self, FeedError> {
        Self::with_base_url(LASTFM_API_BASE, request_timeout)
    }

    pub fn with_base_url(base_url: &str, request_timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("scrobble-mirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            last_request: Mutex::new(Instant::now() - RATE_LIMIT_INTERVAL),
        })
    }

    fn rate_limit(&self) {
        let mut last = self.last_request.lock().unwrap();
        let elapsed = last.elapsed();
        if elapsed < RATE_LIMIT_INTERVAL {
            std::thread::sleep(RATE_LIMIT_INTERVAL - elapsed);
        }
        *last = Instant::now();
    }

    fn request_url(&self, query: &PageQuery) -> String {
        let mut url = format!(
            "{}?method=user.getrecenttracks&user={}&api_key={}&format=json&limit={}&page={}",
            self.base_url,
            urlencoding::encode(&query.user),
            urlencoding::encode(&query.api_key),
            query.limit,
            query.page
        );
        if let Some(from) = query.from {
            url.push_str(&format!("&from={}", from));
        }
        url
    }
}

fn map_send_error(e: reqwest::Error) -> FeedError {
    if e.is_timeout() {
        FeedError::Timeout(e.to_string())
    } else {
        FeedError::Transport(e.to_string())
    }
}

impl RecentTracksFeed for LastFmClient {
    fn fetch_page(&self, query: &PageQuery) -> Result<FeedPage, FeedError> {
        self.rate_limit();
        debug!(
            "Fetching recent tracks page {} for {} (from={:?})",
            query.page, query.user, query.from
        );

        let response = self
            .client
            .get(self.request_url(query))
            .send()
            .map_err(map_send_error)?;
        let status = response.status();
        let body = response.text().map_err(map_send_error)?;

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::Transport(format!(
                "Last.fm responded with status {}",
                status
            )));
        }
        if !status.is_success() {
            // Last.fm usually explains a 4xx in the body
            return match parse_recent_tracks(&body) {
                Err(e @ FeedError::Api { .. }) => Err(e),
                _ => Err(FeedError::Api {
                    code: status.as_u16() as i64,
                    message: format!("Last.fm responded with status {}", status),
                }),
            };
        }

        parse_recent_tracks(&body)
    }
}

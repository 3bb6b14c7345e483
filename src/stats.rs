//! The `stats` listing: a summary plus recent and top lists from the local store.

use crate::cli_style::{
    print_empty_list, print_key_value, print_list_item, print_ranked_item, print_section_header,
    ranked_line,
};
use crate::config::StatsSettings;
use crate::scrobble_store::{RecentTrack, ScrobbleSummary, StatsStore, TopAlbum, TopArtist, TopSong};
use anyhow::{Context, Result};
use unicode_width::UnicodeWidthStr;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub summary: ScrobbleSummary,
    pub recent_tracks: Vec<RecentTrack>,
    pub top_artists: Vec<TopArtist>,
    pub top_albums: Vec<TopAlbum>,
    pub top_songs: Vec<TopSong>,
}

impl StatsSnapshot {
    pub fn collect(store: &dyn StatsStore, limits: &StatsSettings) -> Result<Self> {
        Ok(Self {
            summary: store.summary().context("Failed to read scrobble summary")?,
            recent_tracks: store
                .recent_tracks(limits.recent_tracks)
                .context("Failed to read recent tracks")?,
            top_artists: store
                .top_artists(limits.top_artists)
                .context("Failed to read top artists")?,
            top_albums: store
                .top_albums(limits.top_albums)
                .context("Failed to read top albums")?,
            top_songs: store
                .top_songs(limits.top_songs)
                .context("Failed to read top songs")?,
        })
    }
}

fn print_ranking(title: &str, rows: Vec<(String, i64)>) {
    print_section_header(title);
    if rows.is_empty() {
        print_empty_list("Nothing yet");
        return;
    }
    let label_width = rows.iter().map(|(label, _)| label.width()).max().unwrap_or(0);
    // Rows arrive sorted by plays
    let max_plays = rows[0].1;
    for (i, (label, plays)) in rows.iter().enumerate() {
        print_ranked_item(&ranked_line(i + 1, label, label_width, *plays), *plays, max_plays);
    }
}

pub fn print_stats(user: &str, stats: &StatsSnapshot) {
    print_section_header("Summary");
    print_key_value("User", user);
    print_key_value("Scrobbles", &stats.summary.scrobbles.to_string());
    print_key_value("Artists", &stats.summary.artists.to_string());
    let since = stats
        .summary
        .first_played_at
        .map(|t| t.format(DATE_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string());
    print_key_value("Scrobbling since", &since);

    print_section_header("Recent tracks");
    if stats.recent_tracks.is_empty() {
        print_empty_list("Nothing yet");
    }
    for track in &stats.recent_tracks {
        print_list_item(&format!(
            "{}  {} - {}",
            track.played_at.format(DATE_FORMAT),
            track.artist_name,
            track.title
        ));
    }

    print_ranking(
        "Top artists",
        stats
            .top_artists
            .iter()
            .map(|a| (a.artist_name.clone(), a.plays))
            .collect(),
    );
    print_ranking(
        "Top albums",
        stats
            .top_albums
            .iter()
            .map(|a| (format!("{} - {}", a.artist_name, a.album_name), a.plays))
            .collect(),
    );
    print_ranking(
        "Top songs",
        stats
            .top_songs
            .iter()
            .map(|s| (format!("{} - {}", s.artist_name, s.title), s.plays))
            .collect(),
    );
    println!();
}

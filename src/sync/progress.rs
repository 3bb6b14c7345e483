use super::report::{SyncMode, SyncReport, SyncReporter};
use crate::feed::PageCount;
use crate::scrobble_store::NewTrack;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Terminal progress for a one-shot import.
///
/// Every new track is printed above the bar as `n/total artist / album - title`.
pub struct ImportProgress {
    bar: ProgressBar,
}

impl ImportProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}, ETA: {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }

    /// Same reporting with nothing drawn, for non-interactive output.
    pub fn hidden() -> Self {
        let progress = Self::new();
        progress.bar.set_draw_target(ProgressDrawTarget::hidden());
        progress
    }
}

impl Default for ImportProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncReporter for ImportProgress {
    fn pass_started(&self, mode: SyncMode, count: PageCount) {
        self.bar.set_length(count.total_records);
        self.bar.set_position(0);
        self.bar.set_message(format!("Running {}", mode));
    }

    fn track_created(&self, sequence: u64, total: u64, track: &NewTrack) {
        self.bar.println(format!(
            "{}/{} {} / {} - {}",
            sequence, total, track.artist_name, track.album_name, track.title
        ));
        self.bar.set_position(sequence.min(total));
    }

    fn pass_finished(&self, report: &SyncReport) {
        self.bar.finish_with_message(format!(
            "{} done, {} new tracks",
            report.mode, report.tracks_created
        ));
    }
}

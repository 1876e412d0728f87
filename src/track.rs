use crate::error::{Result, SubsyncError};
use crate::parser::Parser;
use crate::srt::CaptionEntry;

use std::time::Duration;

/// Immutable, start-sorted set of captions with O(log n) time lookup.
#[derive(Debug, Clone)]
pub struct SubtitleTrack {
    entries: Vec<CaptionEntry>,
    /// `reach[i]` is the latest `hide_at` among `entries[..=i]`.
    reach: Vec<Duration>,
}

impl SubtitleTrack {
    pub fn parse(input: &str) -> Result<Self> {
        let entries = Parser::new().parse(input)?;
        Self::from_entries(entries)
    }

    pub fn from_entries(mut entries: Vec<CaptionEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(SubsyncError::Parse("No subtitle blocks found".to_string()));
        }
        entries.sort_by_key(|e| e.show_at);

        let reach = entries
            .iter()
            .scan(Duration::ZERO, |latest, entry| {
                *latest = (*latest).max(entry.hide_at);
                Some(*latest)
            })
            .collect();

        Ok(Self { entries, reach })
    }

    /// Position in `entries()` of the caption shown at `time` seconds.
    ///
    /// When captions overlap the one with the lowest start time wins. Since
    /// `reach` never decreases, the first entry that is still running at
    /// `time` is found by bisection; it is the answer if it has started.
    pub fn active_position(&self, time: f64) -> Option<usize> {
        if !(time >= 0.0) {
            return None;
        }
        let candidate = self.reach.partition_point(|end| end.as_secs_f64() < time);
        self.entries
            .get(candidate)
            .filter(|entry| entry.start_secs() <= time)
            .map(|_| candidate)
    }

    pub fn active_entry(&self, time: f64) -> Option<&CaptionEntry> {
        self.active_position(time).map(|pos| &self.entries[pos])
    }

    pub fn entries(&self) -> &[CaptionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First start and last end time covered by the track.
    pub fn span(&self) -> (Duration, Duration) {
        let first = self.entries.first().map_or(Duration::ZERO, |e| e.show_at);
        let last = self.reach.last().copied().unwrap_or(Duration::ZERO);
        (first, last)
    }
}

use std::time::Duration;

/// One timed caption as declared in an SRT file.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionEntry {
    pub(crate) index: u32,
    pub(crate) show_at: Duration,
    pub(crate) hide_at: Duration,
    pub(crate) text: String,
}

impl CaptionEntry {
    pub fn new(index: u32, show_at: Duration, hide_at: Duration, text: impl Into<String>) -> Self {
        Self {
            index,
            show_at,
            hide_at,
            text: text.into(),
        }
    }

    /// Sequence number as written in the source, not its position in the track.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn show_at(&self) -> Duration {
        self.show_at
    }

    pub fn hide_at(&self) -> Duration {
        self.hide_at
    }

    pub fn start_secs(&self) -> f64 {
        self.show_at.as_secs_f64()
    }

    pub fn end_secs(&self) -> f64 {
        self.hide_at.as_secs_f64()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Both bounds are inclusive.
    pub fn is_active_at(&self, time: f64) -> bool {
        self.start_secs() <= time && time <= self.end_secs()
    }
}

//! Playback clocks
//!
//! Engines report their position in different ways: a plain value somebody
//! keeps updating, a function to call, or an object with an accessor. Each
//! of them is adapted once to [`TimeSource`] so the subtitle session only
//! ever calls `current_time()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Transport notifications an engine may publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    TimeUpdate,
    Paused,
    Resumed,
    Ended,
}

pub trait TimeSource: Send + Sync {
    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    /// A stream of transport notifications, if the source publishes them.
    /// Sources returning `None` are polled.
    fn notifications(&self) -> Option<broadcast::Receiver<MediaEvent>> {
        None
    }
}

impl<F> TimeSource for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn current_time(&self) -> f64 {
        self()
    }
}

/// A position value written by whoever drives playback and read by the
/// subtitle session.
#[derive(Debug, Clone, Default)]
pub struct SharedPosition(Arc<AtomicU64>);

impl SharedPosition {
    pub fn new(secs: f64) -> Self {
        Self(Arc::new(AtomicU64::new(secs.to_bits())))
    }

    pub fn set(&self, secs: f64) {
        self.0.store(secs.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

impl TimeSource for SharedPosition {
    fn current_time(&self) -> f64 {
        self.get()
    }
}

//! Subtitle session
//!
//! Binds a [`TimeSource`] to a [`SubtitleTrack`] and reports caption
//! changes. Sources that publish transport notifications are followed,
//! everything else is polled. The change callback only runs when the active
//! caption actually changes, never once per tick.

use crate::clock::{MediaEvent, TimeSource};
use crate::srt::CaptionEntry;
use crate::track::SubtitleTrack;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, trace};

/// Called with the newly active caption (or `None`) and the playback time
/// that produced it. Runs under the session lock, so it must not call back
/// into the same session.
pub type ChangeCallback = Box<dyn FnMut(Option<&CaptionEntry>, f64) + Send>;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Poll period for sources without notifications.
    pub poll_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
        }
    }
}

struct Session {
    clock: Arc<dyn TimeSource>,
    track: Arc<SubtitleTrack>,
    current: Option<usize>,
    on_change: ChangeCallback,
}

impl Session {
    fn update(&mut self) {
        let time = self.clock.current_time();
        let next = self.track.active_position(time);
        let changed = self.declared_index(next) != self.declared_index(self.current);
        self.current = next;
        if changed {
            self.notify(time);
        }
    }

    fn clear(&mut self) {
        if self.current.take().is_some() {
            let time = self.clock.current_time();
            self.notify(time);
        }
    }

    fn notify(&mut self, time: f64) {
        let track = Arc::clone(&self.track);
        let entry = self.current.map(|pos| &track.entries()[pos]);
        debug!(index = entry.map(CaptionEntry::index), time, "active caption changed");
        (self.on_change)(entry, time);
    }

    /// Transitions compare declared sequence numbers; `None` is its own identity.
    fn declared_index(&self, position: Option<usize>) -> Option<u32> {
        position.map(|pos| self.track.entries()[pos].index)
    }
}

type SharedSession = Arc<Mutex<Option<Session>>>;

pub struct SubtitleSync {
    session: SharedSession,
    task: Option<JoinHandle<()>>,
}

impl SubtitleSync {
    /// Starts following `clock`. Must be called from within a tokio runtime.
    pub fn new<F>(
        clock: Arc<dyn TimeSource>,
        track: Arc<SubtitleTrack>,
        on_change: F,
        options: SyncOptions,
    ) -> Self
    where
        F: FnMut(Option<&CaptionEntry>, f64) + Send + 'static,
    {
        let notifications = clock.notifications();
        let session = Arc::new(Mutex::new(Some(Session {
            clock,
            track,
            current: None,
            on_change: Box::new(on_change),
        })));

        let task = match notifications {
            Some(events) => {
                debug!("subtitle session following engine notifications");
                tokio::spawn(follow(Arc::clone(&session), events))
            }
            None => {
                debug!(interval = ?options.poll_interval, "subtitle session polling");
                tokio::spawn(poll(Arc::clone(&session), options.poll_interval))
            }
        };

        Self {
            session,
            task: Some(task),
        }
    }

    /// Re-reads the clock and fires the callback if the caption changed.
    pub fn update(&self) {
        with_session(&self.session, Session::update);
    }

    pub fn current_entry(&self) -> Option<CaptionEntry> {
        let guard = self.session.lock();
        let session = guard.as_ref()?;
        session
            .current
            .map(|pos| session.track.entries()[pos].clone())
    }

    pub fn entry_at(&self, time: f64) -> Option<CaptionEntry> {
        let guard = self.session.lock();
        guard.as_ref()?.track.active_entry(time).cloned()
    }

    /// The bound track, or `None` once the session is destroyed.
    pub fn track(&self) -> Option<Arc<SubtitleTrack>> {
        self.session.lock().as_ref().map(|s| Arc::clone(&s.track))
    }

    pub fn is_destroyed(&self) -> bool {
        self.session.lock().is_none()
    }

    /// Stops following the clock and releases the track and clock. Safe to
    /// call more than once; no callback runs after this returns.
    pub fn destroy(&mut self) {
        // Taking the session needs the lock, which a running callback holds.
        let released = self.session.lock().take();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if released.is_some() {
            debug!("subtitle session destroyed");
        }
    }
}

impl Drop for SubtitleSync {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn with_session(session: &Mutex<Option<Session>>, f: impl FnOnce(&mut Session)) -> bool {
    match session.lock().as_mut() {
        Some(session) => {
            f(session);
            true
        }
        None => false,
    }
}

async fn follow(session: SharedSession, mut events: broadcast::Receiver<MediaEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                trace!(missed, "subtitle session lagged behind engine events");
                MediaEvent::TimeUpdate
            }
            Err(RecvError::Closed) => break,
        };
        let alive = with_session(&session, |s| match event {
            MediaEvent::Ended => s.clear(),
            MediaEvent::TimeUpdate | MediaEvent::Paused | MediaEvent::Resumed => s.update(),
        });
        if !alive {
            break;
        }
    }
}

async fn poll(session: SharedSession, period: Duration) {
    let mut ticker = interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if !with_session(&session, Session::update) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SharedPosition;

    const TWO_CUES: &str =
        "1\n00:00:01,000 --> 00:00:03,500\nHello\n\n2\n00:00:04,000 --> 00:00:06,000\nWorld\n";

    type Log = Arc<Mutex<Vec<(Option<u32>, f64)>>>;

    fn recorder() -> (Log, impl FnMut(Option<&CaptionEntry>, f64) + Send + 'static) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        let callback = move |entry: Option<&CaptionEntry>, time: f64| {
            sink.lock().push((entry.map(CaptionEntry::index), time));
        };
        (log, callback)
    }

    fn indices(log: &Log) -> Vec<Option<u32>> {
        log.lock().iter().map(|(index, _)| *index).collect()
    }

    fn track() -> Arc<SubtitleTrack> {
        Arc::new(SubtitleTrack::parse(TWO_CUES).unwrap())
    }

    struct EventClock {
        position: SharedPosition,
        events: broadcast::Sender<MediaEvent>,
    }

    impl TimeSource for EventClock {
        fn current_time(&self) -> f64 {
            self.position.get()
        }

        fn notifications(&self) -> Option<broadcast::Receiver<MediaEvent>> {
            Some(self.events.subscribe())
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_transition() {
        let position = SharedPosition::new(0.0);
        let (log, callback) = recorder();
        let sync = SubtitleSync::new(
            Arc::new(position.clone()),
            track(),
            callback,
            SyncOptions::default(),
        );

        for step in 0..=70 {
            position.set(f64::from(step) / 10.0);
            sync.update();
        }

        assert_eq!(indices(&log), vec![Some(1), None, Some(2), None]);
        let times: Vec<f64> = log.lock().iter().map(|(_, t)| *t).collect();
        assert_eq!(times, vec![1.0, 3.6, 4.0, 6.1]);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_index_keeps_the_current_entry_fresh() {
        let track = SubtitleTrack::parse(
            "1\n00:00:01,000 --> 00:00:02,000\nfirst\n\n1\n00:00:02,500 --> 00:00:04,000\nsecond\n",
        )
        .unwrap();
        let position = SharedPosition::new(0.0);
        let (log, callback) = recorder();
        let sync = SubtitleSync::new(
            Arc::new(position.clone()),
            Arc::new(track),
            callback,
            SyncOptions::default(),
        );

        position.set(1.5);
        sync.update();
        assert_eq!(sync.current_entry().map(|e| e.text().to_string()), Some("first".to_string()));

        position.set(3.0);
        sync.update();
        assert_eq!(sync.current_entry().map(|e| e.text().to_string()), Some("second".to_string()));
        assert_eq!(indices(&log), vec![Some(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_does_not_repeat_the_same_caption() {
        let position = SharedPosition::new(2.0);
        let (log, callback) = recorder();
        let _sync = SubtitleSync::new(
            Arc::new(position.clone()),
            track(),
            callback,
            SyncOptions::default(),
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(indices(&log), vec![Some(1)]);

        position.set(4.5);
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(indices(&log), vec![Some(1), Some(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn closure_clock_is_polled() {
        let position = SharedPosition::new(5.0);
        let reader = position.clone();
        let (log, callback) = recorder();
        let sync = SubtitleSync::new(
            Arc::new(move || reader.get()),
            track(),
            callback,
            SyncOptions {
                poll_interval: Duration::from_millis(40),
            },
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(indices(&log), vec![Some(2)]);
        assert_eq!(sync.current_entry().map(|e| e.index()), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn follows_notifications_and_clears_on_end() {
        let (events, _) = broadcast::channel(16);
        let clock = EventClock {
            position: SharedPosition::new(0.0),
            events: events.clone(),
        };
        let position = clock.position.clone();
        let (log, callback) = recorder();
        let sync = SubtitleSync::new(Arc::new(clock), track(), callback, SyncOptions::default());

        // Nothing happens without a notification, even after a poll period.
        position.set(2.0);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(log.lock().is_empty());

        events.send(MediaEvent::TimeUpdate).unwrap();
        settle().await;
        assert_eq!(indices(&log), vec![Some(1)]);

        events.send(MediaEvent::Paused).unwrap();
        settle().await;
        assert_eq!(indices(&log), vec![Some(1)]);

        events.send(MediaEvent::Ended).unwrap();
        settle().await;
        assert_eq!(indices(&log), vec![Some(1), None]);
        assert!(sync.current_entry().is_none());

        events.send(MediaEvent::Ended).unwrap();
        settle().await;
        assert_eq!(log.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_callback_after_destroy() {
        let position = SharedPosition::new(2.0);
        let (log, callback) = recorder();
        let track = track();
        let mut sync = SubtitleSync::new(
            Arc::new(position.clone()),
            Arc::clone(&track),
            callback,
            SyncOptions::default(),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(log.lock().len(), 1);

        sync.destroy();
        assert!(sync.is_destroyed());
        assert_eq!(Arc::strong_count(&track), 1);

        position.set(5.0);
        sync.update();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(log.lock().len(), 1);
        assert!(sync.track().is_none());
        assert!(sync.entry_at(5.0).is_none());

        sync.destroy();
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_releases_the_track() {
        let track = track();
        let (_log, callback) = recorder();
        {
            let _sync = SubtitleSync::new(
                Arc::new(SharedPosition::new(0.0)),
                Arc::clone(&track),
                callback,
                SyncOptions::default(),
            );
            assert_eq!(Arc::strong_count(&track), 2);
        }
        assert_eq!(Arc::strong_count(&track), 1);
    }
}

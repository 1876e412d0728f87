//! Headless WAV engine
//!
//! Reads the WAV header to learn a track's length and then runs a virtual
//! transport clock over it. Nothing is sent to an audio device; the engine
//! exists to drive subtitle sessions and the control flow around them.

use crate::bridge::{MediaEngine, TrackIdentity};
use crate::clock::{MediaEvent, TimeSource};
use crate::error::{Result, SubsyncError};

use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Transport {
    duration: Option<f64>,
    /// Position at the last start or stop.
    offset: f64,
    playing_since: Option<Instant>,
}

impl Transport {
    fn position(&self) -> f64 {
        let elapsed = self
            .playing_since
            .map_or(0.0, |since| since.elapsed().as_secs_f64());
        let position = self.offset + elapsed;
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    fn freeze(&mut self) {
        self.offset = self.position();
        self.playing_since = None;
    }
}

struct Shared {
    transport: Mutex<Transport>,
    events: broadcast::Sender<MediaEvent>,
    driver: Mutex<Option<JoinHandle<()>>>,
    tick: Duration,
}

impl Shared {
    /// One driver step: the event to publish, if playing.
    fn advance(&self) -> Option<MediaEvent> {
        let mut transport = self.transport.lock();
        transport.playing_since?;
        let duration = transport.duration?;
        if transport.position() >= duration {
            transport.freeze();
            debug!(duration, "playback reached the end of the track");
            Some(MediaEvent::Ended)
        } else {
            Some(MediaEvent::TimeUpdate)
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.get_mut().take() {
            driver.abort();
        }
    }
}

#[derive(Clone)]
pub struct WavEngine {
    shared: Arc<Shared>,
}

impl WavEngine {
    /// `tick` is the spacing of time-update notifications while playing.
    pub fn new(tick: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            shared: Arc::new(Shared {
                transport: Mutex::new(Transport::default()),
                events,
                driver: Mutex::new(None),
                tick: tick.max(Duration::from_millis(1)),
            }),
        }
    }

    /// Starts the transport driver. Must be called from within a tokio
    /// runtime; further calls do nothing.
    pub fn start(&self) {
        let mut driver = self.shared.driver.lock();
        if driver.is_some() {
            return;
        }
        *driver = Some(tokio::spawn(drive(
            Arc::downgrade(&self.shared),
            self.shared.tick,
        )));
        info!(tick = ?self.shared.tick, "engine started");
    }

    pub fn is_started(&self) -> bool {
        self.shared.driver.lock().is_some()
    }

    pub fn position(&self) -> f64 {
        self.shared.transport.lock().position()
    }

    pub fn duration(&self) -> Option<f64> {
        self.shared.transport.lock().duration
    }

    pub fn is_playing(&self) -> bool {
        self.shared.transport.lock().playing_since.is_some()
    }

    fn publish(&self, event: MediaEvent) {
        // No subscribers is fine.
        let _ = self.shared.events.send(event);
    }
}

impl MediaEngine for WavEngine {
    async fn load(&self, track: &TrackIdentity) -> Result<()> {
        let path = track.path().to_path_buf();
        let resource = track.to_string();
        let duration = tokio::task::spawn_blocking(move || read_duration(&path))
            .await
            .map_err(|err| SubsyncError::ResourceLoad {
                resource,
                cause: err.to_string(),
            })??;

        *self.shared.transport.lock() = Transport {
            duration: Some(duration),
            ..Transport::default()
        };
        info!(track = %track, duration, "track loaded");
        Ok(())
    }

    async fn play(&self) -> Result<()> {
        {
            let mut transport = self.shared.transport.lock();
            let Some(duration) = transport.duration else {
                return Err(SubsyncError::EngineNotLoaded);
            };
            if transport.playing_since.is_some() {
                return Ok(());
            }
            if transport.offset >= duration {
                transport.offset = 0.0;
            }
            transport.playing_since = Some(Instant::now());
        }
        self.publish(MediaEvent::Resumed);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        let was_playing = {
            let mut transport = self.shared.transport.lock();
            let was_playing = transport.playing_since.is_some();
            transport.freeze();
            was_playing
        };
        if was_playing {
            self.publish(MediaEvent::Paused);
        }
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<MediaEvent> {
        self.shared.events.subscribe()
    }
}

impl TimeSource for WavEngine {
    fn current_time(&self) -> f64 {
        self.position()
    }

    fn notifications(&self) -> Option<broadcast::Receiver<MediaEvent>> {
        Some(self.shared.events.subscribe())
    }
}

async fn drive(weak: Weak<Shared>, tick: Duration) {
    let mut ticker = interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let Some(shared) = weak.upgrade() else {
            break;
        };
        if let Some(event) = shared.advance() {
            let _ = shared.events.send(event);
        }
    }
}

fn read_duration(path: &Path) -> Result<f64> {
    let load_error = |cause: String| SubsyncError::ResourceLoad {
        resource: path.display().to_string(),
        cause,
    };
    let reader = hound::WavReader::open(path).map_err(|err| load_error(err.to_string()))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(load_error("sample rate is zero".to_string()));
    }
    Ok(f64::from(reader.duration()) / f64::from(spec.sample_rate))
}

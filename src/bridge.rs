//! Engine bridge
//!
//! Sits between a control surface and a [`MediaEngine`] that only becomes
//! usable after its own start-up. Every command joins one FIFO queue the
//! moment it is issued; a single worker runs them in that order, holding
//! everything back until the bridge is marked ready. Track loads therefore
//! never overlap and a burst of identical requests loads the resource once.

use crate::clock::MediaEvent;
use crate::error::{Result, SubsyncError};

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The engine side of the bridge.
pub trait MediaEngine: Send + Sync + 'static {
    fn load(&self, track: &TrackIdentity) -> impl Future<Output = Result<()>> + Send;

    fn play(&self) -> impl Future<Output = Result<()>> + Send;

    fn pause(&self) -> impl Future<Output = Result<()>> + Send;

    fn events(&self) -> broadcast::Receiver<MediaEvent>;
}

/// Canonical location of an audio resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackIdentity(PathBuf);

impl TrackIdentity {
    /// Resolves `src` against `base`. Existing files are canonicalized so
    /// different spellings of the same path compare equal.
    pub async fn resolve(base: &Path, src: &str) -> Self {
        let joined = base.join(src);
        match tokio::fs::canonicalize(&joined).await {
            Ok(path) => Self(path),
            Err(_) => Self(joined),
        }
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.0.display())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackRequest {
    pub src: String,
    pub title: String,
    pub subtitle: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTrack {
    pub identity: TrackIdentity,
    pub title: String,
    pub subtitle: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetTrack(TrackRequest),
    Play,
    Pause,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    TrackLoaded(LoadedTrack),
    /// Same audio as before, different subtitle file.
    SubtitleChanged(LoadedTrack),
    TrackEnded(TrackIdentity),
}

struct Pending {
    command: Command,
    reply: oneshot::Sender<Result<()>>,
}

/// State the worker needs to run commands.
struct Core<E> {
    engine: E,
    base_dir: PathBuf,
    active_load: Mutex<Option<TrackIdentity>>,
    current: Arc<Mutex<Option<LoadedTrack>>>,
    events: broadcast::Sender<BridgeEvent>,
}

struct Shared<E> {
    core: Arc<Core<E>>,
    queue: mpsc::UnboundedSender<Pending>,
    ready: watch::Sender<bool>,
    forwarder: JoinHandle<()>,
}

impl<E> Drop for Shared<E> {
    fn drop(&mut self) {
        // The worker stops on its own once the queue sender is gone.
        self.forwarder.abort();
    }
}

/// Cheap to clone; all clones drive the same engine.
pub struct EngineBridge<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for EngineBridge<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: MediaEngine> EngineBridge<E> {
    /// Relative track sources resolve against `base_dir`. Must be called
    /// from within a tokio runtime.
    pub fn new(engine: E, base_dir: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(32);
        let current = Arc::new(Mutex::new(None));
        let forwarder = tokio::spawn(forward_track_end(
            engine.events(),
            Arc::clone(&current),
            events.clone(),
        ));

        let core = Arc::new(Core {
            engine,
            base_dir: base_dir.into(),
            active_load: Mutex::new(None),
            current,
            events,
        });
        let (queue, commands) = mpsc::unbounded_channel();
        let (ready, gate) = watch::channel(false);
        tokio::spawn(run_commands(Arc::clone(&core), commands, gate));

        Self {
            shared: Arc::new(Shared {
                core,
                queue,
                ready,
                forwarder,
            }),
        }
    }

    /// Issues `command`. It joins the queue right away, so commands run in
    /// call order whether or not the returned future is ever polled.
    pub fn command(&self, command: Command) -> impl Future<Output = Result<()>> + Send + 'static {
        let (reply, rx) = oneshot::channel();
        if !self.is_ready() {
            debug!(?command, "engine not ready, queueing command");
        }
        if let Err(rejected) = self.shared.queue.send(Pending { command, reply }) {
            warn!(command = ?rejected.0.command, "command worker has stopped");
        }

        async move { rx.await.unwrap_or(Err(SubsyncError::BridgeClosed)) }
    }

    pub fn set_track(&self, request: TrackRequest) -> impl Future<Output = Result<()>> + Send + 'static {
        self.command(Command::SetTrack(request))
    }

    pub fn play(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        self.command(Command::Play)
    }

    pub fn pause(&self) -> impl Future<Output = Result<()>> + Send + 'static {
        self.command(Command::Pause)
    }

    /// Lets the worker start on the queue. Later calls do nothing.
    pub fn mark_ready(&self) {
        let opened = self.shared.ready.send_if_modified(|ready| !std::mem::replace(ready, true));
        if opened {
            info!("engine ready");
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.shared.ready.borrow()
    }

    pub fn current_track(&self) -> Option<LoadedTrack> {
        self.shared.core.current.lock().clone()
    }

    /// The track being loaded right now, if any.
    pub fn loading(&self) -> Option<TrackIdentity> {
        self.shared.core.active_load.lock().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.shared.core.events.subscribe()
    }

    pub fn engine(&self) -> &E {
        &self.shared.core.engine
    }
}

/// Waits for readiness, then runs queued commands one at a time. Ends when
/// every bridge handle is gone; commands still queued then fail with
/// [`SubsyncError::BridgeClosed`].
async fn run_commands<E: MediaEngine>(
    core: Arc<Core<E>>,
    mut commands: mpsc::UnboundedReceiver<Pending>,
    mut gate: watch::Receiver<bool>,
) {
    if gate.wait_for(|ready| *ready).await.is_err() {
        return;
    }
    while let Some(Pending { command, reply }) = commands.recv().await {
        let outcome = core.dispatch(command).await;
        // The caller may have stopped waiting; the command still ran.
        let _ = reply.send(outcome);
    }
    debug!("command worker stopped");
}

impl<E: MediaEngine> Core<E> {
    async fn dispatch(&self, command: Command) -> Result<()> {
        match command {
            Command::SetTrack(request) => self.set_track(request).await,
            Command::Play => {
                let loaded = self.current.lock().is_some();
                if !loaded {
                    return Err(SubsyncError::EngineNotLoaded);
                }
                self.engine.play().await
            }
            Command::Pause => {
                let loaded = self.current.lock().is_some();
                if !loaded {
                    debug!("pause without a loaded track ignored");
                    return Ok(());
                }
                self.engine.pause().await
            }
        }
    }

    /// Loads run one at a time on the worker, so by the time a request gets
    /// here any earlier load has settled and `current` is up to date.
    async fn set_track(&self, request: TrackRequest) -> Result<()> {
        let identity = TrackIdentity::resolve(&self.base_dir, &request.src).await;
        if self.adopt_if_current(&identity, &request) {
            return Ok(());
        }

        info!(track = %identity, title = %request.title, "loading track");
        *self.active_load.lock() = Some(identity.clone());
        let outcome = self.engine.load(&identity).await;
        *self.active_load.lock() = None;

        match outcome {
            Ok(()) => {
                let loaded = LoadedTrack {
                    identity,
                    title: request.title,
                    subtitle: request.subtitle,
                };
                *self.current.lock() = Some(loaded.clone());
                let _ = self.events.send(BridgeEvent::TrackLoaded(loaded));
                Ok(())
            }
            Err(err) => {
                warn!(track = %identity, "failed to load track: {}", err);
                Err(err)
            }
        }
    }

    /// If `identity` is already loaded, refreshes its title and subtitle and
    /// returns true.
    fn adopt_if_current(&self, identity: &TrackIdentity, request: &TrackRequest) -> bool {
        let changed = {
            let mut current = self.current.lock();
            let Some(loaded) = current.as_mut().filter(|t| &t.identity == identity) else {
                return false;
            };
            loaded.title = request.title.clone();
            if loaded.subtitle == request.subtitle {
                None
            } else {
                loaded.subtitle = request.subtitle.clone();
                Some(loaded.clone())
            }
        };

        debug!(track = %identity, "track already loaded");
        if let Some(loaded) = changed {
            let _ = self.events.send(BridgeEvent::SubtitleChanged(loaded));
        }
        true
    }
}

async fn forward_track_end(
    mut engine_events: broadcast::Receiver<MediaEvent>,
    current: Arc<Mutex<Option<LoadedTrack>>>,
    events: broadcast::Sender<BridgeEvent>,
) {
    loop {
        match engine_events.recv().await {
            Ok(MediaEvent::Ended) => {
                let finished = current.lock().as_ref().map(|t| t.identity.clone());
                if let Some(identity) = finished {
                    info!(track = %identity, "track ended");
                    let _ = events.send(BridgeEvent::TrackEnded(identity));
                }
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}

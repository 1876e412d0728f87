//! Playlist control surface
//!
//! Turns prev/next/play/pause into bridge commands and keeps a short status
//! line for the user.

use crate::bridge::{EngineBridge, MediaEngine};
use crate::config::TrackConfig;
use crate::error::{Result, SubsyncError};

use std::fmt;
use std::str::FromStr;

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Prev,
    Next,
    Play,
    Pause,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prev" | "p" => Ok(Action::Prev),
            "next" | "n" => Ok(Action::Next),
            "play" | "" => Ok(Action::Play),
            "pause" | "s" => Ok(Action::Pause),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Idle,
    Analyzing,
    Ready,
    Playing,
    Paused,
    LoadFailed(String),
    PlayFailed(String),
    PauseFailed(String),
}

impl fmt::Display for Status {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Status::Idle => write!(fmt, "Waiting for the engine"),
            Status::Analyzing => write!(fmt, "Analyzing track..."),
            Status::Ready => write!(fmt, "Ready to play"),
            Status::Playing => write!(fmt, "Playing"),
            Status::Paused => write!(fmt, "Paused"),
            Status::LoadFailed(msg) => write!(fmt, "Error loading: {}", msg),
            Status::PlayFailed(msg) => write!(fmt, "Error playing: {}", msg),
            Status::PauseFailed(msg) => write!(fmt, "Error pausing: {}", msg),
        }
    }
}

pub struct Controls<E> {
    bridge: EngineBridge<E>,
    tracks: Vec<TrackConfig>,
    current: usize,
    status: Status,
}

impl<E: MediaEngine> Controls<E> {
    pub fn new(bridge: EngineBridge<E>, tracks: Vec<TrackConfig>) -> Result<Self> {
        if tracks.is_empty() {
            return Err(SubsyncError::Config("the playlist has no tracks".to_string()));
        }
        Ok(Self {
            bridge,
            tracks,
            current: 0,
            status: Status::Idle,
        })
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn title(&self) -> &str {
        &self.tracks[self.current].title
    }

    /// Selects the track at `index`, wrapping around both ends of the list.
    pub async fn load_track(&mut self, index: isize, autoplay: bool) {
        self.current = index.rem_euclid(self.tracks.len() as isize) as usize;
        self.set_status(Status::Analyzing);

        let request = self.tracks[self.current].to_request();
        let outcome = match self.bridge.set_track(request).await {
            Ok(()) if autoplay => self.bridge.play().await.map(|()| Status::Playing),
            Ok(()) => Ok(Status::Ready),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(status) => self.set_status(status),
            Err(err) => self.set_status(Status::LoadFailed(err.to_string())),
        }
    }

    pub async fn play_track(&mut self) {
        self.set_status(Status::Analyzing);
        let request = self.tracks[self.current].to_request();
        let outcome = match self.bridge.set_track(request).await {
            Ok(()) => self.bridge.play().await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(()) => self.set_status(Status::Playing),
            Err(err) => self.set_status(Status::PlayFailed(err.to_string())),
        }
    }

    pub async fn pause_track(&mut self) {
        match self.bridge.pause().await {
            Ok(()) => self.set_status(Status::Paused),
            Err(err) => self.set_status(Status::PauseFailed(err.to_string())),
        }
    }

    pub async fn handle(&mut self, action: Action) {
        let current = self.current as isize;
        match action {
            Action::Prev => self.load_track(current - 1, true).await,
            Action::Next => self.load_track(current + 1, true).await,
            Action::Play => self.play_track().await,
            Action::Pause => self.pause_track().await,
        }
    }

    /// Playlist advance when the engine finishes a track.
    pub async fn track_ended(&mut self) {
        self.handle(Action::Next).await;
    }

    fn set_status(&mut self, status: Status) {
        info!(track = %self.tracks[self.current].title, %status, "status");
        self.status = status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::write_wav;
    use crate::engine::WavEngine;
    use std::time::Duration;

    fn track(title: &str, src: &str) -> TrackConfig {
        TrackConfig {
            title: title.to_string(),
            src: src.to_string(),
            subtitle: None,
        }
    }

    fn controls(dir: &std::path::Path) -> (Controls<WavEngine>, WavEngine) {
        write_wav(dir, "crush.wav", 1000);
        write_wav(dir, "girlboss.wav", 1000);
        let engine = WavEngine::new(Duration::from_millis(100));
        let bridge = EngineBridge::new(engine.clone(), dir);
        bridge.mark_ready();
        let tracks = vec![
            track("Crush", "crush.wav"),
            track("Girlboss", "girlboss.wav"),
            track("Missing", "missing.wav"),
        ];
        (Controls::new(bridge, tracks).unwrap(), engine)
    }

    #[test]
    fn parses_actions() {
        assert_eq!("next".parse::<Action>(), Ok(Action::Next));
        assert_eq!(" P ".parse::<Action>(), Ok(Action::Prev));
        assert_eq!("".parse::<Action>(), Ok(Action::Play));
        assert!("rewind".parse::<Action>().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn loads_without_autoplay() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controls, engine) = controls(dir.path());
        assert_eq!(controls.status(), &Status::Idle);

        controls.load_track(0, false).await;
        assert_eq!(controls.status().to_string(), "Ready to play");
        assert_eq!(controls.title(), "Crush");
        assert!(!engine.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn prev_wraps_to_the_end_and_reports_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controls, engine) = controls(dir.path());

        controls.handle(Action::Prev).await;
        assert_eq!(controls.current_index(), 2);
        assert_eq!(controls.title(), "Missing");
        assert!(matches!(controls.status(), Status::LoadFailed(_)));
        assert!(controls.status().to_string().starts_with("Error loading: "));
        assert!(!engine.is_playing());

        controls.handle(Action::Next).await;
        assert_eq!(controls.current_index(), 0);
        assert_eq!(controls.status(), &Status::Playing);
        assert!(engine.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn play_and_pause_update_the_status() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controls, engine) = controls(dir.path());

        controls.handle(Action::Play).await;
        assert_eq!(controls.status(), &Status::Playing);
        assert!(engine.is_playing());

        controls.handle(Action::Pause).await;
        assert_eq!(controls.status(), &Status::Paused);
        assert!(!engine.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn track_end_advances_with_autoplay() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controls, engine) = controls(dir.path());

        controls.load_track(0, true).await;
        controls.track_ended().await;
        assert_eq!(controls.title(), "Girlboss");
        assert_eq!(controls.status(), &Status::Playing);
        assert!(engine.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn play_failure_uses_its_own_status() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controls, _engine) = controls(dir.path());

        controls.load_track(2, false).await;
        controls.handle(Action::Play).await;
        assert!(controls.status().to_string().starts_with("Error playing: "));
    }

    #[tokio::test]
    async fn refuses_an_empty_playlist() {
        let bridge = EngineBridge::new(WavEngine::new(Duration::from_millis(100)), ".");
        assert!(Controls::new(bridge, Vec::new()).is_err());
    }
}

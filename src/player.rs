//! Terminal player
//!
//! Wires the engine, the bridge, the playlist controls and one subtitle
//! session per loaded track. Captions and status lines go to stdout, logs
//! to stderr.

use crate::bridge::{BridgeEvent, EngineBridge, LoadedTrack, MediaEngine};
use crate::clock::TimeSource;
use crate::config::PlayerConfig;
use crate::controls::{Action, Controls};
use crate::engine::WavEngine;
use crate::processor::CaptionFormatter;
use crate::srt::CaptionEntry;
use crate::sync::SubtitleSync;
use crate::track::SubtitleTrack;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

pub async fn run(config: PlayerConfig) -> Result<()> {
    let formatter = Arc::new(CaptionFormatter::new(config.caption_style())?);
    let bridge = EngineBridge::new(WavEngine::new(config.tick()), &config.base_dir);
    let mut events = bridge.subscribe();
    let mut controls = Controls::new(bridge.clone(), config.tracks.clone())?;

    // Requested before the engine runs; the bridge holds it until ready.
    let first = bridge.set_track(config.tracks[0].to_request());
    bridge.engine().start();
    bridge.mark_ready();
    if let Err(err) = first.await {
        warn!("first track did not load: {}", err);
    }
    controls.load_track(0, false).await;
    print_status(&controls);
    println!("Commands: play, pause, next, prev, quit");

    let mut subtitles: Option<SubtitleSync> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                let line = line.trim();
                if line == "q" || line == "quit" {
                    break;
                }
                match line.parse::<Action>() {
                    Ok(action) => {
                        controls.handle(action).await;
                        print_status(&controls);
                    }
                    Err(msg) => println!("{}", msg),
                }
            }
            event = events.recv() => match event {
                Ok(BridgeEvent::TrackLoaded(track)) | Ok(BridgeEvent::SubtitleChanged(track)) => {
                    if let Some(mut previous) = subtitles.take() {
                        previous.destroy();
                    }
                    subtitles = attach_subtitles(&config, &track, bridge.engine(), &formatter).await;
                }
                Ok(BridgeEvent::TrackEnded(identity)) => {
                    info!(track = %identity, "advancing playlist");
                    controls.track_ended().await;
                    print_status(&controls);
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "missed bridge events"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    if let Some(mut session) = subtitles.take() {
        session.destroy();
    }
    Ok(())
}

/// Missing or unreadable subtitles leave the track without captions.
async fn attach_subtitles(
    config: &PlayerConfig,
    track: &LoadedTrack,
    engine: &WavEngine,
    formatter: &Arc<CaptionFormatter>,
) -> Option<SubtitleSync> {
    let path = config.base_dir.join(track.subtitle.as_deref()?);
    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(err) => {
            warn!(path = %path.display(), "no subtitles for '{}': {}", track.title, err);
            return None;
        }
    };
    let subtitles = match SubtitleTrack::parse(&text) {
        Ok(subtitles) => subtitles,
        Err(err) => {
            warn!(path = %path.display(), "unusable subtitles: {}", err);
            return None;
        }
    };
    info!(path = %path.display(), captions = subtitles.len(), "subtitles loaded");

    let clock: Arc<dyn TimeSource> = Arc::new(engine.clone());
    let formatter = Arc::clone(formatter);
    Some(SubtitleSync::new(
        clock,
        Arc::new(subtitles),
        move |entry, time| print_caption(&formatter, entry, time),
        config.sync_options(),
    ))
}

fn print_caption(formatter: &CaptionFormatter, entry: Option<&CaptionEntry>, time: f64) {
    let stamp = format!("{:02}:{:05.2}", (time / 60.0) as u64, time % 60.0);
    match entry {
        Some(entry) => println!("[{}] {}", stamp, formatter.format(entry.text())),
        None => println!("[{}]", stamp),
    }
}

fn print_status<E: MediaEngine>(controls: &Controls<E>) {
    println!("{} - {}", controls.title(), controls.status());
}

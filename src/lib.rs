//! Subtitle synchronization for audio playback.
//!
//! Parses SRT files into a time index, follows a playback clock to report
//! caption changes, and queues transport commands until the engine behind
//! them is ready.

pub mod bridge;
pub mod clock;
pub mod config;
pub mod controls;
pub mod engine;
pub mod error;
pub mod parser;
pub mod player;
pub mod processor;
pub mod serialiser;
pub mod srt;
pub mod sync;
pub mod track;

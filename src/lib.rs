//! ASCII Reel - a frame-accurate ASCII video player for the terminal
//!
//! Decoded video frames are downsampled to a character grid, mapped through a
//! brightness ramp (optionally with ANSI colors) and shown in real time. When
//! rendering falls behind, frames are dropped so playback keeps the video's
//! native duration.

pub mod cli;
pub mod config;
pub mod converter;
pub mod decoder;
pub mod mapper;
pub mod scheduler;
pub mod terminal;

pub use cli::Cli;
pub use config::{PlayerConfig, Preset, QualityTier};
pub use converter::{AsciiFrame, FrameConverter, GridLayout, RenderConfig};
pub use decoder::{FrameSource, VideoDecoder, VideoFrame, VideoMetadata};
pub use mapper::{CharacterRamp, CharacterStyle, ColorDepth};
pub use scheduler::{
    CancelToken, Clock, PlaybackOptions, PlaybackReport, PlayerState, Scheduler, SystemClock,
};
pub use terminal::{Terminal, TextSink};

use std::path::PathBuf;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const PACKAGE_NAME: &str = env!("CARGO_PKG_NAME");

/// Error types used throughout the application
#[derive(thiserror::Error, Debug)]
pub enum PlayerError {
    #[error("Failed to open video source '{path}': {reason}")]
    SourceOpen { path: PathBuf, reason: String },

    #[error("Video decoding error: {0}")]
    SourceRead(#[from] ffmpeg_next::Error),

    #[error("Unusable video metadata: {0}")]
    DegenerateMetadata(String),

    #[error("Frame holds {actual} bytes of pixel data, expected {expected}")]
    FrameData { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed configuration file: {0}")]
    ConfigFormat(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Utility functions
pub mod utils {
    use std::time::Duration;

    /// Format duration in a human-readable way
    pub fn format_duration(seconds: f64) -> String {
        let total_seconds = seconds.max(0.0) as u64;
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let secs = total_seconds % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{}:{:02}", minutes, secs)
        }
    }

    /// Milliseconds with two decimals
    pub fn format_millis(duration: Duration) -> String {
        format!("{:.2}ms", duration.as_secs_f64() * 1000.0)
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        utils::*, AsciiFrame, CancelToken, CharacterRamp, CharacterStyle, Cli, Clock,
        ColorDepth, FrameConverter, FrameSource, GridLayout, PlaybackOptions, PlaybackReport,
        PlayerConfig, PlayerError, PlayerState, QualityTier, RenderConfig, Result, Scheduler,
        SystemClock, Terminal, TextSink, VideoFrame, VideoMetadata,
    };
}

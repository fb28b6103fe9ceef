use crate::config::{Preset, QualityTier};
use crate::mapper::CharacterStyle;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the video file to play
    #[arg(required = true)]
    pub file_path: PathBuf,

    /// JSON configuration file; flags given here override it
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Quality, color and style bundle
    #[arg(short, long)]
    pub preset: Option<Preset>,

    /// Quality tier (maximum grid width and color depth)
    #[arg(short, long)]
    pub quality: Option<QualityTier>,

    /// Character ramp used for brightness
    #[arg(short, long)]
    pub style: Option<CharacterStyle>,

    /// Force colored output
    #[arg(long, conflicts_with = "no_color")]
    pub color: bool,

    /// Force monochrome output
    #[arg(long)]
    pub no_color: bool,

    /// Grid width in characters (override automatic detection)
    #[arg(short, long)]
    pub width: Option<u16>,

    /// Frame rate to assume when the video does not report one
    #[arg(short, long)]
    pub fps: Option<f64>,

    /// Loop the video playback
    #[arg(short, long = "loop")]
    pub loop_playback: bool,

    /// Hide the progress line
    #[arg(long)]
    pub no_info: bool,

    /// Recompute the grid when the terminal is resized
    #[arg(long)]
    pub follow_resize: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Show video information only (don't play)
    #[arg(long = "info")]
    pub info_only: bool,
}

impl Cli {
    /// Validate command line arguments
    pub fn validate(&self) -> Result<(), String> {
        if !self.file_path.exists() {
            return Err(format!("Video file does not exist: {}", self.file_path.display()));
        }

        if let Some(ref config) = self.config {
            if !config.exists() {
                return Err(format!("Config file does not exist: {}", config.display()));
            }
        }

        if let Some(width) = self.width {
            if width == 0 {
                return Err("Width must be greater than 0".to_string());
            }
        }

        if let Some(fps) = self.fps {
            if !fps.is_finite() || fps <= 0.0 {
                return Err("FPS must be greater than 0".to_string());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from([
            "ascii-reel", "clip.mp4", "--quality", "medium", "--style", "ultra", "-l", "--no-info",
        ]);
        assert_eq!(cli.quality, Some(QualityTier::Medium));
        assert_eq!(cli.style, Some(CharacterStyle::Ultra));
        assert!(cli.loop_playback);
        assert!(cli.no_info);
        assert!(!cli.follow_resize);
    }

    #[test]
    fn test_color_flags_conflict() {
        let result = Cli::try_parse_from(["ascii-reel", "clip.mp4", "--color", "--no-color"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_missing_file() {
        let cli = Cli::parse_from(["ascii-reel", "definitely-missing.mp4"]);
        let err = cli.validate().unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn test_validate_fps() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();

        let cli = Cli::parse_from(["ascii-reel", path, "--fps", "0"]);
        assert_eq!(cli.validate().unwrap_err(), "FPS must be greater than 0");

        let cli = Cli::parse_from(["ascii-reel", path, "--fps", "24"]);
        assert!(cli.validate().is_ok());
    }
}

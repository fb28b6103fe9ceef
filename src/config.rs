use crate::cli::Cli;
use crate::mapper::{CharacterStyle, ColorDepth};
use crate::{PlayerError, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fidelity bundle trading grid width and color depth for render cost
#[derive(clap::ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Ultra,
    High,
    Medium,
    Low,
}

impl QualityTier {
    /// Widest grid this tier renders, in columns
    pub fn max_columns(self) -> u16 {
        match self {
            QualityTier::Ultra => 200,
            QualityTier::High => 150,
            QualityTier::Medium => 100,
            QualityTier::Low => 80,
        }
    }

    pub fn color_depth(self) -> ColorDepth {
        match self {
            QualityTier::Ultra | QualityTier::High => ColorDepth::TrueColor,
            QualityTier::Medium | QualityTier::Low => ColorDepth::Palette256,
        }
    }
}

/// Ready-made combinations of quality, color and character style
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preset {
    /// Highest resolution, true color, ultra ramp
    Ultra,
    /// True color with the detailed ramp
    High,
    /// Monochrome detailed ramp
    Medium,
    /// Monochrome standard ramp, fastest
    Low,
    /// Matrix-style ramp in color
    Matrix,
}

impl Preset {
    /// (quality, color, style)
    pub fn settings(self) -> (QualityTier, bool, CharacterStyle) {
        match self {
            Preset::Ultra => (QualityTier::Ultra, true, CharacterStyle::Ultra),
            Preset::High => (QualityTier::High, true, CharacterStyle::Detailed),
            Preset::Medium => (QualityTier::Medium, false, CharacterStyle::Detailed),
            Preset::Low => (QualityTier::Low, false, CharacterStyle::Standard),
            Preset::Matrix => (QualityTier::High, true, CharacterStyle::Matrix),
        }
    }
}

/// Player settings, loadable from a JSON file and overridable from the command line
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Grid width in columns; `None` picks it from the terminal
    pub width: Option<u16>,
    /// Frame rate to assume when the source reports none
    pub fps_hint: Option<f64>,
    /// Emit color escape sequences
    pub color: bool,
    /// Character ramp
    pub style: CharacterStyle,
    /// Quality tier
    pub quality: QualityTier,
    /// Restart from the first frame at end of stream
    #[serde(rename = "loop")]
    pub loop_playback: bool,
    /// Draw the progress/status line under each frame
    pub show_info: bool,
    /// Fix the grid once at startup instead of following terminal resizes
    pub static_dimensions: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            width: None,
            fps_hint: None,
            color: true,
            style: CharacterStyle::Detailed,
            quality: QualityTier::High,
            loop_playback: false,
            show_info: true,
            static_dimensions: true,
        }
    }
}

impl PlayerConfig {
    /// Load a config file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: PlayerConfig = serde_json::from_str(&text)?;
        debug!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Resolve the effective configuration: defaults, then file, then preset, then flags
    pub fn resolve(cli: &Cli) -> Result<Self> {
        let mut config = match cli.config {
            Some(ref path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Layer command-line settings over this configuration
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(preset) = cli.preset {
            let (quality, color, style) = preset.settings();
            self.quality = quality;
            self.color = color;
            self.style = style;
        }
        if let Some(quality) = cli.quality {
            self.quality = quality;
        }
        if let Some(style) = cli.style {
            self.style = style;
        }
        if cli.color {
            self.color = true;
        }
        if cli.no_color {
            self.color = false;
        }
        if cli.width.is_some() {
            self.width = cli.width;
        }
        if cli.fps.is_some() {
            self.fps_hint = cli.fps;
        }
        if cli.loop_playback {
            self.loop_playback = true;
        }
        if cli.no_info {
            self.show_info = false;
        }
        if cli.follow_resize {
            self.static_dimensions = false;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(width) = self.width {
            if width == 0 {
                return Err(PlayerError::InvalidConfig(
                    "width must be greater than 0".to_string(),
                ));
            }
        }
        if let Some(fps) = self.fps_hint {
            if !fps.is_finite() || fps <= 0.0 {
                return Err(PlayerError::InvalidConfig(
                    "FPS must be greater than 0".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn color_depth(&self) -> ColorDepth {
        self.quality.color_depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["ascii-reel", "video.mp4"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_quality_tiers() {
        assert_eq!(QualityTier::Ultra.max_columns(), 200);
        assert_eq!(QualityTier::High.max_columns(), 150);
        assert_eq!(QualityTier::Medium.max_columns(), 100);
        assert_eq!(QualityTier::Low.max_columns(), 80);
        assert_eq!(QualityTier::High.color_depth(), ColorDepth::TrueColor);
        assert_eq!(QualityTier::Low.color_depth(), ColorDepth::Palette256);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: PlayerConfig =
            serde_json::from_str(r#"{"quality": "low", "loop": true, "style": "blocks"}"#).unwrap();
        assert_eq!(config.quality, QualityTier::Low);
        assert!(config.loop_playback);
        assert_eq!(config.style, CharacterStyle::Blocks);
        assert!(config.color);
        assert!(config.static_dimensions);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, r#"{{"width": 64, "color": false, "show_info": false}}"#).unwrap();

        let config = PlayerConfig::from_file(&path).unwrap();
        assert_eq!(config.width, Some(64));
        assert!(!config.color);
        assert!(!config.show_info);
    }

    #[test]
    fn test_from_file_rejects_bad_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.json");
        std::fs::write(&path, r#"{"fps_hint": -1.0}"#).unwrap();
        assert!(matches!(
            PlayerConfig::from_file(&path),
            Err(PlayerError::InvalidConfig(_))
        ));

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PlayerConfig::from_file(&path),
            Err(PlayerError::ConfigFormat(_))
        ));
    }

    #[test]
    fn test_preset_then_flags() {
        let mut config = PlayerConfig::default();
        config.apply_cli(&cli(&["--preset", "low", "--style", "blocks"]));
        assert_eq!(config.quality, QualityTier::Low);
        assert!(!config.color);
        assert_eq!(config.style, CharacterStyle::Blocks);

        let mut config = PlayerConfig::default();
        config.apply_cli(&cli(&["--preset", "matrix", "--no-color", "--loop", "--follow-resize"]));
        assert_eq!(config.style, CharacterStyle::Matrix);
        assert!(!config.color);
        assert!(config.loop_playback);
        assert!(!config.static_dimensions);
    }
}

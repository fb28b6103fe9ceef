use crate::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// SGR sequence that restores the terminal's default colors
pub const RESET_COLOR: &str = "\x1b[0m";

/// Named character styles, each backed by a ramp in the registry
#[derive(clap::ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CharacterStyle {
    /// Ten characters, good contrast
    Standard,
    /// Seventy characters, fine gradations
    Detailed,
    /// Unicode shade blocks
    Blocks,
    /// Five characters, very coarse
    Simple,
    /// Standard ramp topped with digits
    Matrix,
    /// Ninety-odd characters ordered by ink coverage
    Ultra,
}

impl CharacterStyle {
    pub const ALL: [CharacterStyle; 6] = [
        CharacterStyle::Standard,
        CharacterStyle::Detailed,
        CharacterStyle::Blocks,
        CharacterStyle::Simple,
        CharacterStyle::Matrix,
        CharacterStyle::Ultra,
    ];

    /// Glyphs of this style, darkest first
    pub fn glyphs(self) -> &'static str {
        match self {
            CharacterStyle::Standard => " .:-=+*#%@",
            CharacterStyle::Detailed => {
                " .'`^\",:;Il!i><~+_-?][}{1)(|\\/tfjrxnuvczXYUJCLQ0OZmwqpdbkhao*#MW&8%B@$"
            }
            CharacterStyle::Blocks => " ░▒▓█",
            CharacterStyle::Simple => " .oO@",
            CharacterStyle::Matrix => " .:-=+*#%@01",
            CharacterStyle::Ultra => {
                " `.-':_,^=;><+!rc*/z?sLTv)J7(|Fi{C}fI31tlu[neoZ5Yxjya]2ESwqkP6h9d4VpOGbUAKXHm8RD#$Bg0MNWQ%&@"
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CharacterStyle::Standard => "standard",
            CharacterStyle::Detailed => "detailed",
            CharacterStyle::Blocks => "blocks",
            CharacterStyle::Simple => "simple",
            CharacterStyle::Matrix => "matrix",
            CharacterStyle::Ultra => "ultra",
        }
    }

    /// Ramp for this style from the shared registry
    pub fn ramp(self) -> &'static CharacterRamp {
        &registry()[self as usize]
    }
}

/// Terminal color encoding used for colored output
#[derive(clap::ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorDepth {
    /// 24-bit RGB passed through verbatim
    TrueColor,
    /// xterm 6x6x6 color cube
    Palette256,
}

/// Ordered glyphs from darkest (index 0) to brightest.
///
/// The luminance-to-glyph table is precomputed on construction, so mapping a
/// pixel is a single array lookup.
#[derive(Debug, Clone)]
pub struct CharacterRamp {
    glyphs: Vec<char>,
    lookup: [char; 256],
}

impl CharacterRamp {
    /// Build a ramp from a string of at least two glyphs
    pub fn new(glyphs: &str) -> Result<Self> {
        let glyphs: Vec<char> = glyphs.chars().collect();
        if glyphs.len() < 2 {
            return Err(PlayerError::InvalidConfig(format!(
                "character ramp needs at least 2 glyphs, got {}",
                glyphs.len()
            )));
        }

        Ok(Self::from_glyphs(glyphs))
    }

    /// Precompute the lookup table; `glyphs` must not be empty
    fn from_glyphs(glyphs: Vec<char>) -> Self {
        let mut lookup = [' '; 256];
        for (intensity, slot) in lookup.iter_mut().enumerate() {
            *slot = glyphs[glyph_index(intensity as u8, glyphs.len())];
        }
        Self { glyphs, lookup }
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn glyphs(&self) -> &[char] {
        &self.glyphs
    }

    /// Glyph for an intensity in 0..=255
    #[inline]
    pub fn map(&self, intensity: u8) -> char {
        self.lookup[intensity as usize]
    }
}

/// `floor(intensity / 255 * (len - 1))`, computed exactly in integers
#[inline]
pub fn glyph_index(intensity: u8, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (intensity as usize * (len - 1) / 255).min(len - 1)
}

/// Read-only style registry, indexed by `CharacterStyle` and built on first use
pub fn registry() -> &'static [CharacterRamp; CharacterStyle::ALL.len()] {
    static REGISTRY: OnceLock<[CharacterRamp; CharacterStyle::ALL.len()]> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        CharacterStyle::ALL.map(|style| CharacterRamp::from_glyphs(style.glyphs().chars().collect()))
    })
}

/// BT.601 luma, rounded to the nearest integer
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let luma = 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
    luma.round().clamp(0.0, 255.0) as u8
}

/// Index into the xterm 256-color cube (always within 16..=231)
#[inline]
pub fn palette_index(r: u8, g: u8, b: u8) -> u8 {
    16 + 36 * (r / 51) + 6 * (g / 51) + (b / 51)
}

/// Foreground color escape sequence for a pixel
pub fn color_prefix(r: u8, g: u8, b: u8, depth: ColorDepth) -> String {
    match depth {
        ColorDepth::TrueColor => format!("\x1b[38;2;{};{};{}m", r, g, b),
        ColorDepth::Palette256 => format!("\x1b[38;5;{}m", palette_index(r, g, b)),
    }
}

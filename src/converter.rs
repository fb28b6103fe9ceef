use crate::decoder::VideoFrame;
use crate::mapper::{color_prefix, luminance, CharacterRamp, ColorDepth, RESET_COLOR};
use crate::{PlayerError, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use log::{debug, warn};

/// Glyphs are roughly twice as tall as they are wide
pub const CHAR_ASPECT: f64 = 0.55;

/// Smallest grid the player will draw
pub const MIN_COLUMNS: u16 = 10;
pub const MIN_ROWS: u16 = 5;

/// Terminal rows kept free below the frame for the status line
pub const RESERVED_ROWS: u16 = 4;

/// Terminal columns kept free beside the frame
pub const RESERVED_COLUMNS: u16 = 2;

/// Share of the terminal width used when no width is given
pub const AUTO_WIDTH_FACTOR: f64 = 0.95;

/// A fully rendered frame, ready to be written to a terminal
#[derive(Debug, Clone, PartialEq)]
pub struct AsciiFrame {
    /// Glyphs, color sequences and newlines for the whole frame
    pub text: String,
    /// Frame width in characters
    pub columns: u16,
    /// Frame height in characters
    pub rows: u16,
    /// Source frame index
    pub frame_index: u64,
}

/// Target grid and color settings for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderConfig {
    pub columns: u16,
    pub rows: u16,
    pub color: bool,
    pub color_depth: ColorDepth,
}

impl RenderConfig {
    pub fn monochrome(columns: u16, rows: u16) -> Self {
        Self {
            columns,
            rows,
            color: false,
            color_depth: ColorDepth::TrueColor,
        }
    }
}

/// Aspect-corrected grid sizing for one source against a terminal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridLayout {
    /// Source frame width in pixels
    pub source_width: u32,
    /// Source frame height in pixels
    pub source_height: u32,
    /// Requested column count, `None` for automatic
    pub width_override: Option<u16>,
    /// Upper bound from the quality tier
    pub max_columns: u16,
}

impl GridLayout {
    /// Fit the grid into a terminal of `term_columns` by `term_rows`
    pub fn fit(&self, term_columns: u16, term_rows: u16) -> (u16, u16) {
        let aspect = self.source_height as f64 / self.source_width.max(1) as f64;

        let requested = match self.width_override {
            Some(width) => width,
            None => (term_columns as f64 * AUTO_WIDTH_FACTOR) as u16,
        };
        let mut columns = requested.min(self.max_columns) as i64;
        let mut rows = (columns as f64 * aspect * CHAR_ASPECT) as i64;

        let max_rows = term_rows as i64 - RESERVED_ROWS as i64;
        if rows > max_rows {
            rows = max_rows;
            columns = (rows as f64 / aspect / CHAR_ASPECT) as i64;
        }

        let max_columns = term_columns as i64 - RESERVED_COLUMNS as i64;
        if columns > max_columns {
            columns = max_columns;
            rows = (columns as f64 * aspect * CHAR_ASPECT) as i64;
        }

        if columns < MIN_COLUMNS as i64 || rows < MIN_ROWS as i64 {
            warn!(
                "Terminal {}x{} too small for the video, using at least {}x{}",
                term_columns, term_rows, MIN_COLUMNS, MIN_ROWS
            );
        }

        let columns = columns.clamp(MIN_COLUMNS as i64, u16::MAX as i64) as u16;
        let rows = rows.clamp(MIN_ROWS as i64, u16::MAX as i64) as u16;
        debug!("Grid for terminal {}x{}: {}x{}", term_columns, term_rows, columns, rows);
        (columns, rows)
    }
}

/// Video frame to ASCII converter
pub struct FrameConverter {
    ramp: CharacterRamp,
}

impl FrameConverter {
    pub fn new(ramp: CharacterRamp) -> Self {
        Self { ramp }
    }

    pub fn ramp(&self) -> &CharacterRamp {
        &self.ramp
    }

    /// Render a whole frame into a text block
    pub fn render(&self, frame: &VideoFrame, config: &RenderConfig) -> Result<AsciiFrame> {
        let expected = frame.width as usize * frame.height as usize * 3;
        if frame.width == 0 || frame.height == 0 || frame.data.len() < expected {
            return Err(PlayerError::FrameData {
                expected,
                actual: frame.data.len(),
            });
        }

        let columns = config.columns.max(1);
        let rows = config.rows.max(1);
        let resized = resize_rgb(&frame.data, frame.width, frame.height, columns as u32, rows as u32)
            .ok_or(PlayerError::FrameData {
                expected,
                actual: frame.data.len(),
            })?;

        let per_cell = if config.color { 20 } else { 1 };
        let mut text = String::with_capacity((columns as usize * per_cell + 5) * rows as usize);

        for row in resized.chunks_exact(columns as usize * 3) {
            for pixel in row.chunks_exact(3) {
                let (r, g, b) = (pixel[0], pixel[1], pixel[2]);
                let glyph = self.ramp.map(luminance(r, g, b));
                if config.color {
                    text.push_str(&color_prefix(r, g, b, config.color_depth));
                }
                text.push(glyph);
            }
            if config.color {
                text.push_str(RESET_COLOR);
            }
            text.push('\n');
        }

        Ok(AsciiFrame {
            text,
            columns,
            rows,
            frame_index: frame.index,
        })
    }
}

/// Resample packed RGB24 to the target grid with a triangle filter.
///
/// Returns `None` when `data` is too short for the stated dimensions.
pub fn resize_rgb(
    data: &[u8],
    src_width: u32,
    src_height: u32,
    target_width: u32,
    target_height: u32,
) -> Option<Vec<u8>> {
    let source = ImageBuffer::<Rgb<u8>, &[u8]>::from_raw(src_width, src_height, data)?;
    Some(imageops::resize(&source, target_width, target_height, FilterType::Triangle).into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::CharacterStyle;

    fn binary_converter() -> FrameConverter {
        FrameConverter::new(CharacterRamp::new(" #").unwrap())
    }

    fn layout(width: u32, height: u32, max_columns: u16) -> GridLayout {
        GridLayout {
            source_width: width,
            source_height: height,
            width_override: None,
            max_columns,
        }
    }

    #[test]
    fn test_black_and_white_frames() {
        let converter = binary_converter();
        let config = RenderConfig::monochrome(4, 2);

        let black = converter.render(&VideoFrame::solid(16, 8, (0, 0, 0), 0), &config).unwrap();
        assert_eq!(black.text, "    \n    \n");

        let white = converter.render(&VideoFrame::solid(16, 8, (255, 255, 255), 1), &config).unwrap();
        assert_eq!(white.text, "####\n####\n");
        assert_eq!(white.frame_index, 1);
    }

    #[test]
    fn test_color_rows_are_reset() {
        let converter = binary_converter();
        let config = RenderConfig {
            columns: 2,
            rows: 1,
            color: true,
            color_depth: ColorDepth::TrueColor,
        };
        let frame = converter.render(&VideoFrame::solid(4, 4, (255, 0, 0), 0), &config).unwrap();
        assert_eq!(frame.text, "\x1b[38;2;255;0;0m \x1b[38;2;255;0;0m \x1b[0m\n");

        let config = RenderConfig {
            color_depth: ColorDepth::Palette256,
            ..config
        };
        let frame = converter.render(&VideoFrame::solid(4, 4, (255, 255, 255), 0), &config).unwrap();
        assert_eq!(frame.text, "\x1b[38;5;231m#\x1b[38;5;231m#\x1b[0m\n");
    }

    #[test]
    fn test_render_is_deterministic() {
        let converter = FrameConverter::new(CharacterStyle::Ultra.ramp().clone());
        let mut frame = VideoFrame::solid(37, 23, (0, 0, 0), 3);
        for (i, byte) in frame.data.iter_mut().enumerate() {
            *byte = (i * 7 % 256) as u8;
        }
        let config = RenderConfig {
            columns: 13,
            rows: 5,
            color: true,
            color_depth: ColorDepth::TrueColor,
        };
        let first = converter.render(&frame, &config).unwrap();
        let second = converter.render(&frame, &config).unwrap();
        assert_eq!(first.text.as_bytes(), second.text.as_bytes());
        assert_eq!(first.text.matches('\n').count(), 5);
    }

    #[test]
    fn test_short_pixel_buffer_is_rejected() {
        let converter = binary_converter();
        let mut frame = VideoFrame::solid(4, 4, (0, 0, 0), 0);
        frame.data.truncate(10);
        let result = converter.render(&frame, &RenderConfig::monochrome(2, 2));
        assert!(matches!(result, Err(PlayerError::FrameData { expected: 48, actual: 10 })));
    }

    #[test]
    fn test_resize_rgb() {
        // Black and white pixels blend into a grey cell
        let blended = resize_rgb(&[0, 0, 0, 255, 255, 255], 2, 1, 1, 1).unwrap();
        assert_eq!(blended.len(), 3);
        assert!(blended.iter().all(|&c| c > 0 && c < 255 && c == blended[0]));

        // Upscale repeats the single source pixel
        assert_eq!(
            resize_rgb(&[10, 20, 30], 1, 1, 2, 1).unwrap(),
            vec![10, 20, 30, 10, 20, 30]
        );

        // Uniform frames stay exactly uniform
        let white = VideoFrame::solid(64, 36, (255, 255, 255), 0);
        let resized = resize_rgb(&white.data, 64, 36, 13, 5).unwrap();
        assert_eq!(resized.len(), 13 * 5 * 3);
        assert!(resized.iter().all(|&c| c == 255));

        assert!(resize_rgb(&[0; 5], 2, 1, 1, 1).is_none());
    }

    #[test]
    fn test_fit_width_limited_by_tier() {
        // 16:9 source in a large terminal, capped at 150 columns
        let (columns, rows) = layout(1920, 1080, 150).fit(300, 120);
        assert_eq!(columns, 150);
        assert_eq!(rows, (150.0 * (1080.0 / 1920.0) * CHAR_ASPECT) as u16);
    }

    #[test]
    fn test_fit_height_limited() {
        // Tall source: rows clamp to terminal height minus the status area
        let (columns, rows) = layout(1080, 1920, 200).fit(200, 50);
        assert_eq!(rows, 46);
        assert_eq!(columns, (46.0 / (1920.0 / 1080.0) / CHAR_ASPECT) as u16);
        assert!(columns <= 198);
    }

    #[test]
    fn test_fit_override_clamped_to_terminal() {
        let grid = GridLayout {
            width_override: Some(120),
            ..layout(400, 100, 200)
        };
        let (columns, rows) = grid.fit(80, 60);
        assert_eq!(columns, 78);
        assert_eq!(rows, (78.0 * 0.25 * CHAR_ASPECT) as u16);
    }

    #[test]
    fn test_fit_tiny_terminal_degrades_to_minimum() {
        let (columns, rows) = layout(640, 480, 200).fit(8, 4);
        assert_eq!((columns, rows), (MIN_COLUMNS, MIN_ROWS));
    }
}

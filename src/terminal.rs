use crate::scheduler::CancelToken;
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyModifiers},
    execute, queue,
    style::{Color, Print, ResetColor, SetBackgroundColor, SetForegroundColor},
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use log::{debug, info};
use std::io::{self, stdout, Stdout, Write};
use std::time::Duration;

/// Output side of playback: somewhere frame text can be drawn
pub trait TextSink {
    fn clear(&mut self) -> io::Result<()>;

    fn write(&mut self, text: &str) -> io::Result<()>;

    /// Progress line drawn beneath the frame
    fn write_status(&mut self, status: &str) -> io::Result<()> {
        self.write(status)
    }

    fn flush(&mut self) -> io::Result<()>;

    /// Current size in (columns, rows)
    fn dimensions(&mut self) -> io::Result<(u16, u16)>;
}

/// crossterm-backed terminal sink
pub struct Terminal {
    stdout: Stdout,
    interactive: bool,
    active: bool,
    terminal_width: u16,
    terminal_height: u16,
}

impl Terminal {
    /// Create a terminal sink; falls back to plain output when stdout is not a TTY
    pub fn new() -> io::Result<Self> {
        let interactive = atty::is(atty::Stream::Stdout);
        let (terminal_width, terminal_height) = if interactive {
            crossterm::terminal::size()?
        } else {
            (80, 24)
        };

        Ok(Self {
            stdout: stdout(),
            interactive,
            active: false,
            terminal_width,
            terminal_height,
        })
    }

    /// Prepare the terminal for full-screen playback
    pub fn init(&mut self) -> io::Result<()> {
        if self.interactive {
            enable_raw_mode()?;
            execute!(self.stdout, Hide, Clear(ClearType::All))?;
            debug!("Terminal initialized for playback");
        }
        self.active = true;
        Ok(())
    }

    /// Restore terminal to normal state
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        if self.interactive {
            execute!(self.stdout, Show, ResetColor, Clear(ClearType::All), MoveTo(0, 0))?;
            disable_raw_mode()?;
            debug!("Terminal restored to normal state");
        }
        Ok(())
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }
}

impl TextSink for Terminal {
    fn clear(&mut self) -> io::Result<()> {
        if self.interactive {
            queue!(self.stdout, Clear(ClearType::All), MoveTo(0, 0))?;
        }
        Ok(())
    }

    fn write(&mut self, text: &str) -> io::Result<()> {
        if !self.interactive {
            return self.stdout.write_all(text.as_bytes());
        }

        // Raw mode does not return the carriage on '\n', so every line is placed explicitly
        let lines: Vec<&str> = text.lines().collect();
        let widest = lines.iter().map(|line| visible_width(line)).max().unwrap_or(0) as u16;

        // Centred above the status row
        let offset_x = self.terminal_width.saturating_sub(widest) / 2;
        let offset_y = self
            .terminal_height
            .saturating_sub(1)
            .saturating_sub(lines.len() as u16)
            / 2;

        for (y, line) in lines.iter().enumerate() {
            queue!(self.stdout, MoveTo(offset_x, offset_y + y as u16), Print(line))?;
        }
        Ok(())
    }

    fn write_status(&mut self, status: &str) -> io::Result<()> {
        if !self.interactive {
            return writeln!(self.stdout, "{}", status);
        }

        let status_y = self.terminal_height.saturating_sub(1);
        let truncated: String = status.chars().take(self.terminal_width as usize).collect();
        queue!(
            self.stdout,
            MoveTo(0, status_y),
            SetForegroundColor(Color::White),
            SetBackgroundColor(Color::DarkGrey),
            Print(truncated),
            ResetColor
        )
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }

    fn dimensions(&mut self) -> io::Result<(u16, u16)> {
        if self.interactive {
            let (width, height) = crossterm::terminal::size()?;
            if (width, height) != (self.terminal_width, self.terminal_height) {
                debug!("Terminal dimensions updated: {}x{}", width, height);
            }
            self.terminal_width = width;
            self.terminal_height = height;
        }
        Ok((self.terminal_width, self.terminal_height))
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Printable width of a line, skipping SGR escape sequences
pub fn visible_width(line: &str) -> usize {
    let mut width = 0;
    let mut in_escape = false;
    for c in line.chars() {
        if in_escape {
            if c == 'm' {
                in_escape = false;
            }
        } else if c == '\x1b' {
            in_escape = true;
        } else {
            width += 1;
        }
    }
    width
}

/// Whether a key press asks playback to stop
pub fn is_quit_key(code: KeyCode, modifiers: KeyModifiers) -> bool {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Poll the keyboard until `token` is cancelled, cancelling it on a quit key.
///
/// Blocks the calling thread; run it on a blocking task.
pub fn watch_keys(token: CancelToken) -> io::Result<()> {
    while !token.is_cancelled() {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key_event) = event::read()? {
                if is_quit_key(key_event.code, key_event.modifiers) {
                    info!("Quit requested by user");
                    token.cancel();
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_width_skips_color_codes() {
        assert_eq!(visible_width("abc"), 3);
        assert_eq!(visible_width("\x1b[38;2;1;2;3m#\x1b[38;5;16m@\x1b[0m"), 2);
        assert_eq!(visible_width(""), 0);
    }

    #[test]
    fn test_quit_keys() {
        assert!(is_quit_key(KeyCode::Char('q'), KeyModifiers::NONE));
        assert!(is_quit_key(KeyCode::Esc, KeyModifiers::NONE));
        assert!(is_quit_key(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(!is_quit_key(KeyCode::Char('c'), KeyModifiers::NONE));
        assert!(!is_quit_key(KeyCode::Char(' '), KeyModifiers::NONE));
    }
}

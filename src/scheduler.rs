//! Real-time playback scheduling.
//!
//! The scheduler never advances at a fixed rate. Each iteration it derives the
//! frame that should be on screen from wall-clock time, reads forward to it,
//! renders only that frame and counts every frame it skipped as dropped. A
//! slow renderer therefore loses frames instead of stretching the video.

use crate::converter::{FrameConverter, GridLayout, RenderConfig};
use crate::decoder::{FrameSource, VideoFrame, VideoMetadata};
use crate::terminal::TextSink;
use crate::Result;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Slack past the nominal duration before a session counts as finished
pub const COMPLETION_EPSILON: f64 = 0.1;

/// Longest single sleep; anything above this points at a clock anomaly
pub const MAX_SLEEP: Duration = Duration::from_secs(1);

/// Displayed frames averaged for render latency
pub const LATENCY_WINDOW: usize = 30;

/// Width of the progress bar in the status line
pub const PROGRESS_BAR_WIDTH: usize = 50;

/// Float slack, in frames, when converting elapsed time to a frame index
const INDEX_TOLERANCE: f64 = 1e-9;

/// Monotonic time source used for scheduling
pub trait Clock {
    /// Time since an arbitrary fixed origin
    fn now(&self) -> Duration;

    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Wall clock backed by `Instant`
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Shared stop request, checked once per scheduler iteration
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Start of the current pass through the video
#[derive(Debug, Clone, Copy)]
pub struct PlaybackClock {
    start: Duration,
}

impl PlaybackClock {
    pub fn start<C: Clock>(clock: &C) -> Self {
        Self { start: clock.now() }
    }

    pub fn elapsed<C: Clock>(&self, clock: &C) -> Duration {
        clock.now().saturating_sub(self.start)
    }
}

/// Per-pass counters, reset whenever playback loops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    /// Index of the next frame the source will yield
    pub current_frame_index: u64,
    pub frames_read: u64,
    pub frames_displayed: u64,
    pub dropped_frame_count: u64,
    pub last_rendered_index: Option<u64>,
}

impl PlaybackState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// What the scheduler should do at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Playback is over
    Complete,
    /// Rewind the source and start a new pass
    Restart,
    /// Read forward to and display `target`
    Advance { target: u64 },
}

/// Frame that should be on screen `elapsed` seconds into playback
#[inline]
pub fn target_frame_index(elapsed: f64, frame_rate: f64) -> u64 {
    // A frame must be due at the exact nanosecond `sleep_budget` wakes for it
    (elapsed * frame_rate + INDEX_TOLERANCE).floor().max(0.0) as u64
}

/// Decide the next step from elapsed time alone
pub fn plan_step(elapsed: f64, metadata: &VideoMetadata, looping: bool) -> Step {
    if !looping && elapsed >= metadata.duration() + COMPLETION_EPSILON {
        return Step::Complete;
    }

    let target = target_frame_index(elapsed, metadata.frame_rate);
    if target >= metadata.total_frames {
        return if looping { Step::Restart } else { Step::Complete };
    }

    Step::Advance { target }
}

/// Time to wait before `next_index` is due, if a sane positive wait exists
pub fn sleep_budget(next_index: u64, frame_rate: f64, elapsed: Duration) -> Option<Duration> {
    let due = frame_due(next_index, frame_rate);
    let remaining = due.checked_sub(elapsed)?;
    (!remaining.is_zero() && remaining < MAX_SLEEP).then_some(remaining)
}

/// Scheduled presentation time of `index`, rounded up to the nanosecond
fn frame_due(index: u64, frame_rate: f64) -> Duration {
    Duration::from_nanos((index as f64 * 1e9 / frame_rate).ceil() as u64)
}

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Behaviour switches for one session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackOptions {
    pub looping: bool,
    pub show_info: bool,
    /// Recompute the grid from the sink size before every displayed frame
    pub follow_resize: bool,
}

/// Final statistics of a session
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    /// `Completed` or `Cancelled`
    pub outcome: PlayerState,
    pub frames_read: u64,
    pub frames_displayed: u64,
    pub frames_dropped: u64,
    /// Passes finished by looping back to the start
    pub loops_completed: u32,
    /// Wall time from the first iteration to the end of the session
    pub total_elapsed: Duration,
    /// Native duration of one pass
    pub video_duration: Duration,
    pub average_render_latency: Option<Duration>,
}

/// Drives a frame source in real time and shows the frame due at each instant
pub struct Scheduler<S: FrameSource, C: Clock> {
    source: S,
    metadata: VideoMetadata,
    converter: FrameConverter,
    render_config: RenderConfig,
    layout: Option<GridLayout>,
    options: PlaybackOptions,
    clock: C,
    state: PlayerState,
    playback: PlaybackState,
    latencies: VecDeque<Duration>,
    loops_completed: u32,
    /// Consecutive passes that ended before a single frame was read
    empty_passes: u32,
}

impl<S: FrameSource, C: Clock> Scheduler<S, C> {
    /// Validate the source metadata and take ownership of the source
    pub fn initialize(
        source: S,
        converter: FrameConverter,
        render_config: RenderConfig,
        options: PlaybackOptions,
        clock: C,
    ) -> Result<Self> {
        let metadata = source.metadata();
        metadata.validate()?;

        Ok(Self {
            source,
            metadata,
            converter,
            render_config,
            layout: None,
            options,
            clock,
            state: PlayerState::Idle,
            playback: PlaybackState::default(),
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            loops_completed: 0,
            empty_passes: 0,
        })
    }

    /// Layout used to refit the grid when following terminal resizes
    pub fn with_layout(mut self, layout: GridLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    /// Play until the stream ends or `cancel` fires, then release the source
    pub fn run<T: TextSink>(mut self, sink: &mut T, cancel: &CancelToken) -> Result<PlaybackReport> {
        let session = PlaybackClock::start(&self.clock);
        let outcome = self.drive(sink, cancel);
        self.source.close();

        let outcome = outcome?;
        self.state = outcome;

        let report = PlaybackReport {
            outcome,
            frames_read: self.playback.frames_read,
            frames_displayed: self.playback.frames_displayed,
            frames_dropped: self.playback.dropped_frame_count,
            loops_completed: self.loops_completed,
            total_elapsed: session.elapsed(&self.clock),
            video_duration: Duration::from_secs_f64(self.metadata.duration()),
            average_render_latency: self.average_latency(),
        };
        info!(
            "Playback {:?}: {} displayed, {} dropped, {} loops",
            report.outcome, report.frames_displayed, report.frames_dropped, report.loops_completed
        );
        Ok(report)
    }

    fn drive<T: TextSink>(&mut self, sink: &mut T, cancel: &CancelToken) -> Result<PlayerState> {
        self.state = PlayerState::Running;
        let mut pass = PlaybackClock::start(&self.clock);
        let frame_rate = self.metadata.frame_rate;
        let total_frames = self.metadata.total_frames;

        loop {
            if cancel.is_cancelled() {
                info!("Playback cancelled at frame {}", self.playback.current_frame_index);
                return Ok(PlayerState::Cancelled);
            }

            let elapsed = pass.elapsed(&self.clock).as_secs_f64();
            let target = match plan_step(elapsed, &self.metadata, self.options.looping) {
                Step::Complete => return Ok(PlayerState::Completed),
                Step::Restart => {
                    self.restart(&mut pass)?;
                    continue;
                }
                Step::Advance { target } => target,
            };

            let mut end_of_stream = false;
            while self.playback.current_frame_index <= target
                && self.playback.current_frame_index < total_frames
            {
                let frame = match self.source.next_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        debug!("End of stream at frame {}", self.playback.current_frame_index);
                        end_of_stream = true;
                        break;
                    }
                    Err(e) => {
                        warn!(
                            "Source read error at frame {}, ending stream: {}",
                            self.playback.current_frame_index, e
                        );
                        end_of_stream = true;
                        break;
                    }
                };
                self.playback.frames_read += 1;

                if self.playback.current_frame_index == target {
                    self.display(&frame, sink, elapsed)?;
                } else {
                    self.playback.dropped_frame_count += 1;
                    debug!("Dropped frame {}", self.playback.current_frame_index);
                }
                self.playback.current_frame_index += 1;
            }

            if end_of_stream {
                if self.options.looping {
                    self.restart(&mut pass)?;
                    continue;
                }
                return Ok(PlayerState::Completed);
            }

            let now = pass.elapsed(&self.clock);
            if let Some(wait) = sleep_budget(self.playback.current_frame_index, frame_rate, now) {
                self.clock.sleep(wait);
            }
        }
    }

    /// Render `frame` and put it on screen
    fn display<T: TextSink>(&mut self, frame: &VideoFrame, sink: &mut T, elapsed: f64) -> Result<()> {
        let started = self.clock.now();

        if self.options.follow_resize {
            if let Some(layout) = self.layout {
                let (term_columns, term_rows) = sink.dimensions()?;
                let (columns, rows) = layout.fit(term_columns, term_rows);
                self.render_config.columns = columns;
                self.render_config.rows = rows;
            }
        }

        let ascii = match self.converter.render(frame, &self.render_config) {
            Ok(ascii) => ascii,
            Err(e) => {
                error!("Error converting frame {}: {}", frame.index, e);
                self.playback.dropped_frame_count += 1;
                return Ok(());
            }
        };

        sink.clear()?;
        sink.write(&ascii.text)?;
        if self.options.show_info {
            let status = format_status(
                self.playback.current_frame_index,
                &self.metadata,
                elapsed,
                self.playback.dropped_frame_count,
            );
            sink.write_status(&status)?;
        }
        sink.flush()?;

        self.playback.frames_displayed += 1;
        self.playback.last_rendered_index = Some(self.playback.current_frame_index);

        let latency = self.clock.now().saturating_sub(started);
        if self.latencies.len() == LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);
        debug!(
            "Frame {} displayed in {:.2}ms",
            self.playback.current_frame_index,
            latency.as_secs_f64() * 1000.0
        );
        Ok(())
    }

    /// Rewind for another pass and reset the per-pass clock and counters
    fn restart(&mut self, pass: &mut PlaybackClock) -> Result<()> {
        if self.playback.frames_read == 0 {
            self.wait_out_empty_pass();
        } else {
            self.empty_passes = 0;
        }

        self.source.seek_to_start()?;
        self.playback.reset();
        *pass = PlaybackClock::start(&self.clock);
        self.loops_completed = self.loops_completed.saturating_add(1);
        info!("Video ended, restarting loop {}", self.loops_completed);
        Ok(())
    }

    /// Hold one frame interval so an unreadable source does not restart in a tight loop
    fn wait_out_empty_pass(&mut self) {
        self.empty_passes = self.empty_passes.saturating_add(1);
        let interval = frame_due(1, self.metadata.frame_rate).min(MAX_SLEEP);
        if self.empty_passes == 1 {
            warn!("Source yielded no frames, retrying every {:?}", interval);
        } else {
            debug!("Empty pass {} in a row", self.empty_passes);
        }
        self.clock.sleep(interval);
    }

    fn average_latency(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: Duration = self.latencies.iter().sum();
        Some(total / self.latencies.len() as u32)
    }
}

/// Progress bar and counters shown under each frame
pub fn format_status(frame_index: u64, metadata: &VideoMetadata, elapsed: f64, dropped: u64) -> String {
    let total = metadata.total_frames.max(1);
    let progress = (frame_index as f64 / total as f64 * 100.0).min(100.0);
    let filled = ((PROGRESS_BAR_WIDTH as u64 * frame_index / total) as usize).min(PROGRESS_BAR_WIDTH);
    let bar = format!(
        "{}{}",
        "█".repeat(filled),
        "░".repeat(PROGRESS_BAR_WIDTH - filled)
    );
    let actual_fps = if elapsed > 0.0 {
        frame_index as f64 / elapsed
    } else {
        0.0
    };

    let mut status = format!(
        "[{}] {:.1}% | Frame {}/{} | FPS: {:.1}/{:.1} | Time: {:.1}s/{:.1}s",
        bar,
        progress,
        frame_index,
        metadata.total_frames,
        actual_fps,
        metadata.frame_rate,
        elapsed,
        metadata.duration()
    );
    if dropped > 0 {
        status.push_str(&format!(" | Dropped: {}", dropped));
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(total_frames: u64, frame_rate: f64) -> VideoMetadata {
        VideoMetadata {
            total_frames,
            frame_rate,
            width: 8,
            height: 4,
        }
    }

    #[test]
    fn test_target_index_is_monotonic() {
        let mut previous = 0;
        for step in 0..2000 {
            let elapsed = step as f64 * 0.0037;
            let target = target_frame_index(elapsed, 29.97);
            assert!(target >= previous);
            previous = target;
        }
        assert_eq!(target_frame_index(0.0, 30.0), 0);
        assert_eq!(target_frame_index(0.5, 10.0), 5);
        assert_eq!(target_frame_index(0.099, 10.0), 0);

        // Exactly at each scheduled time the frame is due, never one short
        for index in 0..1000 {
            let due = frame_due(index, 29.97).as_secs_f64();
            assert_eq!(target_frame_index(due, 29.97), index);
        }
    }

    #[test]
    fn test_plan_step() {
        let meta = metadata(10, 10.0);
        assert_eq!(plan_step(0.0, &meta, false), Step::Advance { target: 0 });
        assert_eq!(plan_step(0.45, &meta, false), Step::Advance { target: 4 });
        assert_eq!(plan_step(1.0, &meta, false), Step::Complete);
        assert_eq!(plan_step(1.0, &meta, true), Step::Restart);
        assert_eq!(plan_step(1.2, &meta, false), Step::Complete);
        assert_eq!(plan_step(0.95, &meta, true), Step::Advance { target: 9 });
    }

    #[test]
    fn test_sleep_budget_guards() {
        assert_eq!(
            sleep_budget(3, 10.0, Duration::from_millis(250)),
            Some(Duration::from_millis(50))
        );
        // Already due
        assert_eq!(sleep_budget(3, 10.0, Duration::from_millis(300)), None);

        // Behind schedule
        assert_eq!(sleep_budget(3, 10.0, Duration::from_millis(400)), None);
        // Implausibly far ahead
        assert_eq!(sleep_budget(50, 10.0, Duration::ZERO), None);
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!token.is_cancelled());
        other.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_state_reset() {
        let mut state = PlaybackState {
            current_frame_index: 7,
            frames_read: 7,
            frames_displayed: 3,
            dropped_frame_count: 4,
            last_rendered_index: Some(6),
        };
        state.reset();
        assert_eq!(state, PlaybackState::default());
    }

    #[test]
    fn test_format_status() {
        let meta = metadata(100, 25.0);
        let status = format_status(50, &meta, 2.0, 0);
        assert!(status.contains("50.0%"));
        assert!(status.contains("Frame 50/100"));
        assert!(status.contains("FPS: 25.0/25.0"));
        assert!(status.contains("Time: 2.0s/4.0s"));
        assert!(!status.contains("Dropped"));
        assert_eq!(status.matches('█').count(), 25);

        let status = format_status(100, &meta, 4.0, 3);
        assert!(status.ends_with(" | Dropped: 3"));
        assert_eq!(status.matches('█').count(), PROGRESS_BAR_WIDTH);
    }
}

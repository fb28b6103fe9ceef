use ascii_reel::converter::{GridLayout, RenderConfig};
use ascii_reel::scheduler::{CancelToken, PlaybackOptions, PlaybackReport, Scheduler, SystemClock};
use ascii_reel::terminal::{watch_keys, Terminal, TextSink};
use ascii_reel::utils::{format_duration, format_millis};
use ascii_reel::{Cli, FrameConverter, FrameSource, PlayerConfig, VideoDecoder};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::{Path, PathBuf};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging; playback owns the screen, so stay quiet unless asked
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    // Validate CLI arguments
    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let config = PlayerConfig::resolve(&cli).context("Failed to load configuration")?;

    info!("Starting ASCII Reel v{}", ascii_reel::VERSION);
    info!("Playing: {}", cli.file_path.display());

    if cli.info_only {
        return print_info(&cli.file_path, &config);
    }

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl+C received, stopping playback");
                cancel.cancel();
            }
        });
    }

    let path = cli.file_path.clone();
    let report = tokio::task::spawn_blocking(move || play(path, config, cancel))
        .await
        .context("Playback task panicked")??;

    print_report(&report);
    Ok(())
}

/// Open the source, prepare the terminal and run one playback session
fn play(path: PathBuf, config: PlayerConfig, cancel: CancelToken) -> Result<PlaybackReport> {
    let mut decoder = VideoDecoder::open(&path)?;
    decoder.apply_frame_rate_hint(config.fps_hint);
    let metadata = decoder.metadata();

    let mut terminal = Terminal::new().context("Failed to access the terminal")?;
    let (term_columns, term_rows) = terminal.dimensions()?;

    let layout = GridLayout {
        source_width: metadata.width,
        source_height: metadata.height,
        width_override: config.width,
        max_columns: config.quality.max_columns(),
    };
    let (columns, rows) = layout.fit(term_columns, term_rows);
    let render_config = RenderConfig {
        columns,
        rows,
        color: config.color,
        color_depth: config.color_depth(),
    };

    info!(
        "Grid {}x{}, quality {:?}, style {}, color {}, loop {}",
        columns,
        rows,
        config.quality,
        config.style.name(),
        if config.color { "on" } else { "off" },
        if config.loop_playback { "on" } else { "off" }
    );

    let options = PlaybackOptions {
        looping: config.loop_playback,
        show_info: config.show_info,
        follow_resize: !config.static_dimensions,
    };
    let converter = FrameConverter::new(config.style.ramp().clone());
    let scheduler = Scheduler::initialize(decoder, converter, render_config, options, SystemClock::new())
        .with_context(|| format!("Cannot play '{}'", path.display()))?
        .with_layout(layout);

    terminal.init()?;
    let key_watcher = if terminal.is_interactive() {
        let token = cancel.clone();
        Some(std::thread::spawn(move || watch_keys(token)))
    } else {
        None
    };

    let result = scheduler.run(&mut terminal, &cancel);

    info!("Cleaning up and exiting");
    terminal.cleanup()?;

    // Stops the key watcher; the session is already over
    cancel.cancel();
    if let Some(handle) = key_watcher {
        match handle.join() {
            Ok(Err(e)) => warn!("Keyboard watcher failed: {}", e),
            Err(_) => warn!("Keyboard watcher panicked"),
            Ok(Ok(())) => {}
        }
    }

    Ok(result?)
}

fn print_info(path: &Path, config: &PlayerConfig) -> Result<()> {
    let mut decoder = VideoDecoder::open(path)?;
    decoder.apply_frame_rate_hint(config.fps_hint);
    let metadata = decoder.metadata();

    println!("Video Information:");
    println!("  File: {}", path.display());
    println!("  Dimensions: {}x{}", metadata.width, metadata.height);
    println!("  Frame Rate: {:.2} FPS", metadata.frame_rate);
    println!("  Frames: {}", metadata.total_frames);
    println!(
        "  Duration: {:.2} seconds ({})",
        metadata.duration(),
        format_duration(metadata.duration())
    );
    println!(
        "  Aspect Ratio: {:.2}",
        metadata.width as f64 / metadata.height.max(1) as f64
    );
    Ok(())
}

fn print_report(report: &PlaybackReport) {
    let total = report.total_elapsed.as_secs_f64();
    let native = report.video_duration.as_secs_f64();

    println!("{}", "=".repeat(60));
    println!("Playback {:?}", report.outcome);
    println!("  Total playback time: {:.2}s", total);
    println!("  Original video duration: {:.2}s", native);
    println!("  Time difference: {:.2}s", (total - native).abs());
    println!("  Frames displayed: {}", report.frames_displayed);
    println!("  Frames dropped: {}", report.frames_dropped);
    if report.loops_completed > 0 {
        println!("  Loops completed: {}", report.loops_completed);
    }
    if let Some(latency) = report.average_render_latency {
        println!("  Avg processing time: {}", format_millis(latency));
    }
    println!("{}", "=".repeat(60));
}

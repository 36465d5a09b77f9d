mod audio;
mod cli;
mod config;
mod display;
mod feeder;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use audio::analysis::{analyze_offline, window_offsets};
use audio::features::FrameReport;
use cli::Cli;
use display::{has_signal, DisplayFrame, DisplayMode, SpectrumDisplay};
use feeder::{FeedEnd, FeederControl, RealtimeFeeder, WindowMessage};

#[derive(Serialize)]
struct WaveReport<'a> {
    offset: usize,
    time: f64,
    samples: &'a [i32],
    signaled: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect bandscope.toml / user config
    let config_path = cli.config.clone().or_else(config::find_config);
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.mode == DisplayMode::Grid { cli.mode = cfg.display.mode; }
            if cli.bits == 16 { cli.bits = cfg.display.bits_per_sample; }
            if cli.tick_ms == config::default_tick_ms() { cli.tick_ms = cfg.feeder.tick_ms; }
            if cli.channel == 0 { cli.channel = cfg.feeder.channel; }
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    log::info!("bandscope - log-band spectrum analyzer");
    log::info!("Input: {}", cli.input.display());
    log::info!("Mode: {:?}, channel {}, tick {}ms", cli.mode, cli.channel, cli.tick_ms);

    let mut display = SpectrumDisplay::new(cli.mode);
    display.set_bits_per_sample(cli.bits);

    // 1. Decode; nothing is fed from a file that failed to decode
    let decoded = audio::decode::decode_file(&cli.input)?;
    let format = decoded.format;
    display.set_bits_per_sample(format.bits_per_sample);
    display.set_sample_rate(format.sample_rate)?;
    if let Some(layout) = display.layout() {
        log::debug!("Band centres (Hz): {:.0?}", layout.frequencies());
    }

    let channel_count = decoded.samples.channel_count();
    let samples: Arc<[i32]> = decoded
        .samples
        .into_channel(cli.channel)
        .with_context(|| {
            format!("Channel {} out of range (file has {})", cli.channel, channel_count)
        })?
        .into();

    let mut out: Box<dyn Write> = match cli.output {
        Some(ref path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let total_windows = window_offsets(samples.len()).count();
    let limit = cli.max_frames.unwrap_or(usize::MAX);
    let pb = if cli.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total_windows.min(limit) as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .unwrap()
            .progress_chars("=>-"),
    );

    // 2a. Offline: whole file, no pacing
    if cli.offline {
        if cli.mode != DisplayMode::Grid {
            log::warn!("Offline analysis always emits grid frames");
        }
        let reports = analyze_offline(&samples, format.sample_rate, format.bits_per_sample)?;
        for report in reports.iter().take(limit) {
            serde_json::to_writer(&mut out, report)?;
            writeln!(out)?;
            pb.inc(1);
        }
        pb.finish_with_message("Analysis complete");
        out.flush()?;
        log::info!("Done! {} frames", reports.len().min(limit));
        return Ok(());
    }

    // 2b. Real-time: feeder thread paces windows, this thread consumes them
    let tick = Duration::from_millis(cli.tick_ms);
    let (control, rx, handle) = spawn_feeder(Arc::clone(&samples), tick, limit)?;
    let options = StreamOptions {
        sample_rate: format.sample_rate,
        max_frames: limit,
        toggle_every: cli.toggle_every.filter(|&n| n > 0),
    };
    let received = stream_frames(&rx, &mut display, &control, &mut out, &pb, &options)?;
    drop(rx);

    let end = handle
        .join()
        .map_err(|_| anyhow::anyhow!("Feeder thread panicked"))?;
    pb.finish_with_message("Playback complete");

    log::info!("Done! {:?}: {} windows fed, {} consumed", end, end.windows(), received);
    Ok(())
}

/// Start the feeder thread. A zero frame budget stops it before the first
/// window is dispatched.
fn spawn_feeder(
    samples: Arc<[i32]>,
    tick: Duration,
    max_frames: usize,
) -> Result<(FeederControl, Receiver<WindowMessage>, JoinHandle<FeedEnd>)> {
    let control = FeederControl::new();
    if max_frames == 0 {
        log::info!("--max-frames 0, nothing to feed");
        control.stop();
    }
    let (tx, rx) = mpsc::channel();
    let handle = RealtimeFeeder::new(samples, control.clone())
        .with_tick(tick)
        .spawn(tx)
        .context("Failed to start feeder thread")?;
    Ok((control, rx, handle))
}

struct StreamOptions {
    sample_rate: u32,
    max_frames: usize,
    toggle_every: Option<usize>,
}

/// Turn feeder windows into JSON lines until the feeder ends or
/// `max_frames` windows have been consumed. Returns the number consumed.
fn stream_frames(
    rx: &Receiver<WindowMessage>,
    display: &mut SpectrumDisplay,
    control: &FeederControl,
    out: &mut impl Write,
    pb: &ProgressBar,
    options: &StreamOptions,
) -> Result<usize> {
    let mut received = 0usize;
    while received < options.max_frames {
        let Ok(message) = rx.recv() else { break };

        if let Some(every) = options.toggle_every {
            if received > 0 && received % every == 0 {
                let mode = display.toggle_mode();
                log::info!("Frame {}: display mode now {:?}", received, mode);
            }
        }

        let signaled = has_signal(&message.samples, display.bits_per_sample());
        match display.show(&message.samples, signaled)? {
            Some(DisplayFrame::Grid { frame, peaks, signaled }) => {
                let report =
                    FrameReport::new(message.offset, options.sample_rate, &frame, peaks, signaled);
                serde_json::to_writer(&mut *out, &report)?;
                writeln!(out)?;
            }
            Some(DisplayFrame::Wave { samples: trace, signaled }) => {
                let report = WaveReport {
                    offset: message.offset,
                    time: message.offset as f64 / f64::from(options.sample_rate.max(1)),
                    samples: &trace,
                    signaled,
                };
                serde_json::to_writer(&mut *out, &report)?;
                writeln!(out)?;
            }
            None => {}
        }
        out.flush()?;

        received += 1;
        pb.set_position(received as u64);
    }

    if received >= options.max_frames {
        log::info!("Reached --max-frames {}, stopping feeder", options.max_frames);
        control.stop();
    }
    Ok(received)
}

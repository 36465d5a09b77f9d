use clap::Parser;
use std::path::PathBuf;

use crate::display::DisplayMode;

#[derive(Parser, Debug)]
#[command(name = "bandscope", about = "Real-time log-band spectrum analyzer for PCM WAV files")]
pub struct Cli {
    /// Input PCM WAV file (8- or 16-bit)
    pub input: PathBuf,

    /// Config file (defaults to bandscope.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Display mode
    #[arg(short, long, value_enum, default_value_t = DisplayMode::Grid)]
    pub mode: DisplayMode,

    /// Channel to analyse
    #[arg(long, default_value_t = 0)]
    pub channel: usize,

    /// Minimum milliseconds between frames
    #[arg(long, default_value_t = 100)]
    pub tick_ms: u64,

    /// Bits-per-sample assumed before the file header is read
    #[arg(long, default_value_t = 16)]
    pub bits: u16,

    /// Stop after this many frames
    #[arg(long)]
    pub max_frames: Option<usize>,

    /// Swap between grid and wave display every N frames
    #[arg(long)]
    pub toggle_every: Option<usize>,

    /// Analyse the whole file as fast as possible instead of at playback pace
    #[arg(long)]
    pub offline: bool,

    /// Write JSON-lines frames here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

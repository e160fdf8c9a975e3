use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};
use iec61937::structs::format::SampleFormat;

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Detects IEC 61937 compressed audio in a PCM stream and routes it to pass-through or a decoder",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat a decoder exiting with an error status as fatal.
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show a progress spinner while running.
    #[arg(long, global = true)]
    pub progress: bool,

    /// YAML configuration file. Command-line flags override its values.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect and route a live stream until the input ends or a signal arrives.
    Run(RunArgs),

    /// Scan a capture and report what the detector and switch would do.
    Probe(ProbeArgs),
}

#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Read input from this file or FIFO ("-" for stdin).
    #[arg(long, alias = "stdin", value_name = "PATH", conflicts_with = "source")]
    pub input: Option<PathBuf>,

    /// Capture input from this audio-server source.
    #[arg(long, value_name = "NAME")]
    pub source: Option<String>,

    /// Write pass-through PCM to this file or FIFO ("-" for stdout).
    #[arg(long, alias = "fifo-out-pcm", value_name = "PATH", conflicts_with = "pcm_sink")]
    pub pcm_out: Option<PathBuf>,

    /// Play pass-through PCM on this audio-server sink.
    #[arg(long, value_name = "NAME")]
    pub pcm_sink: Option<String>,

    /// Write decoded PCM to this file or FIFO.
    #[arg(long, alias = "fifo-out-6ch", value_name = "PATH", conflicts_with = "decoded_sink")]
    pub decoded_out: Option<PathBuf>,

    /// Play decoded PCM on this audio-server sink.
    #[arg(long, value_name = "NAME")]
    pub decoded_sink: Option<String>,

    /// Audio-server sink used for any output not given explicitly.
    #[arg(long, value_name = "NAME")]
    pub sink: Option<String>,

    /// Frames per chunk.
    #[arg(long, value_name = "FRAMES")]
    pub chunk_frames: Option<usize>,

    /// Consecutive agreeing chunks required before switching mode.
    #[arg(long, value_name = "CHUNKS")]
    pub det_window: Option<usize>,

    /// Decoder program. Its arguments come from the config file or the
    /// ffmpeg defaults.
    #[arg(long, value_name = "PROGRAM")]
    pub decoder: Option<String>,

    /// Time allowed for the decoder to flush when leaving compressed mode.
    #[arg(long, value_name = "MS")]
    pub drain_timeout_ms: Option<u64>,

    /// Keep waiting for a writer when the input FIFO reaches end-of-file.
    #[arg(long)]
    pub follow: bool,

    #[command(flatten)]
    pub formats: FormatArgs,
}

#[derive(Debug, Default, Args)]
pub struct FormatArgs {
    /// Input sample format.
    #[arg(long, value_name = "FORMAT")]
    pub input_format: Option<SampleFormat>,

    /// Input channel count.
    #[arg(long, value_name = "N")]
    pub input_channels: Option<u16>,

    /// Sample rate of input and decoded output.
    #[arg(long, value_name = "HZ")]
    pub rate: Option<u32>,

    /// Decoded output channel count.
    #[arg(long, value_name = "N")]
    pub decoded_channels: Option<u16>,

    /// Decoded output sample format.
    #[arg(long, value_name = "FORMAT")]
    pub decoded_format: Option<SampleFormat>,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    /// Captured stream to scan ("-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Frames per chunk.
    #[arg(long, value_name = "FRAMES")]
    pub chunk_frames: Option<usize>,

    /// Consecutive agreeing chunks required before switching mode.
    #[arg(long, value_name = "CHUNKS")]
    pub det_window: Option<usize>,

    #[command(flatten)]
    pub formats: FormatArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

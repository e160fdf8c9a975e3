use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use iec61937::io::command::DecoderCommand;
use iec61937::structs::config::EngineConfig;
use iec61937::structs::format::{AudioFormat, SampleFormat};
use serde::Deserialize;

use crate::cli::command::{FormatArgs, ProbeArgs, RunArgs};

/// Contents of a `--config` YAML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub chunk_frames: Option<usize>,
    pub det_window: Option<usize>,
    pub drain_timeout_ms: Option<u64>,
    pub strict: Option<bool>,
    pub follow: Option<bool>,

    pub input: Option<PathBuf>,
    pub source: Option<String>,
    pub pcm_out: Option<PathBuf>,
    pub pcm_sink: Option<String>,
    pub decoded_out: Option<PathBuf>,
    pub decoded_sink: Option<String>,
    pub sink: Option<String>,

    pub input_format: Option<FormatConfig>,
    pub decoded_format: Option<FormatConfig>,
    pub decoder: Option<DecoderConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FormatConfig {
    pub channels: Option<u16>,
    pub rate: Option<u32>,
    pub sample_format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DecoderConfig {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEndpoint {
    /// File or FIFO; `-` is stdin.
    File(PathBuf),
    /// Audio-server source, or the server default.
    Capture(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEndpoint {
    /// File or FIFO; `-` is stdout.
    File(PathBuf),
    /// Audio-server sink, or the server default.
    Playback(Option<String>),
}

/// Everything `run` needs, after merging defaults, the config file and flags.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub engine: EngineConfig,
    pub decoder: DecoderCommand,
    pub follow: bool,
    pub input: InputEndpoint,
    pub pcm_out: OutputEndpoint,
    pub decoded_out: OutputEndpoint,
}

fn apply_format(
    base: AudioFormat,
    file: Option<&FormatConfig>,
    channels: Option<u16>,
    rate: Option<u32>,
    sample_format: Option<SampleFormat>,
) -> Result<AudioFormat> {
    let mut format = base;
    if let Some(file) = file {
        if let Some(c) = file.channels {
            format.channels = c;
        }
        if let Some(r) = file.rate {
            format.rate = r;
        }
        if let Some(name) = &file.sample_format {
            format.sample_format = name.parse()?;
        }
    }
    if let Some(c) = channels {
        format.channels = c;
    }
    if let Some(r) = rate {
        format.rate = r;
    }
    if let Some(s) = sample_format {
        format.sample_format = s;
    }
    Ok(format)
}

fn det_window(value: Option<usize>) -> Result<Option<NonZeroUsize>> {
    value
        .map(|w| NonZeroUsize::new(w).ok_or_else(|| anyhow!("det-window must be at least 1")))
        .transpose()
}

/// Engine parameters shared by `run` and `probe`.
fn engine(
    file: &FileConfig,
    chunk_frames: Option<usize>,
    window: Option<usize>,
    formats: &FormatArgs,
) -> Result<EngineConfig> {
    let mut engine = EngineConfig::default();

    if let Some(frames) = chunk_frames.or(file.chunk_frames) {
        engine.chunk_frames = frames;
    }
    if let Some(w) = det_window(window.or(file.det_window))? {
        engine.det_window = w;
    }

    engine.input_format = apply_format(
        engine.input_format,
        file.input_format.as_ref(),
        formats.input_channels,
        formats.rate,
        formats.input_format,
    )
    .context("input format")?;
    // Pass-through never converts.
    engine.pcm_format = engine.input_format;
    engine.decoded_format = apply_format(
        engine.decoded_format,
        file.decoded_format.as_ref(),
        formats.decoded_channels,
        formats.rate,
        formats.decoded_format,
    )
    .context("decoded format")?;

    Ok(engine)
}

pub fn resolve_run(args: &RunArgs, file: &FileConfig, strict: bool) -> Result<RunSettings> {
    let mut engine = engine(file, args.chunk_frames, args.det_window, &args.formats)?;
    if let Some(ms) = args.drain_timeout_ms.or(file.drain_timeout_ms) {
        engine.drain_timeout = Duration::from_millis(ms);
    }
    engine.strict = strict || file.strict.unwrap_or(false);
    engine.validate()?;

    let mut decoder = DecoderCommand::default();
    if let Some(cfg) = &file.decoder {
        if let Some(program) = &cfg.program {
            decoder.program = program.clone();
        }
        if let Some(args) = &cfg.args {
            decoder.args = args.clone();
        }
    }
    if let Some(program) = &args.decoder {
        decoder.program = program.clone();
    }

    // A flag on the command line replaces the whole endpoint from the file.
    let input = match (&args.input, &args.source) {
        (Some(path), _) => InputEndpoint::File(path.clone()),
        (None, Some(name)) => InputEndpoint::Capture(Some(name.clone())),
        (None, None) => match (&file.input, &file.source) {
            (Some(path), _) => InputEndpoint::File(path.clone()),
            (None, source) => InputEndpoint::Capture(source.clone()),
        },
    };

    let fallback_sink = args.sink.clone().or_else(|| file.sink.clone());
    let output = |path: &Option<PathBuf>,
                  name: &Option<String>,
                  file_path: &Option<PathBuf>,
                  file_name: &Option<String>| {
        match (path, name) {
            (Some(path), _) => OutputEndpoint::File(path.clone()),
            (None, Some(name)) => OutputEndpoint::Playback(Some(name.clone())),
            (None, None) => match (file_path, file_name) {
                (Some(path), _) => OutputEndpoint::File(path.clone()),
                (None, Some(name)) => OutputEndpoint::Playback(Some(name.clone())),
                (None, None) => OutputEndpoint::Playback(fallback_sink.clone()),
            },
        }
    };
    let pcm_out = output(&args.pcm_out, &args.pcm_sink, &file.pcm_out, &file.pcm_sink);
    let decoded_out = output(
        &args.decoded_out,
        &args.decoded_sink,
        &file.decoded_out,
        &file.decoded_sink,
    );

    Ok(RunSettings {
        engine,
        decoder,
        follow: args.follow || file.follow.unwrap_or(false),
        input,
        pcm_out,
        decoded_out,
    })
}

pub fn resolve_probe(args: &ProbeArgs, file: &FileConfig) -> Result<EngineConfig> {
    let engine = engine(file, args.chunk_frames, args.det_window, &args.formats)?;
    engine.validate()?;
    Ok(engine)
}

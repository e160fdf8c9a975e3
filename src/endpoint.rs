use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use iec61937::io::command::{ChildReader, ChildWriter};
use iec61937::structs::format::AudioFormat;

use crate::config::{InputEndpoint, OutputEndpoint};

const CAPTURE_PROGRAM: &str = "parec";
const PLAYBACK_PROGRAM: &str = "pacat";

/// An opened byte endpoint and the name it is logged under.
pub struct Opened<T> {
    pub stream: T,
    pub label: String,
}

fn is_stdio(path: &Path) -> bool {
    path.to_string_lossy() == "-"
}

#[cfg(unix)]
fn is_fifo(path: &Path) -> bool {
    use std::os::unix::fs::FileTypeExt;
    std::fs::metadata(path).is_ok_and(|m| m.file_type().is_fifo())
}

#[cfg(not(unix))]
fn is_fifo(_path: &Path) -> bool {
    false
}

/// Raw-PCM arguments shared by the capture and playback helpers.
fn stream_args(device: Option<&str>, format: &AudioFormat) -> Vec<String> {
    let mut args = Vec::with_capacity(6);
    if let Some(device) = device {
        args.push(format!("--device={device}"));
    }
    args.push("--raw".to_string());
    args.push(format!("--format={}", format.sample_format.pulse_name()));
    args.push(format!("--rate={}", format.rate));
    args.push(format!("--channels={}", format.channels));
    args
}

fn device_label(device: Option<&str>) -> String {
    match device {
        Some(name) => name.to_string(),
        None => "default device".to_string(),
    }
}

/// Opens the input; `-` is stdin.
pub fn open_input(endpoint: &InputEndpoint, format: &AudioFormat) -> Result<Opened<Box<dyn Read + Send>>> {
    match endpoint {
        InputEndpoint::File(path) if is_stdio(path) => Ok(Opened {
            stream: Box::new(io::stdin()),
            label: "stdin".to_string(),
        }),
        InputEndpoint::File(path) => {
            let file = File::open(path).with_context(|| format!("opening input {}", path.display()))?;
            let stream: Box<dyn Read + Send> = if is_fifo(path) {
                Box::new(file)
            } else {
                Box::new(BufReader::new(file))
            };
            Ok(Opened {
                stream,
                label: path.display().to_string(),
            })
        }
        InputEndpoint::Capture(device) => {
            let args = stream_args(device.as_deref(), format);
            log::debug!("Starting capture: {CAPTURE_PROGRAM} {}", args.join(" "));
            let reader = ChildReader::spawn(CAPTURE_PROGRAM, &args)
                .with_context(|| format!("starting {CAPTURE_PROGRAM}"))?;
            Ok(Opened {
                stream: Box::new(reader),
                label: format!("capture {}", device_label(device.as_deref())),
            })
        }
    }
}

/// Opens an output; `-` is stdout.
///
/// Existing FIFOs are opened read+write so that opening never waits for a
/// reader and a restarting reader does not break the pipe.
pub fn open_output(endpoint: &OutputEndpoint, format: &AudioFormat) -> Result<Opened<Box<dyn Write + Send>>> {
    match endpoint {
        OutputEndpoint::File(path) if is_stdio(path) => Ok(Opened {
            stream: Box::new(io::stdout()),
            label: "stdout".to_string(),
        }),
        OutputEndpoint::File(path) => {
            let file = if is_fifo(path) {
                File::options().read(true).write(true).open(path)
            } else {
                File::create(path)
            }
            .with_context(|| format!("opening output {}", path.display()))?;
            Ok(Opened {
                stream: Box::new(file),
                label: path.display().to_string(),
            })
        }
        OutputEndpoint::Playback(device) => {
            let mut args = vec!["--playback".to_string()];
            args.extend(stream_args(device.as_deref(), format));
            log::debug!("Starting playback: {PLAYBACK_PROGRAM} {}", args.join(" "));
            let writer = ChildWriter::spawn(PLAYBACK_PROGRAM, &args)
                .with_context(|| format!("starting {PLAYBACK_PROGRAM}"))?;
            Ok(Opened {
                stream: Box::new(writer),
                label: format!("playback {}", device_label(device.as_deref())),
            })
        }
    }
}

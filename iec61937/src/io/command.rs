//! External decoder processes and helper-process endpoints.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::io::pipeline::{ChannelPipeline, DecodingPipeline, OutputPump, PipelineFactory};
use crate::io::sink::Sink;
use crate::structs::format::AudioFormat;
use crate::structs::route::OutputRoute;
use crate::utils::errors::Error;

/// Starts `cmd` in its own process group so a terminal interrupt reaches
/// only this process, which then stops its helpers in order.
fn spawn_detached(cmd: &mut Command) -> io::Result<Child> {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    cmd.spawn()
}

/// Program and argument template of a decoder reading IEC 61937 on stdin and
/// writing raw PCM on stdout.
///
/// Arguments may contain `{format}`, `{channels}` and `{rate}`, which are
/// replaced with the decoded-output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for DecoderCommand {
    fn default() -> Self {
        Self::ffmpeg()
    }
}

impl DecoderCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn ffmpeg() -> Self {
        let args = [
            "-hide_banner",
            "-loglevel",
            "warning",
            "-f",
            "spdif",
            "-i",
            "pipe:0",
            "-f",
            "{format}",
            "-ac",
            "{channels}",
            "-ar",
            "{rate}",
            "pipe:1",
        ];
        Self::new("ffmpeg", args.iter().map(|a| a.to_string()).collect())
    }

    /// Arguments with placeholders expanded for `format`.
    pub fn expand(&self, format: &AudioFormat) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{format}", format.sample_format.ffmpeg_name())
                    .replace("{channels}", &format.channels.to_string())
                    .replace("{rate}", &format.rate.to_string())
                    .into()
            })
            .collect()
    }

    pub fn command_line(&self, format: &AudioFormat) -> String {
        let mut line = self.program.clone();
        for arg in self.expand(format) {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Spawns [`DecoderCommand`] child processes as decoding pipelines.
#[derive(Debug, Clone, Default)]
pub struct CommandFactory {
    command: DecoderCommand,
    strict: bool,
}

impl CommandFactory {
    pub fn new(command: DecoderCommand) -> Self {
        Self {
            command,
            strict: false,
        }
    }

    /// Fail the drain when the decoder exits with a nonzero status.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

impl PipelineFactory for CommandFactory {
    fn spawn(
        &mut self,
        route: &OutputRoute,
        sink: Sink,
    ) -> Result<Box<dyn DecodingPipeline>, Error> {
        log::info!("Starting decoder: {}", self.command.command_line(&route.format));

        let mut child = spawn_detached(
            Command::new(&self.command.program)
                .args(self.command.expand(&route.format))
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit()),
        )
        .map_err(Error::PipelineSpawn)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::PipelineSpawn(io::Error::other(
                "decoder stdio was not captured",
            )));
        };

        let pump = match OutputPump::spawn(stdout, sink, route.format.bytes_per_frame()) {
            Ok(pump) => pump,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::PipelineSpawn(e));
            }
        };

        log::debug!("Decoder running as pid {}", child.id());
        Ok(Box::new(
            ChannelPipeline::new(Box::new(stdin), pump, child).strict(self.strict),
        ))
    }
}

/// Reads the stdout of a capture helper; the helper is killed when dropped.
pub struct ChildReader {
    child: Child,
    stdout: ChildStdout,
}

impl ChildReader {
    pub fn spawn(program: &str, args: &[String]) -> io::Result<Self> {
        let mut child = spawn_detached(
            Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit()),
        )?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("capture helper stdout was not captured"))?;
        Ok(Self { child, stdout })
    }
}

impl Read for ChildReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Drop for ChildReader {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Writes to the stdin of a playback helper. Dropping closes its input and
/// waits for it to play out.
pub struct ChildWriter {
    child: Child,
    stdin: Option<ChildStdin>,
}

impl ChildWriter {
    pub fn spawn(program: &str, args: &[String]) -> io::Result<Self> {
        let mut child = spawn_detached(
            Command::new(program)
                .args(args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::inherit()),
        )?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("playback helper stdin was not captured"))?;
        Ok(Self {
            child,
            stdin: Some(stdin),
        })
    }

    fn stdin(&mut self) -> io::Result<&mut ChildStdin> {
        self.stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "playback helper closed"))
    }
}

impl Write for ChildWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdin()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdin()?.flush()
    }
}

impl Drop for ChildWriter {
    fn drop(&mut self) {
        self.stdin = None;
        if let Err(e) = self.child.wait() {
            log::debug!("Waiting for playback helper failed: {e}");
        }
    }
}

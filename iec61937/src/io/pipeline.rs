//! Decoding pipeline capability.
//!
//! A pipeline accepts IEC 61937 bytes on its input channel and produces
//! decoded PCM on its output channel. The router only sees the
//! [`DecodingPipeline`] trait; [`ChannelPipeline`] implements it for any
//! decoder that exposes a writer, a reader and a killable instance, which
//! covers child processes as well as in-process decoders.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::io::sink::Sink;
use crate::structs::route::OutputRoute;
use crate::utils::errors::{Error, SinkRole};

/// Read size for the decoder output pump.
pub const PUMP_READ_SIZE: usize = 64 * 1024;

/// Extra wait for the pump after a decoder has been killed.
pub const KILL_GRACE: Duration = Duration::from_millis(500);

/// Result of tearing a pipeline down.
#[derive(Debug)]
pub struct Drained {
    /// The decoded-output sink, handed back for the next pipeline.
    pub sink: Sink,
    /// Bytes forwarded from the decoder to the sink by this instance.
    pub decoded_bytes: u64,
    /// Bytes written to the decoder input by this instance.
    pub fed_bytes: u64,
    /// The decoder had to be killed.
    pub forced: bool,
    /// Decoder exit code, when it exited normally.
    pub exit_code: Option<i32>,
}

/// A live decoder instance.
pub trait DecodingPipeline: Send {
    /// Writes compressed bytes to the decoder input. Blocks while the decoder
    /// is not keeping up.
    fn feed(&mut self, bytes: &[u8]) -> Result<(), Error>;

    /// Closes the input, lets the decoder emit its remaining output within
    /// `timeout`, then stops it.
    fn drain(self: Box<Self>, timeout: Duration) -> Result<Drained, Error>;

    /// Stops the decoder without waiting for remaining output.
    fn terminate(self: Box<Self>) -> Result<Drained, Error>;
}

/// Starts decoding pipelines on demand.
pub trait PipelineFactory: Send {
    /// Spawns a pipeline writing decoded output in `route.format` to `sink`.
    fn spawn(
        &mut self,
        route: &OutputRoute,
        sink: Sink,
    ) -> Result<Box<dyn DecodingPipeline>, Error>;
}

/// Handle on the running decoder itself, separate from its byte channels.
pub trait DecoderInstance: Send {
    fn describe(&self) -> String;

    /// Forcibly stops the decoder.
    fn kill(&mut self) -> io::Result<()>;

    /// Waits for the decoder to exit. Returns the exit code when there is one.
    fn wait(&mut self) -> io::Result<Option<i32>>;
}

impl DecoderInstance for std::process::Child {
    fn describe(&self) -> String {
        format!("pid {}", self.id())
    }

    fn kill(&mut self) -> io::Result<()> {
        std::process::Child::kill(self)
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        std::process::Child::wait(self).map(|status| status.code())
    }
}

enum PumpEvent {
    ReadFailed(io::Error),
    SinkFailed(io::Error),
    Finished,
}

struct PumpOutcome {
    sink: Sink,
    bytes: u64,
}

/// Thread moving decoder output into the decoded sink in whole frames.
pub struct OutputPump {
    events: Receiver<PumpEvent>,
    handle: Option<thread::JoinHandle<PumpOutcome>>,
    failure: Option<Error>,
    finished: bool,
}

impl OutputPump {
    /// Starts pumping `reader` into `sink`. Output is forwarded in multiples
    /// of `frame_bytes`; a trailing partial frame is zero-padded.
    pub fn spawn<R>(reader: R, sink: Sink, frame_bytes: usize) -> io::Result<Self>
    where
        R: Read + Send + 'static,
    {
        let (tx, events) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("decoder-output".into())
            .spawn(move || pump(reader, sink, frame_bytes.max(1), tx))?;

        Ok(Self {
            events,
            handle: Some(handle),
            failure: None,
            finished: false,
        })
    }

    fn record(&mut self, event: PumpEvent) {
        match event {
            PumpEvent::Finished => self.finished = true,
            PumpEvent::ReadFailed(e) => {
                if self.failure.is_none() {
                    self.failure = Some(Error::PipelineIo(e));
                }
            }
            PumpEvent::SinkFailed(e) => {
                if self.failure.is_none() {
                    self.failure = Some(Error::SinkWrite {
                        role: SinkRole::Decoded,
                        source: e,
                    });
                }
            }
        }
    }

    /// Collects pending pump events without blocking and returns the first
    /// failure, if one was reported.
    pub fn take_failure(&mut self) -> Option<Error> {
        while let Ok(event) = self.events.try_recv() {
            self.record(event);
        }
        self.failure.take()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Waits up to `timeout` for the decoder output to reach end-of-stream.
    pub fn wait_finished(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.finished {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => self.record(event),
                Err(RecvTimeoutError::Timeout) => return false,
                // Pump thread is gone without saying so: it panicked.
                Err(RecvTimeoutError::Disconnected) => return true,
            }
        }
        true
    }

    fn join(mut self) -> Result<(PumpOutcome, Option<Error>), Error> {
        let handle = self.handle.take().ok_or_else(|| {
            Error::PipelineIo(io::Error::other("decoder output pump already joined"))
        })?;
        let outcome = handle
            .join()
            .map_err(|_| Error::PipelineIo(io::Error::other("decoder output pump panicked")))?;

        while let Ok(event) = self.events.try_recv() {
            self.record(event);
        }
        Ok((outcome, self.failure.take()))
    }
}

fn pump<R: Read>(
    mut reader: R,
    mut sink: Sink,
    frame_bytes: usize,
    tx: Sender<PumpEvent>,
) -> PumpOutcome {
    let mut inbuf = vec![0u8; PUMP_READ_SIZE];
    let mut stash: Vec<u8> = Vec::with_capacity(PUMP_READ_SIZE + frame_bytes);
    let mut forwarded = 0u64;
    let mut broken = false;

    loop {
        let n = match reader.read(&mut inbuf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("Reading decoder output failed: {e}");
                let _ = tx.send(PumpEvent::ReadFailed(e));
                break;
            }
        };

        // After a sink failure keep draining so the decoder never blocks on us.
        if broken {
            continue;
        }

        stash.extend_from_slice(&inbuf[..n]);
        let aligned = stash.len() - stash.len() % frame_bytes;
        if aligned == 0 {
            continue;
        }

        if let Err(e) = sink.write_chunk(&stash[..aligned]) {
            log::error!("Decoded sink {} failed: {e}", sink.label());
            broken = true;
            let _ = tx.send(PumpEvent::SinkFailed(e));
            continue;
        }
        forwarded += aligned as u64;
        stash.drain(..aligned);
    }

    if !broken && !stash.is_empty() {
        let pad = frame_bytes - stash.len() % frame_bytes;
        log::debug!(
            "Padding {} trailing decoder bytes with {pad} zero bytes",
            stash.len()
        );
        stash.resize(stash.len() + pad, 0);
        match sink.write_chunk(&stash) {
            Ok(()) => forwarded += stash.len() as u64,
            Err(e) => {
                let _ = tx.send(PumpEvent::SinkFailed(e));
                broken = true;
            }
        }
    }

    if !broken {
        if let Err(e) = sink.flush() {
            let _ = tx.send(PumpEvent::SinkFailed(e));
        }
    }

    let _ = tx.send(PumpEvent::Finished);
    PumpOutcome {
        sink,
        bytes: forwarded,
    }
}

/// A decoder reached through a byte writer and an output pump.
pub struct ChannelPipeline<I: DecoderInstance> {
    input: Option<Box<dyn Write + Send>>,
    pump: Option<OutputPump>,
    instance: I,
    fed: u64,
    strict: bool,
}

fn pump_gone() -> Error {
    Error::PipelineIo(io::Error::other("decoder output pump already released"))
}

impl<I: DecoderInstance> ChannelPipeline<I> {
    pub fn new(input: Box<dyn Write + Send>, pump: OutputPump, instance: I) -> Self {
        Self {
            input: Some(input),
            pump: Some(pump),
            instance,
            fed: 0,
            strict: false,
        }
    }

    /// Treat a nonzero decoder exit status during drain as an error.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    fn close_input(&mut self) {
        if let Some(mut input) = self.input.take() {
            // The decoder may already have exited; nothing left to deliver then.
            if let Err(e) = input.flush() {
                log::debug!("Flushing decoder input failed: {e}");
            }
        }
    }

    fn kill(&mut self) {
        if let Err(e) = self.instance.kill() {
            log::debug!("Killing decoder {} failed: {e}", self.instance.describe());
        }
    }

    fn finish(&mut self, forced: bool) -> Result<Drained, Error> {
        let mut pump = self.pump.take().ok_or_else(pump_gone)?;

        if !pump.is_finished() && !pump.wait_finished(KILL_GRACE) {
            log::error!(
                "Decoder {} output did not close after kill; abandoning output pump",
                self.instance.describe()
            );
            let _ = self.instance.wait();
            return Err(Error::PipelineIo(io::Error::new(
                io::ErrorKind::TimedOut,
                "decoder output pump did not finish",
            )));
        }

        let exit_code = match self.instance.wait() {
            Ok(code) => code,
            Err(e) => {
                log::warn!("Waiting for decoder {} failed: {e}", self.instance.describe());
                None
            }
        };

        let (outcome, failure) = pump.join()?;
        if let Some(err) = failure {
            return Err(err);
        }

        if !forced && exit_code.is_some_and(|code| code != 0) {
            let msg = format!(
                "decoder {} exited with status {exit_code:?}",
                self.instance.describe()
            );
            if self.strict {
                return Err(Error::PipelineIo(io::Error::other(msg)));
            }
            log::warn!("{msg}");
        }

        Ok(Drained {
            sink: outcome.sink,
            decoded_bytes: outcome.bytes,
            fed_bytes: self.fed,
            forced,
            exit_code,
        })
    }
}

impl<I: DecoderInstance> DecodingPipeline for ChannelPipeline<I> {
    fn feed(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let pump = self.pump.as_mut().ok_or_else(pump_gone)?;
        if let Some(err) = pump.take_failure() {
            return Err(err);
        }

        let input = self.input.as_mut().ok_or_else(|| {
            Error::PipelineIo(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "decoder input already closed",
            ))
        })?;

        match input.write_all(bytes) {
            Ok(()) => {
                self.fed += bytes.len() as u64;
                Ok(())
            }
            // A dead sink makes the decoder exit; report the cause, not the pipe.
            Err(e) => Err(pump.take_failure().unwrap_or(Error::PipelineIo(e))),
        }
    }

    fn drain(mut self: Box<Self>, timeout: Duration) -> Result<Drained, Error> {
        self.close_input();

        let finished = match self.pump.as_mut() {
            Some(pump) => pump.wait_finished(timeout),
            None => return Err(pump_gone()),
        };
        if !finished {
            log::warn!(
                "Decoder {} did not finish within {} ms; killing it",
                self.instance.describe(),
                timeout.as_millis()
            );
            self.kill();
        }

        self.finish(!finished)
    }

    fn terminate(mut self: Box<Self>) -> Result<Drained, Error> {
        self.close_input();
        self.kill();
        self.finish(true)
    }
}

impl<I: DecoderInstance> Drop for ChannelPipeline<I> {
    fn drop(&mut self) {
        // Still holding the pump means the pipeline was neither drained nor
        // terminated; do not leave the decoder running.
        if self.pump.is_some() {
            self.input = None;
            self.kill();
            let _ = self.instance.wait();
        }
    }
}

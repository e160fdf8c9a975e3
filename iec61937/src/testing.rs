//! Test doubles for sinks and decoders.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crate::io::pipeline::{ChannelPipeline, DecoderInstance, DecodingPipeline, OutputPump, PipelineFactory};
use crate::io::sink::Sink;
use crate::structs::route::OutputRoute;
use crate::utils::errors::Error;

/// In-memory writer whose contents stay reachable after it is moved away.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Reader that replays a script of reads. `None` is one end-of-input, and an
/// exhausted script reads as end-of-input forever.
pub struct ScriptedReader {
    steps: VecDeque<Option<Vec<u8>>>,
}

impl ScriptedReader {
    pub fn new(steps: Vec<Option<Vec<u8>>>) -> Self {
        Self {
            steps: steps.into(),
        }
    }
}

impl Read for ScriptedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.steps.pop_front() {
            Some(Some(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.steps.push_front(Some(bytes.split_off(n)));
                }
                Ok(n)
            }
            Some(None) | None => Ok(0),
        }
    }
}

/// Accepts `ok_bytes` bytes, then fails `failures` times with `BrokenPipe`,
/// then accepts everything.
pub struct FlakyWriter {
    inner: SharedBuffer,
    ok_bytes: usize,
    failures: u32,
}

impl FlakyWriter {
    pub fn new(inner: SharedBuffer, ok_bytes: usize, failures: u32) -> Self {
        Self {
            inner,
            ok_bytes,
            failures,
        }
    }
}

impl Write for FlakyWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.ok_bytes > 0 {
            let n = buf.len().min(self.ok_bytes);
            self.ok_bytes -= n;
            return self.inner.write(&buf[..n]);
        }
        if self.failures > 0 {
            self.failures -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader closed"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writer that sleeps before every write.
pub struct SlowWriter {
    inner: SharedBuffer,
    delay: Duration,
}

impl SlowWriter {
    pub fn new(inner: SharedBuffer, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl Write for SlowWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        thread::sleep(self.delay);
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Kill switch of an in-process fake decoder.
pub struct FakeInstance {
    kill: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl DecoderInstance for FakeInstance {
    fn describe(&self) -> String {
        "fake decoder".to_string()
    }

    fn kill(&mut self) -> io::Result<()> {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        Ok(())
    }

    fn wait(&mut self) -> io::Result<Option<i32>> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| io::Error::other("fake decoder panicked"))?;
        }
        Ok(Some(0))
    }
}

/// In-process stand-in for a decoder process, connected through OS pipes.
///
/// Every input byte is emitted `factor` times on the output.
pub struct FakeDecoder {
    pub input: io::PipeWriter,
    pub output: io::PipeReader,
    pub instance: FakeInstance,
}

impl FakeDecoder {
    pub fn spawn(factor: usize, delay: Duration) -> io::Result<Self> {
        Self::start(factor, delay, false)
    }

    /// A decoder that keeps its output open after input EOF until killed.
    pub fn hanging() -> io::Result<Self> {
        Self::start(1, Duration::ZERO, true)
    }

    fn start(factor: usize, delay: Duration, hang: bool) -> io::Result<Self> {
        let (mut in_reader, input) = io::pipe()?;
        let (output, mut out_writer) = io::pipe()?;
        let (kill_tx, kill_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("fake-decoder".into())
            .spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    if kill_rx.try_recv().is_ok() {
                        return;
                    }
                    let n = match in_reader.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => n,
                    };
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    let mut decoded = Vec::with_capacity(n * factor);
                    for &byte in &buf[..n] {
                        decoded.extend(std::iter::repeat_n(byte, factor));
                    }
                    if out_writer.write_all(&decoded).is_err() {
                        break;
                    }
                }
                if hang {
                    let _ = kill_rx.recv();
                }
            })?;

        Ok(Self {
            input,
            output,
            instance: FakeInstance {
                kill: Some(kill_tx),
                handle: Some(handle),
            },
        })
    }
}

/// Factory of [`FakeDecoder`] pipelines that records what it was asked to do.
#[derive(Clone, Default)]
pub struct FakeFactory {
    pub spawned: Arc<Mutex<usize>>,
    pub fail: bool,
    pub factor: usize,
}

impl FakeFactory {
    pub fn new(factor: usize) -> Self {
        Self {
            factor,
            ..Default::default()
        }
    }

    pub fn spawn_count(&self) -> usize {
        *self.spawned.lock().unwrap()
    }
}

impl PipelineFactory for FakeFactory {
    fn spawn(&mut self, route: &OutputRoute, sink: Sink) -> Result<Box<dyn DecodingPipeline>, Error> {
        if self.fail {
            return Err(Error::PipelineSpawn(io::Error::new(
                io::ErrorKind::NotFound,
                "no such decoder",
            )));
        }
        let fake = FakeDecoder::spawn(self.factor.max(1), Duration::ZERO).map_err(Error::PipelineSpawn)?;
        let pump = OutputPump::spawn(fake.output, sink, route.format.bytes_per_frame())
            .map_err(Error::PipelineSpawn)?;
        *self.spawned.lock().unwrap() += 1;
        Ok(Box::new(ChannelPipeline::new(
            Box::new(fake.input),
            pump,
            fake.instance,
        )))
    }
}

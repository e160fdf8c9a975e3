use std::io::{self, Read};
use std::thread;
use std::time::Duration;

use crate::process::session::CancelToken;
use crate::structs::chunk::Chunk;
use crate::structs::format::AudioFormat;
use crate::utils::errors::Error;

/// Produces fixed-size chunks in sequence.
pub trait ChunkSource {
    /// Blocks until one full chunk is available.
    fn next_chunk(&mut self) -> Result<Chunk, Error>;

    /// Lets a source that waits internally give up once `cancel` is set.
    fn watch_cancel(&mut self, _cancel: CancelToken) {}

    /// Whether the input restarted since the previous chunk. Clears the flag.
    fn take_discontinuity(&mut self) -> bool {
        false
    }
}

/// What to do when the input stops producing bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Stop,
    Retry(Duration),
}

/// Decides whether an interrupted input is given up on or read again.
pub trait RecoveryPolicy: Send {
    /// Called on end-of-input. `filled` is the number of bytes already
    /// buffered for the chunk being assembled.
    fn on_end_of_input(&mut self, filled: usize) -> Recovery;

    fn on_io_error(&mut self, error: &io::Error) -> Recovery;

    /// Called whenever a read returned data.
    fn on_data(&mut self) {}
}

/// Stop at the first end-of-input or read error.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFast;

impl RecoveryPolicy for FailFast {
    fn on_end_of_input(&mut self, _filled: usize) -> Recovery {
        Recovery::Stop
    }

    fn on_io_error(&mut self, _error: &io::Error) -> Recovery {
        Recovery::Stop
    }
}

/// Keep reading a FIFO across writer restarts.
///
/// End-of-input means the writer went away; sleep and read again. Read errors
/// stay fatal.
#[derive(Debug, Clone, Copy)]
pub struct WaitForWriter {
    pub interval: Duration,
    lost: bool,
}

impl WaitForWriter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            lost: false,
        }
    }
}

impl Default for WaitForWriter {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl RecoveryPolicy for WaitForWriter {
    fn on_end_of_input(&mut self, _filled: usize) -> Recovery {
        if !self.lost {
            log::warn!("Input stream lost, waiting for a writer");
            self.lost = true;
        }
        Recovery::Retry(self.interval)
    }

    fn on_io_error(&mut self, _error: &io::Error) -> Recovery {
        Recovery::Stop
    }

    fn on_data(&mut self) {
        if self.lost {
            log::info!("Input stream resumed");
            self.lost = false;
        }
    }
}

/// Chunk source over any byte reader: a file, a FIFO, stdin or the output of
/// a capture process.
pub struct ReaderSource<R: Read> {
    reader: R,
    format: AudioFormat,
    chunk_bytes: usize,
    next_seq: u64,
    exhausted: bool,
    resumed: bool,
    policy: Box<dyn RecoveryPolicy>,
    cancel: Option<CancelToken>,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R, format: AudioFormat, chunk_frames: usize) -> Self {
        Self {
            reader,
            format,
            chunk_bytes: format.chunk_bytes(chunk_frames),
            next_seq: 0,
            exhausted: false,
            resumed: false,
            policy: Box::new(FailFast),
            cancel: None,
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn RecoveryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Survive writer restarts on a FIFO, polling every `interval`.
    pub fn follow(self, interval: Duration) -> Self {
        self.with_policy(Box::new(WaitForWriter::new(interval)))
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Sleeps before a retry. Fails with `SourceExhausted` instead when the
    /// run has been cancelled, dropping any partially read chunk.
    fn wait(&mut self, after: Duration) -> Result<(), Error> {
        if self.cancelled() {
            log::debug!("Cancelled while waiting for input");
            self.exhausted = true;
            return Err(Error::SourceExhausted);
        }
        thread::sleep(after);
        Ok(())
    }

    /// Fills `buf` completely, or returns the number of bytes read before
    /// the policy gave up on end-of-input.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut filled = 0;
        let mut waited = false;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => match self.policy.on_end_of_input(filled) {
                    Recovery::Stop => return Ok(filled),
                    Recovery::Retry(after) => {
                        self.wait(after)?;
                        waited = true;
                    }
                },
                Ok(n) => {
                    filled += n;
                    if waited {
                        self.resumed = true;
                        waited = false;
                    }
                    self.policy.on_data();
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => match self.policy.on_io_error(&e) {
                    Recovery::Stop => return Err(Error::SourceIo(e)),
                    Recovery::Retry(after) => {
                        log::warn!("Input read failed ({e}), retrying");
                        self.wait(after)?;
                        waited = true;
                    }
                },
            }
        }
        Ok(filled)
    }
}

impl<R: Read> ChunkSource for ReaderSource<R> {
    fn next_chunk(&mut self) -> Result<Chunk, Error> {
        if self.exhausted {
            return Err(Error::SourceExhausted);
        }

        let mut buf = vec![0u8; self.chunk_bytes];
        let filled = self.fill(&mut buf)?;

        if filled == 0 {
            self.exhausted = true;
            return Err(Error::SourceExhausted);
        }
        if filled < buf.len() {
            // Zeroes are digital silence for PCM and stuffing for IEC 61937.
            log::debug!(
                "Padding final chunk {} from {filled} to {} bytes",
                self.next_seq,
                buf.len()
            );
            self.exhausted = true;
        }

        let chunk = Chunk::new(self.next_seq, self.format, buf);
        self.next_seq += 1;
        Ok(chunk)
    }

    fn watch_cancel(&mut self, cancel: CancelToken) {
        self.cancel = Some(cancel);
    }

    fn take_discontinuity(&mut self) -> bool {
        std::mem::take(&mut self.resumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedReader;

    fn source(data: Vec<u8>, chunk_frames: usize) -> ReaderSource<io::Cursor<Vec<u8>>> {
        ReaderSource::new(io::Cursor::new(data), AudioFormat::STEREO_S16LE, chunk_frames)
    }

    #[test]
    fn chunks_are_sequenced_and_sized() -> anyhow::Result<()> {
        let data: Vec<u8> = (0..64u32).map(|i| ((i * 37 + 123) % 256) as u8).collect();
        let mut src = source(data.clone(), 4);
        assert_eq!(src.chunk_bytes(), 16);

        for seq in 0..4u64 {
            let chunk = src.next_chunk()?;
            assert_eq!(chunk.seq, seq);
            assert_eq!(chunk.len(), 16);
            assert_eq!(chunk.frames(), 4);
            let start = seq as usize * 16;
            assert_eq!(chunk.as_ref(), &data[start..start + 16]);
        }
        assert!(matches!(src.next_chunk(), Err(Error::SourceExhausted)));
        Ok(())
    }

    #[test]
    fn partial_trailing_chunk_is_zero_padded() -> anyhow::Result<()> {
        let mut src = source(vec![9u8; 20], 4);
        src.next_chunk()?;

        let last = src.next_chunk()?;
        assert_eq!(last.seq, 1);
        assert_eq!(&last.data[..4], &[9u8; 4]);
        assert_eq!(&last.data[4..], &[0u8; 12]);

        assert!(matches!(src.next_chunk(), Err(Error::SourceExhausted)));
        assert!(matches!(src.next_chunk(), Err(Error::SourceExhausted)));
        Ok(())
    }

    #[test]
    fn empty_input_is_exhausted_immediately() {
        let mut src = source(Vec::new(), 4);
        assert!(matches!(src.next_chunk(), Err(Error::SourceExhausted)));
    }

    struct Scripted {
        steps: Vec<io::Result<Vec<u8>>>,
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.steps.is_empty() {
                return Ok(0);
            }
            match self.steps.remove(0) {
                Ok(bytes) => {
                    buf[..bytes.len()].copy_from_slice(&bytes);
                    Ok(bytes.len())
                }
                Err(e) => Err(e),
            }
        }
    }

    #[test]
    fn interrupted_reads_are_retried() -> anyhow::Result<()> {
        let reader = Scripted {
            steps: vec![
                Ok(vec![1; 8]),
                Err(io::Error::new(io::ErrorKind::Interrupted, "signal")),
                Ok(vec![2; 8]),
            ],
        };
        let mut src = ReaderSource::new(reader, AudioFormat::STEREO_S16LE, 4);
        let chunk = src.next_chunk()?;
        assert_eq!(&chunk.data[..8], &[1; 8]);
        assert_eq!(&chunk.data[8..], &[2; 8]);
        Ok(())
    }

    #[test]
    fn read_error_is_fatal_by_default() {
        let reader = Scripted {
            steps: vec![Err(io::Error::new(io::ErrorKind::ConnectionReset, "gone"))],
        };
        let mut src = ReaderSource::new(reader, AudioFormat::STEREO_S16LE, 4);
        match src.next_chunk() {
            Err(Error::SourceIo(e)) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
            other => panic!("expected SourceIo, got {other:?}"),
        }
    }

    #[test]
    fn follow_waits_for_writer_across_eof() -> anyhow::Result<()> {
        // EOF twice mid-chunk, then the writer comes back.
        let reader = ScriptedReader::new(vec![Some(vec![5u8; 10]), None, None, Some(vec![6u8; 6])]);
        let mut src =
            ReaderSource::new(reader, AudioFormat::STEREO_S16LE, 4).follow(Duration::from_millis(1));

        let chunk = src.next_chunk()?;
        assert_eq!(&chunk.data[..10], &[5u8; 10]);
        assert_eq!(&chunk.data[10..], &[6u8; 6]);
        Ok(())
    }

    #[test]
    fn writer_restart_is_reported_once() -> anyhow::Result<()> {
        let reader = ScriptedReader::new(vec![
            Some(vec![1u8; 16]),
            Some(vec![2u8; 16]),
            None,
            Some(vec![3u8; 16]),
            Some(vec![4u8; 16]),
        ]);
        let mut src =
            ReaderSource::new(reader, AudioFormat::STEREO_S16LE, 4).follow(Duration::from_millis(1));

        src.next_chunk()?;
        assert!(!src.take_discontinuity());
        src.next_chunk()?;
        assert!(!src.take_discontinuity());

        let resumed = src.next_chunk()?;
        assert_eq!(resumed.seq, 2);
        assert_eq!(resumed.as_ref(), &[3u8; 16]);
        assert!(src.take_discontinuity());
        assert!(!src.take_discontinuity());

        src.next_chunk()?;
        assert!(!src.take_discontinuity());
        Ok(())
    }

    #[test]
    fn cancel_stops_waiting_for_writer() {
        let cancel = CancelToken::new();
        let reader = ScriptedReader::new(vec![Some(vec![7u8; 6])]);
        let mut src =
            ReaderSource::new(reader, AudioFormat::STEREO_S16LE, 4).follow(Duration::from_millis(1));
        src.watch_cancel(cancel.clone());
        cancel.cancel();

        // The six buffered bytes are dropped rather than padded out.
        assert!(matches!(src.next_chunk(), Err(Error::SourceExhausted)));
        assert!(matches!(src.next_chunk(), Err(Error::SourceExhausted)));
    }

    #[test]
    fn custom_policy_is_consulted() {
        struct Counting(usize);
        impl RecoveryPolicy for Counting {
            fn on_end_of_input(&mut self, _filled: usize) -> Recovery {
                self.0 += 1;
                if self.0 < 3 {
                    Recovery::Retry(Duration::ZERO)
                } else {
                    Recovery::Stop
                }
            }
            fn on_io_error(&mut self, _error: &io::Error) -> Recovery {
                Recovery::Stop
            }
        }

        let mut src = source(Vec::new(), 4).with_policy(Box::new(Counting(0)));
        assert!(matches!(src.next_chunk(), Err(Error::SourceExhausted)));
    }

    #[test]
    fn fail_fast_stops_on_everything() {
        let mut policy = FailFast;
        assert_eq!(policy.on_end_of_input(0), Recovery::Stop);
        assert_eq!(policy.on_io_error(&io::Error::other("x")), Recovery::Stop);

        let mut follow = WaitForWriter::default();
        assert_eq!(
            follow.on_end_of_input(3),
            Recovery::Retry(Duration::from_millis(500))
        );
        assert_eq!(follow.on_io_error(&io::Error::other("x")), Recovery::Stop);
    }
}

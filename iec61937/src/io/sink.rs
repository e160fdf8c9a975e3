use std::fmt;
use std::io::{self, Write};

use crate::utils::errors::SinkRole;

/// An output byte stream with its role and a human-readable label.
///
/// Writes are retried once on failure, resuming after the bytes that were
/// already accepted.
pub struct Sink {
    role: SinkRole,
    label: String,
    writer: Box<dyn Write + Send>,
    bytes_written: u64,
    retries: u64,
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("role", &self.role)
            .field("label", &self.label)
            .field("bytes_written", &self.bytes_written)
            .field("retries", &self.retries)
            .finish()
    }
}

impl Sink {
    pub fn new(role: SinkRole, label: impl Into<String>, writer: Box<dyn Write + Send>) -> Self {
        Self {
            role,
            label: label.into(),
            writer,
            bytes_written: 0,
            retries: 0,
        }
    }

    pub fn role(&self) -> SinkRole {
        self.role
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// Writes all of `bytes`, blocking while the reader is slow.
    pub fn write_chunk(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut written = 0;
        let mut retried = false;

        while written < bytes.len() {
            match self.writer.write(&bytes[written..]) {
                Ok(0) => {
                    let err = io::Error::new(io::ErrorKind::WriteZero, "sink accepted no bytes");
                    self.retry_or_fail(&mut retried, err)?;
                }
                Ok(n) => {
                    written += n;
                    self.bytes_written += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => self.retry_or_fail(&mut retried, e)?,
            }
        }

        Ok(())
    }

    fn retry_or_fail(&mut self, retried: &mut bool, err: io::Error) -> io::Result<()> {
        if *retried {
            return Err(err);
        }
        log::warn!("{} sink {}: write failed ({err}), retrying once", self.role, self.label);
        *retried = true;
        self.retries += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Flushes and releases the underlying writer.
    pub fn close(mut self) -> io::Result<u64> {
        let flushed = self.writer.flush();
        let written = self.bytes_written;
        drop(self.writer);
        flushed.map(|_| written)
    }
}

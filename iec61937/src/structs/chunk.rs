use std::sync::Arc;

use crate::structs::format::AudioFormat;

/// One fixed-size block of interleaved input frames.
///
/// Chunks are produced once by a [`ChunkSource`](crate::io::source::ChunkSource)
/// and moved through the detector and router; the payload is never mutated.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub seq: u64,
    pub format: AudioFormat,
    pub data: Arc<[u8]>,
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Chunk {
    pub fn new(seq: u64, format: AudioFormat, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            seq,
            format,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn frames(&self) -> usize {
        match self.format.bytes_per_frame() {
            0 => 0,
            bpf => self.data.len() / bpf,
        }
    }
}

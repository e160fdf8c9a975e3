use crate::structs::preamble::{BurstIssue, BurstPreamble, PREAMBLE_LEN, SYNC_LEN};

/// Bytes retained from the end of one chunk for the next scan. A preamble
/// that starts in the last `CARRY_LEN` bytes of a chunk cannot be read in
/// full until the next chunk arrives.
pub const CARRY_LEN: usize = PREAMBLE_LEN - 2;

/// Per-chunk detector verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Pcm,
    Compressed,
    Ambiguous,
}

/// Fixed-capacity tail of the byte stream threaded between detector calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarryTail {
    bytes: [u8; CARRY_LEN],
    len: usize,
}

impl CarryTail {
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The tail that follows `self` once `chunk` has been appended to the stream.
    pub fn advance(&self, chunk: &[u8]) -> CarryTail {
        let mut next = CarryTail::default();
        if chunk.len() >= CARRY_LEN {
            next.bytes.copy_from_slice(&chunk[chunk.len() - CARRY_LEN..]);
            next.len = CARRY_LEN;
        } else {
            let keep = (CARRY_LEN - chunk.len()).min(self.len);
            let old = &self.bytes[self.len - keep..self.len];
            next.bytes[..keep].copy_from_slice(old);
            next.bytes[keep..keep + chunk.len()].copy_from_slice(chunk);
            next.len = keep + chunk.len();
        }
        next
    }
}

/// Outcome of scanning one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub classification: Classification,
    /// First burst that passed validation.
    pub burst: Option<BurstPreamble>,
    /// First reason a sync hit was rejected, if any.
    pub rejected: Option<BurstIssue>,
    /// Number of Pa/Pb sync pairs seen, including rejected ones.
    pub sync_hits: u32,
}

#[derive(Default)]
struct Evidence {
    burst: Option<BurstPreamble>,
    rejected: Option<BurstIssue>,
    incomplete: bool,
    sync_hits: u32,
}

impl Evidence {
    /// Inspects a sync hit at `bytes[0]`.
    fn hit(&mut self, bytes: &[u8]) {
        self.sync_hits += 1;

        let Some(preamble) = BurstPreamble::parse(bytes) else {
            self.incomplete = true;
            return;
        };

        match preamble.validate() {
            Ok(()) => {
                if self.burst.is_none() {
                    self.burst = Some(preamble);
                }
            }
            Err(issue) => {
                if self.rejected.is_none() {
                    self.rejected = Some(issue);
                }
            }
        }
    }

    fn into_detection(self) -> Detection {
        let classification = if self.burst.is_some() {
            Classification::Compressed
        } else if self.sync_hits > 0 {
            Classification::Ambiguous
        } else {
            Classification::Pcm
        };

        if self.incomplete && self.burst.is_none() {
            log::trace!("sync word with truncated burst info at chunk end");
        }

        Detection {
            classification,
            burst: self.burst,
            rejected: self.rejected,
            sync_hits: self.sync_hits,
        }
    }
}

/// Scans sync pairs starting at even offsets in `starts` of `bytes`.
fn scan(bytes: &[u8], starts: usize, evidence: &mut Evidence) {
    let mut offset = 0;
    while offset < starts && offset + SYNC_LEN <= bytes.len() {
        if BurstPreamble::is_sync(&bytes[offset..]) {
            evidence.hit(&bytes[offset..]);
        }
        offset += 2;
    }
}

/// Classifies one chunk against the tail of the previous one.
///
/// Pure function form of [`SyncDetector::classify`]: the caller owns the tail
/// and receives the next one.
pub fn classify(chunk: &[u8], carry_tail: &CarryTail) -> (Detection, CarryTail) {
    let mut evidence = Evidence::default();

    // Junction: sync pairs starting inside the carried tail. Only the first
    // few bytes of the chunk can complete them.
    if !carry_tail.is_empty() {
        let mut junction = [0u8; CARRY_LEN * 2];
        let tail = carry_tail.as_slice();
        let head = &chunk[..chunk.len().min(CARRY_LEN)];
        junction[..tail.len()].copy_from_slice(tail);
        junction[tail.len()..tail.len() + head.len()].copy_from_slice(head);

        scan(
            &junction[..tail.len() + head.len()],
            tail.len(),
            &mut evidence,
        );
    }

    scan(chunk, chunk.len(), &mut evidence);

    (evidence.into_detection(), carry_tail.advance(chunk))
}

/// Stateful detector that keeps the carry tail between chunks.
#[derive(Debug, Default)]
pub struct SyncDetector {
    tail: CarryTail,
    chunks: u64,
}

impl SyncDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classify(&mut self, chunk: &[u8]) -> Detection {
        let (detection, tail) = classify(chunk, &self.tail);
        self.tail = tail;
        self.chunks += 1;

        if let Some(issue) = detection.rejected {
            if detection.classification == Classification::Ambiguous {
                log::debug!("Sync word rejected in chunk {}: {issue}", self.chunks - 1);
            }
        }

        detection
    }

    /// Forgets the carried tail, e.g. after a discontinuity in the input.
    pub fn reset(&mut self) {
        self.tail = CarryTail::default();
    }
}

use std::fmt::{self, Display};
use std::io;

/// Coarse error categories, one per fatal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SourceExhausted,
    SourceIo,
    SinkWrite,
    PipelineSpawn,
    PipelineIo,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::SourceExhausted => "SourceExhausted",
            ErrorKind::SourceIo => "SourceIOError",
            ErrorKind::SinkWrite => "SinkWriteError",
            ErrorKind::PipelineSpawn => "PipelineSpawnError",
            ErrorKind::PipelineIo => "PipelineIOError",
        };
        f.write_str(name)
    }
}

/// The component a failure was observed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Source,
    Router,
    PcmSink,
    DecodedSink,
    Pipeline,
}

impl Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Source => "source",
            Component::Router => "router",
            Component::PcmSink => "pcm sink",
            Component::DecodedSink => "decoded sink",
            Component::Pipeline => "decoding pipeline",
        };
        f.write_str(name)
    }
}

/// Which of the two output sinks a write went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkRole {
    Pcm,
    Decoded,
}

impl SinkRole {
    pub fn component(self) -> Component {
        match self {
            SinkRole::Pcm => Component::PcmSink,
            SinkRole::Decoded => Component::DecodedSink,
        }
    }
}

impl Display for SinkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkRole::Pcm => f.write_str("pcm"),
            SinkRole::Decoded => f.write_str("decoded"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("input exhausted")]
    SourceExhausted,

    #[error("input read failed: {0}")]
    SourceIo(#[source] io::Error),

    #[error("{role} sink write failed: {source}")]
    SinkWrite {
        role: SinkRole,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn decoding pipeline: {0}")]
    PipelineSpawn(#[source] io::Error),

    #[error("decoding pipeline I/O failed: {0}")]
    PipelineIo(#[source] io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SourceExhausted => ErrorKind::SourceExhausted,
            Error::SourceIo(_) => ErrorKind::SourceIo,
            Error::SinkWrite { .. } => ErrorKind::SinkWrite,
            Error::PipelineSpawn(_) => ErrorKind::PipelineSpawn,
            Error::PipelineIo(_) => ErrorKind::PipelineIo,
        }
    }

    /// Component the error is attributed to when no better context exists.
    pub fn component(&self) -> Component {
        match self {
            Error::SourceExhausted | Error::SourceIo(_) => Component::Source,
            Error::SinkWrite { role, .. } => role.component(),
            Error::PipelineSpawn(_) | Error::PipelineIo(_) => Component::Pipeline,
        }
    }
}

/// A fatal error together with where and when it happened.
#[derive(thiserror::Error, Debug)]
#[error("{kind} in {component}{}: {error}", fmt_seq(.seq))]
pub struct RunError {
    pub kind: ErrorKind,
    pub component: Component,
    pub seq: Option<u64>,
    #[source]
    pub error: Error,
}

fn fmt_seq(seq: &Option<u64>) -> String {
    match seq {
        Some(seq) => format!(" at chunk {seq}"),
        None => String::new(),
    }
}

impl RunError {
    pub fn new(error: Error, seq: Option<u64>) -> Self {
        Self {
            kind: error.kind(),
            component: error.component(),
            seq,
            error,
        }
    }

    /// Distinct process exit status per error kind.
    pub fn exit_code(&self) -> u8 {
        match self.kind {
            ErrorKind::SourceExhausted => 0,
            ErrorKind::SourceIo => 3,
            ErrorKind::SinkWrite => 4,
            ErrorKind::PipelineSpawn => 5,
            ErrorKind::PipelineIo => 6,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk size must be at least one frame")]
    ZeroChunkFrames,

    #[error("input frame size of {0} bytes is not 16-bit aligned")]
    UnalignedInputFrame(usize),

    #[error("format has zero channels or zero sample rate: {0}")]
    EmptyFormat(String),

    #[error("pcm output format {output} differs from input format {input}; conversion is not supported")]
    PcmFormatMismatch { input: String, output: String },
}

#[test]
fn run_error_display_names_kind_component_and_chunk() {
    let err = RunError::new(
        Error::SinkWrite {
            role: SinkRole::Pcm,
            source: io::Error::new(io::ErrorKind::BrokenPipe, "reader went away"),
        },
        Some(41),
    );

    assert_eq!(err.kind, ErrorKind::SinkWrite);
    assert_eq!(err.component, Component::PcmSink);
    assert_eq!(err.exit_code(), 4);
    assert_eq!(
        err.to_string(),
        "SinkWriteError in pcm sink at chunk 41: pcm sink write failed: reader went away"
    );
}

#[test]
fn exit_codes_are_distinct_per_fatal_kind() {
    let codes: Vec<u8> = [
        Error::SourceIo(io::Error::other("x")),
        Error::SinkWrite {
            role: SinkRole::Decoded,
            source: io::Error::other("x"),
        },
        Error::PipelineSpawn(io::Error::other("x")),
        Error::PipelineIo(io::Error::other("x")),
    ]
    .into_iter()
    .map(|e| RunError::new(e, None).exit_code())
    .collect();

    let mut unique = codes.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), codes.len());
    assert!(codes.iter().all(|&c| c != 0));
}

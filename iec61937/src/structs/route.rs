use std::fmt::{self, Display};

use crate::process::switch::StreamMode;
use crate::structs::format::AudioFormat;

/// Where the output of one mode goes and in which format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRoute {
    pub mode: StreamMode,
    pub target: String,
    pub format: AudioFormat,
}

impl OutputRoute {
    pub fn pcm(target: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            mode: StreamMode::Pcm,
            target: target.into(),
            format,
        }
    }

    pub fn decoded(target: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            mode: StreamMode::Compressed,
            target: target.into(),
            format,
        }
    }
}

impl Display for OutputRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} ({})", self.mode, self.target, self.format)
    }
}

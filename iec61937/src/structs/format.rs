//! Sample formats and stream format descriptors.

use std::fmt::{self, Display};
use std::str::FromStr;

/// Interleaved sample encodings understood by the sources, sinks and decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    S16Le,
    S24Le,
    S32Le,
    F32Le,
}

impl SampleFormat {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::S24Le => 3,
            SampleFormat::S32Le | SampleFormat::F32Le => 4,
        }
    }

    /// Raw format name as used by ffmpeg's `-f` option.
    pub const fn ffmpeg_name(self) -> &'static str {
        match self {
            SampleFormat::S16Le => "s16le",
            SampleFormat::S24Le => "s24le",
            SampleFormat::S32Le => "s32le",
            SampleFormat::F32Le => "f32le",
        }
    }

    /// Sample format name as understood by PulseAudio tools.
    pub const fn pulse_name(self) -> &'static str {
        match self {
            SampleFormat::S16Le => "s16le",
            SampleFormat::S24Le => "s24le",
            SampleFormat::S32Le => "s32le",
            SampleFormat::F32Le => "float32le",
        }
    }
}

impl Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown sample format: {0}")]
pub struct UnknownSampleFormat(pub String);

impl FromStr for SampleFormat {
    type Err = UnknownSampleFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s16le" | "s16" => Ok(SampleFormat::S16Le),
            "s24le" | "s24" => Ok(SampleFormat::S24Le),
            "s32le" | "s32" => Ok(SampleFormat::S32Le),
            "f32le" | "f32" | "float32le" => Ok(SampleFormat::F32Le),
            _ => Err(UnknownSampleFormat(s.to_string())),
        }
    }
}

/// Channel count, sample rate and sample encoding of an interleaved stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub channels: u16,
    pub rate: u32,
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    /// IEC 61937 carrier and default pass-through format.
    pub const STEREO_S16LE: AudioFormat = AudioFormat {
        channels: 2,
        rate: 48_000,
        sample_format: SampleFormat::S16Le,
    };

    /// Default decoder output: 5.1 float.
    pub const SURROUND_F32LE: AudioFormat = AudioFormat {
        channels: 6,
        rate: 48_000,
        sample_format: SampleFormat::F32Le,
    };

    pub const fn new(channels: u16, rate: u32, sample_format: SampleFormat) -> Self {
        Self {
            channels,
            rate,
            sample_format,
        }
    }

    pub const fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_format.bytes_per_sample()
    }

    pub const fn chunk_bytes(&self, frames: usize) -> usize {
        frames * self.bytes_per_frame()
    }

    /// Duration in seconds of `frames` frames at this rate.
    pub fn seconds(&self, frames: u64) -> f64 {
        if self.rate == 0 {
            return 0.0;
        }
        frames as f64 / self.rate as f64
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::STEREO_S16LE
    }
}

impl Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch {}Hz {}",
            self.channels, self.rate, self.sample_format
        )
    }
}

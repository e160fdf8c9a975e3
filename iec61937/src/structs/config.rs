use std::num::NonZeroUsize;
use std::time::Duration;

use crate::structs::format::AudioFormat;
use crate::structs::preamble::DataType;
use crate::utils::errors::ConfigError;

pub const DEFAULT_CHUNK_FRAMES: usize = 2048;
pub const DEFAULT_DET_WINDOW: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(w) => w,
    None => unreachable!(),
};
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Startup parameters of a session. Fixed for the lifetime of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub chunk_frames: usize,
    pub det_window: NonZeroUsize,
    pub input_format: AudioFormat,
    pub pcm_format: AudioFormat,
    pub decoded_format: AudioFormat,
    pub drain_timeout: Duration,
    pub strict: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_frames: DEFAULT_CHUNK_FRAMES,
            det_window: DEFAULT_DET_WINDOW,
            input_format: AudioFormat::STEREO_S16LE,
            pcm_format: AudioFormat::STEREO_S16LE,
            decoded_format: AudioFormat::SURROUND_F32LE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            strict: false,
        }
    }
}

impl EngineConfig {
    pub fn chunk_bytes(&self) -> usize {
        self.input_format.chunk_bytes(self.chunk_frames)
    }

    /// Frames the switch needs to see before it may change mode.
    pub fn switch_latency_frames(&self) -> usize {
        self.det_window.get() * self.chunk_frames
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_frames == 0 {
            return Err(ConfigError::ZeroChunkFrames);
        }

        for format in [&self.input_format, &self.pcm_format, &self.decoded_format] {
            if format.channels == 0 || format.rate == 0 {
                return Err(ConfigError::EmptyFormat(format.to_string()));
            }
        }

        let frame = self.input_format.bytes_per_frame();
        if frame % 2 != 0 {
            return Err(ConfigError::UnalignedInputFrame(frame));
        }

        if self.pcm_format != self.input_format {
            return Err(ConfigError::PcmFormatMismatch {
                input: self.input_format.to_string(),
                output: self.pcm_format.to_string(),
            });
        }

        let ac3_period = DataType::Ac3.repetition_period().unwrap_or(1536);
        if self.switch_latency_frames() < ac3_period {
            log::warn!(
                "Detection window of {} frames is shorter than one AC-3 burst period ({ac3_period} frames); \
                 gaps between bursts may read as PCM",
                self.switch_latency_frames()
            );
        }

        Ok(())
    }
}

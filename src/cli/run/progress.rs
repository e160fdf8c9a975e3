use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use iec61937::process::detect::Detection;
use iec61937::process::session::SessionObserver;
use iec61937::process::switch::{ModeTransition, StreamMode};
use iec61937::structs::chunk::Chunk;
use iec61937::structs::format::AudioFormat;

use crate::timestamp::chunk_time;

/// Spinner refresh interval, in chunks.
const MESSAGE_EVERY: u64 = 16;

pub fn create_spinner(multi: &MultiProgress) -> Result<ProgressBar> {
    let pb = multi.add(ProgressBar::new_spinner());
    pb.set_style(ProgressStyle::with_template(
        "{spinner:.green} {pos} chunks\n{msg} | elapsed: {elapsed_precise}",
    )?);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb.set_message("waiting for input");
    Ok(pb)
}

/// Mirrors session progress onto an optional spinner.
pub struct ProgressObserver {
    pb: Option<ProgressBar>,
    chunk_frames: usize,
    format: AudioFormat,
    mode: StreamMode,
}

impl ProgressObserver {
    pub fn new(multi: Option<&MultiProgress>, chunk_frames: usize, format: AudioFormat) -> Result<Self> {
        let pb = match multi {
            Some(multi) => Some(create_spinner(multi)?),
            None => None,
        };
        Ok(Self {
            pb,
            chunk_frames,
            format,
            mode: StreamMode::Pcm,
        })
    }

    fn message(&self, seq: u64) -> String {
        format!(
            "{} | {}",
            chunk_time(seq + 1, self.chunk_frames, &self.format),
            self.mode
        )
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
    }
}

impl SessionObserver for ProgressObserver {
    fn on_chunk(&mut self, chunk: &Chunk, _detection: &Detection, mode: StreamMode) {
        self.mode = mode;
        if let Some(pb) = &self.pb {
            pb.inc(1);
            if chunk.seq % MESSAGE_EVERY == 0 {
                pb.set_message(self.message(chunk.seq));
            }
        }
    }

    fn on_transition(&mut self, seq: u64, transition: ModeTransition, _detection: &Detection) {
        self.mode = transition.to;
        if let Some(pb) = &self.pb {
            pb.set_message(self.message(seq));
        }
    }
}

use std::fmt::{self, Display};
use std::num::NonZeroUsize;

use crate::process::detect::Classification;

/// Authoritative routing decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StreamMode {
    #[default]
    Pcm,
    Compressed,
}

impl StreamMode {
    /// The mode a sustained run of `classification` would move to, if any.
    pub fn supported_by(classification: Classification) -> Option<StreamMode> {
        match classification {
            Classification::Pcm => Some(StreamMode::Pcm),
            Classification::Compressed => Some(StreamMode::Compressed),
            Classification::Ambiguous => None,
        }
    }

    pub fn opposite(self) -> StreamMode {
        match self {
            StreamMode::Pcm => StreamMode::Compressed,
            StreamMode::Compressed => StreamMode::Pcm,
        }
    }
}

impl Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMode::Pcm => f.write_str("PCM"),
            StreamMode::Compressed => f.write_str("compressed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeTransition {
    pub from: StreamMode,
    pub to: StreamMode,
}

impl Display for ModeTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Hysteresis counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionWindow {
    /// Consecutive chunks supporting the opposite of the current mode.
    pub agree_count: usize,
    /// Consecutive ambiguous chunks. Diagnostic only.
    pub ambiguous_run: usize,
}

/// Turns the per-chunk classification stream into deliberate mode changes.
///
/// The mode flips only after `det_window` consecutive chunks classified as
/// the opposite mode. Anything else, ambiguous chunks included, resets the
/// count.
#[derive(Debug, Clone)]
pub struct DebouncedSwitch {
    mode: StreamMode,
    window: DetectionWindow,
    det_window: NonZeroUsize,
}

/// Ambiguous runs longer than this are worth a debug line.
const AMBIGUOUS_RUN_NOTICE: usize = 16;

impl DebouncedSwitch {
    pub fn new(det_window: NonZeroUsize) -> Self {
        Self {
            mode: StreamMode::Pcm,
            window: DetectionWindow::default(),
            det_window,
        }
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn window(&self) -> DetectionWindow {
        self.window
    }

    pub fn det_window(&self) -> usize {
        self.det_window.get()
    }

    pub fn observe(&mut self, classification: Classification) -> Option<ModeTransition> {
        if classification == Classification::Ambiguous {
            self.window.ambiguous_run += 1;
            if self.window.ambiguous_run == AMBIGUOUS_RUN_NOTICE {
                log::debug!(
                    "{AMBIGUOUS_RUN_NOTICE} consecutive ambiguous chunks in {} mode",
                    self.mode
                );
            }
        } else {
            self.window.ambiguous_run = 0;
        }

        let opposing = self.mode.opposite();
        if StreamMode::supported_by(classification) != Some(opposing) {
            self.window.agree_count = 0;
            return None;
        }

        self.window.agree_count += 1;
        if self.window.agree_count < self.det_window.get() {
            return None;
        }

        let transition = ModeTransition {
            from: self.mode,
            to: opposing,
        };
        self.mode = opposing;
        self.window = DetectionWindow::default();

        Some(transition)
    }
}

/// Sync-word scanning and chunk classification.
///
/// Provides [`SyncDetector`](detect::SyncDetector), which threads a small
/// [`CarryTail`](detect::CarryTail) between chunks so preambles split across
/// a chunk boundary are still found.
pub mod detect;

/// Debounced mode switching.
pub mod switch;

/// Output routing and decoding pipeline lifecycle.
///
/// Provides the [`OutputRouter`](route::OutputRouter).
pub mod route;

pub mod session;

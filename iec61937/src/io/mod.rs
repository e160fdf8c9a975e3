//! Byte endpoints around the core.

/// External decoder commands and helper processes.
pub mod command;

/// The [`DecodingPipeline`](pipeline::DecodingPipeline) capability and its
/// channel-based implementation.
pub mod pipeline;

pub mod sink;
pub mod source;

//! Detection and routing of IEC 61937 compressed audio carried in a PCM stream.
//!
//! ## Technical Overview
//!
//! IEC 61937 packs compressed audio (AC-3, E-AC-3, DTS, MPEG, TrueHD) into
//! bursts inside a 16-bit stereo PCM carrier. Each burst starts with a
//! four-word preamble: the sync pair `Pa = 0xF872`, `Pb = 0x4E1F`, the burst
//! info `Pc` and the burst length `Pd`.
//!
//! The crate classifies fixed-size chunks of the carrier, debounces the
//! classification into a stable stream mode, and routes each chunk either to
//! a PCM sink or into an external decoding pipeline whose output goes to a
//! second sink.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use iec61937::io::command::CommandFactory;
//! use iec61937::io::sink::Sink;
//! use iec61937::io::source::ReaderSource;
//! use iec61937::process::route::OutputRouter;
//! use iec61937::process::session::Session;
//! use iec61937::structs::config::EngineConfig;
//! use iec61937::structs::route::OutputRoute;
//! use iec61937::utils::errors::SinkRole;
//!
//! let config = EngineConfig::default();
//! config.validate()?;
//!
//! let input = std::fs::File::open("capture.raw")?;
//! let source = ReaderSource::new(input, config.input_format, config.chunk_frames);
//!
//! let router = OutputRouter::new(
//!     OutputRoute::pcm("stdout", config.pcm_format),
//!     Sink::new(SinkRole::Pcm, "stdout", Box::new(std::io::stdout())),
//!     OutputRoute::decoded("decoded.raw", config.decoded_format),
//!     Sink::new(SinkRole::Decoded, "decoded.raw", Box::new(std::fs::File::create("decoded.raw")?)),
//!     Box::new(CommandFactory::default()),
//! );
//!
//! let summary = Session::new(source, router, &config).run(&mut ())?;
//! println!("{} chunks, {} transitions", summary.chunks, summary.transitions);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Version of this library, logged by the daemon at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Chunk-level processing stages.
///
/// 1. **Detection** ([`process::detect`]): per-chunk sync scan and burst validation.
/// 2. **Switching** ([`process::switch`]): hysteresis over the classification stream.
/// 3. **Routing** ([`process::route`]): sinks and the decoding pipeline lifecycle.
/// 4. **Session** ([`process::session`]): the chunk loop and its shutdown order.
pub mod process;

/// Data structures: chunks, audio formats, burst preambles, routes and
/// configuration.
pub mod structs;

/// Byte endpoints: chunk sources, sinks and decoding pipelines.
pub mod io;

/// Error types.
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

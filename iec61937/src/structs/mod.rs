pub mod chunk;
pub mod config;
pub mod format;

/// IEC 61937 burst preamble layout and validation.
pub mod preamble;

pub mod route;

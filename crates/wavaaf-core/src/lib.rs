//! WAVsToAAF core - broadcast WAV to AAF object-graph conversion
//!
//! Pipeline per input file:
//!
//! 1. [`wav`] walks the RIFF/RF64 chunks and collects format, `bext`,
//!    `LIST/INFO` and embedded XML metadata
//! 2. [`ucs`] assigns a Universal Category System category
//! 3. [`timecode`] turns the sample count into exact edit units and timecode
//! 4. [`aaf`] assembles the master/source pair through the [`graph`] API
//!
//! [`batch`] runs that pipeline over a folder on a worker pool and writes the
//! reports; [`config`] holds the run settings.

pub mod aaf;
pub mod batch;
pub mod config;
pub mod error;
pub mod graph;
mod output;
pub mod timecode;
pub mod ucs;
pub mod wav;

pub use error::{ConvertError, ErrorKind};

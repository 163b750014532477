//! # Holter ECG data for Rust
//!
//! Decodes Holter-monitor ECG recordings into normalised per-channel sample
//! buffers and loads their beat annotations into a searchable timeline.
//!
//! Two kinds of recordings are understood:
//!
//! - WFDB records (`.hea` header, signal file in format 16, 61, 80, 160 or 212)
//! - legacy recorder files: raw interleaved samples described by a two-line
//!   header next to the data file, or by a shared `ecg.hea`, or by nothing
//!   at all (one channel at 200 Hz)
//!
//! Every sample is normalised to `u16` around `range_per_sample / 2`.
//! Annotations are read from the MIT-format file with the same base name
//! (`rec.dat` → `rec.atr`).
//!
//! ## Quick Start
//!
//! ### Opening a recording
//!
//! ```rust
//! use holterdata::{open_recording, Result, SearchDirection};
//!
//! fn main() -> Result<()> {
//!     # holterdata::doctest_utils::create_legacy_recording("quick.dat")?;
//!     let recording = open_recording("quick.dat")?;
//!
//!     let descriptor = recording.descriptor();
//!     println!("Channels: {}", descriptor.channel_count);
//!     println!("Rate: {} Hz", descriptor.sample_rate);
//!     println!("Duration: {} s", descriptor.duration_seconds);
//!
//!     // 8 s window of channel 1, starting 4 s in
//!     let rate = descriptor.sample_rate as i64;
//!     let window = recording.get(1, 4 * rate, recording.sample_count());
//!     assert_eq!(window.len() as i64, recording.sample_count());
//!
//!     // First beat at or after the window start
//!     if let Some(beat) = recording.beats_near(4 * rate, SearchDirection::CanBeHigher) {
//!         println!("{} at {}", beat.label(), holterdata::utils::format_position(beat.position, descriptor.sample_rate));
//!     }
//!
//!     println!("Paced beats in minute 0: {}", recording.pace_count_for_minute(0));
//!     # holterdata::doctest_utils::remove_recording("quick.dat");
//!     Ok(())
//! }
//! ```
//!
//! ### WFDB records
//!
//! ```rust
//! use holterdata::{open_recording, HeaderSource};
//!
//! # holterdata::doctest_utils::create_wfdb_record("mit.dat")?;
//! let recording = open_recording("mit.dat")?;
//! assert!(matches!(recording.header_source(), HeaderSource::Wfdb(_)));
//! assert_eq!(recording.descriptor().channel_count, 2);
//! # holterdata::doctest_utils::remove_recording("mit.dat");
//! # Ok::<(), holterdata::HolterError>(())
//! ```
//!
//! ## Normalisation
//!
//! | source            | rule                                                                |
//! |-------------------|---------------------------------------------------------------------|
//! | format 81         | `round(((b as i8 * 2 + 0x80) mod 256) × range / 256)`               |
//! | 16-bit vendor     | `round((word & mask) × range / 2^bits)`                             |
//! | WFDB              | `range/2 + round((raw − adc_zero) × range / device_mV / gain)`      |
//!
//! WFDB samples equal to the invalid marker are replaced with
//! `2^adc_resolution / 2` first. Results saturate into `0..=u16::MAX`.
//!
//! ## Legacy headers
//!
//! By default every legacy recording is decoded as format 81 with one byte
//! per sample, whatever format its header declares. This is how the
//! recorder's software has always read them; use
//! [`LoadOptions::with_declared_format`] to honour the declared code.
//!
//! ```rust
//! use holterdata::{FormatSpecifier, HeaderResolver, LoadOptions};
//! # use std::fs;
//! # let dir = std::env::temp_dir().join("holterdata_doc_legacy");
//! # fs::create_dir_all(&dir)?;
//! # let data = dir.join("rec.dat");
//! # fs::write(&data, vec![0u8; 1600])?;
//! # fs::write(dir.join("rec.hea"), "rec 1 100 0 10:00:00 1/2/2020\nrec 1612\n")?;
//!
//! let forced = LoadOptions::default();
//! let resolved = HeaderResolver::new(&forced).resolve(&data)?;
//! assert_eq!(resolved.declared_format, Some(1612));
//! assert_eq!(resolved.descriptor.format, FormatSpecifier::Signed8);
//!
//! let declared = LoadOptions::default().with_declared_format();
//! let resolved = HeaderResolver::new(&declared).resolve(&data)?;
//! assert_eq!(resolved.descriptor.format.code(), 1612);
//! # fs::remove_dir_all(&dir).ok();
//! # Ok::<(), holterdata::HolterError>(())
//! ```

pub mod error;
pub mod types;
pub mod utils;
pub mod config;
pub mod classify;
pub mod wfdb;
pub mod annotation;
pub mod codec;
pub mod store;
pub mod timeline;
pub mod header;
pub mod recording;
pub mod writer;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use error::{HolterError, Result};
pub use types::{
    AuxText, Beat, ChannelSpec, FormatSpecifier, Masked16Format, PacerEvent, RecordingDescriptor,
    RecordingStart, WfdbFormat,
};
pub use config::LoadOptions;
pub use classify::{classify, AnnotationCode};
pub use codec::{CancelToken, DecodeOutcome, LoadObserver, NullObserver, SampleDecoder};
pub use store::ChannelStore;
pub use timeline::{AnnotationTimeline, SearchDirection, TypeScan};
pub use header::{HeaderResolver, HeaderSource, ResolvedHeader};
pub use recording::{open_recording, Recording, ViewContext};

// Important constants
pub const CHANNEL_MAX: usize = 12;
pub const AUX_TEXT_MAX: usize = 63;
pub const DISPLAY_WINDOW_SECONDS: i64 = 8;
pub const DEFAULT_GAIN: f64 = 200.0;
pub const DEFAULT_SAMPLE_RATE: u32 = 16000 / 80;
pub const DEFAULT_RANGE_PER_SAMPLE: f64 = 50000.0;
pub const DEFAULT_DEVICE_RANGE_MV: f64 = 5.0;
/// Group delay of the recorder's 201-tap pacer detection filter, in samples
pub const PACER_FILTER_DELAY: i64 = 100;
pub const PROGRESS_CHUNK: usize = 1000;
pub const UNIVERSAL_HEADER: &str = "ecg.hea";

/// Library version
///
/// Returns the current version of the holterdata library.
///
/// # Examples
///
/// ```rust
/// let version = holterdata::version();
/// assert!(!version.is_empty());
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_defaults_are_consistent() {
        assert_eq!(DEFAULT_SAMPLE_RATE, 200);
        assert!(AUX_TEXT_MAX < 64);
    }
}

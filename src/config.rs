use crate::{
    DEFAULT_DEVICE_RANGE_MV, DEFAULT_GAIN, DEFAULT_RANGE_PER_SAMPLE, DEFAULT_SAMPLE_RATE,
    PACER_FILTER_DELAY, PROGRESS_CHUNK, UNIVERSAL_HEADER,
};

/// Knobs for opening a recording.
///
/// The defaults reproduce the behaviour of the Holter viewer this crate
/// serves; most callers never change them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LoadOptions {
    /// Frames decoded between progress reports and cancellation checks
    pub progress_chunk: usize,
    /// Extension of the annotation file next to the record
    pub annotation_extension: String,
    /// Shared header used when a recording has no `.hea` of its own
    pub universal_header: String,
    /// Decode every legacy (non-WFDB) recording as format 81 with one byte
    /// per sample, whatever its header declares
    pub force_legacy_format: bool,
    pub range_per_sample: f64,
    pub device_range_mv: f64,
    pub default_gain: f64,
    pub default_sample_rate: u32,
    /// Samples subtracted from each pacer spike position (filter group delay)
    pub pacer_filter_delay: i64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            progress_chunk: PROGRESS_CHUNK,
            annotation_extension: "atr".to_string(),
            universal_header: UNIVERSAL_HEADER.to_string(),
            force_legacy_format: true,
            range_per_sample: DEFAULT_RANGE_PER_SAMPLE,
            device_range_mv: DEFAULT_DEVICE_RANGE_MV,
            default_gain: DEFAULT_GAIN,
            default_sample_rate: DEFAULT_SAMPLE_RATE,
            pacer_filter_delay: PACER_FILTER_DELAY,
        }
    }
}

impl LoadOptions {
    /// Honour the format declared in legacy headers instead of forcing format 81.
    pub fn with_declared_format(mut self) -> Self {
        self.force_legacy_format = false;
        self
    }

    pub fn with_annotation_extension(mut self, ext: &str) -> Self {
        self.annotation_extension = ext.trim_start_matches('.').to_string();
        self
    }

    pub(crate) fn chunk(&self) -> usize {
        self.progress_chunk.max(1)
    }
}

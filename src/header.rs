//! Locating and reading the header of a recording.
//!
//! A record is tried as WFDB first. When that fails the two-line legacy
//! header next to the data file is read, or the shared universal header in
//! the same directory, or nothing at all, in which case the built-in
//! defaults (one channel at 200 Hz) stand.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::LoadOptions;
use crate::error::{HolterError, Result};
use crate::types::{ChannelSpec, FormatSpecifier, RecordingDescriptor};
use crate::utils::{atoi_nonlocalized, parse_legacy_start, simplified_tokens};
use crate::wfdb::WfdbHeader;
use crate::CHANNEL_MAX;

pub const HEADER_EXTENSION: &str = "hea";

/// Where a descriptor's values came from.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderSource {
    Wfdb(WfdbHeader),
    /// legacy header, per-recording or universal
    Legacy(PathBuf),
    /// no header could be read
    Defaults,
}

#[derive(Debug, Clone)]
pub struct ResolvedHeader {
    pub descriptor: RecordingDescriptor,
    pub source: HeaderSource,
    /// File holding the samples
    pub data_path: PathBuf,
    /// Format code the legacy header declared, before any override
    pub declared_format: Option<u16>,
}

impl ResolvedHeader {
    pub fn wfdb(&self) -> Option<&WfdbHeader> {
        match &self.source {
            HeaderSource::Wfdb(header) => Some(header),
            _ => None,
        }
    }

    pub fn is_wfdb(&self) -> bool {
        self.wfdb().is_some()
    }
}

pub struct HeaderResolver<'a> {
    options: &'a LoadOptions,
}

impl<'a> HeaderResolver<'a> {
    pub fn new(options: &'a LoadOptions) -> Self {
        HeaderResolver { options }
    }

    /// `dir/name.ext` → `dir/name.hea`
    pub fn header_path(data_path: &Path) -> PathBuf {
        data_path.with_extension(HEADER_EXTENSION)
    }

    /// Builds the descriptor of the recording stored at `data_path`.
    ///
    /// Only a missing data file is an error; any header problem falls back
    /// to the next source.
    pub fn resolve<P: AsRef<Path>>(&self, data_path: P) -> Result<ResolvedHeader> {
        let data_path = data_path.as_ref();
        let header_path = Self::header_path(data_path);

        match WfdbHeader::open(&header_path) {
            Ok(header) => return self.from_wfdb(header),
            Err(e) => log::debug!(
                "{} is not a WFDB record ({}), trying legacy header",
                header_path.display(),
                e
            ),
        }

        self.resolve_legacy(data_path, &header_path)
    }

    fn from_wfdb(&self, header: WfdbHeader) -> Result<ResolvedHeader> {
        let data_path = header.signal_path();
        let format = header.format();
        let channel_count = header.channel_count();
        let sample_rate = header.sample_rate();

        let duration_seconds = match header.sample_count {
            Some(nsamp) => nsamp / sample_rate.max(1) as u64,
            None => {
                let len = fs::metadata(&data_path)?.len();
                let offset = header.signals.first().map_or(0, |s| s.byte_offset);
                duration_from_size(
                    len.saturating_sub(offset),
                    format.bytes_per_sample(),
                    sample_rate,
                    channel_count,
                )
            }
        };

        let descriptor = RecordingDescriptor {
            channel_count,
            sample_rate,
            format: FormatSpecifier::Wfdb(format),
            bytes_per_sample: format.bytes_per_sample(),
            device_range_mv: self.options.device_range_mv,
            range_per_sample: self.options.range_per_sample,
            channels: header.signals.iter().map(|s| s.channel_spec()).collect(),
            start: header.start,
            duration_seconds,
        };
        descriptor.validate()?;

        log::debug!(
            "WFDB record {}: {} channels of format {} at {} Hz, {} s",
            header.record_name,
            channel_count,
            format.code(),
            sample_rate,
            duration_seconds
        );

        Ok(ResolvedHeader {
            descriptor,
            source: HeaderSource::Wfdb(header),
            data_path,
            declared_format: None,
        })
    }

    fn resolve_legacy(&self, data_path: &Path, header_path: &Path) -> Result<ResolvedHeader> {
        let mut descriptor = self.default_descriptor();
        let mut declared_format = None;

        let mut chosen = header_path.to_path_buf();
        if !chosen.exists() {
            let universal = data_path
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(&self.options.universal_header);
            if universal.exists() {
                chosen = universal;
            }
        }

        let source = match fs::read_to_string(&chosen) {
            Ok(text) => {
                declared_format = self.apply_legacy_header(&mut descriptor, &text);
                HeaderSource::Legacy(chosen)
            }
            Err(e) => {
                log::warn!(
                    "no ECG header for {} ({}), using defaults",
                    data_path.display(),
                    e
                );
                HeaderSource::Defaults
            }
        };

        descriptor.format = match declared_format {
            Some(code) if !self.options.force_legacy_format => FormatSpecifier::from_code(code),
            _ => FormatSpecifier::LEGACY_DEFAULT,
        };
        descriptor.bytes_per_sample = descriptor.format.bytes_per_sample();

        let len = match fs::metadata(data_path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(HolterError::DataFileMissing {
                    path: data_path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        descriptor.duration_seconds = duration_from_size(
            len,
            descriptor.bytes_per_sample,
            descriptor.sample_rate,
            descriptor.channel_count,
        );

        log::debug!(
            "legacy record {}: {} channels of format {} at {} Hz, {} bytes, {} s",
            data_path.display(),
            descriptor.channel_count,
            descriptor.format,
            descriptor.sample_rate,
            len,
            descriptor.duration_seconds
        );

        Ok(ResolvedHeader {
            descriptor,
            source,
            data_path: data_path.to_path_buf(),
            declared_format,
        })
    }

    fn default_descriptor(&self) -> RecordingDescriptor {
        let options = self.options;
        RecordingDescriptor {
            channel_count: 1,
            sample_rate: options.default_sample_rate.max(1),
            format: FormatSpecifier::LEGACY_DEFAULT,
            bytes_per_sample: FormatSpecifier::LEGACY_DEFAULT.bytes_per_sample(),
            device_range_mv: options.device_range_mv,
            range_per_sample: options.range_per_sample,
            channels: vec![self.default_channel()],
            start: None,
            duration_seconds: 0,
        }
    }

    fn default_channel(&self) -> ChannelSpec {
        ChannelSpec {
            gain: self.options.default_gain,
            ..ChannelSpec::default()
        }
    }

    /// Applies the first two lines of a legacy header to `descriptor` and
    /// returns the format code of line two, if any.
    ///
    /// Line 1: `name channels rate ignored time date` (time and date may be
    /// shifted one token right). Line 2: `name format`. Out-of-range
    /// channel counts and rates keep the current values.
    pub fn apply_legacy_header(&self, descriptor: &mut RecordingDescriptor, text: &str) -> Option<u16> {
        let mut declared = None;
        for (index, line) in text.lines().take(2).enumerate() {
            let tokens = simplified_tokens(line);
            if index == 0 {
                let channels = atoi_nonlocalized(tokens.get(1).copied().unwrap_or(""));
                if channels >= 1 && channels as usize <= CHANNEL_MAX {
                    descriptor.channel_count = channels as usize;
                } else {
                    log::warn!("header channel count {} out of range, keeping {}", channels, descriptor.channel_count);
                }

                let rate = atoi_nonlocalized(tokens.get(2).copied().unwrap_or(""));
                match u32::try_from(rate) {
                    Ok(rate) if rate > 0 => descriptor.sample_rate = rate,
                    _ => log::warn!("header sample rate {} invalid, keeping {}", rate, descriptor.sample_rate),
                }

                descriptor.start = parse_legacy_start(&tokens);
            } else {
                let code = atoi_nonlocalized(tokens.get(1).copied().unwrap_or(""));
                declared = u16::try_from(code).ok();
            }
        }

        let channel = self.default_channel();
        descriptor.channels.resize(descriptor.channel_count, channel);
        declared
    }
}

fn duration_from_size(len: u64, bytes_per_sample: f64, rate: u32, channels: usize) -> u64 {
    let frame_bytes = bytes_per_sample * channels.max(1) as f64;
    (len as f64 / frame_bytes / rate.max(1) as f64) as u64
}

//! Minimal WFDB record support: `.hea` headers and interleaved signal files.
//!
//! Only single-segment records whose signals all live in one file are
//! opened. Anything else is rejected so the caller can fall back to the
//! legacy header rules.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{HolterError, Result};
use crate::types::{ChannelSpec, RecordingStart, WfdbFormat};
use crate::utils::{atoi_nonlocalized, parse_wfdb_start, simplified_tokens};
use crate::{CHANNEL_MAX, DEFAULT_GAIN};

/// Value reported for samples the recorder marked as missing.
pub const WFDB_INVALID_SAMPLE: i32 = -32768;

/// Sampling frequency assumed when the record line omits it.
pub const WFDB_DEFAULT_FREQUENCY: f64 = 250.0;

#[derive(Debug, Clone, PartialEq)]
pub struct WfdbSignal {
    pub file_name: String,
    pub format: WfdbFormat,
    pub byte_offset: u64,
    pub gain: f64,
    pub baseline: i32,
    pub units: String,
    pub adc_resolution: u32,
    pub adc_zero: i32,
    pub initial_value: i32,
    pub description: String,
}

impl WfdbSignal {
    pub fn new(file_name: &str, format: WfdbFormat) -> Self {
        WfdbSignal {
            file_name: file_name.to_string(),
            format,
            byte_offset: 0,
            gain: DEFAULT_GAIN,
            baseline: 0,
            units: "mV".to_string(),
            adc_resolution: format.default_resolution(),
            adc_zero: 0,
            initial_value: 0,
            description: String::new(),
        }
    }

    pub fn channel_spec(&self) -> ChannelSpec {
        ChannelSpec {
            gain: self.gain,
            adc_zero: self.adc_zero,
            adc_resolution: self.adc_resolution,
            description: self.description.clone(),
        }
    }

    fn parse(line: &str, index: usize) -> Result<Self> {
        let tokens = simplified_tokens(line);
        let (Some(file_name), Some(format_spec)) = (tokens.first(), tokens.get(1)) else {
            return Err(HolterError::InvalidHeader(format!(
                "signal line {} needs a file name and a format",
                index
            )));
        };

        let (format, byte_offset) = parse_format_field(format_spec)?;
        let mut signal = WfdbSignal::new(file_name, format);
        signal.byte_offset = byte_offset;

        let mut baseline = None;
        if let Some(gain_spec) = tokens.get(2) {
            let (gain, base, units) = parse_gain_field(gain_spec);
            if gain != 0.0 {
                signal.gain = gain;
            }
            baseline = base;
            if let Some(units) = units {
                signal.units = units.to_string();
            }
        }
        if let Some(res) = tokens.get(3) {
            let res = atoi_nonlocalized(res);
            if res > 0 && res <= 32 {
                signal.adc_resolution = res as u32;
            }
        }
        if let Some(zero) = tokens.get(4) {
            signal.adc_zero = atoi_nonlocalized(zero) as i32;
        }
        if let Some(init) = tokens.get(5) {
            signal.initial_value = atoi_nonlocalized(init) as i32;
        }
        // checksum and block size (6, 7) are not used
        if tokens.len() > 8 {
            signal.description = tokens[8..].join(" ");
        }
        signal.baseline = baseline.unwrap_or(signal.adc_zero);

        Ok(signal)
    }
}

/// `format[xN][:skew][+offset]`
fn parse_format_field(field: &str) -> Result<(WfdbFormat, u64)> {
    let digits: String = field.chars().take_while(|c| c.is_ascii_digit()).collect();
    let code: u16 = digits
        .parse()
        .map_err(|_| HolterError::InvalidHeader(format!("bad signal format '{}'", field)))?;
    let format = WfdbFormat::from_code(code).ok_or(HolterError::UnsupportedWfdbFormat(code))?;

    let rest = &field[digits.len()..];
    if let Some(x) = rest.strip_prefix('x') {
        let per_frame = atoi_nonlocalized(x.split([':', '+']).next().unwrap_or(""));
        if per_frame > 1 {
            return Err(HolterError::InvalidHeader(format!(
                "multi-frequency signals are not supported ('{}')",
                field
            )));
        }
    }
    let offset = rest
        .split_once('+')
        .map(|(_, off)| atoi_nonlocalized(off).max(0) as u64)
        .unwrap_or(0);

    Ok((format, offset))
}

/// `gain[(baseline)][/units]`
fn parse_gain_field(field: &str) -> (f64, Option<i32>, Option<&str>) {
    let (value, units) = match field.split_once('/') {
        Some((v, u)) => (v, Some(u)),
        None => (field, None),
    };
    let (gain, baseline) = match value.split_once('(') {
        Some((g, b)) => (g, Some(atoi_nonlocalized(b.trim_end_matches(')')) as i32)),
        None => (value, None),
    };
    (gain.parse().unwrap_or(0.0), baseline, units)
}

/// Parsed `.hea` file of a single-segment record.
#[derive(Debug, Clone, PartialEq)]
pub struct WfdbHeader {
    pub record_name: String,
    pub sampling_frequency: f64,
    pub sample_count: Option<u64>,
    pub start: Option<RecordingStart>,
    pub signals: Vec<WfdbSignal>,
    /// Directory the signal file names are relative to
    pub directory: PathBuf,
}

impl WfdbHeader {
    /// Reads the header at `header_path` and checks that its signal file exists.
    pub fn open<P: AsRef<Path>>(header_path: P) -> Result<Self> {
        let header_path = header_path.as_ref();
        let text = fs::read_to_string(header_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => HolterError::HeaderMissing {
                path: header_path.to_path_buf(),
            },
            _ => HolterError::Io(e),
        })?;
        let directory = header_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let header = Self::parse(&text, &directory)?;

        let signal_path = header.signal_path();
        if !signal_path.exists() {
            return Err(HolterError::DataFileMissing { path: signal_path });
        }
        Ok(header)
    }

    pub fn parse(text: &str, directory: &Path) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        let record_line = lines
            .next()
            .ok_or_else(|| HolterError::InvalidHeader("empty header".to_string()))?;
        let tokens = simplified_tokens(record_line);

        let record_name = tokens.first().copied().unwrap_or("");
        if record_name.contains('/') {
            return Err(HolterError::InvalidHeader(
                "multi-segment records are not supported".to_string(),
            ));
        }

        let nsig = tokens
            .get(1)
            .and_then(|t| t.parse::<usize>().ok())
            .ok_or_else(|| HolterError::InvalidHeader("missing signal count".to_string()))?;
        if nsig == 0 || nsig > CHANNEL_MAX {
            return Err(HolterError::InvalidChannelCount(nsig));
        }

        let sampling_frequency = match tokens.get(2) {
            Some(field) => {
                let freq = field.split(['/', '(']).next().unwrap_or("");
                freq.parse::<f64>()
                    .map_err(|_| HolterError::InvalidHeader(format!("bad frequency '{}'", field)))?
            }
            None => WFDB_DEFAULT_FREQUENCY,
        };
        if sampling_frequency < 1.0 {
            return Err(HolterError::InvalidSampleRate(sampling_frequency as i64));
        }

        let sample_count = tokens
            .get(3)
            .and_then(|t| t.parse::<u64>().ok())
            .filter(|n| *n > 0);
        let start = parse_wfdb_start(tokens.get(4).copied(), tokens.get(5).copied());

        let mut signals = Vec::with_capacity(nsig);
        for index in 0..nsig {
            let line = lines.next().ok_or_else(|| {
                HolterError::InvalidHeader(format!("expected {} signal lines, found {}", nsig, index))
            })?;
            signals.push(WfdbSignal::parse(line, index)?);
        }

        let first = &signals[0];
        if signals
            .iter()
            .any(|s| s.file_name != first.file_name || s.format != first.format)
        {
            return Err(HolterError::InvalidHeader(
                "signals spread over several files are not supported".to_string(),
            ));
        }

        Ok(WfdbHeader {
            record_name: record_name.to_string(),
            sampling_frequency,
            sample_count,
            start,
            signals,
            directory: directory.to_path_buf(),
        })
    }

    pub fn channel_count(&self) -> usize {
        self.signals.len()
    }

    /// Integer sampling rate, as `getifreq` reports it.
    pub fn sample_rate(&self) -> u32 {
        self.sampling_frequency.round() as u32
    }

    pub fn format(&self) -> WfdbFormat {
        self.signals.first().map_or(WfdbFormat::Fmt16, |s| s.format)
    }

    pub fn signal_path(&self) -> PathBuf {
        match self.signals.first() {
            Some(signal) => self.directory.join(&signal.file_name),
            None => self.directory.join(format!("{}.dat", self.record_name)),
        }
    }

    /// Frame reader over the raw contents of this record's signal file.
    pub fn frames<'a>(&self, data: &'a [u8]) -> FrameReader<'a> {
        let offset = self.signals.first().map_or(0, |s| s.byte_offset as usize);
        let offset = offset.min(data.len());
        FrameReader::new(&data[offset..], self.format(), self.channel_count(), self.sample_count)
    }
}

/// Walks interleaved samples one frame (one sample per channel) at a time.
pub struct FrameReader<'a> {
    bytes: &'a [u8],
    format: WfdbFormat,
    channels: usize,
    cursor: usize,
    // second sample of a 212 pair
    pending: Option<i32>,
    frames_left: u64,
}

impl<'a> FrameReader<'a> {
    pub fn new(bytes: &'a [u8], format: WfdbFormat, channels: usize, nsamp: Option<u64>) -> Self {
        let channels = channels.max(1);
        let available = total_samples(bytes.len(), format) / channels as u64;
        FrameReader {
            bytes,
            format,
            channels,
            cursor: 0,
            pending: None,
            frames_left: nsamp.map_or(available, |n| n.min(available)),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    pub fn frames_remaining(&self) -> u64 {
        self.frames_left
    }

    /// Fills `out` with the next frame. Returns false once the record is exhausted.
    pub fn read_frame(&mut self, out: &mut [i32]) -> bool {
        if self.frames_left == 0 || out.len() < self.channels {
            return false;
        }
        for slot in out.iter_mut().take(self.channels) {
            match self.next_sample() {
                Some(v) => *slot = v,
                None => {
                    self.frames_left = 0;
                    return false;
                }
            }
        }
        self.frames_left -= 1;
        true
    }

    fn next_sample(&mut self) -> Option<i32> {
        match self.format {
            WfdbFormat::Fmt16 => {
                let b = self.take::<2>()?;
                Some(i16::from_le_bytes(b) as i32)
            }
            WfdbFormat::Fmt61 => {
                let b = self.take::<2>()?;
                Some(i16::from_be_bytes(b) as i32)
            }
            WfdbFormat::Fmt80 => {
                let [b] = self.take::<1>()?;
                let v = b as i32 - 128;
                Some(if v == -128 { WFDB_INVALID_SAMPLE } else { v })
            }
            WfdbFormat::Fmt160 => {
                let b = self.take::<2>()?;
                Some(u16::from_le_bytes(b) as i32 - 32768)
            }
            WfdbFormat::Fmt212 => {
                if let Some(v) = self.pending.take() {
                    return Some(v);
                }
                let remaining = self.bytes.len() - self.cursor;
                if remaining >= 3 {
                    let [b0, b1, b2] = self.take::<3>()?;
                    let first = (b0 as i32) | (((b1 & 0x0f) as i32) << 8);
                    let second = (b2 as i32) | (((b1 & 0xf0) as i32) << 4);
                    self.pending = Some(sign_extend_12(second));
                    Some(sign_extend_12(first))
                } else if remaining == 2 {
                    // trailing odd sample
                    let [b0, b1] = self.take::<2>()?;
                    Some(sign_extend_12((b0 as i32) | (((b1 & 0x0f) as i32) << 8)))
                } else {
                    None
                }
            }
        }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.cursor.checked_add(N)?;
        let slice = self.bytes.get(self.cursor..end)?;
        self.cursor = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Some(out)
    }
}

fn sign_extend_12(v: i32) -> i32 {
    let v = if v & 0x800 != 0 { v - 0x1000 } else { v };
    if v == -2048 {
        WFDB_INVALID_SAMPLE
    } else {
        v
    }
}

fn total_samples(len: usize, format: WfdbFormat) -> u64 {
    let len = len as u64;
    match format {
        WfdbFormat::Fmt80 => len,
        WfdbFormat::Fmt16 | WfdbFormat::Fmt61 | WfdbFormat::Fmt160 => len / 2,
        WfdbFormat::Fmt212 => (len / 3) * 2 + u64::from(len % 3 == 2),
    }
}

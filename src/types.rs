use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDateTime, NaiveTime};

use crate::classify::AnnotationCode;
use crate::error::{HolterError, Result};
use crate::{AUX_TEXT_MAX, CHANNEL_MAX, DEFAULT_GAIN};

/// Sample encodings understood by the WFDB signal reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum WfdbFormat {
    /// 16-bit two's complement, little-endian
    Fmt16,
    /// 16-bit two's complement, big-endian
    Fmt61,
    /// 8-bit offset binary
    Fmt80,
    /// 16-bit offset binary, little-endian
    Fmt160,
    /// two 12-bit samples packed into three bytes
    Fmt212,
}

impl WfdbFormat {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            16 => Some(WfdbFormat::Fmt16),
            61 => Some(WfdbFormat::Fmt61),
            80 => Some(WfdbFormat::Fmt80),
            160 => Some(WfdbFormat::Fmt160),
            212 => Some(WfdbFormat::Fmt212),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            WfdbFormat::Fmt16 => 16,
            WfdbFormat::Fmt61 => 61,
            WfdbFormat::Fmt80 => 80,
            WfdbFormat::Fmt160 => 160,
            WfdbFormat::Fmt212 => 212,
        }
    }

    pub fn bytes_per_sample(self) -> f64 {
        match self {
            WfdbFormat::Fmt80 => 1.0,
            WfdbFormat::Fmt212 => 1.5,
            WfdbFormat::Fmt16 | WfdbFormat::Fmt61 | WfdbFormat::Fmt160 => 2.0,
        }
    }

    /// ADC resolution assumed when the header leaves it out
    pub fn default_resolution(self) -> u32 {
        match self {
            WfdbFormat::Fmt80 => 8,
            WfdbFormat::Fmt212 => 12,
            WfdbFormat::Fmt16 | WfdbFormat::Fmt61 | WfdbFormat::Fmt160 => 16,
        }
    }
}

/// Vendor formats that carry an unsigned value of `bits()` width inside a 16-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Masked16Format {
    /// 1608: 8-bit range, little-endian
    U8Le,
    /// 1680: 8-bit range, big-endian
    U8Be,
    /// 1600: 10-bit range, little-endian
    U10Le,
    /// 1610: 10-bit range, little-endian
    U10LeAlt,
    /// 1611: 11-bit range, little-endian
    U11Le,
    /// 1612: 12-bit range, little-endian
    U12Le,
}

impl Masked16Format {
    pub fn code(self) -> u16 {
        match self {
            Masked16Format::U8Le => 1608,
            Masked16Format::U8Be => 1680,
            Masked16Format::U10Le => 1600,
            Masked16Format::U10LeAlt => 1610,
            Masked16Format::U11Le => 1611,
            Masked16Format::U12Le => 1612,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Masked16Format::U8Le | Masked16Format::U8Be => 8,
            Masked16Format::U10Le | Masked16Format::U10LeAlt => 10,
            Masked16Format::U11Le => 11,
            Masked16Format::U12Le => 12,
        }
    }

    pub fn is_big_endian(self) -> bool {
        matches!(self, Masked16Format::U8Be)
    }

    /// Extracts the sample value from one 16-bit word.
    pub fn unpack(self, bytes: [u8; 2]) -> u16 {
        let word = if self.is_big_endian() {
            u16::from_be_bytes(bytes)
        } else {
            u16::from_le_bytes(bytes)
        };
        word & ((1u16 << self.bits()) - 1)
    }
}

/// On-disk sample layout of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FormatSpecifier {
    /// 81: one signed byte per sample, channels interleaved
    Signed8,
    Masked16(Masked16Format),
    /// record opened through its WFDB header
    Wfdb(WfdbFormat),
}

impl FormatSpecifier {
    pub const LEGACY_DEFAULT: FormatSpecifier = FormatSpecifier::Signed8;

    /// Looks up a code from the legacy header vocabulary.
    pub fn recognize(code: u16) -> Option<Self> {
        let format = match code {
            81 => FormatSpecifier::Signed8,
            1608 => FormatSpecifier::Masked16(Masked16Format::U8Le),
            1680 => FormatSpecifier::Masked16(Masked16Format::U8Be),
            1600 => FormatSpecifier::Masked16(Masked16Format::U10Le),
            1610 => FormatSpecifier::Masked16(Masked16Format::U10LeAlt),
            1611 => FormatSpecifier::Masked16(Masked16Format::U11Le),
            1612 => FormatSpecifier::Masked16(Masked16Format::U12Le),
            _ => return None,
        };
        Some(format)
    }

    /// Like [`FormatSpecifier::recognize`], but unknown codes fall back to 8-bit signed.
    pub fn from_code(code: u16) -> Self {
        Self::recognize(code).unwrap_or_else(|| {
            log::warn!("unknown format specifier {}, using 8-bit signed", code);
            Self::LEGACY_DEFAULT
        })
    }

    pub fn code(self) -> u16 {
        match self {
            FormatSpecifier::Signed8 => 81,
            FormatSpecifier::Masked16(m) => m.code(),
            FormatSpecifier::Wfdb(w) => w.code(),
        }
    }

    pub fn bytes_per_sample(self) -> f64 {
        match self {
            FormatSpecifier::Signed8 => 1.0,
            FormatSpecifier::Masked16(_) => 2.0,
            FormatSpecifier::Wfdb(w) => w.bytes_per_sample(),
        }
    }
}

impl fmt::Display for FormatSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Start of recording as read from a header.
///
/// Some legacy headers only carry a time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingStart {
    DateTime(NaiveDateTime),
    TimeOnly(NaiveTime),
}

impl RecordingStart {
    pub fn time(&self) -> NaiveTime {
        match self {
            RecordingStart::DateTime(dt) => dt.time(),
            RecordingStart::TimeOnly(t) => *t,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelSpec {
    pub gain: f64,            // ADC units per mV
    pub adc_zero: i32,
    pub adc_resolution: u32,  // bits
    pub description: String,
}

impl Default for ChannelSpec {
    fn default() -> Self {
        ChannelSpec {
            gain: DEFAULT_GAIN,
            adc_zero: 0,
            adc_resolution: 8,
            description: String::new(),
        }
    }
}

/// Everything needed to decode one recording.
#[derive(Debug, Clone)]
pub struct RecordingDescriptor {
    pub channel_count: usize,
    pub sample_rate: u32,                // 每通道每秒样本数
    pub format: FormatSpecifier,
    pub bytes_per_sample: f64,
    pub device_range_mv: f64,
    pub range_per_sample: f64,           // digital full-scale span
    pub channels: Vec<ChannelSpec>,
    pub start: Option<RecordingStart>,
    pub duration_seconds: u64,
}

impl RecordingDescriptor {
    pub fn gain(&self, channel: usize) -> f64 {
        self.channels
            .get(channel)
            .map(|c| c.gain)
            .filter(|g| *g != 0.0)
            .unwrap_or(DEFAULT_GAIN)
    }

    pub fn adc_zero(&self, channel: usize) -> i32 {
        self.channels.get(channel).map_or(0, |c| c.adc_zero)
    }

    /// Samples per channel covered by `duration_seconds`.
    pub fn total_samples(&self) -> u64 {
        self.duration_seconds * self.sample_rate as u64
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 || self.channel_count > CHANNEL_MAX {
            return Err(HolterError::InvalidChannelCount(self.channel_count));
        }
        if self.sample_rate == 0 {
            return Err(HolterError::InvalidSampleRate(0));
        }
        Ok(())
    }
}

/// Annotation text limited to [`AUX_TEXT_MAX`] bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxText(String);

impl AuxText {
    pub fn new(text: &str) -> Self {
        AuxText(truncate_at_boundary(text, AUX_TEXT_MAX).to_string())
    }

    /// Builds the text from a length-prefixed aux buffer: byte 0 is the declared
    /// length, the text follows. The declared length is never trusted past the
    /// end of the buffer, a NUL ends the text early.
    pub fn from_length_prefixed(aux: &[u8]) -> Self {
        let Some((&declared, rest)) = aux.split_first() else {
            return AuxText::default();
        };
        let len = (declared as usize).min(rest.len()).min(AUX_TEXT_MAX);
        if (declared as usize) > rest.len() {
            log::warn!(
                "aux length byte {} exceeds the {} bytes available",
                declared,
                rest.len()
            );
        }
        let bytes = &rest[..len];
        let bytes = match bytes.iter().position(|&b| b == 0) {
            Some(nul) => &bytes[..nul],
            None => bytes,
        };
        AuxText::new(&String::from_utf8_lossy(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AuxText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn truncate_at_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// One annotated cardiac event.
///
/// Two beats are equal when position and code match; ordering only looks at position.
#[derive(Debug, Clone)]
pub struct Beat {
    pub position: i64,       // 样本位置
    pub code: AnnotationCode,
    pub subtype: i8,
    pub text: AuxText,
}

impl Beat {
    pub fn new(position: i64, code: AnnotationCode) -> Self {
        Beat {
            position,
            code,
            subtype: 0,
            text: AuxText::default(),
        }
    }

    pub fn with_subtype(mut self, subtype: i8) -> Self {
        self.subtype = subtype;
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = AuxText::new(text);
        self
    }

    /// Display label for this beat.
    pub fn label(&self) -> String {
        crate::classify::classify(self.code, self.subtype).into_owned()
    }
}

impl PartialEq for Beat {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position && self.code == other.code
    }
}

impl PartialOrd for Beat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.position.cmp(&other.position) {
            Ordering::Equal if self.code != other.code => None,
            ord => Some(ord),
        }
    }
}

/// A pacing spike position, already corrected for filter delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacerEvent {
    pub position: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_codes() {
        assert_eq!(FormatSpecifier::from_code(81), FormatSpecifier::Signed8);
        assert_eq!(
            FormatSpecifier::from_code(1680),
            FormatSpecifier::Masked16(Masked16Format::U8Be)
        );
        assert_eq!(FormatSpecifier::from_code(311), FormatSpecifier::Signed8);
        assert!(FormatSpecifier::recognize(311).is_none());
        assert_eq!(FormatSpecifier::Wfdb(WfdbFormat::Fmt212).bytes_per_sample(), 1.5);
    }

    #[test]
    fn test_masked_unpack() {
        assert_eq!(Masked16Format::U12Le.unpack([0xff, 0xff]), 0x0fff);
        assert_eq!(Masked16Format::U8Be.unpack([0x12, 0x34]), 0x34);
        assert_eq!(Masked16Format::U10Le.unpack([0x34, 0x12]), 0x0234);
    }

    #[test]
    fn test_aux_text_length_prefix() {
        let aux = [5u8, b'(', b'A', b'F', b'I', b'B', b'x'];
        assert_eq!(AuxText::from_length_prefixed(&aux).as_str(), "(AFIB");

        // declared length larger than the buffer
        let aux = [200u8, b'N', b'O', b'T', b'E'];
        assert_eq!(AuxText::from_length_prefixed(&aux).as_str(), "NOTE");

        let aux = [3u8, b'a', 0, b'b'];
        assert_eq!(AuxText::from_length_prefixed(&aux).as_str(), "a");

        assert!(AuxText::from_length_prefixed(&[]).is_empty());
    }

    #[test]
    fn test_aux_text_bounded() {
        let mut aux = vec![255u8];
        aux.extend(std::iter::repeat(b'x').take(255));
        let text = AuxText::from_length_prefixed(&aux);
        assert_eq!(text.as_str().len(), AUX_TEXT_MAX);

        let long = "é".repeat(40);
        assert!(AuxText::new(&long).as_str().len() <= AUX_TEXT_MAX);
    }

    #[test]
    fn test_beat_equality_and_order() {
        let a = Beat::new(10, AnnotationCode::Normal);
        let b = Beat::new(10, AnnotationCode::Normal).with_text("other");
        let c = Beat::new(10, AnnotationCode::Pvc);
        let d = Beat::new(20, AnnotationCode::Normal);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < d);
        assert_eq!(a.partial_cmp(&c), None);
    }
}

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::annotation::{RawAnnotation, AUX, CHN, CODE_SHIFT, DATA_MASK, NUM, SKIP, SUB};
use crate::error::{HolterError, Result};
use crate::types::{FormatSpecifier, RecordingStart, WfdbFormat};
use crate::wfdb::{WfdbHeader, WFDB_INVALID_SAMPLE};

/// Renders a WFDB header as text.
///
/// The record line always carries the sample count when a base time is
/// present, since the fields are positional.
pub fn format_header(header: &WfdbHeader) -> String {
    let mut out = format!(
        "{} {} {}",
        header.record_name,
        header.signals.len(),
        header.sampling_frequency
    );
    if header.sample_count.is_some() || header.start.is_some() {
        out.push_str(&format!(" {}", header.sample_count.unwrap_or(0)));
    }
    match &header.start {
        Some(RecordingStart::DateTime(dt)) => {
            out.push_str(&dt.format(" %H:%M:%S %d/%m/%Y").to_string());
        }
        Some(RecordingStart::TimeOnly(t)) => {
            out.push_str(&t.format(" %H:%M:%S").to_string());
        }
        None => {}
    }
    out.push('\n');

    for signal in &header.signals {
        let mut format = signal.format.code().to_string();
        if signal.byte_offset > 0 {
            format.push_str(&format!("+{}", signal.byte_offset));
        }
        out.push_str(&format!(
            "{} {} {}({})/{} {} {} {} 0 0",
            signal.file_name,
            format,
            signal.gain,
            signal.baseline,
            signal.units,
            signal.adc_resolution,
            signal.adc_zero,
            signal.initial_value
        ));
        if !signal.description.is_empty() {
            out.push(' ');
            out.push_str(&signal.description);
        }
        out.push('\n');
    }
    out
}

/// Writes `header` to `path`.
pub fn write_header<P: AsRef<Path>>(path: P, header: &WfdbHeader) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(format_header(header).as_bytes())?;
    file.flush()?;
    Ok(())
}

/// Writes the two-line legacy header read by the fallback path:
/// `name channels rate 0 time date` then `name format`.
pub fn write_legacy_header<P: AsRef<Path>>(
    path: P,
    channels: usize,
    sample_rate: u32,
    start: Option<&RecordingStart>,
    format: FormatSpecifier,
) -> Result<()> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ecg".to_string());

    let stamp = match start {
        // day/month without padding, as the recorder writes them
        Some(RecordingStart::DateTime(dt)) => dt.format(" %H:%M:%S %-d/%-m/%Y").to_string(),
        Some(RecordingStart::TimeOnly(t)) => t.format(" %H:%M:%S").to_string(),
        None => String::new(),
    };

    let mut file = BufWriter::new(File::create(path)?);
    writeln!(file, "{} {} {} 0{}", name, channels, sample_rate, stamp)?;
    writeln!(file, "{} {}", name, format.code())?;
    file.flush()?;
    Ok(())
}

/// Interleaves per-channel samples into a WFDB signal file body.
///
/// Channels shorter than the first are padded with the invalid sample.
/// Values outside the format's range are clamped.
pub fn encode_frames(format: WfdbFormat, channels: &[Vec<i32>]) -> Vec<u8> {
    let samples = interleave(channels);
    let mut out = Vec::with_capacity((samples.len() as f64 * format.bytes_per_sample()).ceil() as usize);

    match format {
        WfdbFormat::Fmt16 => {
            for v in samples {
                out.extend_from_slice(&clamp_i16(v).to_le_bytes());
            }
        }
        WfdbFormat::Fmt61 => {
            for v in samples {
                out.extend_from_slice(&clamp_i16(v).to_be_bytes());
            }
        }
        WfdbFormat::Fmt80 => {
            for v in samples {
                let byte = if v == WFDB_INVALID_SAMPLE {
                    0
                } else {
                    (v.clamp(-127, 127) + 128) as u8
                };
                out.push(byte);
            }
        }
        WfdbFormat::Fmt160 => {
            for v in samples {
                let word = (clamp_i16(v) as i32 + 32768) as u16;
                out.extend_from_slice(&word.to_le_bytes());
            }
        }
        WfdbFormat::Fmt212 => {
            for pair in samples.chunks(2) {
                let first = pack_12(pair[0]);
                out.push((first & 0xff) as u8);
                match pair.get(1) {
                    Some(&v) => {
                        let second = pack_12(v);
                        out.push((((first >> 8) & 0x0f) | (((second >> 8) & 0x0f) << 4)) as u8);
                        out.push((second & 0xff) as u8);
                    }
                    None => out.push(((first >> 8) & 0x0f) as u8),
                }
            }
        }
    }
    out
}

/// Interleaves per-channel samples in one of the legacy encodings.
///
/// Format 81 stores the low byte of each value; the 16-bit formats store
/// the value masked to their bit width.
pub fn encode_legacy_frames(format: FormatSpecifier, channels: &[Vec<i32>]) -> Vec<u8> {
    match format {
        FormatSpecifier::Signed8 => interleave(channels)
            .into_iter()
            .map(|v| v.clamp(i8::MIN as i32, i8::MAX as i32) as i8 as u8)
            .collect(),
        FormatSpecifier::Masked16(masked) => {
            let mask = (1u32 << masked.bits()) - 1;
            let mut out = Vec::new();
            for v in interleave(channels) {
                let word = (v.max(0) as u32 & mask) as u16;
                if masked.is_big_endian() {
                    out.extend_from_slice(&word.to_be_bytes());
                } else {
                    out.extend_from_slice(&word.to_le_bytes());
                }
            }
            out
        }
        FormatSpecifier::Wfdb(wfdb) => encode_frames(wfdb, channels),
    }
}

fn interleave(channels: &[Vec<i32>]) -> Vec<i32> {
    let frames = channels.first().map_or(0, Vec::len);
    let mut out = Vec::with_capacity(frames * channels.len());
    for i in 0..frames {
        for channel in channels {
            out.push(channel.get(i).copied().unwrap_or(WFDB_INVALID_SAMPLE));
        }
    }
    out
}

fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn pack_12(v: i32) -> u16 {
    let v = if v == WFDB_INVALID_SAMPLE { -2048 } else { v.clamp(-2047, 2047) };
    (v as u16) & 0x0fff
}

/// Writes MIT-format annotation files.
///
/// Annotations must be put in time order; a backwards step is encoded as
/// a negative SKIP, which readers accept but which breaks beat searches.
///
/// ```rust
/// use holterdata::annotation::{read_annotations, RawAnnotation};
/// use holterdata::writer::AnnotationWriter;
///
/// let mut writer = AnnotationWriter::create("notes.atr")?;
/// writer.put(&RawAnnotation::new(360, 1))?;
/// writer.put(&RawAnnotation::new(700, 5).with_aux("PVC"))?;
/// writer.finalize()?;
///
/// let anns = read_annotations("notes.atr")?;
/// assert_eq!(anns.len(), 2);
/// assert_eq!(anns[1].aux_text().as_str(), "PVC");
/// # std::fs::remove_file("notes.atr").ok();
/// # Ok::<(), holterdata::HolterError>(())
/// ```
pub struct AnnotationWriter<W: Write> {
    inner: W,
    time: i64,
    chan: u8,
    num: i8,
}

impl AnnotationWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(AnnotationWriter::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> AnnotationWriter<W> {
    pub fn new(inner: W) -> Self {
        AnnotationWriter {
            inner,
            time: 0,
            chan: 0,
            num: 0,
        }
    }

    fn word(&mut self, code: u8, data: u16) -> Result<()> {
        let word = ((code as u16) << CODE_SHIFT) | (data & DATA_MASK);
        self.inner.write_all(&word.to_le_bytes())?;
        Ok(())
    }

    pub fn put(&mut self, ann: &RawAnnotation) -> Result<()> {
        if ann.anntyp == 0 || ann.anntyp >= SKIP {
            return Err(HolterError::MalformedAnnotation(format!(
                "annotation code {} cannot be stored",
                ann.anntyp
            )));
        }

        let delta = ann.time - self.time;
        if (0..=DATA_MASK as i64).contains(&delta) {
            self.word(ann.anntyp, delta as u16)?;
        } else {
            let interval = i32::try_from(delta).map_err(|_| {
                HolterError::MalformedAnnotation(format!("interval {} does not fit a SKIP", delta))
            })? as u32;
            self.word(SKIP, 0)?;
            self.inner.write_all(&((interval >> 16) as u16).to_le_bytes())?;
            self.inner.write_all(&((interval & 0xffff) as u16).to_le_bytes())?;
            self.word(ann.anntyp, 0)?;
        }
        self.time = ann.time;

        if ann.subtyp != 0 {
            self.word(SUB, ann.subtyp as u8 as u16)?;
        }
        if ann.chan != self.chan {
            self.chan = ann.chan;
            self.word(CHN, ann.chan as u16)?;
        }
        if ann.num != self.num {
            self.num = ann.num;
            self.word(NUM, ann.num as u8 as u16)?;
        }
        if let Some((&declared, rest)) = ann.aux.as_deref().and_then(<[u8]>::split_first) {
            let text = &rest[..(declared as usize).min(rest.len())];
            self.word(AUX, text.len() as u16)?;
            self.inner.write_all(text)?;
            if text.len() % 2 == 1 {
                self.inner.write_all(&[0])?;
            }
        }
        Ok(())
    }

    /// Writes the terminating zero word and flushes.
    pub fn finalize(mut self) -> Result<()> {
        self.inner.write_all(&[0, 0])?;
        self.inner.flush()?;
        Ok(())
    }
}

// Internal utilities for documentation tests
// Helpers that write small synthetic recordings next to the doctest

use std::fs;
use std::path::Path;

use chrono::NaiveDate;

use crate::annotation::RawAnnotation;
use crate::types::{FormatSpecifier, RecordingStart, WfdbFormat};
use crate::wfdb::{WfdbHeader, WfdbSignal};
use crate::writer::{encode_frames, encode_legacy_frames, write_header, write_legacy_header, AnnotationWriter};
use crate::Result;

const RATE: u32 = 200;
const SECONDS: usize = 20;

/// One ECG-like channel: a spike every second over a slow wave.
fn synthetic_channel(amplitude: i32, seconds: usize, rate: u32) -> Vec<i32> {
    let rate = rate as usize;
    (0..seconds * rate)
        .map(|i| {
            let t = i as f64 / rate as f64;
            let wave = (amplitude as f64 * 0.2 * (2.0 * std::f64::consts::PI * 0.5 * t).sin()) as i32;
            if i % rate < 4 {
                wave + amplitude
            } else {
                wave
            }
        })
        .collect()
}

/// Beats once per second, every fifth one a PVC, with pacer spikes in the first minute.
fn synthetic_annotations(seconds: usize, rate: u32) -> Vec<RawAnnotation> {
    let mut anns = Vec::new();
    for s in 0..seconds {
        let position = (s as u32 * rate) as i64;
        if s % 7 == 3 {
            anns.push(RawAnnotation::new(position + 150, 26));
        }
        let code = if s % 5 == 4 { 5 } else { 1 };
        anns.push(RawAnnotation::new(position + 2, code));
    }
    anns.sort_by_key(|a| a.time);
    anns
}

fn write_annotations(path: &Path, anns: &[RawAnnotation]) -> Result<()> {
    let mut writer = AnnotationWriter::create(path)?;
    for ann in anns {
        writer.put(ann)?;
    }
    writer.finalize()
}

/// Creates a two-channel format 81 recording with its legacy header and annotations
pub fn create_legacy_recording<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let channels = vec![
        synthetic_channel(60, SECONDS, RATE),
        synthetic_channel(-40, SECONDS, RATE),
    ];
    fs::write(path, encode_legacy_frames(FormatSpecifier::Signed8, &channels))?;

    let start = NaiveDate::from_ymd_opt(2023, 4, 17)
        .and_then(|d| d.and_hms_opt(9, 15, 0))
        .map(RecordingStart::DateTime);
    write_legacy_header(
        path.with_extension("hea"),
        channels.len(),
        RATE,
        start.as_ref(),
        FormatSpecifier::Signed8,
    )?;
    write_annotations(&path.with_extension("atr"), &synthetic_annotations(SECONDS, RATE))
}

/// Creates a two-channel WFDB record in format 212 with annotations
pub fn create_wfdb_record<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".to_string());
    let file_name = format!("{}.dat", name);
    let directory = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();

    let channels = vec![
        synthetic_channel(800, SECONDS, RATE),
        synthetic_channel(400, SECONDS, RATE),
    ];
    fs::write(directory.join(&file_name), encode_frames(WfdbFormat::Fmt212, &channels))?;

    let signal = WfdbSignal::new(&file_name, WfdbFormat::Fmt212);
    let header = WfdbHeader {
        record_name: name,
        sampling_frequency: RATE as f64,
        sample_count: Some((SECONDS as u32 * RATE) as u64),
        start: None,
        signals: vec![signal.clone(), signal],
        directory: directory.clone(),
    };
    write_header(path.with_extension("hea"), &header)?;
    write_annotations(&path.with_extension("atr"), &synthetic_annotations(SECONDS, RATE))
}

/// Removes the data, header and annotation files of a test recording
pub fn remove_recording<P: AsRef<Path>>(path: P) {
    let path = path.as_ref();
    for ext in ["dat", "hea", "atr"] {
        fs::remove_file(path.with_extension(ext)).ok();
    }
}

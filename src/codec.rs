//! Raw sample decoding into normalised 16-bit channel data.
//!
//! Decoding runs on the caller's thread in chunks of
//! [`LoadOptions::progress_chunk`] frames. Before each chunk the decoder
//! reports progress and checks the [`CancelToken`]; a cancelled decode keeps
//! every whole second decoded so far.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::LoadOptions;
use crate::store::ChannelStore;
use crate::types::{FormatSpecifier, Masked16Format, RecordingDescriptor};
use crate::utils::round_to_int;
use crate::wfdb::{FrameReader, WFDB_INVALID_SAMPLE};

/// Cooperative cancellation flag shared between the decoder and whoever may
/// want to stop it (usually a "Cancel" button).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Callbacks fired while a recording loads. All methods default to no-ops.
pub trait LoadObserver {
    /// Size of the work ahead, in the same unit as [`LoadObserver::on_progress`].
    fn on_load_size_known(&mut self, _total: u64) {}
    fn on_progress(&mut self, _loaded: u64) {}
    fn on_load_finished(&mut self) {}
    /// A pacer spike was read from the annotations (raw position, before delay correction).
    fn on_pacer_spike_found(&mut self, _position: i64) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl LoadObserver for NullObserver {}

/// Result of a decode: complete, or stopped early by the cancel token.
/// Both carry a valid store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    Complete(ChannelStore),
    Cancelled(ChannelStore),
}

impl DecodeOutcome {
    pub fn store(&self) -> &ChannelStore {
        match self {
            DecodeOutcome::Complete(store) | DecodeOutcome::Cancelled(store) => store,
        }
    }

    pub fn into_store(self) -> ChannelStore {
        match self {
            DecodeOutcome::Complete(store) | DecodeOutcome::Cancelled(store) => store,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DecodeOutcome::Cancelled(_))
    }
}

/// Converts raw recordings described by a [`RecordingDescriptor`].
pub struct SampleDecoder<'a> {
    descriptor: &'a RecordingDescriptor,
    chunk: usize,
}

impl<'a> SampleDecoder<'a> {
    pub fn new(descriptor: &'a RecordingDescriptor, options: &LoadOptions) -> Self {
        SampleDecoder {
            descriptor,
            chunk: options.chunk(),
        }
    }

    /// Decodes a legacy data file held in memory.
    ///
    /// Format 81 and 16xx announce the raw byte length and count progress in
    /// bytes consumed. WFDB formats behave like [`SampleDecoder::decode_wfdb`].
    pub fn decode_raw(
        &self,
        raw: &[u8],
        cancel: &CancelToken,
        observer: &mut dyn LoadObserver,
    ) -> DecodeOutcome {
        let d = self.descriptor;
        let channels = d.channel_count.max(1);
        let format = d.format;
        let stride = format.bytes_per_sample() * channels as f64;
        let frame_bytes = stride.round() as u64;
        let available = (raw.len() as f64 / stride) as u64;
        let frames = d.total_samples().min(available) as usize;

        log::debug!(
            "decoding {} frames of format {} ({} channels, {} bytes)",
            frames,
            format,
            channels,
            raw.len()
        );

        match format {
            FormatSpecifier::Signed8 => {
                observer.on_load_size_known(raw.len() as u64);
                let scale = d.range_per_sample / 2f64.powf(8.0 * d.bytes_per_sample);
                self.run(frames, frame_bytes, cancel, observer, |i, out| {
                    let base = i * channels;
                    for (ch, data) in out.iter_mut().enumerate() {
                        data.push(normalize_signed8(raw[base + ch], scale));
                    }
                    true
                })
            }
            FormatSpecifier::Masked16(masked) => {
                observer.on_load_size_known(raw.len() as u64);
                let scale = d.range_per_sample / 2f64.powi(masked.bits() as i32);
                self.run(frames, frame_bytes, cancel, observer, |i, out| {
                    let base = i * channels * 2;
                    for (ch, data) in out.iter_mut().enumerate() {
                        let at = base + ch * 2;
                        data.push(normalize_masked16(masked, [raw[at], raw[at + 1]], scale));
                    }
                    true
                })
            }
            FormatSpecifier::Wfdb(wfdb) => {
                let reader = FrameReader::new(raw, wfdb, channels, Some(frames as u64));
                self.decode_wfdb(reader, cancel, observer)
            }
        }
    }

    /// Decodes a WFDB record frame by frame.
    ///
    /// Progress is counted in samples (frames × channels).
    pub fn decode_wfdb(
        &self,
        mut frames: FrameReader<'_>,
        cancel: &CancelToken,
        observer: &mut dyn LoadObserver,
    ) -> DecodeOutcome {
        let d = self.descriptor;
        let channels = frames.channel_count();
        let total = frames.frames_remaining() as usize;
        observer.on_load_size_known((total * channels) as u64);

        log::debug!(
            "decoding {} WFDB frames ({} channels, device range {} mV)",
            total,
            channels,
            d.device_range_mv
        );

        let params: Vec<ChannelParams> = (0..channels)
            .map(|ch| ChannelParams {
                gain: d.gain(ch),
                adc_zero: d.adc_zero(ch) as f64,
                invalid_substitute: d
                    .channels
                    .get(ch)
                    .map_or(0, |c| (1i64 << c.adc_resolution.min(31)) / 2)
                    as i32,
            })
            .collect();

        let mut frame = vec![0i32; channels];
        self.run(total, channels as u64, cancel, observer, |_, out| {
            if !frames.read_frame(&mut frame) {
                return false;
            }
            for ((data, &raw), p) in out.iter_mut().zip(frame.iter()).zip(params.iter()) {
                let raw = if raw == WFDB_INVALID_SAMPLE {
                    p.invalid_substitute
                } else {
                    raw
                };
                data.push(normalize_wfdb(
                    raw,
                    p,
                    d.range_per_sample,
                    d.device_range_mv,
                ));
            }
            true
        })
    }

    /// Drives `decode_frame` over `frames` frames in chunks, reporting
    /// progress and polling `cancel` at each chunk boundary. Progress is
    /// `frames decoded × progress_scale`.
    fn run<F>(
        &self,
        frames: usize,
        progress_scale: u64,
        cancel: &CancelToken,
        observer: &mut dyn LoadObserver,
        mut decode_frame: F,
    ) -> DecodeOutcome
    where
        F: FnMut(usize, &mut [Vec<u16>]) -> bool,
    {
        let d = self.descriptor;
        let mut out: Vec<Vec<u16>> = (0..d.channel_count.max(1))
            .map(|_| Vec::with_capacity(frames))
            .collect();

        let mut decoded = 0usize;
        let mut cancelled = false;
        'chunks: while decoded < frames {
            observer.on_progress(decoded as u64 * progress_scale);
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let end = (decoded + self.chunk).min(frames);
            while decoded < end {
                if !decode_frame(decoded, &mut out) {
                    break 'chunks;
                }
                decoded += 1;
            }
        }

        let store = ChannelStore::new(out, d.sample_rate);
        if cancelled {
            log::info!(
                "decode cancelled after {} frames, keeping {} s",
                decoded,
                store.duration_seconds()
            );
            DecodeOutcome::Cancelled(store)
        } else {
            observer.on_progress(decoded as u64 * progress_scale);
            log::debug!("decoded {} s of data", store.duration_seconds());
            DecodeOutcome::Complete(store)
        }
    }
}

struct ChannelParams {
    gain: f64,
    adc_zero: f64,
    invalid_substitute: i32,
}

fn saturate(value: i64) -> u16 {
    value.clamp(0, u16::MAX as i64) as u16
}

/// Format 81: the signed byte is doubled and re-centred around 0x80
/// (wrapping), then scaled to the digital range.
fn normalize_signed8(byte: u8, scale: f64) -> u16 {
    let unsigned = ((byte as i8 as i32) * 2 + 0x80) as u8;
    saturate(round_to_int(unsigned as f64 * scale))
}

fn normalize_masked16(format: Masked16Format, bytes: [u8; 2], scale: f64) -> u16 {
    saturate(round_to_int(format.unpack(bytes) as f64 * scale))
}

fn normalize_wfdb(raw: i32, p: &ChannelParams, range_per_sample: f64, device_range_mv: f64) -> u16 {
    let delta = (raw as f64 - p.adc_zero) * range_per_sample / device_range_mv / p.gain;
    let value = range_per_sample / 2.0 + round_to_int(delta) as f64;
    saturate(value as i64)
}

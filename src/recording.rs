use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::codec::{CancelToken, LoadObserver, NullObserver, SampleDecoder};
use crate::config::LoadOptions;
use crate::error::{HolterError, Result};
use crate::header::{HeaderResolver, HeaderSource, ResolvedHeader};
use crate::store::ChannelStore;
use crate::timeline::{AnnotationTimeline, SearchDirection};
use crate::types::{Beat, RecordingDescriptor};
use crate::CHANNEL_MAX;

/// An opened Holter recording: decoded samples plus its annotations
///
/// `Recording` ties the pipeline together. Opening one resolves the header,
/// decodes the data file into a [`ChannelStore`] and loads the annotation
/// file that sits next to it into an [`AnnotationTimeline`]. After `open`
/// returns everything is read-only.
///
/// # Examples
///
/// ## Basic usage
///
/// ```rust
/// use holterdata::{open_recording, SearchDirection};
///
/// # // Generate test files (hidden from docs)
/// # holterdata::doctest_utils::create_legacy_recording("holter.dat")?;
/// #
/// let recording = open_recording("holter.dat")?;
///
/// let descriptor = recording.descriptor();
/// println!("{} channels at {} Hz", descriptor.channel_count, descriptor.sample_rate);
/// println!("Duration: {} s", descriptor.duration_seconds);
///
/// // Eight seconds of the first channel
/// let window = recording.get(0, 0, recording.sample_count());
/// println!("First sample: {}", window[0]);
///
/// // Beat closest to the 2 second mark
/// if let Some(beat) = recording.beats_near(2 * descriptor.sample_rate as i64, SearchDirection::Closest) {
///     println!("{} at sample {}", beat.label(), beat.position);
/// }
///
/// # // Cleanup (hidden from docs)
/// # holterdata::doctest_utils::remove_recording("holter.dat");
/// # Ok::<(), holterdata::HolterError>(())
/// ```
///
/// ## Progress and cancellation
///
/// ```rust
/// use holterdata::{CancelToken, LoadObserver, LoadOptions, Recording};
///
/// struct Progress {
///     total: u64,
///     cancel: CancelToken,
/// }
///
/// impl LoadObserver for Progress {
///     fn on_load_size_known(&mut self, total: u64) {
///         self.total = total;
///     }
///
///     fn on_progress(&mut self, loaded: u64) {
///         // Stop after the first chunk
///         if loaded >= 1000 {
///             self.cancel.cancel();
///         }
///     }
/// }
///
/// # holterdata::doctest_utils::create_legacy_recording("partial.dat")?;
/// let cancel = CancelToken::new();
/// let mut progress = Progress { total: 0, cancel: cancel.clone() };
/// let recording = Recording::open("partial.dat", &LoadOptions::default(), &cancel, &mut progress)?;
///
/// assert!(recording.was_cancelled());
/// println!("Kept {} s", recording.store().duration_seconds());
/// # holterdata::doctest_utils::remove_recording("partial.dat");
/// # Ok::<(), holterdata::HolterError>(())
/// ```
#[derive(Debug)]
pub struct Recording {
    path: PathBuf,
    header: ResolvedHeader,
    store: ChannelStore,
    timeline: AnnotationTimeline,
    cancelled: bool,
    /// Why the annotation file could not be read, if it could not
    annotation_error: Option<HolterError>,
}

impl Recording {
    /// Opens and decodes the recording stored at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Data file of the recording (`.dat`, `.ecg`, ...)
    /// * `options` - Load parameters, usually `LoadOptions::default()`
    /// * `cancel` - Checked between decode chunks
    /// * `observer` - Receives size, progress, pacer spike and finish notifications
    ///
    /// # Errors
    ///
    /// * `HolterError::DataFileMissing` - The data file (or the WFDB signal file) does not exist
    /// * `HolterError::Io` - The data file exists but cannot be read
    ///
    /// A missing header or annotation file is not an error: defaults are
    /// used and [`Recording::annotation_error`] tells what went wrong. A
    /// cancelled decode is not an error either; the recording holds the
    /// whole seconds decoded so far.
    pub fn open<P: AsRef<Path>>(
        path: P,
        options: &LoadOptions,
        cancel: &CancelToken,
        observer: &mut dyn LoadObserver,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut header = HeaderResolver::new(options).resolve(path)?;

        let data = fs::read(&header.data_path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => HolterError::DataFileMissing {
                path: header.data_path.clone(),
            },
            _ => HolterError::Io(e),
        })?;

        let decoder = SampleDecoder::new(&header.descriptor, options);
        let outcome = match header.wfdb() {
            Some(wfdb) => decoder.decode_wfdb(wfdb.frames(&data), cancel, observer),
            None => decoder.decode_raw(&data, cancel, observer),
        };
        let cancelled = outcome.is_cancelled();
        let mut store = outcome.into_store();
        store.truncate_to_seconds(header.descriptor.duration_seconds);
        header.descriptor.duration_seconds = store.duration_seconds();

        let mut timeline = AnnotationTimeline::new(header.descriptor.sample_rate)
            .with_pacer_filter_delay(options.pacer_filter_delay);
        let annotation_error = match timeline.load_file(path, &options.annotation_extension, observer) {
            Ok(()) => None,
            Err(e) => {
                log::warn!("annotations for {} not loaded: {}", path.display(), e);
                Some(e)
            }
        };

        observer.on_load_finished();

        Ok(Recording {
            path: path.to_path_buf(),
            header,
            store,
            timeline,
            cancelled,
            annotation_error,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Descriptor of the decoded data; after a cancelled decode its
    /// duration is the truncated one.
    pub fn descriptor(&self) -> &RecordingDescriptor {
        &self.header.descriptor
    }

    pub fn header_source(&self) -> &HeaderSource {
        &self.header.source
    }

    pub fn store(&self) -> &ChannelStore {
        &self.store
    }

    pub fn timeline(&self) -> &AnnotationTimeline {
        &self.timeline
    }

    /// Mutable timeline, for pacer spikes pushed by the caller.
    pub fn timeline_mut(&mut self) -> &mut AnnotationTimeline {
        &mut self.timeline
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn annotation_error(&self) -> Option<&HolterError> {
        self.annotation_error.as_ref()
    }

    /// Sample window, see [`ChannelStore::get`].
    pub fn get(&self, channel: usize, start: i64, duration: i64) -> &[u16] {
        self.store.get(channel, start, duration)
    }

    /// Default window size: eight seconds of samples.
    pub fn sample_count(&self) -> i64 {
        self.store.sample_count()
    }

    pub fn beats(&self) -> &[Beat] {
        self.timeline.beats()
    }

    pub fn beats_near(&self, position: i64, direction: SearchDirection) -> Option<&Beat> {
        self.timeline
            .find_beat_near(position, direction)
            .and_then(|i| self.timeline.beat(i))
    }

    pub fn pace_count_for_minute(&self, minute: u32) -> u32 {
        self.timeline.pace_count_for_minute(minute)
    }

    /// Windows of the channels `ctx` marks visible, paired with their index.
    pub fn visible_windows<'a>(
        &'a self,
        ctx: &ViewContext,
        start: i64,
        duration: i64,
    ) -> Vec<(usize, &'a [u16])> {
        (0..self.store.channel_count())
            .filter(|&ch| ctx.is_visible(ch))
            .map(|ch| (ch, self.store.get(ch, start, duration)))
            .collect()
    }
}

/// Opens a recording with default options, no cancellation and no observer.
pub fn open_recording<P: AsRef<Path>>(path: P) -> Result<Recording> {
    Recording::open(path, &LoadOptions::default(), &CancelToken::new(), &mut NullObserver)
}

/// Per-view display state handed to queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewContext {
    pub visible: [bool; CHANNEL_MAX],
}

impl Default for ViewContext {
    fn default() -> Self {
        ViewContext {
            visible: [true; CHANNEL_MAX],
        }
    }
}

impl ViewContext {
    /// Only `channel` visible.
    pub fn only(channel: usize) -> Self {
        let mut ctx = ViewContext {
            visible: [false; CHANNEL_MAX],
        };
        ctx.set_visible(channel, true);
        ctx
    }

    pub fn set_visible(&mut self, channel: usize, visible: bool) {
        if let Some(slot) = self.visible.get_mut(channel) {
            *slot = visible;
        }
    }

    pub fn is_visible(&self, channel: usize) -> bool {
        self.visible.get(channel).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_context() {
        let mut ctx = ViewContext::default();
        assert!(ctx.is_visible(11));
        assert!(!ctx.is_visible(12));
        ctx.set_visible(3, false);
        ctx.set_visible(40, false);
        assert!(!ctx.is_visible(3));

        let only = ViewContext::only(2);
        assert_eq!(only.visible.iter().filter(|v| **v).count(), 1);
        assert!(only.is_visible(2));
    }
}

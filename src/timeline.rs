//! Time-ordered beats and pacer spikes of one recording.
//!
//! Beats are kept in file order, which is assumed to be non-decreasing in
//! position; every search below relies on it. Pacer spikes live in their
//! own sorted list together with per-minute counts.

use std::collections::BTreeMap;
use std::path::Path;

use crate::annotation::{AnnotationReader, RawAnnotation};
use crate::classify::AnnotationCode;
use crate::codec::{LoadObserver, NullObserver};
use crate::error::Result;
use crate::types::{Beat, PacerEvent};
use crate::PACER_FILTER_DELAY;

/// Tie-break policy of [`AnnotationTimeline::find_beat_near`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SearchDirection {
    /// Exact position, or wherever the search converged
    Exact,
    /// The converged beat, or the one after it when the converged beat is earlier
    CanBeHigher,
    /// The converged beat, or the one before it when the converged beat is later
    CanBeLower,
    /// Nearest neighbour; equal distances pick the earlier beat
    #[default]
    Closest,
}

/// Result of a linear scan for a beat of a given kind.
///
/// The historical navigation API signalled "not found" with the start
/// index (forward scans) or -1 (backward scans). Those values are still
/// available through [`TypeScan::legacy_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeScan {
    Found(usize),
    /// Nothing matched; the index the caller should stay at
    Fallback(usize),
    /// Nothing matched and there is no index to fall back to
    Exhausted,
}

impl TypeScan {
    pub fn found(self) -> Option<usize> {
        match self {
            TypeScan::Found(i) => Some(i),
            _ => None,
        }
    }

    pub fn legacy_index(self) -> i64 {
        match self {
            TypeScan::Found(i) | TypeScan::Fallback(i) => i as i64,
            TypeScan::Exhausted => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationTimeline {
    beats: Vec<Beat>,
    pacers: Vec<PacerEvent>,
    pace_per_minute: BTreeMap<u32, u32>,
    sample_rate: u32,
    pacer_filter_delay: i64,
}

impl AnnotationTimeline {
    /// Creates an empty timeline for a recording sampled at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        AnnotationTimeline {
            beats: Vec::new(),
            pacers: Vec::new(),
            pace_per_minute: BTreeMap::new(),
            sample_rate: sample_rate.max(1),
            pacer_filter_delay: PACER_FILTER_DELAY,
        }
    }

    pub fn from_beats(beats: Vec<Beat>, sample_rate: u32) -> Self {
        AnnotationTimeline {
            beats,
            ..AnnotationTimeline::new(sample_rate)
        }
    }

    /// Samples subtracted from each stored pacer position.
    pub fn with_pacer_filter_delay(mut self, delay: i64) -> Self {
        self.pacer_filter_delay = delay;
        self
    }

    /// Loads the annotation file that sits next to `record_path` with the
    /// given extension (`100.dat` + `atr` → `100.atr`).
    pub fn load<P: AsRef<Path>>(record_path: P, extension: &str, sample_rate: u32) -> Result<Self> {
        let mut timeline = AnnotationTimeline::new(sample_rate);
        timeline.load_file(record_path, extension, &mut NullObserver)?;
        Ok(timeline)
    }

    /// Replaces the beats, pacers and per-minute pacer counts with the
    /// contents of the annotation file next to `record_path`. On failure the
    /// timeline is left untouched.
    pub fn load_file<P: AsRef<Path>>(
        &mut self,
        record_path: P,
        extension: &str,
        observer: &mut dyn LoadObserver,
    ) -> Result<()> {
        let path = annotation_path(record_path.as_ref(), extension);
        log::debug!("loading annotations from {}", path.display());
        let reader = AnnotationReader::open(&path)?;
        self.beats.clear();
        self.pacers.clear();
        self.pace_per_minute.clear();
        self.extend(reader, observer);
        log::debug!(
            "{} annotations, {} pacer spikes",
            self.beats.len(),
            self.pacers.len()
        );
        Ok(())
    }

    /// Appends annotations in stream order. Pacer spike annotations also
    /// feed the pacer list.
    pub fn extend<I>(&mut self, annotations: I, observer: &mut dyn LoadObserver)
    where
        I: IntoIterator<Item = RawAnnotation>,
    {
        for ann in annotations {
            let beat = ann.to_beat();
            if beat.code == AnnotationCode::PacerSpike {
                observer.on_pacer_spike_found(beat.position);
                self.store_pacer_position(beat.position);
            }
            self.beats.push(beat);
        }
    }

    pub fn beats(&self) -> &[Beat] {
        &self.beats
    }

    pub fn beat(&self, index: usize) -> Option<&Beat> {
        self.beats.get(index)
    }

    pub fn len(&self) -> usize {
        self.beats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beats.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Binary search for the beat nearest `position`.
    ///
    /// The search narrows `[imin, imax]` until the bounds meet, then applies
    /// `direction` to the converged candidate. Returns `None` on an empty
    /// timeline, or when a directional search runs off either end.
    pub fn find_beat_near(&self, position: i64, direction: SearchDirection) -> Option<usize> {
        if self.beats.is_empty() {
            return None;
        }
        let count = self.beats.len();
        let pos = |i: usize| self.beats[i].position;

        let mut imin = 0usize;
        let mut imax = count - 1;
        while imax > imin {
            let imid = (imin + imax) / 2;
            let value = pos(imid);
            if position < value {
                imax = imid.saturating_sub(1).max(imin);
            } else if position > value {
                imin = (imid + 1).min(imax);
            } else {
                return Some(imid);
            }
        }

        if pos(imin) == position {
            return Some(imin);
        }

        match direction {
            SearchDirection::Exact => Some(imin),
            SearchDirection::CanBeHigher => {
                if pos(imin) < position {
                    (imin + 1 < count).then_some(imin + 1)
                } else {
                    Some(imin)
                }
            }
            SearchDirection::CanBeLower => {
                if pos(imin) > position {
                    imin.checked_sub(1)
                } else {
                    Some(imin)
                }
            }
            SearchDirection::Closest => {
                let prev = if pos(imin) > position {
                    match imin.checked_sub(1) {
                        Some(p) => p,
                        None => return Some(imin),
                    }
                } else {
                    imin
                };
                let next = prev + 1;
                if next >= count {
                    return Some(prev);
                }
                if position - pos(prev) <= pos(next) - position {
                    Some(prev)
                } else {
                    Some(next)
                }
            }
        }
    }

    /// Closest earlier beat that is neither paced nor a rhythm change.
    pub fn previous_non_paced_beat(&self, index: usize) -> Option<&Beat> {
        let end = index.min(self.beats.len());
        self.beats[..end]
            .iter()
            .rev()
            .find(|b| !b.code.is_paced_or_rhythm())
    }

    /// First beat after `index` with the given code.
    pub fn next_of_type(&self, index: usize, code: AnnotationCode) -> TypeScan {
        self.scan_forward(index, |b| b.code == code)
            .map_or(TypeScan::Fallback(index), TypeScan::Found)
    }

    /// Last beat before `index` with the given code.
    pub fn prev_of_type(&self, index: usize, code: AnnotationCode) -> TypeScan {
        self.scan_backward(index, |b| b.code == code)
            .map_or(TypeScan::Exhausted, TypeScan::Found)
    }

    /// Next rhythm change or AF episode bracket after `index`.
    ///
    /// Annotation codes are 6 bits wide, so beat types `'A'` (65) and
    /// `'a'` (97) never occur in a file. AF episodes are matched by their
    /// `(`/`)` brackets carrying subtype `'a'` instead.
    pub fn next_af_related(&self, index: usize) -> TypeScan {
        self.scan_forward(index, is_af_related)
            .map_or(TypeScan::Fallback(index), TypeScan::Found)
    }

    /// Previous rhythm change or AF episode bracket. Falls back to the first beat.
    pub fn prev_af_related(&self, index: usize) -> TypeScan {
        self.scan_backward(index, is_af_related)
            .map_or(TypeScan::Fallback(0), TypeScan::Found)
    }

    fn scan_forward<F: Fn(&Beat) -> bool>(&self, index: usize, pred: F) -> Option<usize> {
        let start = index.saturating_add(1);
        self.beats
            .get(start..)?
            .iter()
            .position(pred)
            .map(|offset| start + offset)
    }

    fn scan_backward<F: Fn(&Beat) -> bool>(&self, index: usize, pred: F) -> Option<usize> {
        let end = index.min(self.beats.len());
        self.beats[..end].iter().rposition(pred)
    }

    /// Beats with `start <= position < start + len`.
    pub fn beats_in_window(&self, start: i64, len: i64) -> &[Beat] {
        let end = start.saturating_add(len.max(0));
        let lo = self.beats.partition_point(|b| b.position < start);
        let hi = self.beats.partition_point(|b| b.position < end).max(lo);
        &self.beats[lo..hi]
    }

    /// Heart rate in beats per minute at beat `index`, from the interval to
    /// the previous non-paced beat.
    pub fn heart_rate_at(&self, index: usize) -> Option<u32> {
        let beat = self.beats.get(index)?;
        let prev = self.previous_non_paced_beat(index)?;
        let interval = beat.position - prev.position;
        if interval <= 0 {
            return None;
        }
        let bpm = (60.0 * self.sample_rate as f64 / interval as f64).round();
        Some(bpm as u32)
    }

    /// Records a pacer spike reported at `raw_position`.
    ///
    /// The position is corrected for the detection filter delay. Spikes that
    /// would land before the start of the recording are rejected. Returns
    /// the stored position.
    ///
    /// The list is kept sorted by position. Spikes arrive in time order when
    /// read from a file, so this matches appending them in arrival order.
    pub fn store_pacer_position(&mut self, raw_position: i64) -> Option<u32> {
        let corrected = raw_position - self.pacer_filter_delay;
        if corrected < 0 {
            log::debug!("pacer spike at {} rejected", raw_position);
            return None;
        }
        let position = u32::try_from(corrected).ok()?;

        let at = self.pacers.partition_point(|p| p.position <= position);
        self.pacers.insert(at, PacerEvent { position });

        let minute = position / self.sample_rate / 60;
        *self.pace_per_minute.entry(minute).or_insert(0) += 1;
        Some(position)
    }

    pub fn pacers(&self) -> &[PacerEvent] {
        &self.pacers
    }

    /// Pacer spikes with `start <= position < start + len`.
    pub fn pacers_in_window(&self, start: i64, len: i64) -> &[PacerEvent] {
        let lo = self.pacer_lower_bound(start);
        let hi = self.pacer_lower_bound(start.saturating_add(len.max(0))).max(lo);
        &self.pacers[lo..hi]
    }

    /// First pacer spike at or after `position`.
    pub fn next_pacer_after(&self, position: i64) -> Option<PacerEvent> {
        self.pacers.get(self.pacer_lower_bound(position)).copied()
    }

    /// Last pacer spike strictly before `position`.
    pub fn prev_pacer_before(&self, position: i64) -> Option<PacerEvent> {
        let lo = self.pacer_lower_bound(position);
        lo.checked_sub(1).and_then(|i| self.pacers.get(i)).copied()
    }

    fn pacer_lower_bound(&self, position: i64) -> usize {
        self.pacers
            .partition_point(|p| (p.position as i64) < position)
    }

    pub fn pace_count_for_minute(&self, minute: u32) -> u32 {
        self.pace_per_minute.get(&minute).copied().unwrap_or(0)
    }

    /// Minute index → number of pacer spikes, minutes without spikes omitted.
    pub fn pace_counts(&self) -> &BTreeMap<u32, u32> {
        &self.pace_per_minute
    }

    /// Status text for a minute with paced beats, `None` when there are none.
    pub fn pacer_summary(&self, minute: u32) -> Option<String> {
        match self.pace_count_for_minute(minute) {
            0 => None,
            n => Some(format!("{} Paced Beats during minute {}", n, minute)),
        }
    }
}

fn is_af_related(beat: &Beat) -> bool {
    match beat.code {
        AnnotationCode::Rhythm => true,
        AnnotationCode::EpisodeStart | AnnotationCode::EpisodeEnd => beat.subtype == b'a' as i8,
        _ => false,
    }
}

pub(crate) fn annotation_path(record_path: &Path, extension: &str) -> std::path::PathBuf {
    record_path.with_extension(extension.trim_start_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use AnnotationCode::*;

    fn timeline(positions: &[(i64, AnnotationCode)]) -> AnnotationTimeline {
        let beats = positions.iter().map(|&(p, c)| Beat::new(p, c)).collect();
        AnnotationTimeline::from_beats(beats, 200)
    }

    fn three() -> AnnotationTimeline {
        timeline(&[(10, Normal), (50, Normal), (100, Normal)])
    }

    #[test]
    fn test_find_beat_near_policies() {
        let t = three();
        assert_eq!(t.find_beat_near(50, SearchDirection::Exact), Some(1));
        assert_eq!(t.find_beat_near(60, SearchDirection::CanBeHigher), Some(2));
        assert_eq!(t.find_beat_near(60, SearchDirection::CanBeLower), Some(1));
        assert_eq!(t.find_beat_near(5, SearchDirection::CanBeLower), None);
        assert_eq!(t.find_beat_near(200, SearchDirection::CanBeHigher), None);
        assert_eq!(t.find_beat_near(55, SearchDirection::Closest), Some(1));
    }

    #[test]
    fn test_find_beat_near_edges() {
        let t = three();
        assert_eq!(t.find_beat_near(10, SearchDirection::CanBeLower), Some(0));
        assert_eq!(t.find_beat_near(100, SearchDirection::CanBeHigher), Some(2));
        assert_eq!(t.find_beat_near(0, SearchDirection::Closest), Some(0));
        assert_eq!(t.find_beat_near(1000, SearchDirection::Closest), Some(2));
        assert_eq!(t.find_beat_near(90, SearchDirection::Closest), Some(2));
        // equal distance: the earlier beat wins
        assert_eq!(t.find_beat_near(30, SearchDirection::Closest), Some(0));
        assert_eq!(t.find_beat_near(75, SearchDirection::Closest), Some(1));
        assert_eq!(AnnotationTimeline::new(200).find_beat_near(5, SearchDirection::Exact), None);
    }

    #[test]
    fn test_find_beat_near_matches_scan() {
        let positions: Vec<(i64, AnnotationCode)> = (0..37).map(|i| (i * 13 + 7, Normal)).collect();
        let t = timeline(&positions);
        for query in -5..500 {
            let expected = positions
                .iter()
                .enumerate()
                .min_by_key(|(_, (p, _))| (p - query).abs())
                .map(|(i, _)| i);
            assert_eq!(t.find_beat_near(query, SearchDirection::Closest), expected, "query {}", query);

            let higher = positions.iter().position(|(p, _)| *p >= query);
            assert_eq!(t.find_beat_near(query, SearchDirection::CanBeHigher), higher, "query {}", query);

            let lower = positions.iter().rposition(|(p, _)| *p <= query);
            assert_eq!(t.find_beat_near(query, SearchDirection::CanBeLower), lower, "query {}", query);
        }
    }

    #[test]
    fn test_previous_non_paced_beat() {
        let t = timeline(&[(10, Normal), (20, Paced), (30, Rhythm), (40, Pvc)]);
        assert_eq!(t.previous_non_paced_beat(3).map(|b| b.position), Some(10));
        assert!(t.previous_non_paced_beat(0).is_none());
        assert_eq!(t.previous_non_paced_beat(99).map(|b| b.position), Some(40));
    }

    #[test]
    fn test_type_scans() {
        let t = timeline(&[(10, Pvc), (20, Normal), (30, Normal), (40, Pvc)]);
        assert_eq!(t.next_of_type(0, Pvc), TypeScan::Found(3));
        assert_eq!(t.next_of_type(3, Pvc), TypeScan::Fallback(3));
        assert_eq!(t.next_of_type(3, Pvc).legacy_index(), 3);
        assert_eq!(t.prev_of_type(3, Pvc), TypeScan::Found(0));
        assert_eq!(t.prev_of_type(0, Pvc), TypeScan::Exhausted);
        assert_eq!(t.prev_of_type(0, Pvc).legacy_index(), -1);
        assert_eq!(t.prev_of_type(2, Normal).found(), Some(1));
    }

    #[test]
    fn test_af_navigation() {
        let beats = vec![
            Beat::new(10, Normal),
            Beat::new(20, EpisodeStart).with_subtype(b'a' as i8),
            Beat::new(30, Normal),
            Beat::new(40, EpisodeStart).with_subtype(b't' as i8),
            Beat::new(50, Rhythm).with_text("(N"),
        ];
        let t = AnnotationTimeline::from_beats(beats, 200);
        assert_eq!(t.next_af_related(0), TypeScan::Found(1));
        assert_eq!(t.next_af_related(1), TypeScan::Found(4));
        assert_eq!(t.next_af_related(4), TypeScan::Fallback(4));
        assert_eq!(t.prev_af_related(4), TypeScan::Found(1));
        assert_eq!(t.prev_af_related(1).legacy_index(), 0);
    }

    #[test]
    fn test_beats_in_window() {
        let t = three();
        let window = t.beats_in_window(10, 90);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].position, 10);
        assert!(t.beats_in_window(101, 1000).is_empty());
        assert!(t.beats_in_window(50, -3).is_empty());
    }

    #[test]
    fn test_heart_rate() {
        let t = timeline(&[(0, Normal), (150, Paced), (200, Normal)]);
        assert_eq!(t.heart_rate_at(2), Some(60));
        assert_eq!(t.heart_rate_at(0), None);
    }

    #[test]
    fn test_store_pacer_position() {
        let mut t = AnnotationTimeline::new(200);
        assert_eq!(t.store_pacer_position(50), None);
        assert_eq!(t.store_pacer_position(100), Some(0));
        assert_eq!(t.store_pacer_position(12_100), Some(12_000));
        assert_eq!(t.store_pacer_position(11_000), Some(10_900));
        assert_eq!(t.pacers().len(), 3);
        assert!(t.pacers().windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(t.pace_count_for_minute(0), 2);
        assert_eq!(t.pace_count_for_minute(1), 1);
        assert_eq!(t.pace_count_for_minute(2), 0);
        assert_eq!(t.pacer_summary(0).as_deref(), Some("2 Paced Beats during minute 0"));
        assert!(t.pacer_summary(5).is_none());
    }

    #[test]
    fn test_pacer_lookups() {
        let mut t = AnnotationTimeline::new(200).with_pacer_filter_delay(0);
        for p in [100, 300, 500] {
            t.store_pacer_position(p);
        }
        assert_eq!(t.next_pacer_after(300).map(|p| p.position), Some(300));
        assert_eq!(t.next_pacer_after(301).map(|p| p.position), Some(500));
        assert!(t.next_pacer_after(501).is_none());
        assert_eq!(t.prev_pacer_before(300).map(|p| p.position), Some(100));
        assert!(t.prev_pacer_before(100).is_none());
        assert_eq!(t.pacers_in_window(100, 400).len(), 2);
    }

    #[test]
    fn test_pacer_spike_annotations() {
        struct Spikes(Vec<i64>);
        impl LoadObserver for Spikes {
            fn on_pacer_spike_found(&mut self, position: i64) {
                self.0.push(position);
            }
        }

        let anns = vec![
            RawAnnotation::new(500, 1),
            RawAnnotation::new(520, 26),
            RawAnnotation::new(700, 12),
        ];
        let mut t = AnnotationTimeline::new(250);
        let mut spikes = Spikes(Vec::new());
        t.extend(anns, &mut spikes);
        assert_eq!(t.len(), 3);
        assert_eq!(spikes.0, vec![520]);
        assert_eq!(t.pacers(), &[PacerEvent { position: 420 }]);
    }
}

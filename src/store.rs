use crate::DISPLAY_WINDOW_SECONDS;

/// Decoded, normalised samples of every channel of one recording.
///
/// Built once by the decoder and read-only afterwards. Each channel holds
/// exactly `duration_seconds × sample_rate` samples; a partial trailing
/// second is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStore {
    channels: Vec<Vec<u16>>,
    sample_rate: u32,
    duration_seconds: u64,
}

impl ChannelStore {
    /// Wraps decoded channel data, trimming all channels to the same whole
    /// number of seconds.
    pub fn new(mut channels: Vec<Vec<u16>>, sample_rate: u32) -> Self {
        let rate = sample_rate.max(1) as u64;
        let shortest = channels.iter().map(Vec::len).min().unwrap_or(0) as u64;
        let duration_seconds = shortest / rate;
        let keep = (duration_seconds * rate) as usize;
        for data in &mut channels {
            data.truncate(keep);
            data.shrink_to_fit();
        }
        ChannelStore {
            channels,
            sample_rate,
            duration_seconds,
        }
    }

    pub fn empty(channel_count: usize, sample_rate: u32) -> Self {
        ChannelStore::new(vec![Vec::new(); channel_count], sample_rate)
    }

    /// Drops everything past `seconds`. Never grows the store.
    pub fn truncate_to_seconds(&mut self, seconds: u64) {
        if seconds >= self.duration_seconds {
            return;
        }
        let keep = (seconds * self.sample_rate as u64) as usize;
        for data in &mut self.channels {
            data.truncate(keep);
        }
        self.duration_seconds = seconds;
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    /// Samples held per channel.
    pub fn samples_per_channel(&self) -> i64 {
        (self.duration_seconds * self.sample_rate as u64) as i64
    }

    /// Default window length: eight seconds of samples, not the recording length.
    pub fn sample_count(&self) -> i64 {
        self.sample_rate as i64 * DISPLAY_WINDOW_SECONDS
    }

    /// Whole channel. Out-of-range channels read channel 0.
    pub fn channel_data(&self, channel: usize) -> &[u16] {
        let channel = self.resolve_channel(channel);
        self.channels.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Window of `duration` samples starting at `start`.
    ///
    /// The window is slid back so it never runs past the end of the data and
    /// never starts before zero; it is shorter than `duration` only when the
    /// channel itself is. An out-of-range `channel` silently reads channel 0.
    pub fn get(&self, channel: usize, start: i64, duration: i64) -> &[u16] {
        let data = self.channel_data(channel);
        let total = data.len() as i64;
        let duration = duration.max(0);

        let mut start = start;
        if start.saturating_add(duration) > total {
            start = total - duration;
        }
        if start < 0 {
            start = 0;
        }
        let end = start.saturating_add(duration).min(total);
        &data[start as usize..end.max(start) as usize]
    }

    fn resolve_channel(&self, channel: usize) -> usize {
        if channel >= self.channels.len() {
            log::debug!(
                "channel {} out of range ({} channels), reading channel 0",
                channel,
                self.channels.len()
            );
            0
        } else {
            channel
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_store() -> ChannelStore {
        let ch0: Vec<u16> = (0..1050).collect();
        let ch1: Vec<u16> = (0..1000).map(|v| v + 5000).collect();
        ChannelStore::new(vec![ch0, ch1], 100)
    }

    #[test]
    fn test_trims_to_whole_seconds() {
        let store = ramp_store();
        assert_eq!(store.duration_seconds(), 10);
        assert_eq!(store.samples_per_channel(), 1000);
        assert_eq!(store.channel_data(0).len(), 1000);
        assert_eq!(store.channel_data(1).len(), 1000);
    }

    #[test]
    fn test_get_window() {
        let store = ramp_store();
        let window = store.get(1, 10, 5);
        assert_eq!(window, &[5010, 5011, 5012, 5013, 5014]);
    }

    #[test]
    fn test_get_clamps_to_end() {
        let store = ramp_store();
        let window = store.get(0, 990, 50);
        assert_eq!(window.len(), 50);
        assert_eq!(window[0], 950);
        assert_eq!(*window.last().unwrap(), 999);
    }

    #[test]
    fn test_get_clamps_to_start() {
        let store = ramp_store();
        assert_eq!(store.get(0, -20, 3), &[0, 1, 2]);
        // longer than the data: whole channel
        assert_eq!(store.get(0, 500, 5000).len(), 1000);
        assert_eq!(store.get(0, 0, -4).len(), 0);
    }

    #[test]
    fn test_get_extreme_arguments() {
        let store = ramp_store();
        assert_eq!(store.get(0, i64::MAX, 10), store.get(0, 990, 10));
        assert_eq!(store.get(0, 1, i64::MAX).len(), 1000);
        assert_eq!(store.get(0, i64::MAX, i64::MAX).len(), 1000);
        assert_eq!(store.get(0, i64::MIN, 3), &[0, 1, 2]);
    }

    #[test]
    fn test_bad_channel_reads_channel_zero() {
        let store = ramp_store();
        assert_eq!(store.get(7, 0, 2), &[0, 1]);
        assert_eq!(store.get(2, 0, 2), &[0, 1]);
    }

    #[test]
    fn test_truncate_to_seconds() {
        let mut store = ramp_store();
        store.truncate_to_seconds(20);
        assert_eq!(store.duration_seconds(), 10);
        store.truncate_to_seconds(4);
        assert_eq!(store.duration_seconds(), 4);
        assert_eq!(store.channel_data(1).len(), 400);
        assert_eq!(store.get(0, 1000, 10)[9], 399);
    }

    #[test]
    fn test_sample_count_is_eight_seconds() {
        let store = ramp_store();
        assert_eq!(store.sample_count(), 800);
        let empty = ChannelStore::empty(3, 256);
        assert_eq!(empty.sample_count(), 2048);
        assert!(empty.get(0, 0, 100).is_empty());
        assert!(ChannelStore::empty(0, 256).get(0, 0, 1).is_empty());
    }
}

use holterdata::wfdb::{WfdbHeader, WfdbSignal};
use holterdata::writer::{encode_frames, encode_legacy_frames, write_header, write_legacy_header};
use holterdata::{
    CancelToken, FormatSpecifier, LoadObserver, LoadOptions, NullObserver, Recording, WfdbFormat,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::tempdir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// 记录加载进度的观察者
#[derive(Default)]
struct ProgressLog {
    sizes: Vec<u64>,
    progress: Vec<u64>,
    finished: usize,
    cancel_at: Option<(u64, CancelToken)>,
}

impl ProgressLog {
    fn cancelling_at(loaded: u64, token: &CancelToken) -> Self {
        ProgressLog {
            cancel_at: Some((loaded, token.clone())),
            ..ProgressLog::default()
        }
    }
}

impl LoadObserver for ProgressLog {
    fn on_load_size_known(&mut self, total: u64) {
        self.sizes.push(total);
    }

    fn on_progress(&mut self, loaded: u64) {
        self.progress.push(loaded);
        if let Some((at, token)) = &self.cancel_at {
            if loaded >= *at {
                token.cancel();
            }
        }
    }

    fn on_load_finished(&mut self) {
        self.finished += 1;
    }
}

fn create_legacy(dir: &Path, name: &str, channels: usize, rate: u32, seconds: usize) -> PathBuf {
    let data = dir.join(format!("{}.dat", name));
    let frames = rate as usize * seconds;
    let signal: Vec<Vec<i32>> = (0..channels)
        .map(|ch| (0..frames).map(|i| ((i * 7 + ch * 13) % 120) as i32 - 60).collect())
        .collect();
    fs::write(&data, encode_legacy_frames(FormatSpecifier::Signed8, &signal)).unwrap();
    write_legacy_header(data.with_extension("hea"), channels, rate, None, FormatSpecifier::Signed8).unwrap();
    data
}

#[test]
fn test_progress_in_chunks() {
    init_logging();
    let dir = tempdir().unwrap();
    let data = create_legacy(dir.path(), "chunks", 1, 100, 25);

    let mut log = ProgressLog::default();
    let recording = Recording::open(&data, &LoadOptions::default(), &CancelToken::new(), &mut log).unwrap();

    assert_eq!(log.sizes, vec![2500]);
    assert_eq!(log.progress, vec![0, 1000, 2000, 2500]);
    assert_eq!(log.finished, 1);
    assert!(!recording.was_cancelled());
    assert_eq!(recording.store().duration_seconds(), 25);
}

#[test]
fn test_custom_chunk_size() {
    let dir = tempdir().unwrap();
    let data = create_legacy(dir.path(), "small", 2, 100, 10);

    let options = LoadOptions {
        progress_chunk: 256,
        ..LoadOptions::default()
    };
    let mut log = ProgressLog::default();
    Recording::open(&data, &options, &CancelToken::new(), &mut log).unwrap();

    // legacy files count bytes: 2 per frame here
    assert_eq!(log.sizes, vec![2000]);
    assert_eq!(log.progress, vec![0, 512, 1024, 1536, 2000]);
}

#[test]
fn test_legacy_progress_fills_load_size() {
    let dir = tempdir().unwrap();
    let data = create_legacy(dir.path(), "three", 3, 200, 10);

    let mut log = ProgressLog::default();
    Recording::open(&data, &LoadOptions::default(), &CancelToken::new(), &mut log).unwrap();

    assert_eq!(log.sizes, vec![6000]);
    assert_eq!(log.progress.last(), log.sizes.last());
}

#[test]
fn test_cancel_keeps_whole_seconds() {
    init_logging();
    let dir = tempdir().unwrap();
    let data = create_legacy(dir.path(), "cancel", 3, 256, 46);

    let token = CancelToken::new();
    let mut log = ProgressLog::cancelling_at(9000, &token);
    let recording = Recording::open(&data, &LoadOptions::default(), &token, &mut log).unwrap();

    assert!(recording.was_cancelled());
    assert_eq!(log.progress, vec![0, 3000, 6000, 9000]);
    // no final report after a cancel, but the load still finishes
    assert_eq!(log.finished, 1);

    // 3000 frames at 256 Hz: 11 whole seconds
    assert_eq!(recording.store().duration_seconds(), 11);
    assert_eq!(recording.descriptor().duration_seconds, 11);
    assert_eq!(recording.store().samples_per_channel(), 11 * 256);

    // windows past the kept data slide back inside it
    let window = recording.get(2, 100_000, recording.sample_count());
    assert_eq!(window.len(), 2048);
    assert_eq!(window, recording.get(2, 11 * 256 - 2048, 2048));
}

#[test]
fn test_cancelled_prefix_matches_full_decode() {
    let dir = tempdir().unwrap();
    let data = create_legacy(dir.path(), "prefix", 2, 200, 30);

    let full = holterdata::open_recording(&data).unwrap();

    let token = CancelToken::new();
    let mut log = ProgressLog::cancelling_at(4000, &token);
    let partial = Recording::open(&data, &LoadOptions::default(), &token, &mut log).unwrap();
    assert!(partial.was_cancelled());
    assert_eq!(partial.store().duration_seconds(), 10);

    for ch in 0..2 {
        assert_eq!(partial.get(ch, 0, 2000), full.get(ch, 0, 2000));
    }
}

#[test]
fn test_cancelled_before_start() {
    let dir = tempdir().unwrap();
    let data = create_legacy(dir.path(), "early", 1, 200, 5);

    let token = CancelToken::new();
    let remote = token.clone();
    thread::spawn(move || remote.cancel()).join().unwrap();
    assert!(token.is_cancelled());

    let mut log = ProgressLog::default();
    let recording = Recording::open(&data, &LoadOptions::default(), &token, &mut log).unwrap();
    assert!(recording.was_cancelled());
    assert_eq!(log.progress, vec![0]);
    assert_eq!(recording.store().duration_seconds(), 0);
    assert!(recording.get(0, 0, recording.sample_count()).is_empty());
    // the window length still follows the sample rate
    assert_eq!(recording.sample_count(), 1600);
}

#[test]
fn test_wfdb_progress_counts_samples() {
    let dir = tempdir().unwrap();
    let frames: i32 = 2500;
    let channels: Vec<Vec<i32>> = (0..2)
        .map(|ch: i32| (0..frames).map(|i: i32| (i * (ch + 1)) % 500 - 250).collect())
        .collect();

    let signal = WfdbSignal::new("stream.dat", WfdbFormat::Fmt16);
    let header = WfdbHeader {
        record_name: "stream".to_string(),
        sampling_frequency: 250.0,
        sample_count: Some(frames as u64),
        start: None,
        signals: vec![signal.clone(), signal],
        directory: dir.path().to_path_buf(),
    };
    write_header(dir.path().join("stream.hea"), &header).unwrap();
    fs::write(dir.path().join("stream.dat"), encode_frames(WfdbFormat::Fmt16, &channels)).unwrap();

    let mut log = ProgressLog::default();
    let recording = Recording::open(
        dir.path().join("stream.dat"),
        &LoadOptions::default(),
        &CancelToken::new(),
        &mut log,
    )
    .unwrap();

    assert_eq!(log.sizes, vec![5000]);
    assert_eq!(log.progress, vec![0, 2000, 4000, 5000]);
    assert_eq!(recording.store().duration_seconds(), 10);
}

#[test]
fn test_decode_is_deterministic() {
    let dir = tempdir().unwrap();
    let data = create_legacy(dir.path(), "twice", 3, 128, 12);

    let first = holterdata::open_recording(&data).unwrap();
    let second = holterdata::open_recording(&data).unwrap();
    assert_eq!(first.store(), second.store());
    assert_eq!(first.timeline(), second.timeline());
}

#[test]
fn test_decode_on_worker_thread() {
    init_logging();
    let dir = tempdir().unwrap();
    let data = create_legacy(dir.path(), "worker", 2, 250, 60);

    let token = CancelToken::new();
    let worker_token = token.clone();
    let worker = thread::spawn(move || {
        Recording::open(&data, &LoadOptions::default(), &worker_token, &mut NullObserver)
    });
    token.cancel();

    // either finished before the cancel or stopped on a chunk boundary
    let recording = worker.join().unwrap().unwrap();
    let seconds = recording.store().duration_seconds();
    assert!(seconds <= 60);
    assert_eq!(recording.store().samples_per_channel(), seconds as i64 * 250);
    assert_eq!(recording.was_cancelled(), seconds < 60);
}

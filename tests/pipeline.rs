//! End-to-end capture sessions against the synthetic depth source

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use depthlog::capture::SyntheticSource;
use depthlog::log::{LogEnd, LogReader, LogRecord};
use depthlog::{Codec, Config, DepthGeometry, EncoderKind, Pipeline, PipelineError};

fn session_config(path: &Path, encoder: EncoderKind, capacity: usize) -> Config {
    let mut config = Config::default();
    config.pipeline.encoder = Some(encoder);
    config.pipeline.buffer_capacity = capacity;
    config.pipeline.poll_interval_ms = 1;
    config.output.path = path.to_path_buf();
    config
}

fn read_log(path: &Path) -> (Vec<LogRecord>, LogEnd) {
    let mut reader = LogReader::open(path).unwrap();
    let records: Vec<_> = reader.by_ref().collect();
    let end = reader.end().cloned().unwrap();
    (records, end)
}

#[tokio::test(flavor = "multi_thread")]
async fn overload_keeps_buffer_bounded_and_lossless() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overload.mpack");
    let config = session_config(&path, EncoderKind::Image, 10);
    let geometry = config.geometry();

    let pipeline = Pipeline::new(config).unwrap();
    let source = SyntheticSource::new(geometry, Duration::ZERO, Some(100));
    let report = pipeline.run(source).await.unwrap();

    assert_eq!(report.capture.accepted, 100);
    assert!(report.buffer.max_resident <= 10);
    assert!(report.worker.persisted <= 100);
    assert_eq!(report.worker.codec_failures, 0);
    // drained on shutdown, so every accepted frame was either written or evicted
    assert_eq!(
        report.worker.persisted + report.buffer.evicted as u64,
        report.capture.accepted
    );

    let (records, end) = read_log(&path);
    assert_eq!(end, LogEnd::Clean);
    assert_eq!(records.len() as u64, report.worker.persisted);

    let codec = Codec::Image(geometry);
    let mut seen = HashSet::new();
    for record in &records {
        assert_eq!(record.kind, 1);
        assert!(seen.insert(record.sensor_timestamp), "duplicate record");
        assert_eq!(
            codec.decode(&record.payload).unwrap(),
            SyntheticSource::pattern(geometry, record.sensor_timestamp)
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn paced_stream_is_logged_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("paced.mpack");
    let mut config = session_config(&path, EncoderKind::Raw, 2);
    config.capture.target_fps = 0;
    let geometry = config.geometry();

    let pipeline = Pipeline::new(config).unwrap();
    let source = SyntheticSource::new(geometry, Duration::from_millis(20), Some(15));
    let report = pipeline.run(source).await.unwrap();

    assert_eq!(report.buffer.evicted, 0);
    assert_eq!(report.worker.persisted, 15);

    let (records, end) = read_log(&path);
    assert_eq!(end, LogEnd::Clean);
    let timestamps: Vec<u32> = records.iter().map(|r| r.sensor_timestamp).collect();
    assert_eq!(timestamps, (0..15).collect::<Vec<_>>());
    for record in &records {
        assert_eq!(
            record.payload,
            SyntheticSource::pattern(geometry, record.sensor_timestamp)
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn throttle_thins_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("throttled.mpack");
    let mut config = session_config(&path, EncoderKind::Raw, 4);
    config.capture.width = 32;
    config.capture.height = 24;
    config.capture.target_fps = 20; // one frame per 50ms
    let geometry = config.geometry();

    let pipeline = Pipeline::new(config).unwrap();
    let source = SyntheticSource::new(geometry, Duration::from_millis(5), Some(60));
    let report = pipeline.run(source).await.unwrap();

    assert_eq!(report.capture.delivered, 60);
    assert!(report.capture.throttled > 0);
    assert!(report.capture.accepted < 60);
    assert_eq!(
        report.capture.accepted + report.capture.throttled,
        report.capture.delivered
    );

    let (records, _) = read_log(&path);
    assert_eq!(
        records.len() as u64 + report.buffer.evicted as u64,
        report.capture.accepted
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_stops_an_endless_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cancelled.mpack");
    let mut config = session_config(&path, EncoderKind::Raw, 8);
    config.capture.width = 32;
    config.capture.height = 24;
    let geometry = config.geometry();

    let pipeline = Pipeline::new(config).unwrap();
    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let source = SyntheticSource::new(geometry, Duration::from_millis(2), None);
    let report = pipeline.run(source).await.unwrap();

    assert!(report.capture.accepted > 0);
    let (records, end) = read_log(&path);
    assert_eq!(end, LogEnd::Clean);
    assert_eq!(
        records.len() as u64 + report.buffer.evicted as u64,
        report.capture.accepted
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn appended_sessions_share_a_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.mpack");
    let geometry = DepthGeometry::new(16, 8);

    for truncate in [true, false] {
        let mut config = session_config(&path, EncoderKind::Image, 8);
        config.capture.width = geometry.width;
        config.capture.height = geometry.height;
        config.output.truncate = truncate;

        let source = SyntheticSource::new(geometry, Duration::from_millis(5), Some(3));
        Pipeline::new(config).unwrap().run(source).await.unwrap();
    }

    let (records, end) = read_log(&path);
    assert_eq!(end, LogEnd::Clean);
    assert_eq!(records.len(), 6);
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread")]
async fn write_failure_is_fatal() {
    let full = Path::new("/dev/full");
    if !full.exists() {
        return;
    }

    let mut config = session_config(full, EncoderKind::Raw, 4);
    config.capture.width = 32;
    config.capture.height = 24;
    let geometry = config.geometry();

    let pipeline = Pipeline::new(config).unwrap();
    let source = SyntheticSource::new(geometry, Duration::from_millis(1), None);
    let err = pipeline.run(source).await.unwrap_err();

    assert!(matches!(err, PipelineError::Persist(_)), "{err}");
}

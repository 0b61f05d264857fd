use parget::config::DownloadConfig;
use parget::downloader::DownloadJob;
use parget::error::DownloadError;
use parget::state::{ResumeStore, SegmentStatus};
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BODY: &[u8] = b"ABCDEFGHIJKLMNOPQRST"; // 20 bytes

fn fast_retry_config(splits: u64) -> DownloadConfig {
    DownloadConfig {
        splits: Some(splits),
        max_retries: 2,
        retry_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

async fn mount_head(server: &MockServer, ranges: bool) {
    let mut template = ResponseTemplate::new(200).set_body_bytes(BODY);
    if ranges {
        template = template.insert_header("Accept-Ranges", "bytes");
    }
    Mock::given(method("HEAD"))
        .respond_with(template)
        .mount(server)
        .await;
}

async fn mount_range(server: &MockServer, start: u64, end_incl: u64, delay_ms: u64) {
    Mock::given(method("GET"))
        .and(header("Range", format!("bytes={start}-{end_incl}")))
        .respond_with(
            ResponseTemplate::new(206)
                .set_body_bytes(&BODY[start as usize..=end_incl as usize])
                .set_delay(Duration::from_millis(delay_ms)),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn parallel_download_stitches_segments_in_any_order() {
    let server = MockServer::start().await;
    mount_head(&server, true).await;
    // Deliberately scrambled completion order via per-range delays.
    mount_range(&server, 0, 4, 40).await;
    mount_range(&server, 5, 9, 0).await;
    mount_range(&server, 10, 14, 20).await;
    mount_range(&server, 15, 19, 5).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");

    let job = DownloadJob::new(
        server.uri(),
        &dest,
        fast_retry_config(4),
        reqwest::Client::new(),
    )
    .unwrap();
    let outcome = job.run().await.expect("download should succeed");

    assert_eq!(outcome.total_size, Some(20));
    assert_eq!(outcome.bytes_written, 20);
    assert!(!outcome.resumed);

    let content = tokio::fs::read(&dest).await.unwrap();
    assert_eq!(content, BODY, "segments were not stitched correctly");

    // Resume record is cleared on success.
    let store = ResumeStore::new(&server.uri(), &dest);
    assert!(store.load(Some(20)).await.is_none());
}

#[tokio::test]
async fn failed_segment_keeps_siblings_and_resumes() {
    let server = MockServer::start().await;
    mount_head(&server, true).await;
    mount_range(&server, 0, 9, 0).await;
    // Second segment always errors; retries are exhausted.
    Mock::given(method("GET"))
        .and(header("Range", "bytes=10-19"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");
    let url = server.uri();

    let job = DownloadJob::new(
        url.clone(),
        &dest,
        fast_retry_config(2),
        reqwest::Client::new(),
    )
    .unwrap();
    let err = job.run().await.unwrap_err();
    match err {
        DownloadError::SegmentTransferFailed { index, attempts, .. } => {
            assert_eq!(index, 1);
            assert_eq!(attempts, 2);
        }
        other => panic!("unexpected error: {other}"),
    }

    // The completed sibling is on disk and in the record.
    let store = ResumeStore::new(&url, &dest);
    let record = store.load(Some(20)).await.expect("record retained");
    assert_eq!(record.segments[0].status, SegmentStatus::Done);
    assert_eq!(record.segments[1].status, SegmentStatus::Failed);
    let content = tokio::fs::read(&dest).await.unwrap();
    assert_eq!(&content[..10], &BODY[..10]);

    // Re-run against a healed server that only serves the failed range.
    // If the resumed job re-requested segment 0 it would get a 404.
    server.reset().await;
    mount_head(&server, true).await;
    mount_range(&server, 10, 19, 0).await;

    let job = DownloadJob::new(
        url,
        &dest,
        fast_retry_config(2),
        reqwest::Client::new(),
    )
    .unwrap();
    let outcome = job.run().await.expect("resumed download should succeed");
    assert!(outcome.resumed);

    let content = tokio::fs::read(&dest).await.unwrap();
    assert_eq!(content, BODY);
}

#[tokio::test]
async fn server_without_range_support_downloads_sequentially() {
    let server = MockServer::start().await;
    mount_head(&server, false).await;
    // Full-body GET, no Range header expected.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");

    // Requested splits are irrelevant: the plan must collapse to one.
    let job = DownloadJob::new(
        server.uri(),
        &dest,
        fast_retry_config(8),
        reqwest::Client::new(),
    )
    .unwrap();
    let outcome = job.run().await.expect("download should succeed");

    assert_eq!(outcome.bytes_written, 20);
    let content = tokio::fs::read(&dest).await.unwrap();
    assert_eq!(content, BODY);
}

#[tokio::test]
async fn range_ignoring_server_fails_instead_of_corrupting() {
    let server = MockServer::start().await;
    mount_head(&server, true).await;
    // Advertises range support but replays the full body with a 200 for
    // every GET, Range header or not.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(BODY))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");

    let job = DownloadJob::new(
        server.uri(),
        &dest,
        fast_retry_config(2),
        reqwest::Client::new(),
    )
    .unwrap();
    let err = job.run().await.unwrap_err();
    assert!(matches!(err, DownloadError::SegmentTransferFailed { .. }));

    // No worker wrote the full body at its own offset: the preallocated
    // file keeps its exact length.
    assert_eq!(tokio::fs::metadata(&dest).await.unwrap().len(), 20);
}

#[tokio::test]
async fn resumed_no_range_download_keeps_flushed_prefix() {
    let server = MockServer::start().await;
    mount_head(&server, false).await;
    // The replayed body differs in its first half; those bytes must be
    // discarded in favor of what is already durably on disk.
    let replay: Vec<u8> = [b"abcdefghij".as_slice(), &BODY[10..]].concat();
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(replay))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");
    let url = server.uri();

    // A prior run got the first 10 bytes down before being interrupted.
    tokio::fs::write(&dest, &BODY[..10]).await.unwrap();
    let store = ResumeStore::new(&url, &dest);
    let mut segment = parget::state::Segment::new(0, 0, 20);
    segment.status = SegmentStatus::InProgress;
    segment.bytes_written = 10;
    let record = parget::state::ResumeRecord {
        key: store.key().to_string(),
        url: url.clone(),
        total_size: Some(20),
        range_supported: false,
        segments: vec![segment],
    };
    store.save(&record).await.unwrap();

    let job = DownloadJob::new(url, &dest, fast_retry_config(1), reqwest::Client::new()).unwrap();
    let outcome = job.run().await.expect("resumed download should succeed");

    assert!(outcome.resumed);
    let content = tokio::fs::read(&dest).await.unwrap();
    assert_eq!(
        content, BODY,
        "replayed prefix must not overwrite flushed bytes"
    );
}

/// Minimal HTTP/1.1 server that never sends Content-Length: the body
/// ends when the connection closes. wiremock cannot produce this shape
/// because hyper stamps a length onto every response it knows the size
/// of.
async fn spawn_sizeless_server(body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let Ok(n) = socket.read(&mut buf).await else {
                    return;
                };
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n")
                    .await;
                if request.starts_with("GET") {
                    let _ = socket.write_all(body).await;
                }
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn unknown_total_size_streams_to_eof() {
    let url = spawn_sizeless_server(BODY).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");

    let job = DownloadJob::new(
        url.clone(),
        &dest,
        DownloadConfig::default(),
        reqwest::Client::new(),
    )
    .unwrap();
    let outcome = job.run().await.expect("sizeless download should succeed");

    assert_eq!(outcome.total_size, None);
    assert_eq!(outcome.bytes_written, 20);
    let content = tokio::fs::read(&dest).await.unwrap();
    assert_eq!(content, BODY);

    // Completion still clears the resume record.
    let store = ResumeStore::new(&url, &dest);
    assert!(store.load(None).await.is_none());
}

#[tokio::test]
async fn zero_length_resource_completes_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Length", "0")
                .insert_header("Accept-Ranges", "bytes"),
        )
        .mount(&server)
        .await;
    // No GET mock: no segment work may happen at all.

    let dir = tempdir().unwrap();
    let dest = dir.path().join("empty.bin");

    let job = DownloadJob::new(
        server.uri(),
        &dest,
        DownloadConfig::default(),
        reqwest::Client::new(),
    )
    .unwrap();
    let outcome = job.run().await.expect("empty download should succeed");

    assert_eq!(outcome.total_size, Some(0));
    assert_eq!(outcome.bytes_written, 0);
    assert_eq!(tokio::fs::metadata(&dest).await.unwrap().len(), 0);
}

#[tokio::test]
async fn changed_total_size_discards_old_record() {
    let server = MockServer::start().await;
    mount_head(&server, true).await;
    mount_range(&server, 0, 9, 0).await;
    mount_range(&server, 10, 19, 0).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");
    let url = server.uri();

    // A stale record from when the resource was 5 bytes long.
    let store = ResumeStore::new(&url, &dest);
    let stale = parget::state::ResumeRecord {
        key: store.key().to_string(),
        url: url.clone(),
        total_size: Some(5),
        range_supported: true,
        segments: vec![parget::state::Segment::new(0, 0, 5)],
    };
    store.save(&stale).await.unwrap();

    let job = DownloadJob::new(
        url,
        &dest,
        fast_retry_config(2),
        reqwest::Client::new(),
    )
    .unwrap();
    let outcome = job.run().await.expect("fresh download should succeed");

    assert!(!outcome.resumed, "stale record must not be resumed");
    let content = tokio::fs::read(&dest).await.unwrap();
    assert_eq!(content, BODY);
}

#[tokio::test]
async fn cancelled_job_leaves_a_resumable_record() {
    let server = MockServer::start().await;
    mount_head(&server, true).await;
    mount_range(&server, 0, 9, 0).await;
    mount_range(&server, 10, 19, 0).await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");
    let url = server.uri();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let job = DownloadJob::new(
        url.clone(),
        &dest,
        fast_retry_config(2),
        reqwest::Client::new(),
    )
    .unwrap()
    .with_cancellation(cancel);
    let err = job.run().await.unwrap_err();
    assert!(matches!(err, DownloadError::Cancelled));

    // The record survives and a later run finishes the job.
    let store = ResumeStore::new(&url, &dest);
    assert!(store.load(Some(20)).await.is_some());

    let job = DownloadJob::new(
        url,
        &dest,
        fast_retry_config(2),
        reqwest::Client::new(),
    )
    .unwrap();
    let outcome = job.run().await.expect("second run should succeed");
    assert!(outcome.resumed);
    let content = tokio::fs::read(&dest).await.unwrap();
    assert_eq!(content, BODY);
}

#[tokio::test]
async fn unreachable_resource_fails_before_any_segment_work() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let dest = dir.path().join("out.bin");

    let job = DownloadJob::new(
        server.uri(),
        &dest,
        DownloadConfig::default(),
        reqwest::Client::new(),
    )
    .unwrap();
    let err = job.run().await.unwrap_err();
    assert!(matches!(err, DownloadError::ProbeFailed { .. }));

    // Fail fast: no output file, no resume record.
    assert!(tokio::fs::metadata(&dest).await.is_err());
    let record_path = format!("{}.resume.json", dest.display());
    assert!(tokio::fs::metadata(&record_path).await.is_err());
}

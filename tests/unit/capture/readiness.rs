use super::*;

fn fast() -> FileReadinessWaiter {
    FileReadinessWaiter::new(ReadinessOpts {
        poll_interval_ms: 10,
        pending_interval_ms: 5,
        stable_polls: 3,
    })
}

#[tokio::test]
async fn stable_file_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rec.webm");
    std::fs::write(&path, vec![7u8; 128]).unwrap();

    let got = fast()
        .wait(Some(&path), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(got, path);
}

#[tokio::test]
async fn file_appearing_late_is_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.webm");
    let writer_path = path.clone();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(40)).await;
        tokio::fs::write(&writer_path, b"abc").await.unwrap();
    });

    let got = fast()
        .wait(Some(&path), Duration::from_secs(5))
        .await
        .unwrap();
    writer.await.unwrap();
    assert_eq!(got, path);
}

#[tokio::test]
async fn growing_file_times_out_with_last_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grow.webm");
    std::fs::write(&path, b"x").unwrap();
    let writer_path = path.clone();
    let writer = tokio::spawn(async move {
        for _ in 0..60 {
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(&writer_path)
                .unwrap();
            std::io::Write::write_all(&mut f, b"x").unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let err = fast()
        .wait(Some(&path), Duration::from_millis(150))
        .await
        .unwrap_err();
    writer.abort();
    match err {
        ReelError::ReadinessTimeout {
            path: Some(p),
            last_size,
            ..
        } => {
            assert_eq!(p, path);
            assert!(last_size > 1);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn empty_file_never_counts_as_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.webm");
    std::fs::write(&path, b"").unwrap();

    let err = fast()
        .wait(Some(&path), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReelError::ReadinessTimeout { last_size: 0, .. }
    ));
}

#[tokio::test]
async fn unknown_path_times_out() {
    let err = fast().wait(None, Duration::from_millis(30)).await.unwrap_err();
    assert!(err.to_string().contains("<unknown>"));
}

#[tokio::test]
async fn file_that_stops_growing_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flush.webm");
    std::fs::write(&path, b"x").unwrap();
    let writer_path = path.clone();
    // Appends outpace the 10ms poll for ~80ms, then the file settles.
    let writer = tokio::spawn(async move {
        for _ in 0..16 {
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(&writer_path)
                .unwrap();
            std::io::Write::write_all(&mut f, b"x").unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    let started = std::time::Instant::now();
    let got = fast()
        .wait(Some(&path), Duration::from_secs(5))
        .await
        .unwrap();
    writer.await.unwrap();
    assert_eq!(got, path);
    // Three unchanged polls after the last observed change.
    assert!(started.elapsed() >= Duration::from_millis(30));
    assert!(std::fs::metadata(&path).unwrap().len() > 1);
}

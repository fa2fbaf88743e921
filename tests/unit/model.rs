use super::*;

fn fps30() -> FrameRate {
    FrameRate::new(30).unwrap()
}

#[test]
fn request_validates_inputs() {
    assert!(CaptureRequest::new("https://a.example/", 10.0, fps30(), "a").is_ok());
    assert!(CaptureRequest::new("not a url", 10.0, fps30(), "a").is_err());
    assert!(CaptureRequest::new("https://a.example/", 0.0, fps30(), "a").is_err());
    assert!(CaptureRequest::new("https://a.example/", 10.0, fps30(), "").is_err());
}

#[test]
fn request_frame_count_is_exact() {
    let req = CaptureRequest::new("https://a.example/", 7.0, fps30(), "a").unwrap();
    assert_eq!(req.frame_count().unwrap(), 210);
}

#[test]
fn output_ids_are_file_safe() {
    assert_eq!(
        output_id_for_url("https://project-car-animation-439.magicpatterns.app/"),
        "project-car-animation-439.magicpatterns.app"
    );
    assert_eq!(
        output_id_for_url("http://example.com/a/b?c=1"),
        "example.com-a-b-c-1"
    );
    assert_eq!(output_id_for_url("https:///"), "capture");
}

#[test]
fn repeated_urls_get_distinct_ids() {
    let urls = vec![
        "https://a.example/".to_owned(),
        "https://b.example/".to_owned(),
        "https://a.example/".to_owned(),
    ];
    let reqs = requests_for_urls(&urls, 5.0, fps30()).unwrap();
    let ids: Vec<_> = reqs.iter().map(|r| r.output_id().to_owned()).collect();
    assert_eq!(ids, vec!["a.example", "b.example", "a.example-2"]);
}

#[test]
fn suffixed_ids_never_collide_with_later_urls() {
    let urls = vec![
        "https://a.test/".to_owned(),
        "https://a.test".to_owned(),
        "https://a.test-2".to_owned(),
        "https://a.test/".to_owned(),
    ];
    let reqs = requests_for_urls(&urls, 5.0, fps30()).unwrap();
    let ids: Vec<_> = reqs.iter().map(|r| r.output_id().to_owned()).collect();
    assert_eq!(ids, vec!["a.test", "a.test-2", "a.test-2-2", "a.test-3"]);
    let unique: HashSet<_> = ids.iter().collect();
    assert_eq!(unique.len(), ids.len());
}

#[test]
fn deserialized_requests_are_validated() {
    let bad = [
        r#"{"sourceUrl":"not a url","targetDurationSecs":5.0,"frameRate":30,"outputId":"a"}"#,
        r#"{"sourceUrl":"https://a.test/","targetDurationSecs":-5.0,"frameRate":30,"outputId":"a"}"#,
        r#"{"sourceUrl":"https://a.test/","targetDurationSecs":5.0,"frameRate":0,"outputId":"a"}"#,
        r#"{"sourceUrl":"https://a.test/","targetDurationSecs":5.0,"frameRate":30,"outputId":""}"#,
    ];
    for json in bad {
        assert!(serde_json::from_str::<CaptureRequest>(json).is_err(), "{json}");
    }

    let req = CaptureRequest::new("https://a.test/", 2.0, fps30(), "a").unwrap();
    let back: CaptureRequest =
        serde_json::from_str(&serde_json::to_string(&req).unwrap()).unwrap();
    assert_eq!(back, req);
    assert_eq!(back.frame_count().unwrap(), 60);
}

#[test]
fn report_counts_outcomes() {
    let req = CaptureRequest::new("https://a.example/", 1.0, fps30(), "a").unwrap();
    let ok = CaptureResult::succeeded(
        &req,
        "https://cdn/a.mp4".to_owned(),
        true,
        std::time::Duration::from_millis(1400),
    );
    let bad = CaptureResult::failed(
        &req,
        &ReelError::navigation("timeout"),
        std::time::Duration::from_secs(3),
    );
    assert_eq!(ok.duration, "1s");
    assert_eq!(bad.duration, "3s");
    assert_eq!(bad.failure_kind, Some(ErrorKind::Navigation));

    let report = BatchReport::from_results(vec![ok, bad], std::time::Duration::from_secs(5));
    assert_eq!(report.total, 2);
    assert_eq!(report.successful, 1);
    assert_eq!(report.failed, 1);
    assert!(!report.all_succeeded());
}

#[test]
fn results_serialize_camel_case() {
    let req = CaptureRequest::new("https://a.example/", 1.0, fps30(), "a").unwrap();
    let ok = CaptureResult::succeeded(
        &req,
        "https://cdn/a.mp4".to_owned(),
        true,
        std::time::Duration::ZERO,
    );
    let v = serde_json::to_value(&ok).unwrap();
    assert_eq!(v["outputId"], "a");
    assert_eq!(v["assetUrl"], "https://cdn/a.mp4");
    assert!(v["failureReason"].is_null());
}

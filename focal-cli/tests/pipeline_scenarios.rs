mod common;

use std::{fs, sync::Arc, time::Duration};

use focal_cli::{Manifest, ManifestError, ManifestPipeline, PipelineState};
use focal_core::FocusPoint;
use image::ImageFormat;
use serde_json::Value;
use tempfile::tempdir;

use common::{
    StubDetector, options_for, reference_detector, reference_tree, shared, write_image,
    write_image_as, write_truncated,
};

#[test]
fn reference_tree_produces_expected_manifest() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    let output = dir.path().join("data/image-manifest.json");
    reference_tree(&root);

    let stub = Arc::new(reference_detector());
    let mut pipeline = ManifestPipeline::new(options_for(&root, &output));
    let summary = pipeline.run(|| Ok(shared(&stub))).expect("run succeeds");

    assert_eq!(pipeline.state(), PipelineState::Done);
    assert_eq!(summary.discovered, 4);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.detection_failures, 0);
    assert_eq!(summary.output_path, output);

    let manifest = Manifest::load_from(&output).expect("manifest on disk");
    assert_eq!(manifest.len(), 3);

    let a = manifest.get("/a.jpg").expect("a.jpg entry");
    assert_eq!((a.width, a.height, a.kind.as_str()), (1000, 1000, "jpeg"));
    assert_eq!(a.focus, Some(FocusPoint { x: 0.5, y: 0.25 }));

    let b = manifest.get("/b.png").expect("b.png entry");
    assert_eq!((b.width, b.height, b.kind.as_str()), (800, 600, "png"));
    assert_eq!(b.focus, None);

    let c = manifest.get("/c.jpg").expect("c.jpg entry");
    assert_eq!((c.width, c.height, c.kind.as_str()), (640, 480, "jpeg"));
    assert_eq!(c.focus, None);

    assert!(manifest.get("/d.jpg").is_none());

    let raw: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert!(raw["/b.png"].get("focus").is_none());
    assert!(raw["/c.jpg"].get("focus").is_none());
    assert_eq!(raw["/a.jpg"]["type"], "jpeg");
}

#[test]
fn only_jpeg_sources_reach_the_detector() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    let output = dir.path().join("manifest.json");
    reference_tree(&root);
    // PNG bytes behind a .jpg name are not detected.
    write_image_as(&root.join("e.jpg"), 16, 8, ImageFormat::Png);

    let stub = Arc::new(reference_detector());
    let mut pipeline = ManifestPipeline::new(options_for(&root, &output));
    pipeline.run(|| Ok(shared(&stub))).expect("run succeeds");

    assert_eq!(stub.calls(), 2);
    let manifest = Manifest::load_from(&output).unwrap();
    let e = manifest.get("/e.jpg").expect("e.jpg entry");
    assert_eq!(e.kind, "png");
    assert_eq!(e.focus, None);
}

#[test]
fn rerun_is_byte_identical() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    let output = dir.path().join("manifest.json");
    reference_tree(&root);

    let stub = Arc::new(reference_detector());
    ManifestPipeline::new(options_for(&root, &output))
        .run(|| Ok(shared(&stub)))
        .unwrap();
    let first = fs::read(&output).unwrap();

    let mut options = options_for(&root, &output);
    options.workers = 1;
    ManifestPipeline::new(options)
        .run(|| Ok(shared(&stub)))
        .unwrap();
    assert_eq!(first, fs::read(&output).unwrap());
}

#[test]
fn nested_keys_keep_case_and_ignore_other_files() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    let output = dir.path().join("manifest.json");
    write_image(&root.join("photos/Portraits/Example.PNG"), 30, 40);
    write_image(&root.join("photos/banner.gif"), 50, 10);
    fs::write(root.join("photos/notes.txt"), "not an image").unwrap();

    let stub = Arc::new(StubDetector::new());
    let summary = ManifestPipeline::new(options_for(&root, &output))
        .run(|| Ok(shared(&stub)))
        .unwrap();

    assert_eq!(summary.discovered, 2);
    let manifest = Manifest::load_from(&output).unwrap();
    assert_eq!(manifest.len(), 2);
    assert!(manifest.get("/photos/Portraits/Example.PNG").is_some());
    assert_eq!(manifest.get("/photos/banner.gif").unwrap().kind, "gif");

    let text = fs::read_to_string(&output).unwrap();
    let portrait = text.find("/photos/Portraits/Example.PNG").unwrap();
    assert!(portrait < text.find("/photos/banner.gif").unwrap());
}

#[test]
fn truncated_images_are_excluded() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    let output = dir.path().join("manifest.json");
    reference_tree(&root);
    write_truncated(&root.join("cut.png"), 300, 300, 60);
    write_truncated(&root.join("cut.jpg"), 300, 300, 200);

    let stub = Arc::new(reference_detector());
    let summary = ManifestPipeline::new(options_for(&root, &output))
        .run(|| Ok(shared(&stub)))
        .unwrap();

    assert_eq!(summary.discovered, 6);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.skipped, 3);
    let manifest = Manifest::load_from(&output).unwrap();
    assert!(manifest.get("/cut.png").is_none());
    assert!(manifest.get("/cut.jpg").is_none());
    assert_eq!(stub.calls(), 2);
}

#[test]
fn abandoned_detections_stay_within_worker_count() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    let output = dir.path().join("manifest.json");
    for index in 0..12 {
        write_image(&root.join(format!("{index:02}.jpg")), 8, 8);
    }

    let stub = Arc::new(StubDetector::new().with_delay(Duration::from_secs(2)));
    let mut options = options_for(&root, &output);
    options.workers = 2;
    options.detection_timeout = Some(Duration::from_millis(20));

    let summary = ManifestPipeline::new(options)
        .run(|| Ok(shared(&stub)))
        .unwrap();

    assert_eq!(summary.processed, 12);
    assert_eq!(summary.detection_failures, 12);
    assert!(stub.peak_in_flight() <= 2, "peak {}", stub.peak_in_flight());
}

#[cfg(unix)]
#[test]
fn non_utf8_names_are_skipped() {
    use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    let output = dir.path().join("manifest.json");
    write_image(&root.join("ok.png"), 4, 4);
    write_image_as(&root.join(OsStr::from_bytes(b"\xffname.png")), 4, 4, ImageFormat::Png);
    write_image_as(&root.join(OsStr::from_bytes(b"\xfename.png")), 4, 4, ImageFormat::Png);

    let stub = Arc::new(StubDetector::new());
    let summary = ManifestPipeline::new(options_for(&root, &output))
        .run(|| Ok(shared(&stub)))
        .unwrap();

    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.skipped, 2);
    let manifest = Manifest::load_from(&output).unwrap();
    assert_eq!(manifest.len(), 1);
    assert!(manifest.get("/ok.png").is_some());
}

#[test]
fn detection_failure_keeps_dimensions() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    let output = dir.path().join("manifest.json");
    reference_tree(&root);

    let stub = Arc::new(reference_detector().failing_on("c.jpg"));
    let summary = ManifestPipeline::new(options_for(&root, &output))
        .run(|| Ok(shared(&stub)))
        .unwrap();

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.detection_failures, 1);
    let manifest = Manifest::load_from(&output).unwrap();
    let c = manifest.get("/c.jpg").unwrap();
    assert_eq!((c.width, c.height), (640, 480));
    assert_eq!(c.focus, None);
    assert!(manifest.get("/a.jpg").unwrap().focus.is_some());
}

#[test]
fn slow_detection_is_abandoned_after_timeout() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    let output = dir.path().join("manifest.json");
    write_image(&root.join("slow.jpg"), 20, 20);

    let stub = Arc::new(StubDetector::new().with_delay(Duration::from_secs(5)));
    let mut options = options_for(&root, &output);
    options.detection_timeout = Some(Duration::from_millis(100));

    let summary = ManifestPipeline::new(options)
        .run(|| Ok(shared(&stub)))
        .unwrap();

    assert_eq!(summary.detection_failures, 1);
    let manifest = Manifest::load_from(&output).unwrap();
    let slow = manifest.get("/slow.jpg").unwrap();
    assert_eq!((slow.width, slow.height), (20, 20));
    assert_eq!(slow.focus, None);
}

#[test]
fn model_load_failure_aborts_before_processing() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    let output = dir.path().join("manifest.json");
    reference_tree(&root);

    let mut pipeline = ManifestPipeline::new(options_for(&root, &output));
    let err = pipeline
        .run(|| Err(anyhow::anyhow!("model file not found")))
        .unwrap_err();

    assert!(matches!(err, ManifestError::FatalInit { .. }));
    assert!(err.to_string().contains("model file not found"));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(!output.exists());
}

#[test]
fn missing_root_is_fatal() {
    let dir = tempdir().expect("tempdir");
    let output = dir.path().join("manifest.json");

    let stub = Arc::new(StubDetector::new());
    let mut pipeline = ManifestPipeline::new(options_for(&dir.path().join("absent"), &output));
    let err = pipeline.run(|| Ok(shared(&stub))).unwrap_err();

    assert!(matches!(err, ManifestError::FileRead { .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(!output.exists());
}

#[test]
fn unwritable_output_is_fatal() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    write_image(&root.join("a.png"), 4, 4);
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "a file, not a directory").unwrap();

    let stub = Arc::new(StubDetector::new());
    let mut pipeline = ManifestPipeline::new(options_for(&root, &blocker.join("manifest.json")));
    let err = pipeline.run(|| Ok(shared(&stub))).unwrap_err();

    assert!(matches!(err, ManifestError::Write { .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[test]
fn empty_root_writes_empty_manifest() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    fs::create_dir_all(&root).unwrap();
    let output = dir.path().join("manifest.json");
    fs::write(&output, "{ \"/stale.jpg\": {} }").unwrap();

    let stub = Arc::new(StubDetector::new());
    let summary = ManifestPipeline::new(options_for(&root, &output))
        .run(|| Ok(shared(&stub)))
        .unwrap();

    assert_eq!(summary.processed, 0);
    assert!(Manifest::load_from(&output).unwrap().is_empty());
}

#[test]
fn cache_reuses_unchanged_files_without_changing_output() {
    let dir = tempdir().expect("tempdir");
    let root = dir.path().join("public");
    let output = dir.path().join("manifest.json");
    let cache_path = dir.path().join(".cache/focal.json");
    reference_tree(&root);

    let cached_options = || {
        let mut options = options_for(&root, &output);
        options.cache_path = Some(cache_path.clone());
        options
    };

    let stub = Arc::new(reference_detector());
    let first = ManifestPipeline::new(cached_options())
        .run(|| Ok(shared(&stub)))
        .unwrap();
    assert_eq!(first.cache_hits, 0);
    assert!(cache_path.exists());
    let first_bytes = fs::read(&output).unwrap();
    let calls_after_first = stub.calls();

    let second = ManifestPipeline::new(cached_options())
        .run(|| Ok(shared(&stub)))
        .unwrap();
    assert_eq!(second.cache_hits, 3);
    assert_eq!(second.skipped, 1);
    assert_eq!(stub.calls(), calls_after_first);
    assert_eq!(first_bytes, fs::read(&output).unwrap());

    // A changed file is read again.
    write_image(&root.join("c.jpg"), 320, 240);
    let third = ManifestPipeline::new(cached_options())
        .run(|| Ok(shared(&stub)))
        .unwrap();
    assert_eq!(third.cache_hits, 2);
    let manifest = Manifest::load_from(&output).unwrap();
    let c = manifest.get("/c.jpg").unwrap();
    assert_eq!((c.width, c.height), (320, 240));

    // The uncached run agrees with the cached one.
    let plain = dir.path().join("plain.json");
    ManifestPipeline::new(options_for(&root, &plain))
        .run(|| Ok(shared(&stub)))
        .unwrap();
    assert_eq!(fs::read(&plain).unwrap(), fs::read(&output).unwrap());
}

use std::path::Path;

use fiducam_aruco::{render_marker, MarkerDictionary};
use fiducam_pipeline::{
    CameraConfig, ChannelSink, DetectorSelection, DirectorySink, DisplaySink, Session,
    SessionConfig, SessionError, SourceKind, SourceSpec,
};
use image::{imageops, GrayImage, Luma};

fn write_marker_image(path: &Path, id: u32) {
    let dict = MarkerDictionary::ArucoOriginal.dictionary();
    let marker = render_marker(&dict, id, 20, 1).expect("render");
    let mut canvas = GrayImage::from_pixel(640, 480, Luma([255]));
    imageops::replace(&mut canvas, &marker, 200, 150);
    canvas.save(path).expect("save");
}

fn marker_camera(id: &str, dir: &Path) -> CameraConfig {
    CameraConfig::new(id, SourceSpec::Uri(dir.display().to_string()), SourceKind::LocalImage).with_detectors(
        DetectorSelection {
            locator: false,
            symbols: false,
            markers: true,
        },
    )
}

#[test]
fn image_directory_session_reports_marker_id() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_marker_image(&dir.path().join("000.png"), 7);
    write_marker_image(&dir.path().join("001.png"), 7);

    let config = SessionConfig {
        cameras: vec![marker_camera("bench", dir.path())],
        ..Default::default()
    };
    let (sink, rx) = ChannelSink::bounded(8);
    let session = Session::start(&config, |_| Box::new(sink.clone())).expect("session");
    assert_eq!(session.cameras(), ["bench"]);
    let store = session.store().clone();

    let stats = session.join();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].1.frames, 2);

    let state = store.try_get("bench").expect("state");
    assert_eq!(state.last_marker_id, 7);
    assert!(state.last_payload.is_empty());
    assert_eq!(rx.try_iter().count(), 2);
}

#[test]
fn unavailable_camera_fails_the_whole_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_marker_image(&dir.path().join("a.png"), 3);

    let config = SessionConfig {
        cameras: vec![
            marker_camera("ok", dir.path()),
            marker_camera("missing", &dir.path().join("nope")),
        ],
        ..Default::default()
    };
    let err = Session::start(&config, |_| -> Box<dyn DisplaySink> { Box::new(fiducam_pipeline::NullSink) })
        .err()
        .expect("error");
    match err {
        SessionError::Source { camera, .. } => assert_eq!(camera, "missing"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn directory_sink_receives_annotated_frames() {
    let input = tempfile::tempdir().expect("tempdir");
    let output = tempfile::tempdir().expect("tempdir");
    write_marker_image(&input.path().join("frame.png"), 42);

    let config = SessionConfig {
        cameras: vec![marker_camera("cam", input.path())],
        ..Default::default()
    };
    let out_dir = output.path().to_path_buf();
    let session = Session::start(&config, |cam| Box::new(DirectorySink::new(out_dir.join(&cam.id))))
        .expect("session");
    let store = session.store().clone();
    session.join();

    assert_eq!(store.get("cam").last_marker_id, 42);
    let annotated = image::open(output.path().join("cam/cam_000000.png")).expect("png").to_rgb8();
    // Green marker outline along the border's top edge.
    assert!((166..176).any(|y| annotated.get_pixel(300, y).0 == [0, 255, 0]));
}

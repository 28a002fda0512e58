use fiducam_aruco::{
    render_marker, FiducialMarkerDetector, MarkerDetectorParams, MarkerDictionary,
};
use fiducam_core::{is_convex, signed_area, Frame, PixelOrder};
use image::{imageops, GrayImage, Luma};
use nalgebra::Point2;

fn canvas(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, Luma([255]))
}

/// Paste marker `id` with a one-cell quiet zone; returns the top-left of the
/// black border.
fn paste_marker(canvas: &mut GrayImage, id: u32, cell_px: u32, x: u32, y: u32) -> (f32, f32) {
    let dict = MarkerDictionary::ArucoOriginal.dictionary();
    let marker = render_marker(&dict, id, cell_px, 1).expect("render");
    imageops::replace(canvas, &marker, x as i64, y as i64);
    ((x + cell_px) as f32, (y + cell_px) as f32)
}

fn frame(gray: &GrayImage) -> Frame {
    Frame::from_gray_image(gray, PixelOrder::Bgr)
}

fn near(p: Point2<f32>, x: f32, y: f32, tol: f32) -> bool {
    (p.x - x).abs() <= tol && (p.y - y).abs() <= tol
}

#[test]
fn black_frame_yields_empty_list() {
    let black = GrayImage::new(640, 480);
    let (markers, _) = FiducialMarkerDetector::default().detect(&frame(&black));
    assert!(markers.is_empty());
}

#[test]
fn single_marker_id_7() {
    let mut img = canvas(640, 480);
    let (x0, y0) = paste_marker(&mut img, 7, 20, 200, 150);
    let side = 7.0 * 20.0 - 1.0;

    let (markers, annotated) = FiducialMarkerDetector::default().detect(&frame(&img));
    assert_eq!(markers.len(), 1, "{markers:?}");
    let m = &markers[0];
    assert_eq!(m.id, 7);
    assert_eq!(m.rotation, 0);
    assert!(near(m.corners[0], x0, y0, 2.0), "{:?}", m.corners);
    assert!(near(m.corners[1], x0 + side, y0, 2.0), "{:?}", m.corners);
    assert!(near(m.corners[2], x0 + side, y0 + side, 2.0), "{:?}", m.corners);
    assert!(near(m.corners[3], x0, y0 + side, 2.0), "{:?}", m.corners);

    let c = m.centroid();
    assert!(near(c, x0 + side / 2.0, y0 + side / 2.0, 1.5));
    // Centroid dot is red on the annotated copy.
    assert_eq!(annotated.rgb_at(c.x.round() as u32, c.y.round() as u32), Some([255, 0, 0]));
    assert_eq!(annotated.order(), PixelOrder::Bgr);
}

#[test]
fn marker_with_white_margin_on_darker_background() {
    for background in [200u8, 128, 60] {
        let mut img = GrayImage::from_pixel(640, 480, Luma([background]));
        let (x0, y0) = paste_marker(&mut img, 7, 20, 200, 150);
        let side = 7.0 * 20.0 - 1.0;

        let (markers, _) = FiducialMarkerDetector::default().detect(&frame(&img));
        assert_eq!(markers.len(), 1, "background {background}: {markers:?}");
        let m = &markers[0];
        assert_eq!(m.id, 7);
        assert!(near(m.corners[0], x0, y0, 2.0), "background {background}: {:?}", m.corners);
        assert!(near(m.corners[2], x0 + side, y0 + side, 2.0), "background {background}: {:?}", m.corners);
    }
}

#[test]
fn same_id_at_two_places_is_reported_twice() {
    let mut img = GrayImage::from_pixel(640, 480, Luma([180]));
    paste_marker(&mut img, 42, 16, 60, 100);
    paste_marker(&mut img, 42, 16, 380, 200);

    let (markers, _) = FiducialMarkerDetector::default().detect(&frame(&img));
    assert_eq!(markers.iter().map(|m| m.id).collect::<Vec<_>>(), [42, 42], "{markers:?}");
}

#[test]
fn several_markers_are_all_reported() {
    let mut img = canvas(640, 480);
    let ids = [3u32, 100, 777];
    paste_marker(&mut img, ids[0], 16, 40, 40);
    paste_marker(&mut img, ids[1], 16, 300, 60);
    paste_marker(&mut img, ids[2], 16, 420, 280);

    let (markers, _) = FiducialMarkerDetector::default().detect(&frame(&img));
    assert_eq!(markers.len(), 3, "{markers:?}");
    let mut found: Vec<u32> = markers.iter().map(|m| m.id).collect();
    found.sort_unstable();
    assert_eq!(found, ids);
    for m in &markers {
        assert!(is_convex(&m.corners));
        assert!(m.id < 1024);
    }
}

#[test]
fn rotated_marker_keeps_its_top_left() {
    let mut img = canvas(480, 480);
    let (x0, y0) = paste_marker(&mut img, 7, 20, 150, 150);
    let side = 7.0 * 20.0 - 1.0;
    // Rotating the whole canvas clockwise moves the marker's top-left corner
    // to the top-right of its square.
    let rotated = imageops::rotate90(&img);
    let (rx, ry) = (480.0 - 1.0 - (y0 + side), x0);

    let (markers, _) = FiducialMarkerDetector::default().detect(&frame(&rotated));
    assert_eq!(markers.len(), 1, "{markers:?}");
    let m = &markers[0];
    assert_eq!(m.id, 7);
    assert_eq!(m.rotation, 1);
    assert!(near(m.corners[0], rx + side, ry, 2.0), "{:?}", m.corners);
    assert!(near(m.corners[1], rx + side, ry + side, 2.0), "{:?}", m.corners);
    // Marker order stays clockwise on screen.
    assert!(signed_area(&m.corners) > 0.0);
}

#[test]
fn working_width_scales_corners() {
    let mut img = canvas(1280, 960);
    let (x0, y0) = paste_marker(&mut img, 7, 30, 470, 270);

    let det = FiducialMarkerDetector::new(MarkerDetectorParams {
        working_width: Some(640),
        ..Default::default()
    });
    let detection = det.detect_markers(&frame(&img));
    assert_eq!(detection.markers.len(), 1);
    assert_eq!(detection.markers[0].id, 7);
    let tl = detection.markers[0].corners[0];
    assert!(near(tl, x0 * detection.scale, y0 * detection.scale, 3.0), "{tl:?}");
}

#[test]
fn mirrored_input_is_flipped_back() {
    let mut img = canvas(640, 480);
    paste_marker(&mut img, 7, 20, 200, 150);
    let mirrored = imageops::flip_horizontal(&img);

    let plain = FiducialMarkerDetector::default();
    let flipping = FiducialMarkerDetector::new(MarkerDetectorParams {
        flip_horizontal: true,
        ..Default::default()
    });
    let (markers, _) = flipping.detect(&frame(&mirrored));
    assert_eq!(markers.iter().map(|m| m.id).collect::<Vec<_>>(), [7]);
    // Read unflipped, the mirrored marker is not id 7.
    let (raw, _) = plain.detect(&frame(&mirrored));
    assert!(raw.iter().all(|m| m.id != 7));
}

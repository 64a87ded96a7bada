mod common;

use camcalib::{
    load, run, CalibrationConfig, ImageOutcome, PatternShape, PipelineError, SolverError,
    SquareSize, ValidateError, RESULTS_FILE_NAME,
};
use common::{poses, render_view, write_views, COLS, CX, CY, FX, FY, HEIGHT, ROWS, SQUARE_MM};
use image::{GrayImage, Luma};
use std::{fs, path::Path};

fn config(images: &Path, results: &Path) -> CalibrationConfig {
    CalibrationConfig::new(
        images,
        results,
        PatternShape::new(ROWS, COLS).expect("shape"),
        SquareSize::new(SQUARE_MM).expect("size"),
    )
}

fn blank(dir: &Path, name: &str, width: u32, height: u32) {
    GrayImage::from_pixel(width, height, Luma([128]))
        .save(dir.join(name))
        .expect("save blank");
}

#[test]
fn synthetic_views_recover_camera_matrix() {
    let images = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    write_views(images.path(), 6);
    blank(images.path(), "blank.png", 320, 240);
    fs::write(images.path().join("corrupt.png"), b"definitely not a png").expect("write");
    fs::write(images.path().join("notes.txt"), b"ignored").expect("write");

    let results_dir = out.path().join("results");
    let annotated = out.path().join("annotated");
    let mut cfg = config(images.path(), &results_dir);
    cfg.annotated_dir = Some(annotated.clone());

    let run = run(&cfg).expect("calibration run");

    assert_eq!(run.images.valid, 6);
    assert_eq!(run.images.total, 8);
    let unreadable = run
        .images
        .outcomes
        .iter()
        .filter(|r| matches!(r.outcome, ImageOutcome::Unreadable(_)))
        .count();
    assert_eq!(unreadable, 1);
    assert_eq!(
        run.images.image_size.map(|s| (s.width, s.height)),
        Some((common::WIDTH, HEIGHT))
    );

    let r = &run.result;
    let rel = |a: f64, b: f64| (a - b).abs() / b;
    assert!(rel(r.fx(), FX) < 0.01, "fx {}", r.fx());
    assert!(rel(r.fy(), FY) < 0.01, "fy {}", r.fy());
    assert!(rel(r.cx(), CX) < 0.01, "cx {}", r.cx());
    assert!(rel(r.cy(), CY) < 0.01, "cy {}", r.cy());
    assert!(r.rmse < 0.5, "rmse {}", r.rmse);

    assert_eq!(run.results_path, results_dir.join(RESULTS_FILE_NAME));
    assert_eq!(&load(&results_dir).expect("load"), r);

    let raw = fs::read_to_string(&run.results_path).expect("read");
    let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
    let mut keys: Vec<_> = json.as_object().expect("object").keys().cloned().collect();
    keys.sort();
    assert_eq!(keys, ["camera_matrix", "distortion_coefficients", "rmse"]);
    assert_eq!(
        json["distortion_coefficients"].as_array().map(Vec::len),
        Some(5)
    );

    let saved = fs::read_dir(&annotated).expect("annotated dir").count();
    assert_eq!(saved, 6);
}

#[test]
fn detected_corners_follow_lattice_order() {
    let images = tempfile::tempdir().expect("tempdir");
    write_views(images.path(), 1);
    let detector = camcalib::ChessboardDetector::new(
        PatternShape::new(ROWS, COLS).expect("shape"),
        Default::default(),
    );
    let set = camcalib::scan(images.path(), &detector).expect("scan");
    assert_eq!(set.valid, 1);

    let pose = &poses()[0];
    let corners = &set.views[0].corners;
    assert_eq!(corners.len(), (ROWS * COLS) as usize);
    let mut total = 0.0;
    for r in 0..ROWS {
        for c in 0..COLS {
            let (u, v) = common::project_corner(pose, r, c);
            let got = corners[(r * COLS + c) as usize];
            let err = ((got.x - u).powi(2) + (got.y - v).powi(2)).sqrt();
            assert!(err < 0.3, "corner ({r}, {c}) off by {err}");
            total += err;
        }
    }
    let mean = total / (ROWS * COLS) as f64;
    assert!(mean < 0.15, "mean corner error {mean}");
}

#[test]
fn mixed_image_sizes_abort_before_solving() {
    let images = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    write_views(images.path(), 2);
    render_view(800, 600, &poses()[2])
        .save(images.path().join("view_99_large.png"))
        .expect("save");

    let err = run(&config(images.path(), out.path())).unwrap_err();
    match err {
        PipelineError::Validate(ValidateError::DimensionMismatch {
            expected, found, ..
        }) => {
            assert_eq!((expected.width, expected.height), (common::WIDTH, HEIGHT));
            assert_eq!((found.width, found.height), (800, 600));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!out.path().join(RESULTS_FILE_NAME).exists());
}

#[test]
fn size_mismatch_without_a_board_is_ignored() {
    let images = tempfile::tempdir().expect("tempdir");
    write_views(images.path(), 1);
    blank(images.path(), "view_50_blank.png", 1024, 768);
    let detector = camcalib::ChessboardDetector::new(
        PatternShape::new(ROWS, COLS).expect("shape"),
        Default::default(),
    );
    let set = camcalib::scan(images.path(), &detector).expect("scan");
    assert_eq!((set.valid, set.total), (1, 2));
}

#[test]
fn no_boards_found_is_an_error() {
    let images = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    blank(images.path(), "a.png", 320, 240);
    blank(images.path(), "b.jpg", 320, 240);

    let err = run(&config(images.path(), out.path())).unwrap_err();
    assert!(matches!(err, PipelineError::NoValidImages(_)), "{err:?}");
    assert!(!out.path().join(RESULTS_FILE_NAME).exists());
}

#[test]
fn empty_directory_is_an_error() {
    let images = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    let err = run(&config(images.path(), out.path())).unwrap_err();
    assert!(matches!(err, PipelineError::NoValidImages(_)), "{err:?}");
}

#[test]
fn missing_image_directory_is_an_error() {
    let root = tempfile::tempdir().expect("tempdir");
    let err = run(&config(&root.path().join("nope"), root.path())).unwrap_err();
    assert!(
        matches!(err, PipelineError::Validate(ValidateError::ReadDir { .. })),
        "{err:?}"
    );
}

#[test]
fn single_view_is_reported_as_degenerate() {
    let images = tempfile::tempdir().expect("tempdir");
    let out = tempfile::tempdir().expect("tempdir");
    write_views(images.path(), 1);

    let err = run(&config(images.path(), out.path())).unwrap_err();
    assert!(
        matches!(err, PipelineError::Solver(SolverError::Degenerate(_))),
        "{err:?}"
    );
    assert!(!out.path().join(RESULTS_FILE_NAME).exists());
}

//! Image set validation: which files carry a usable board, and do they agree
//! on the image size.
//!
//! The scan is a fold over the sorted candidate files. The accumulator owns
//! the reference size, fixed by the first image in which the board is found,
//! and any later detection at a different size aborts the scan.

use camcalib_chessboard::{ChessboardDetection, ChessboardDetector};
use camcalib_core::{ImagePointSet, ImageSize};
use image::DynamicImage;
use log::{debug, info, warn};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// File extensions considered calibration images (case-insensitive).
pub const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(thiserror::Error, Debug)]
pub enum ValidateError {
    #[error("cannot list image directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "calibration images have varying sizes: {path} is {found}, \
         earlier images are {expected}"
    )]
    DimensionMismatch {
        path: PathBuf,
        expected: ImageSize,
        found: ImageSize,
    },
}

/// What happened to one candidate file.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageOutcome {
    Detected,
    NotFound,
    /// The file could not be opened or decoded.
    Unreadable(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub outcome: ImageOutcome,
}

/// An accepted image and its refined corners.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationView {
    pub path: PathBuf,
    pub corners: ImagePointSet,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedImageSet {
    pub views: Vec<CalibrationView>,
    /// Shared size of the accepted images; `None` when no board was found.
    pub image_size: Option<ImageSize>,
    pub valid: usize,
    pub total: usize,
    /// Every candidate file in scan order.
    pub outcomes: Vec<ImageRecord>,
}

impl ValidatedImageSet {
    /// Corner sets of the accepted views, in scan order.
    pub fn image_points(&self) -> Vec<ImagePointSet> {
        self.views.iter().map(|v| v.corners.clone()).collect()
    }
}

/// Fold state of [`scan`].
#[derive(Debug, Default)]
pub struct ScanAccumulator {
    reference: Option<ImageSize>,
    views: Vec<CalibrationView>,
    outcomes: Vec<ImageRecord>,
}

impl ScanAccumulator {
    /// Account for one decoded candidate. A board found at a size other than
    /// the reference size is fatal.
    pub fn step(
        mut self,
        path: &Path,
        image: Result<DynamicImage, image::ImageError>,
        detector: &ChessboardDetector,
        on_detect: &mut impl FnMut(&Path, &DynamicImage, &ChessboardDetection),
    ) -> Result<Self, ValidateError> {
        let img = match image {
            Ok(img) => img,
            Err(err) => {
                warn!("cannot read {}: {err}", path.display());
                self.record(path, ImageOutcome::Unreadable(err.to_string()));
                return Ok(self);
            }
        };

        let Some(detection) = detector.detect(&img) else {
            info!("chessboard not found in {}", path.display());
            self.record(path, ImageOutcome::NotFound);
            return Ok(self);
        };

        let size = ImageSize::new(img.width(), img.height());
        match self.reference {
            None => self.reference = Some(size),
            Some(expected) if expected != size => {
                return Err(ValidateError::DimensionMismatch {
                    path: path.to_path_buf(),
                    expected,
                    found: size,
                });
            }
            Some(_) => {}
        }

        debug!("chessboard found in {}", path.display());
        on_detect(path, &img, &detection);
        self.record(path, ImageOutcome::Detected);
        self.views.push(CalibrationView {
            path: path.to_path_buf(),
            corners: detection.corners,
        });
        Ok(self)
    }

    fn record(&mut self, path: &Path, outcome: ImageOutcome) {
        self.outcomes.push(ImageRecord {
            path: path.to_path_buf(),
            outcome,
        });
    }

    pub fn finish(self) -> ValidatedImageSet {
        ValidatedImageSet {
            valid: self.views.len(),
            total: self.outcomes.len(),
            views: self.views,
            image_size: self.reference,
            outcomes: self.outcomes,
        }
    }
}

/// Regular files in `dir` with an image extension, sorted by file name.
pub fn list_candidates(dir: &Path) -> Result<Vec<PathBuf>, ValidateError> {
    let read_dir_err = |source| ValidateError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_err)? {
        let path = entry.map_err(read_dir_err)?.path();
        if path.is_file() && has_image_extension(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Run the detector over every candidate image in `dir`.
pub fn scan(dir: &Path, detector: &ChessboardDetector) -> Result<ValidatedImageSet, ValidateError> {
    scan_with(dir, detector, |_, _, _| {})
}

/// [`scan`] with a hook called for every accepted image.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(detector, on_detect),
        fields(dir = %dir.display())
    )
)]
pub fn scan_with(
    dir: &Path,
    detector: &ChessboardDetector,
    mut on_detect: impl FnMut(&Path, &DynamicImage, &ChessboardDetection),
) -> Result<ValidatedImageSet, ValidateError> {
    let set = list_candidates(dir)?
        .into_iter()
        .try_fold(ScanAccumulator::default(), |acc, path| {
            let image = image::open(&path);
            acc.step(&path, image, detector, &mut on_detect)
        })?
        .finish();

    info!("{}/{} valid calibration image(s)", set.valid, set.total);
    Ok(set)
}

//! Aesthetic scoring.
//!
//! A quality model rates each display artifact on its native [0, 100]
//! scale; the pipeline rescales that to the 1-10 rating the gallery
//! shows. The backend sits behind a trait so the orchestrator can be
//! tested without an ONNX model on disk.

mod preprocess;
mod session;

pub use preprocess::preprocess;
pub use session::QualitySession;

use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView};

use crate::error::{Outcome, StageError, StageResult};
use crate::pipeline::derive::crop_box;
use crate::types::ArtifactPair;

/// Rating assigned when scoring fails permanently for a photo.
///
/// The midpoint of the 1-10 scale: the photo sorts neither first nor
/// last, and a later run with a working backend replaces it.
pub const NEUTRAL_SCORE: f32 = 5.5;

/// Map a raw [0, 100] model score onto the 1-10 display scale,
/// rounded to one decimal place.
pub fn rescale(raw: f32) -> f32 {
    let scaled = 1.0 + (raw / 100.0) * 9.0;
    let clamped = scaled.clamp(1.0, 10.0);
    (clamped * 10.0).round() / 10.0
}

/// Produces one raw quality score per image.
pub trait ScoreBackend: Send + Sync {
    fn raw_score(&self, image: &DynamicImage, path: &Path) -> StageResult<f32>;
}

/// The production backend: ONNX inference over a preprocessed tensor.
pub struct OnnxBackend {
    session: QualitySession,
    image_size: u32,
}

impl OnnxBackend {
    pub fn load(model_path: &Path, image_size: u32) -> StageResult<Self> {
        Ok(Self {
            session: QualitySession::load(model_path)?,
            image_size,
        })
    }
}

impl ScoreBackend for OnnxBackend {
    fn raw_score(&self, image: &DynamicImage, path: &Path) -> StageResult<f32> {
        let tensor = preprocess(image, self.image_size);
        self.session.score(&tensor, path)
    }
}

/// Scores display artifacts through a [`ScoreBackend`].
pub struct AestheticScorer {
    backend: Arc<dyn ScoreBackend>,
}

impl AestheticScorer {
    /// Load the production ONNX backend. Failure here is fatal: without
    /// a model no photo can be scored, so the run aborts before workers
    /// start.
    pub fn load(model_path: &Path, image_size: u32) -> StageResult<Self> {
        Ok(Self {
            backend: Arc::new(OnnxBackend::load(model_path, image_size)?),
        })
    }

    /// Use an injected backend.
    pub fn with_backend(backend: Arc<dyn ScoreBackend>) -> Self {
        Self { backend }
    }

    /// Score one photo's display artifact on the 1-10 scale.
    pub fn score(&self, pair: &ArtifactPair) -> Outcome<f32> {
        let image = match load_display_image(pair) {
            Ok(img) => img,
            Err(e) => return Outcome::Recoverable(e),
        };
        self.backend
            .raw_score(&image, &pair.compressed_path)
            .map(rescale)
            .into()
    }
}

/// Load the pixels the display artifact shows.
///
/// Prefers decoding the compressed artifact itself. Not every build can
/// decode the display codec (AVIF decoding needs a system dav1d), so on
/// decode failure the archival copy is re-cropped with the same centered
/// crop the encoder used, which reproduces the identical pixel region.
fn load_display_image(pair: &ArtifactPair) -> StageResult<DynamicImage> {
    match image::open(&pair.compressed_path) {
        Ok(img) => Ok(img),
        Err(compressed_err) => {
            let archival =
                image::open(&pair.original_path).map_err(|e| StageError::Score {
                    path: pair.original_path.clone(),
                    message: format!(
                        "cannot decode display artifact ({compressed_err}) or archival copy ({e})"
                    ),
                })?;
            let (width, height) = archival.dimensions();
            let (x, y, w, h) = crop_box(width, height);
            Ok(archival.crop_imm(x, y, w, h))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_rescale_endpoints() {
        assert_eq!(rescale(0.0), 1.0);
        assert_eq!(rescale(100.0), 10.0);
    }

    #[test]
    fn test_rescale_rounds_to_one_decimal() {
        // 61.2 -> 1 + 5.508 = 6.508 -> 6.5
        assert_eq!(rescale(61.2), 6.5);
        assert_eq!(rescale(50.0), 5.5);
    }

    #[test]
    fn test_rescale_clamps_out_of_range_output() {
        assert_eq!(rescale(-20.0), 1.0);
        assert_eq!(rescale(140.0), 10.0);
    }

    struct FixedBackend {
        raw: f32,
        calls: AtomicU32,
    }

    impl ScoreBackend for FixedBackend {
        fn raw_score(&self, _image: &DynamicImage, _path: &Path) -> StageResult<f32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.raw)
        }
    }

    fn pair_in(dir: &Path, name: &str) -> ArtifactPair {
        ArtifactPair {
            base_name: name.to_string(),
            original_path: dir.join(format!("orig_{name}")),
            compressed_path: dir.join(format!("comp_{name}")),
        }
    }

    #[test]
    fn test_score_rescales_backend_output() {
        let dir = tempfile::tempdir().unwrap();
        let pair = pair_in(dir.path(), "a.jpg");
        image::DynamicImage::new_rgb8(64, 48)
            .save_with_format(&pair.compressed_path, image::ImageFormat::Jpeg)
            .unwrap();

        let backend = Arc::new(FixedBackend {
            raw: 80.0,
            calls: AtomicU32::new(0),
        });
        let scorer = AestheticScorer::with_backend(backend.clone());

        let outcome = scorer.score(&pair);
        assert_eq!(outcome.into_result().unwrap(), 8.2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_score_unreadable_artifacts_is_recoverable() {
        let pair = ArtifactPair {
            base_name: "gone.jpg".to_string(),
            original_path: PathBuf::from("/nonexistent/orig.jpg"),
            compressed_path: PathBuf::from("/nonexistent/comp.avif"),
        };
        let scorer = AestheticScorer::with_backend(Arc::new(FixedBackend {
            raw: 50.0,
            calls: AtomicU32::new(0),
        }));

        assert!(!scorer.score(&pair).is_success());
    }

    #[test]
    fn test_display_image_falls_back_to_cropped_archival() {
        let dir = tempfile::tempdir().unwrap();
        let pair = pair_in(dir.path(), "b.jpg");
        // Archival exists; compressed artifact is undecodable bytes.
        image::DynamicImage::new_rgb8(1000, 700)
            .save_with_format(&pair.original_path, image::ImageFormat::Jpeg)
            .unwrap();
        std::fs::write(&pair.compressed_path, b"not an image").unwrap();

        let img = load_display_image(&pair).unwrap();
        let (_, _, w, h) = crop_box(1000, 700);
        assert_eq!((img.width(), img.height()), (w, h));
    }
}

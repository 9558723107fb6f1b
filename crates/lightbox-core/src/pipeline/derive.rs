//! Artifact derivation: idempotent crop + encode of one source image into
//! an archival copy and a compressed display variant.
//!
//! Existence of both output files is the durable completion record, so a
//! repeated run over the same output directory is a no-op for anything
//! already derived. Artifacts are published write-then-rename: a finished
//! file is never observed half-written and is never mutated in place.

use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::{Outcome, StageError, StageResult};
use crate::metadata::MetadataExtractor;
use crate::progress::ProgressCounter;
use crate::types::{ArtifactPair, SourceImage};

/// Display aspect ratio for horizontal images (vertical uses the inverse).
const RATIO_H: f64 = 7.0 / 5.0;

/// Subdirectory holding archival copies.
pub const ORIGINAL_DIR: &str = "original";

/// Subdirectory holding compressed display variants.
pub const COMPRESSED_DIR: &str = "compressed";

/// The fixed on-disk layout of derived artifacts under one output root.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    original_dir: PathBuf,
    compressed_dir: PathBuf,
    compressed_ext: String,
}

impl ArtifactLayout {
    /// Create a layout rooted at `output_root`.
    pub fn new(output_root: &Path, compressed_format: &str) -> Self {
        Self {
            original_dir: output_root.join(ORIGINAL_DIR),
            compressed_dir: output_root.join(COMPRESSED_DIR),
            compressed_ext: compressed_format.to_string(),
        }
    }

    /// Create both output subdirectories if absent.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.original_dir)?;
        std::fs::create_dir_all(&self.compressed_dir)
    }

    /// The expected artifact pair for a source filename.
    pub fn pair_for(&self, file_name: &str) -> ArtifactPair {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);
        ArtifactPair {
            base_name: stem.to_string(),
            original_path: self.original_dir.join(file_name),
            compressed_path: self
                .compressed_dir
                .join(format!("{}.{}", stem, self.compressed_ext)),
        }
    }

    /// The completion predicate: a pair is derived when both files exist.
    pub fn is_derived(&self, pair: &ArtifactPair) -> bool {
        pair.original_path.exists() && pair.compressed_path.exists()
    }

    /// Directory holding the archival copies.
    pub fn original_dir(&self) -> &Path {
        &self.original_dir
    }

    /// URL of the display variant, relative to the output root.
    pub fn url_for(&self, pair: &ArtifactPair) -> String {
        let file = pair
            .compressed_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&pair.base_name);
        format!("/{}/{}", COMPRESSED_DIR, file)
    }

    /// Encoding format for the display variant.
    pub fn compressed_format(&self) -> StageResult<ImageFormat> {
        match self.compressed_ext.as_str() {
            "avif" => Ok(ImageFormat::Avif),
            "webp" => Ok(ImageFormat::WebP),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            other => Err(StageError::Encode {
                path: self.compressed_dir.clone(),
                message: format!("unsupported compressed format {:?}", other),
            }),
        }
    }
}

/// The largest centered crop box matching the display ratio.
///
/// Horizontal images (width > height) target 7/5, vertical images 5/7.
/// Returns `(x, y, width, height)`; the box never exceeds the source
/// extent in either axis.
pub fn crop_box(width: u32, height: u32) -> (u32, u32, u32, u32) {
    let (w, h) = (width as f64, height as f64);
    let (new_w, new_h) = if width > height {
        let candidate = h * RATIO_H;
        if candidate <= w {
            (candidate, h)
        } else {
            (w, w / RATIO_H)
        }
    } else {
        let candidate = w * RATIO_H;
        if candidate <= h {
            (w, candidate)
        } else {
            (h / RATIO_H, h)
        }
    };

    let crop_w = (new_w.round() as u32).min(width);
    let crop_h = (new_h.round() as u32).min(height);
    let x = (width - crop_w) / 2;
    let y = (height - crop_h) / 2;
    (x, y, crop_w, crop_h)
}

/// Right the pixel data per the EXIF orientation tag.
///
/// Tags 1-4 are mirror/rotation-180 variants; 5-8 involve a quarter turn
/// and swap the axes.
pub fn apply_orientation(img: DynamicImage, tag: u32) -> DynamicImage {
    match tag {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Derives the artifact pair for one source image.
pub struct ArtifactWriter {
    layout: ArtifactLayout,
}

impl ArtifactWriter {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Derive both artifacts for one source image.
    ///
    /// Fast path: if both outputs already exist, advance the counter by
    /// two and return without decoding. Slow path: decode once, correct
    /// orientation, write the archival copy and the cropped display
    /// variant independently (either may already exist on its own).
    ///
    /// The counter always advances by two, including on failure, so the
    /// progress display never stalls on a bad file.
    pub fn derive(&self, source: &SourceImage, counter: &ProgressCounter) -> Outcome<ArtifactPair> {
        let pair = self.layout.pair_for(source.file_name());

        if self.layout.is_derived(&pair) {
            counter.add(2);
            tracing::trace!("Already derived: {}", pair.base_name);
            return Outcome::Success(pair);
        }

        let result = self.derive_slow(source, &pair);
        counter.add(2);
        match result {
            Ok(()) => Outcome::Success(pair),
            Err(e) => {
                tracing::warn!("Derivation failed for {:?}: {}", source.path, e);
                Outcome::Recoverable(e)
            }
        }
    }

    fn derive_slow(&self, source: &SourceImage, pair: &ArtifactPair) -> StageResult<()> {
        let decoded = image::open(&source.path).map_err(|e| StageError::Decode {
            path: source.path.clone(),
            message: e.to_string(),
        })?;

        let upright = match MetadataExtractor::orientation(&source.path) {
            Some(tag) => apply_orientation(decoded, tag),
            None => decoded,
        };

        if !pair.original_path.exists() {
            publish(&upright, ImageFormat::Jpeg, &pair.original_path)?;
        }

        if !pair.compressed_path.exists() {
            let (width, height) = upright.dimensions();
            let (x, y, w, h) = crop_box(width, height);
            let cropped = upright.crop_imm(x, y, w, h);
            publish(&cropped, self.layout.compressed_format()?, &pair.compressed_path)?;
        }

        Ok(())
    }
}

/// Encode to a sibling temp file, then rename into place.
///
/// The rename is the publish point: readers either see the complete file
/// or no file.
fn publish(img: &DynamicImage, format: ImageFormat, dest: &Path) -> StageResult<()> {
    let encode_err = |message: String| StageError::Encode {
        path: dest.to_path_buf(),
        message,
    };

    let file_name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| encode_err("destination has no filename".to_string()))?;
    let tmp = dest.with_file_name(format!(".{}.tmp", file_name));

    img.save_with_format(&tmp, format).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        encode_err(e.to_string())
    })?;

    std::fs::rename(&tmp, dest).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        encode_err(e.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn writer(root: &Path) -> ArtifactWriter {
        // jpg keeps the encode cheap; the layout is format-agnostic.
        let layout = ArtifactLayout::new(root, "jpg");
        layout.ensure_dirs().unwrap();
        ArtifactWriter::new(layout)
    }

    fn source_jpeg(dir: &Path, name: &str, width: u32, height: u32) -> SourceImage {
        let path = dir.join(name);
        image::DynamicImage::new_rgb8(width, height)
            .save(&path)
            .unwrap();
        SourceImage {
            path,
            modified: SystemTime::now(),
        }
    }

    #[test]
    fn test_crop_box_horizontal_ratio() {
        let (x, y, w, h) = crop_box(1000, 700);
        assert_eq!((w, h), (980, 700));
        assert!((w as f64 / h as f64 - 7.0 / 5.0).abs() < 0.01);
        assert_eq!((x, y), (10, 0));
    }

    #[test]
    fn test_crop_box_vertical_ratio() {
        let (x, y, w, h) = crop_box(700, 1000);
        assert_eq!((w, h), (700, 980));
        assert!((w as f64 / h as f64 - 5.0 / 7.0).abs() < 0.01);
        assert_eq!((x, y), (0, 10));
    }

    #[test]
    fn test_crop_box_wide_panorama_clamps_to_width() {
        // 3000x500: height*1.4 = 700 <= 3000, so full-height crop.
        let (_, _, w, h) = crop_box(3000, 500);
        assert_eq!((w, h), (700, 500));

        // 600x550: height*1.4 = 770 > 600, so width-limited crop.
        let (_, _, w, h) = crop_box(600, 550);
        assert_eq!(w, 600);
        assert!(h <= 550);
        assert!((w as f64 / h as f64 - 7.0 / 5.0).abs() < 0.01);
    }

    #[test]
    fn test_crop_box_never_exceeds_source_extent() {
        for &(w, h) in &[(1u32, 1u32), (3, 1000), (1000, 3), (1001, 701), (7, 5)] {
            let (x, y, cw, ch) = crop_box(w, h);
            assert!(cw <= w && ch <= h, "crop {}x{} exceeds {}x{}", cw, ch, w, h);
            assert!(x + cw <= w && y + ch <= h);
        }
    }

    #[test]
    fn test_apply_orientation_quarter_turn_swaps_axes() {
        let img = DynamicImage::new_rgb8(40, 20);
        let turned = apply_orientation(img, 6);
        assert_eq!(turned.dimensions(), (20, 40));

        let img = DynamicImage::new_rgb8(40, 20);
        let mirrored = apply_orientation(img, 2);
        assert_eq!(mirrored.dimensions(), (40, 20));
    }

    #[test]
    fn test_derive_creates_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let writer = writer(&out);
        let source = source_jpeg(dir.path(), "shot.jpg", 100, 70);
        let counter = ProgressCounter::new();

        let outcome = writer.derive(&source, &counter);
        let pair = outcome.into_result().unwrap();
        assert!(pair.original_path.exists());
        assert!(pair.compressed_path.exists());
        assert_eq!(counter.value(), 2);

        // Display variant carries the 7/5 crop.
        let (w, h) = image::image_dimensions(&pair.compressed_path).unwrap();
        assert!((w as f64 / h as f64 - 7.0 / 5.0).abs() < 0.05);
    }

    #[test]
    fn test_derive_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let writer = writer(&out);
        let source = source_jpeg(dir.path(), "shot.jpg", 100, 70);
        let counter = ProgressCounter::new();

        let first = writer.derive(&source, &counter).into_result().unwrap();
        let original_mtime = std::fs::metadata(&first.original_path)
            .unwrap()
            .modified()
            .unwrap();
        let compressed_mtime = std::fs::metadata(&first.compressed_path)
            .unwrap()
            .modified()
            .unwrap();

        let second = writer.derive(&source, &counter).into_result().unwrap();
        assert_eq!(first, second);
        assert_eq!(counter.value(), 4);

        // Fast path performed zero additional writes.
        let meta = std::fs::metadata(&second.original_path).unwrap();
        assert_eq!(meta.modified().unwrap(), original_mtime);
        let meta = std::fs::metadata(&second.compressed_path).unwrap();
        assert_eq!(meta.modified().unwrap(), compressed_mtime);
    }

    #[test]
    fn test_derive_failure_still_advances_counter() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let writer = writer(&out);

        let path = dir.path().join("corrupt.jpg");
        std::fs::write(&path, b"this is not a jpeg").unwrap();
        let source = SourceImage {
            path,
            modified: SystemTime::now(),
        };
        let counter = ProgressCounter::new();

        let outcome = writer.derive(&source, &counter);
        assert!(!outcome.is_success());
        assert_eq!(counter.value(), 2);
        assert!(!writer.layout().pair_for("corrupt.jpg").original_path.exists());
    }

    #[test]
    fn test_no_tmp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let writer = writer(&out);
        let source = source_jpeg(dir.path(), "shot.jpg", 70, 100);
        let counter = ProgressCounter::new();

        writer.derive(&source, &counter).into_result().unwrap();

        for sub in [ORIGINAL_DIR, COMPRESSED_DIR] {
            for entry in std::fs::read_dir(out.join(sub)).unwrap() {
                let name = entry.unwrap().file_name();
                assert!(
                    !name.to_string_lossy().ends_with(".tmp"),
                    "leftover temp file: {:?}",
                    name
                );
            }
        }
    }
}

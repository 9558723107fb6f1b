//! Core data types for the Lightbox ingestion pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;

/// A source photograph discovered by the scanner.
///
/// Immutable once discovered; identity is the file path.
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// Full path to the source file
    pub path: PathBuf,

    /// Filesystem modification time, used for stable ordering
    pub modified: SystemTime,
}

impl SourceImage {
    /// The filename portion of the source path.
    ///
    /// This is the key for the rating cache: it stays stable across
    /// changes to the compression format of the derived artifacts.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
    }
}

/// The two output files derived from one source image.
///
/// Existence on disk is the durable record of completion; there is no
/// separate manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPair {
    /// Source filename without extension
    pub base_name: String,

    /// Archival copy: orientation-corrected, full resolution
    pub original_path: PathBuf,

    /// Display variant: cropped, compressed
    pub compressed_path: PathBuf,
}

/// Landscape or portrait framing of a photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    /// Classify from pixel dimensions and the EXIF orientation tag.
    ///
    /// Tags 5-8 mean the camera was held vertically, regardless of the
    /// stored pixel dimensions; otherwise the dimensions decide.
    pub fn classify(width: u32, height: u32, orientation_tag: Option<u32>) -> Self {
        match orientation_tag {
            Some(5..=8) => Orientation::Vertical,
            _ => {
                if width > height {
                    Orientation::Horizontal
                } else {
                    Orientation::Vertical
                }
            }
        }
    }
}

/// Camera-recorded capture metadata, extracted from the source file
/// (or, as a fallback, from the archival copy). Read-only after
/// extraction.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CaptureMetadata {
    /// Camera model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,

    /// Aperture (e.g., "f/1.8")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f_number: Option<String>,

    /// Exposure time (e.g., "1/1000")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<String>,

    /// ISO sensitivity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,

    /// Capture datetime as recorded by the camera
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_taken: Option<String>,

    /// Image orientation (1-8 per EXIF spec)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation_tag: Option<u32>,
}

impl CaptureMetadata {
    /// True if no field was extracted at all.
    pub fn is_empty(&self) -> bool {
        self.camera_model.is_none()
            && self.f_number.is_none()
            && self.exposure_time.is_none()
            && self.iso.is_none()
            && self.date_taken.is_none()
            && self.orientation_tag.is_none()
    }
}

/// The pipeline's final output unit, handed by value to the serving layer.
///
/// `id` is assigned by stable position in the time-sorted source list,
/// not by completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoRecord {
    /// Stable position in the time-sorted source list (1-based)
    pub id: usize,

    /// Aesthetic score in [1, 10], one decimal place
    pub rating: f32,

    /// Landscape or portrait framing of the display variant
    pub orientation: Orientation,

    /// Capture date if known, else the file modification time (RFC 3339)
    pub sort_date: String,

    /// URL of the display variant, relative to the output root
    pub url: String,

    /// Capture metadata extracted during ingestion
    pub metadata: CaptureMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_from_dimensions() {
        assert_eq!(
            Orientation::classify(1000, 700, None),
            Orientation::Horizontal
        );
        assert_eq!(
            Orientation::classify(700, 1000, None),
            Orientation::Vertical
        );
        // Square counts as vertical (width is not strictly greater)
        assert_eq!(
            Orientation::classify(800, 800, None),
            Orientation::Vertical
        );
    }

    #[test]
    fn test_orientation_tag_overrides_dimensions() {
        // Tag 6 = rotated 90° CW: sensor data is landscape but the
        // photo is a portrait.
        assert_eq!(
            Orientation::classify(4000, 3000, Some(6)),
            Orientation::Vertical
        );
        // Tags 1-4 defer to dimensions.
        assert_eq!(
            Orientation::classify(4000, 3000, Some(1)),
            Orientation::Horizontal
        );
    }

    #[test]
    fn test_photo_record_serializes_orientation_lowercase() {
        let record = PhotoRecord {
            id: 1,
            rating: 7.2,
            orientation: Orientation::Horizontal,
            sort_date: "2024-06-01T12:00:00Z".to_string(),
            url: "/compressed/P1090567.avif".to_string(),
            metadata: CaptureMetadata::default(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"orientation\":\"horizontal\""));
        assert!(json.contains("\"rating\":7.2"));
    }

    #[test]
    fn test_capture_metadata_is_empty() {
        assert!(CaptureMetadata::default().is_empty());
        let md = CaptureMetadata {
            iso: Some(200),
            ..Default::default()
        };
        assert!(!md.is_empty());
    }
}

//! Capture metadata extraction from source photographs.

use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::types::CaptureMetadata;

/// Extracts camera-recorded capture metadata from image files.
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Extract capture metadata from an image file.
    ///
    /// Returns `None` if the file has no EXIF data or if extraction fails.
    /// Intentionally lenient: partial data is returned if available.
    pub fn extract(path: &Path) -> Option<CaptureMetadata> {
        let file = File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = Reader::new().read_from_container(&mut reader).ok()?;

        let data = CaptureMetadata {
            camera_model: Self::get_string(&exif, Tag::Model),
            f_number: Self::get_f_number(&exif),
            exposure_time: Self::get_exposure_time(&exif),
            iso: Self::get_u32(&exif, Tag::PhotographicSensitivity),
            date_taken: Self::get_datetime(&exif),
            orientation_tag: Self::get_u32(&exif, Tag::Orientation),
        };

        if data.is_empty() {
            None
        } else {
            Some(data)
        }
    }

    /// Extract from the source file, falling back to the archival copy.
    ///
    /// Some sources lose their EXIF block to earlier tooling; the archival
    /// copy may still carry tags propagated by a previous run.
    pub fn extract_with_fallback(source: &Path, archival: &Path) -> CaptureMetadata {
        Self::extract(source)
            .or_else(|| Self::extract(archival))
            .unwrap_or_default()
    }

    /// Read just the EXIF orientation tag (1-8), cheaply.
    ///
    /// Used by the derivation worker to right the pixel data before
    /// cropping. `None` means "treat as already upright".
    pub fn orientation(path: &Path) -> Option<u32> {
        let file = File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = Reader::new().read_from_container(&mut reader).ok()?;
        Self::get_u32(&exif, Tag::Orientation)
    }

    /// Get a string field from EXIF data.
    fn get_string(exif: &exif::Exif, tag: Tag) -> Option<String> {
        exif.get_field(tag, In::PRIMARY).map(|f| {
            let s = f.display_value().to_string();
            s.trim_matches('"').to_string()
        })
    }

    /// Get a u32 field from EXIF data.
    fn get_u32(exif: &exif::Exif, tag: Tag) -> Option<u32> {
        exif.get_field(tag, In::PRIMARY)
            .and_then(|f| match &f.value {
                Value::Short(v) => v.first().map(|&x| x as u32),
                Value::Long(v) => v.first().copied(),
                _ => None,
            })
    }

    /// Get the capture datetime, preferring DateTimeOriginal over DateTime.
    fn get_datetime(exif: &exif::Exif) -> Option<String> {
        exif.get_field(Tag::DateTimeOriginal, In::PRIMARY)
            .or_else(|| exif.get_field(Tag::DateTime, In::PRIMARY))
            .map(|f| {
                let s = f.display_value().to_string();
                s.trim_matches('"').to_string()
            })
    }

    /// Get aperture as a formatted string (e.g., "f/1.8").
    fn get_f_number(exif: &exif::Exif) -> Option<String> {
        exif.get_field(Tag::FNumber, In::PRIMARY).map(|f| {
            let s = f.display_value().to_string();
            format!("f/{}", s)
        })
    }

    /// Get exposure time as a string (e.g., "1/1000").
    fn get_exposure_time(exif: &exif::Exif) -> Option<String> {
        exif.get_field(Tag::ExposureTime, In::PRIMARY)
            .map(|f| f.display_value().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_missing_file() {
        let result = MetadataExtractor::extract(Path::new("/nonexistent/file.jpg"));
        assert!(result.is_none());
    }

    #[test]
    fn test_extract_with_fallback_returns_default_when_both_missing() {
        let md = MetadataExtractor::extract_with_fallback(
            Path::new("/nonexistent/a.jpg"),
            Path::new("/nonexistent/b.jpg"),
        );
        assert!(md.is_empty());
    }

    #[test]
    fn test_orientation_on_exifless_image() {
        // An image encoded by the image crate carries no EXIF block.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.jpg");
        image::DynamicImage::new_rgb8(16, 16).save(&path).unwrap();

        assert!(MetadataExtractor::orientation(&path).is_none());
    }
}

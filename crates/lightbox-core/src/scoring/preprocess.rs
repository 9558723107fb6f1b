//! Image preprocessing for quality model inference.
//!
//! The quality backbone expects:
//! - Input size: `image_size × image_size` pixels (224 for paq2piq)
//! - Normalization: ImageNet per-channel mean/std
//! - Channel order: RGB
//! - Tensor layout: NCHW [batch, channels, height, width]

use image::DynamicImage;
use ndarray::Array4;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// ImageNet normalization mean (per-channel, RGB).
const NORM_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet normalization std (per-channel, RGB).
const NORM_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Preprocess an image for quality inference.
///
/// Resizes to `image_size × image_size`, converts to RGB, applies
/// ImageNet normalization, and returns an NCHW tensor for ONNX Runtime.
pub fn preprocess(image: &DynamicImage, image_size: u32) -> Array4<f32> {
    let resized = image.resize_exact(
        image_size,
        image_size,
        image::imageops::FilterType::Lanczos3,
    );
    let rgb = resized.to_rgb8();

    let size = image_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, CHANNELS, size, size));

    // Access raw RGB bytes and tensor slice directly to avoid per-pixel
    // bounds-checking overhead from get_pixel() and 4D ndarray indexing.
    let raw = rgb.as_raw();
    let tensor_data = tensor.as_slice_mut().unwrap();
    for (i, pixel) in raw.chunks_exact(3).enumerate() {
        let y = i / size;
        let x = i % size;
        for (c, &val) in pixel.iter().enumerate() {
            // NCHW layout: offset = c * size * size + y * size + x
            let idx = c * size * size + y * size + x;
            tensor_data[idx] = (val as f32 / 255.0 - NORM_MEAN[c]) / NORM_STD[c];
        }
    }

    tensor
}

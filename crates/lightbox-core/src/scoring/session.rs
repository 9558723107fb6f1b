//! ONNX session management for the quality model.
//!
//! Loads a paq2piq-style quality backbone exported to ONNX and runs
//! inference to produce one raw quality score per image on the model's
//! native [0, 100] scale.

use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

use crate::error::{StageError, StageResult};

/// Wraps an ONNX Runtime session for quality scoring.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct QualitySession {
    session: Mutex<Session>,
    /// Name of the input tensor (detected from model metadata).
    input_name: String,
}

impl QualitySession {
    /// Load a quality model from an ONNX file.
    ///
    /// Hardware execution providers are compiled in behind the `cuda`
    /// and `coreml` features; ONNX Runtime falls back to CPU when a
    /// provider fails to register at runtime.
    pub fn load(model_path: &Path) -> StageResult<Self> {
        #[allow(unused_mut)]
        let mut builder = Session::builder().map_err(|e| StageError::ScorerInit {
            message: format!("Failed to create ONNX session builder: {e}"),
        })?;

        #[cfg(feature = "cuda")]
        {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default().build()
                ])
                .map_err(|e| StageError::ScorerInit {
                    message: format!("Failed to register CUDA provider: {e}"),
                })?;
        }

        #[cfg(feature = "coreml")]
        {
            builder = builder
                .with_execution_providers([
                    ort::execution_providers::CoreMLExecutionProvider::default().build()
                ])
                .map_err(|e| StageError::ScorerInit {
                    message: format!("Failed to register CoreML provider: {e}"),
                })?;
        }

        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| StageError::ScorerInit {
                message: format!(
                    "Failed to load ONNX model from {}: {e}",
                    model_path.display()
                ),
            })?;

        // Detect the input tensor name from model metadata.
        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "input".to_string());

        tracing::debug!(
            "Loaded quality model from {:?} (input: {:?}, outputs: {:?})",
            model_path,
            input_name,
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }

    /// Run inference on a preprocessed image tensor and return the raw
    /// quality score on the model's [0, 100] scale.
    ///
    /// Input shape: \[1, 3, image_size, image_size\] (NCHW, ImageNet
    /// normalized). The model's first output holds the global score as
    /// its first element; paq2piq exports append per-patch scores after
    /// it, which the pipeline does not use.
    pub fn score(&self, preprocessed: &Array4<f32>, path: &Path) -> StageResult<f32> {
        // Convert ndarray to (shape, flat_data) for ort (avoids ndarray feature dependency).
        let shape: Vec<i64> = preprocessed.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = preprocessed.iter().copied().collect();

        let input_value = Value::from_array((shape, flat_data)).map_err(|e| StageError::Score {
            path: path.to_path_buf(),
            message: format!("Failed to create input tensor: {e}"),
        })?;

        let inputs = ort::inputs![self.input_name.as_str() => input_value];

        let mut session = self.session.lock().map_err(|e| StageError::Score {
            path: path.to_path_buf(),
            message: format!("Session lock poisoned: {e}"),
        })?;

        let outputs = session.run(inputs).map_err(|e| StageError::Score {
            path: path.to_path_buf(),
            message: format!("ONNX inference failed: {e}"),
        })?;

        let (name, output) = outputs.iter().next().ok_or_else(|| StageError::Score {
            path: path.to_path_buf(),
            message: "Model produced no outputs".to_string(),
        })?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| StageError::Score {
                path: path.to_path_buf(),
                message: format!("Failed to extract {name} tensor: {e}"),
            })?;

        data.first().copied().ok_or_else(|| StageError::Score {
            path: path.to_path_buf(),
            message: "Model output tensor is empty".to_string(),
        })
    }
}

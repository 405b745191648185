//! ONNX Runtime sessions for image models.
//!
//! Handles both NHWC (`[1, H, W, 3]`, the Keras export default) and NCHW
//! (`[1, 3, H, W]`) inputs. A static input shape in the model takes precedence
//! over the configured resolution.

use std::path::Path;

use cardioscan_core::{AnalysisError, NUM_CLASSES, Probabilities};
use ndarray::Array4;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use tracing::{debug, info};

use crate::classifier::Classifier;

/// Channel placement of a 4-D image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Layout {
    Nhwc,
    Nchw,
}

/// An ONNX image model with its resolved input geometry.
pub(crate) struct ImageSession {
    session: Session,
    layout: Layout,
    input_size: (u32, u32),
}

impl ImageSession {
    pub(crate) fn load(path: &Path, fallback_size: (u32, u32)) -> Result<Self, AnalysisError> {
        let session = Session::builder()
            .map_err(|e| load_error(path, e))?
            .commit_from_file(path)
            .map_err(|e| load_error(path, e))?;

        let input = session
            .inputs()
            .first()
            .ok_or_else(|| AnalysisError::Load(format!("{}: model has no inputs", path.display())))?;
        let (layout, static_size) = infer_geometry(input.dtype()).ok_or_else(|| {
            AnalysisError::Load(format!(
                "{}: expected a 4-D image input with 3 channels",
                path.display()
            ))
        })?;
        let input_size = static_size.unwrap_or(fallback_size);

        info!(
            model = %path.display(),
            ?layout,
            height = input_size.0,
            width = input_size.1,
            "loaded ONNX session"
        );
        Ok(Self {
            session,
            layout,
            input_size,
        })
    }

    pub(crate) fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    pub(crate) fn layout(&self) -> Layout {
        self.layout
    }

    /// Static shape of the first output, if the model declares one.
    pub(crate) fn output_dims(&self) -> Option<Vec<i64>> {
        match self.session.outputs().first()?.dtype() {
            ValueType::Tensor { shape, .. } => Some(shape.to_vec()),
            _ => None,
        }
    }

    /// Run the model on an NHWC tensor, returning the first output's shape and data.
    pub(crate) fn run(&mut self, input: &Array4<f32>) -> Result<(Vec<i64>, Vec<f32>), AnalysisError> {
        let (shape, data) = to_model_layout(input, self.layout);
        let tensor = Tensor::from_array((shape, data.into_boxed_slice()))
            .map_err(|e| AnalysisError::Inference(format!("building input tensor: {e}")))?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| AnalysisError::Inference(e.to_string()))?;

        let (output_shape, output_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AnalysisError::Inference(format!("reading output tensor: {e}")))?;
        let dims: &[i64] = output_shape;
        debug!(?dims, "forward pass complete");
        Ok((dims.to_vec(), output_data.to_vec()))
    }
}

fn load_error(path: &Path, e: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::Load(format!("{}: {e}", path.display()))
}

/// Work out layout and (if static) `(height, width)` from an input type.
fn infer_geometry(input_type: &ValueType) -> Option<(Layout, Option<(u32, u32)>)> {
    match input_type {
        ValueType::Tensor { shape, .. } => geometry_from_dims(shape),
        _ => None,
    }
}

/// NHWC when the last dim is 3, otherwise NCHW when dim 1 is 3. Symbolic
/// (`-1`) or zero spatial dims leave the size to the caller.
fn geometry_from_dims(dims: &[i64]) -> Option<(Layout, Option<(u32, u32)>)> {
    let &[_, d1, d2, d3] = dims else {
        return None;
    };
    let (layout, h, w) = if d3 == 3 {
        (Layout::Nhwc, d1, d2)
    } else if d1 == 3 {
        (Layout::Nchw, d2, d3)
    } else {
        return None;
    };
    let dim = |d: i64| u32::try_from(d).ok().filter(|&v| v > 0);
    Some((layout, dim(h).zip(dim(w))))
}

/// Shape and row-major data of an NHWC batch rearranged for `layout`.
fn to_model_layout(input: &Array4<f32>, layout: Layout) -> ([i64; 4], Vec<f32>) {
    let (n, h, w, c) = input.dim();
    match layout {
        Layout::Nhwc => ([n as i64, h as i64, w as i64, c as i64], input.iter().copied().collect()),
        Layout::Nchw => (
            [n as i64, c as i64, h as i64, w as i64],
            input.view().permuted_axes([0, 3, 1, 2]).iter().copied().collect(),
        ),
    }
}

/// A fully trained classifier exported to ONNX.
pub struct OnnxClassifier {
    session: ImageSession,
}

impl OnnxClassifier {
    /// Load a trained model and check that it ends in [`NUM_CLASSES`] outputs.
    pub fn load(path: &Path, fallback_size: (u32, u32)) -> Result<Self, AnalysisError> {
        let session = ImageSession::load(path, fallback_size)?;
        if let Some(dims) = session.output_dims()
            && let Some(&last) = dims.last()
            && last > 0
            && last as usize != NUM_CLASSES
        {
            return Err(AnalysisError::Load(format!(
                "{}: model outputs {last} classes, expected {NUM_CLASSES}",
                path.display()
            )));
        }
        Ok(Self { session })
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        "onnx"
    }

    fn input_size(&self) -> (u32, u32) {
        self.session.input_size()
    }

    fn predict(&mut self, input: &Array4<f32>) -> Result<Probabilities, AnalysisError> {
        let (_, data) = self.session.run(input)?;
        Probabilities::from_model_output(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn model_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("models")
            .join("cardiac_cnn.onnx")
    }

    #[test]
    fn keras_export_is_nhwc() {
        assert_eq!(geometry_from_dims(&[1, 224, 224, 3]), Some((Layout::Nhwc, Some((224, 224)))));
        assert_eq!(geometry_from_dims(&[-1, 300, 260, 3]), Some((Layout::Nhwc, Some((300, 260)))));
    }

    #[test]
    fn channels_first_is_nchw() {
        assert_eq!(geometry_from_dims(&[1, 3, 256, 192]), Some((Layout::Nchw, Some((256, 192)))));
    }

    #[test]
    fn dynamic_spatial_dims_defer_to_configured_size() {
        assert_eq!(geometry_from_dims(&[-1, -1, -1, 3]), Some((Layout::Nhwc, None)));
        assert_eq!(geometry_from_dims(&[1, 3, 224, -1]), Some((Layout::Nchw, None)));
        assert_eq!(geometry_from_dims(&[1, 0, 224, 3]), Some((Layout::Nhwc, None)));
    }

    #[test]
    fn non_image_inputs_are_rejected() {
        assert_eq!(geometry_from_dims(&[1, 224, 224, 1]), None);
        assert_eq!(geometry_from_dims(&[1, 224, 224]), None);
        assert_eq!(geometry_from_dims(&[1, 3, 224, 224, 1]), None);
        assert_eq!(geometry_from_dims(&[]), None);
    }

    #[test]
    fn nhwc_input_passes_through() {
        let input = Array4::from_shape_fn((1, 2, 2, 3), |(_, y, x, c)| (y * 6 + x * 3 + c) as f32);
        let (shape, data) = to_model_layout(&input, Layout::Nhwc);
        assert_eq!(shape, [1, 2, 2, 3]);
        assert_eq!(data, (0..12).map(|v| v as f32).collect::<Vec<_>>());
    }

    #[test]
    fn nchw_input_is_channel_planar() {
        // Encode (y, x, c) as c*100 + y*10 + x.
        let input = Array4::from_shape_fn((1, 2, 3, 3), |(_, y, x, c)| (c * 100 + y * 10 + x) as f32);
        let (shape, data) = to_model_layout(&input, Layout::Nchw);
        assert_eq!(shape, [1, 3, 2, 3]);
        assert_eq!(&data[..6], &[0.0, 1.0, 2.0, 10.0, 11.0, 12.0]);
        assert_eq!(&data[6..9], &[100.0, 101.0, 102.0]);
        assert_eq!(data[17], 212.0);
    }

    #[test]
    fn missing_file_is_load_error() {
        let err = OnnxClassifier::load(Path::new("/nonexistent/model.onnx"), (224, 224))
            .err()
            .unwrap();
        assert!(matches!(err, AnalysisError::Load(_)));
    }

    #[test]
    fn corrupt_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"not a protobuf").unwrap();
        let err = OnnxClassifier::load(&path, (224, 224)).err().unwrap();
        assert!(matches!(err, AnalysisError::Load(_)));
    }

    #[test]
    #[ignore = "requires models/cardiac_cnn.onnx"]
    fn trained_model_is_deterministic() {
        let mut clf = OnnxClassifier::load(&model_path(), (224, 224)).unwrap();
        let (h, w) = clf.input_size();
        let input = Array4::from_elem((1, h as usize, w as usize, 3), 0.5f32);
        let a = clf.predict(&input).unwrap();
        let b = clf.predict(&input).unwrap();
        assert_eq!(a, b);
        let sum: f32 = a.as_slice().iter().sum();
        assert!((sum - 1.0).abs() < 5e-3);
    }
}

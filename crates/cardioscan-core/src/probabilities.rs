//! Validated class-probability vectors.

use tracing::debug;

use crate::AnalysisError;
use crate::labels::NUM_CLASSES;

/// Tolerance on the sum of an output that is already a distribution.
const SUM_TOLERANCE: f64 = 1e-3;

/// A probability distribution over the [`NUM_CLASSES`] classes.
///
/// Every value is finite and non-negative and the values sum to 1 within
/// floating-point tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probabilities([f32; NUM_CLASSES]);

impl Probabilities {
    /// Validate raw classifier output.
    ///
    /// Output that is already a distribution is kept as-is. Anything else
    /// (values outside `[0, 1]`, or a sum away from 1) is treated as logits
    /// and passed through [`softmax`].
    pub fn from_model_output(raw: &[f32]) -> Result<Self, AnalysisError> {
        let values: [f32; NUM_CLASSES] = raw.try_into().map_err(|_| {
            AnalysisError::Inference(format!(
                "classifier produced {} outputs, expected {NUM_CLASSES}",
                raw.len()
            ))
        })?;

        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(AnalysisError::Inference(format!(
                "classifier output {i} is not finite: {}",
                values[i]
            )));
        }

        let sum: f64 = values.iter().map(|&v| f64::from(v)).sum();
        let in_range = values.iter().all(|v| (0.0..=1.0).contains(v));
        if in_range && (sum - 1.0).abs() <= SUM_TOLERANCE {
            return Ok(Self(values));
        }

        debug!(sum, "classifier output is not a distribution, applying softmax");
        let mut normalized = values;
        softmax(&mut normalized);
        Ok(Self(normalized))
    }

    /// Index of the most probable class. Ties resolve to the lowest index.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &p) in self.0.iter().enumerate().skip(1) {
            if p > self.0[best] {
                best = i;
            }
        }
        best
    }

    /// The most probable class and its probability.
    pub fn top(&self) -> (usize, f32) {
        let index = self.argmax();
        (index, self.0[index])
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// Numerically stable softmax, in place.
pub fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

use std::cell::RefCell;

use candle_core::{DType, Device, Tensor};

use crate::error::ValueNetworkError;
use crate::value::ValueNetwork;

/// A 3x4x4 image of ones.
pub fn dummy_image() -> Tensor {
    Tensor::ones((3, 4, 4), DType::F32, &Device::Cpu).expect("allocate dummy image")
}

/// `value(seq) = len(seq)`.
pub struct LengthValueNetwork;

impl ValueNetwork for LengthValueNetwork {
    fn evaluate(
        &self,
        _images: &Tensor,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<f32>, ValueNetworkError> {
        Ok(sequences.iter().map(|s| s.len() as f32).collect())
    }
}

/// `value(seq) = sum(seq) / 100`; distinct for most sequences.
pub struct TokenSumValueNetwork;

impl ValueNetwork for TokenSumValueNetwork {
    fn evaluate(
        &self,
        _images: &Tensor,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<f32>, ValueNetworkError> {
        Ok(sequences
            .iter()
            .map(|s| s.iter().map(|&t| t as f32).sum::<f32>() / 100.0)
            .collect())
    }
}

/// 1.0 for sequences ending in the preferred token, 0.0 otherwise.
pub struct LastTokenValueNetwork {
    preferred: u32,
}

impl LastTokenValueNetwork {
    pub fn prefer(preferred: u32) -> Self {
        Self { preferred }
    }
}

impl ValueNetwork for LastTokenValueNetwork {
    fn evaluate(
        &self,
        _images: &Tensor,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<f32>, ValueNetworkError> {
        Ok(sequences
            .iter()
            .map(|s| {
                if s.last() == Some(&self.preferred) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect())
    }
}

/// Always reports the network as unavailable.
pub struct FailingValueNetwork {
    message: String,
}

impl Default for FailingValueNetwork {
    fn default() -> Self {
        Self {
            message: "value server offline".to_string(),
        }
    }
}

impl ValueNetwork for FailingValueNetwork {
    fn evaluate(
        &self,
        _images: &Tensor,
        _sequences: &[Vec<u32>],
    ) -> Result<Vec<f32>, ValueNetworkError> {
        Err(ValueNetworkError::Unavailable(self.message.clone()))
    }
}

/// Returns one value fewer than requested.
pub struct ShortValueNetwork;

impl ValueNetwork for ShortValueNetwork {
    fn evaluate(
        &self,
        _images: &Tensor,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<f32>, ValueNetworkError> {
        Ok(vec![0.0; sequences.len().saturating_sub(1)])
    }
}

struct RecordedCall {
    image_shape: Vec<usize>,
    sequences: Vec<Vec<u32>>,
}

/// Wraps another network and records every call it receives.
///
/// Fails a call whose image batch does not match the number of sequences.
pub struct RecordingValueNetwork<N> {
    inner: N,
    calls: RefCell<Vec<RecordedCall>>,
}

impl<N> RecordingValueNetwork<N> {
    pub fn new(inner: N) -> Self {
        Self {
            inner,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Number of pairs in each call, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls.borrow().iter().map(|c| c.sequences.len()).collect()
    }

    pub fn image_shapes(&self) -> Vec<Vec<usize>> {
        self.calls
            .borrow()
            .iter()
            .map(|c| c.image_shape.clone())
            .collect()
    }

    /// Sequences of each call, in call order.
    pub fn sequences(&self) -> Vec<Vec<Vec<u32>>> {
        self.calls
            .borrow()
            .iter()
            .map(|c| c.sequences.clone())
            .collect()
    }
}

impl<N: ValueNetwork> ValueNetwork for RecordingValueNetwork<N> {
    fn evaluate(
        &self,
        images: &Tensor,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<f32>, ValueNetworkError> {
        let batch = images.dim(0)?;
        if batch != sequences.len() {
            return Err(ValueNetworkError::Failed(format!(
                "{batch} images for {} sequences",
                sequences.len()
            )));
        }
        self.calls.borrow_mut().push(RecordedCall {
            image_shape: images.dims().to_vec(),
            sequences: sequences.to_vec(),
        });
        self.inner.evaluate(images, sequences)
    }
}

use candle_core::Tensor;

use super::ValueNetwork;
use crate::error::DecodeError;

/// Sub-batch size used when none is configured.
pub const DEFAULT_VALUE_BATCH_SIZE: usize = 10;

/// Batches value requests for a single image.
///
/// Requests are split into sub-batches of at most `batch_size` pairs. Each
/// sub-batch is evaluated on a detached copy of the image, and results are
/// concatenated in submission order. Sub-batches are independent, so the
/// result for a request does not depend on `batch_size`.
pub struct ValueOracleAdapter<N> {
    network: N,
    batch_size: usize,
}

impl<N: ValueNetwork> ValueOracleAdapter<N> {
    pub fn new(network: N, batch_size: usize) -> Result<Self, DecodeError> {
        if batch_size == 0 {
            return Err(DecodeError::config("value batch size must be > 0"));
        }
        Ok(Self {
            network,
            batch_size,
        })
    }

    pub fn with_default_batch_size(network: N) -> Self {
        Self {
            network,
            batch_size: DEFAULT_VALUE_BATCH_SIZE,
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    /// One value per sequence, `values[i]` for `sequences[i]`.
    ///
    /// `image` is a single image without a batch dimension. A sub-batch that
    /// comes back with the wrong number of values, or any non-finite value,
    /// fails the whole request.
    pub fn evaluate(
        &self,
        image: &Tensor,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<f32>, DecodeError> {
        let image = image.detach();
        let mut values = Vec::with_capacity(sequences.len());

        for (batch_idx, chunk) in sequences.chunks(self.batch_size).enumerate() {
            let images = Tensor::stack(&vec![image.clone(); chunk.len()], 0)?;
            let batch_values = self.network.evaluate(&images, chunk)?;
            if batch_values.len() != chunk.len() {
                return Err(DecodeError::ValueCountMismatch {
                    expected: chunk.len(),
                    found: batch_values.len(),
                });
            }
            tracing::trace!(batch_idx, batch_len = chunk.len(), "value sub-batch");
            values.extend(batch_values);
        }

        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DecodeError::NonFiniteValue { index });
        }
        Ok(values)
    }
}

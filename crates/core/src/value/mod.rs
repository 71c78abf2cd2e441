//! Value oracle integration for value-guided beam search.
//!
//! The value network is an injected collaborator that scores
//! `(image, partial caption)` pairs. [`ValueOracleAdapter`] batches requests
//! into fixed-size sub-batches and guarantees that values come back in
//! submission order; [`CandidateValueDispatcher`] turns per-hypothesis
//! candidate sets into adapter requests and reassembles the results.

mod adapter;
mod dispatcher;

pub use adapter::{ValueOracleAdapter, DEFAULT_VALUE_BATCH_SIZE};
pub use dispatcher::{CandidateScores, CandidateSet, CandidateValueDispatcher};

use candle_core::Tensor;

use crate::error::ValueNetworkError;

/// Opaque learned estimate of a partial caption's long-term quality.
pub trait ValueNetwork {
    /// Score a batch of pairs.
    ///
    /// `images` has shape `(n, ...)`, one row per entry of `sequences`;
    /// `sequences[i]` starts with the start token. Must return exactly `n`
    /// values, `values[i]` belonging to `sequences[i]`.
    fn evaluate(
        &self,
        images: &Tensor,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<f32>, ValueNetworkError>;
}

impl<T: ValueNetwork + ?Sized> ValueNetwork for &T {
    fn evaluate(
        &self,
        images: &Tensor,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<f32>, ValueNetworkError> {
        (**self).evaluate(images, sequences)
    }
}

impl ValueNetwork for Box<dyn ValueNetwork> {
    fn evaluate(
        &self,
        images: &Tensor,
        sequences: &[Vec<u32>],
    ) -> Result<Vec<f32>, ValueNetworkError> {
        (**self).evaluate(images, sequences)
    }
}

//! Neural components seen by the decoders.
//!
//! The search code only talks to [`RecurrentStep`]; the LSTM decoder and the
//! projection encoder are the concrete networks used by the CLI.

mod encoder;
mod lstm;

pub use encoder::{FeatureBackbone, ImageEncoder, ProjectionEncoder};
pub use lstm::{LstmCaptionDecoder, LstmState};

use candle_core::Tensor;

use crate::error::DecodeError;

/// Input to one recurrent step.
#[derive(Debug, Clone, Copy)]
pub enum StepInput<'a> {
    /// Image feature vector, shape `(embed_size,)` or `(1, embed_size)`.
    Features(&'a Tensor),
    /// A previously chosen or replayed token; the step function embeds it.
    Token(u32),
}

/// One step of the caption decoder.
///
/// Implementations must be deterministic: identical state and input give
/// identical outputs. The returned distribution has `vocab_size()` entries.
pub trait RecurrentStep {
    type State: Clone;

    fn vocab_size(&self) -> usize;

    fn step(
        &self,
        state: Option<&Self::State>,
        input: StepInput<'_>,
    ) -> Result<(Self::State, Vec<f32>), DecodeError>;
}

impl<T: RecurrentStep + ?Sized> RecurrentStep for &T {
    type State = T::State;

    fn vocab_size(&self) -> usize {
        (**self).vocab_size()
    }

    fn step(
        &self,
        state: Option<&Self::State>,
        input: StepInput<'_>,
    ) -> Result<(Self::State, Vec<f32>), DecodeError> {
        (**self).step(state, input)
    }
}

/// Run one step and check the distribution size.
pub(crate) fn checked_step<M: RecurrentStep>(
    model: &M,
    state: Option<&M::State>,
    input: StepInput<'_>,
) -> Result<(M::State, Vec<f32>), DecodeError> {
    if let StepInput::Token(token_id) = input {
        if token_id as usize >= model.vocab_size() {
            return Err(DecodeError::InvalidToken {
                token_id,
                vocab_size: model.vocab_size(),
            });
        }
    }
    let (next, probs) = model.step(state, input)?;
    if probs.is_empty() {
        return Err(DecodeError::EmptyDistribution);
    }
    if probs.len() != model.vocab_size() {
        return Err(DecodeError::DistributionSize {
            expected: model.vocab_size(),
            found: probs.len(),
        });
    }
    Ok((next, probs))
}

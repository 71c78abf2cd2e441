use candle_core::Tensor;

use super::beam::argmax;
use crate::error::DecodeError;
use crate::model::{checked_step, RecurrentStep, StepInput};

/// Decode by always taking the most probable token.
///
/// Emits exactly `max_length` tokens; there is no end-token early stop.
pub fn greedy_decode<M: RecurrentStep>(
    model: &M,
    features: &Tensor,
    max_length: usize,
) -> Result<Vec<u32>, DecodeError> {
    if max_length == 0 {
        return Err(DecodeError::config("max_length must be > 0"));
    }
    let _span = tracing::debug_span!("greedy_decode", max_length).entered();

    let mut tokens = Vec::with_capacity(max_length);
    let (mut state, mut probs) = checked_step(model, None, StepInput::Features(features))?;

    for step in 0..max_length {
        let token_id = argmax(&probs).ok_or(DecodeError::EmptyDistribution)?;
        tokens.push(token_id);
        tracing::trace!(step, token_id, prob = probs[token_id as usize], "greedy pick");

        if step + 1 < max_length {
            (state, probs) = checked_step(model, Some(&state), StepInput::Token(token_id))?;
        }
    }

    Ok(tokens)
}

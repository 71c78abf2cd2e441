//! Likelihood-only beam search.
//!
//! Every step expands each live hypothesis by its `beam_width` most probable
//! next tokens, pools the children of all hypotheses and keeps the best
//! `beam_width` by accumulated log probability.

use candle_core::Tensor;

use super::beam::{
    safe_ln, top_k_candidates, Beam, BeamObserver, BeamSearchConfig, Hypothesis, NoopObserver,
};
use crate::config::StateMode;
use crate::error::DecodeError;
use crate::model::{checked_step, RecurrentStep, StepInput};

/// Feed the features and then every token of `tokens`, returning the final
/// state and the distribution produced by the last step.
pub(crate) fn replay_prefix<M: RecurrentStep>(
    model: &M,
    features: &Tensor,
    tokens: &[u32],
) -> Result<(M::State, Vec<f32>), DecodeError> {
    let (mut state, mut probs) = checked_step(model, None, StepInput::Features(features))?;
    for &token_id in tokens {
        (state, probs) = checked_step(model, Some(&state), StepInput::Token(token_id))?;
    }
    Ok((state, probs))
}

/// Initial beam; in cached mode the root carries the post-features state.
pub(crate) fn initial_beam<M: RecurrentStep>(
    model: &M,
    features: &Tensor,
    config: &BeamSearchConfig,
) -> Result<Beam<M::State>, DecodeError> {
    let root_state = match config.state_mode {
        StateMode::Replay => None,
        StateMode::Cached => Some(checked_step(model, None, StepInput::Features(features))?.0),
    };
    Ok(Beam::root(config.start_token_id, config.beam_width, root_state))
}

/// State and next-token distribution of one beam entry.
///
/// A cached entry holds the state reached before its last token, so one
/// step suffices; otherwise the whole prefix is replayed.
pub(crate) fn expand_entry<M: RecurrentStep>(
    model: &M,
    features: &Tensor,
    hypothesis: &Hypothesis,
    cached: Option<&M::State>,
) -> Result<(M::State, Vec<f32>), DecodeError> {
    match cached {
        Some(parent_state) => checked_step(
            model,
            Some(parent_state),
            StepInput::Token(hypothesis.last_token()),
        ),
        None => replay_prefix(model, features, hypothesis.tokens()),
    }
}

/// State handed to children, or nothing when replaying.
pub(crate) fn carry<S>(state: S, mode: StateMode) -> Option<S> {
    match mode {
        StateMode::Replay => None,
        StateMode::Cached => Some(state),
    }
}

pub(crate) fn log_step(step: usize, hypotheses: &[Hypothesis]) {
    tracing::debug!(
        step,
        beam_len = hypotheses.len(),
        best_score = hypotheses.first().map(|h| h.score()),
        "beam step"
    );
}

/// Run beam search and return the final beam, best hypothesis first.
pub fn beam_search<M: RecurrentStep>(
    model: &M,
    features: &Tensor,
    config: &BeamSearchConfig,
    observer: &mut dyn BeamObserver,
) -> Result<Vec<Hypothesis>, DecodeError> {
    config.validate(model.vocab_size())?;
    let _span = tracing::debug_span!(
        "beam_search",
        beam_width = config.beam_width,
        max_length = config.max_length,
        state_mode = ?config.state_mode,
    )
    .entered();

    let mut beam = initial_beam(model, features, config)?;

    for step in 0..config.max_length {
        let mut pool = Vec::with_capacity(beam.len() * config.beam_width);

        for (hypothesis, cached) in beam.iter() {
            let (state, probs) = expand_entry(model, features, hypothesis, cached)?;
            let carried = carry(state, config.state_mode);

            for candidate in top_k_candidates(&probs, config.beam_width) {
                let score = hypothesis.score() + safe_ln(candidate.prob);
                pool.push((hypothesis.extend(candidate.token_id, score), carried.clone()));
            }
        }

        beam = Beam::from_candidates(pool, config.beam_width);
        log_step(step, beam.hypotheses());
        observer.on_step(step, beam.hypotheses());
    }

    if beam.is_empty() {
        return Err(DecodeError::EmptyBeam);
    }
    Ok(beam.into_hypotheses())
}

/// Beam search returning the best hypothesis' tokens, start token excluded.
pub fn beam_decode<M: RecurrentStep>(
    model: &M,
    features: &Tensor,
    config: &BeamSearchConfig,
) -> Result<Vec<u32>, DecodeError> {
    let beam = beam_search(model, features, config, &mut NoopObserver)?;
    best_tokens(&beam)
}

pub(crate) fn best_tokens(beam: &[Hypothesis]) -> Result<Vec<u32>, DecodeError> {
    beam.first()
        .map(|h| h.generated().to_vec())
        .ok_or(DecodeError::EmptyBeam)
}

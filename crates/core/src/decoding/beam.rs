//! Beam data structures.
//!
//! A beam is a bounded, score-ordered collection of hypotheses. Hypotheses
//! are immutable: expanding one produces a new value that shares nothing
//! with its parent except a copy of the prefix.

use crate::config::StateMode;
use crate::error::DecodeError;

/// Floor applied to step probabilities before taking their logarithm.
pub const PROB_EPSILON: f32 = 1e-10;

/// Natural log of a probability, floored at [`PROB_EPSILON`].
///
/// NaN and non-positive inputs map to `ln(PROB_EPSILON)`, so accumulated
/// scores stay finite and comparable.
pub fn safe_ln(prob: f32) -> f32 {
    prob.max(PROB_EPSILON).ln()
}

/// Configuration for likelihood-only beam search.
#[derive(Debug, Clone, PartialEq)]
pub struct BeamSearchConfig {
    /// Number of hypotheses kept after each step.
    pub beam_width: usize,
    /// Number of tokens emitted after the start token.
    pub max_length: usize,
    /// Token every hypothesis starts with.
    pub start_token_id: u32,
    /// Whether recurrent state is replayed or carried between steps.
    pub state_mode: StateMode,
}

impl Default for BeamSearchConfig {
    fn default() -> Self {
        Self {
            beam_width: 3,
            max_length: 15,
            start_token_id: 1,
            state_mode: StateMode::Replay,
        }
    }
}

impl BeamSearchConfig {
    pub fn validate(&self, vocab_size: usize) -> Result<(), DecodeError> {
        if self.beam_width == 0 {
            return Err(DecodeError::config("beam_width must be > 0"));
        }
        if self.max_length == 0 {
            return Err(DecodeError::config("max_length must be > 0"));
        }
        if vocab_size == 0 {
            return Err(DecodeError::config("vocabulary is empty"));
        }
        if self.start_token_id as usize >= vocab_size {
            return Err(DecodeError::InvalidToken {
                token_id: self.start_token_id,
                vocab_size,
            });
        }
        Ok(())
    }
}

/// A partial caption and its accumulated score.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Token sequence, starting with the start token.
    tokens: Vec<u32>,
    /// Accumulated log probability.
    score: f32,
}

impl Hypothesis {
    /// The single-token hypothesis every search starts from.
    pub fn root(start_token_id: u32) -> Self {
        Self {
            tokens: vec![start_token_id],
            score: 0.0,
        }
    }

    /// New hypothesis with `token_id` appended and the given score.
    pub fn extend(&self, token_id: u32, score: f32) -> Self {
        let mut tokens = Vec::with_capacity(self.tokens.len() + 1);
        tokens.extend_from_slice(&self.tokens);
        tokens.push(token_id);
        Self { tokens, score }
    }

    /// Full sequence including the start token.
    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    /// Tokens produced by the search (start token excluded).
    pub fn generated(&self) -> &[u32] {
        &self.tokens[1..]
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn last_token(&self) -> u32 {
        // Never empty: constructed through `root` or `extend`.
        self.tokens[self.tokens.len() - 1]
    }

    /// Prospective sequence obtained by appending `token_id`.
    pub fn with_token(&self, token_id: u32) -> Vec<u32> {
        let mut seq = self.tokens.clone();
        seq.push(token_id);
        seq
    }
}

/// A next-token proposal for one hypothesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub token_id: u32,
    /// Step probability of `token_id`.
    pub prob: f32,
}

/// Top-`k` tokens of a distribution, highest probability first.
///
/// Ties are broken by lowest token id. NaN entries are treated as zero.
pub fn top_k_candidates(probs: &[f32], k: usize) -> Vec<Candidate> {
    if probs.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut indexed: Vec<Candidate> = probs
        .iter()
        .enumerate()
        .map(|(i, &p)| Candidate {
            token_id: i as u32,
            prob: if p.is_nan() { 0.0 } else { p },
        })
        .collect();

    // Stable sort keeps ascending token order among equal probabilities.
    indexed.sort_by(|a, b| b.prob.total_cmp(&a.prob));
    indexed.truncate(k);
    indexed
}

/// Index of the largest probability; the lowest index wins ties.
pub fn argmax(probs: &[f32]) -> Option<u32> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &p) in probs.iter().enumerate() {
        if p.is_nan() {
            continue;
        }
        match best {
            Some((_, bp)) if p <= bp => {}
            _ => best = Some((i, p)),
        }
    }
    best.map(|(i, _)| i as u32)
}

/// Bounded set of hypotheses sorted by descending score.
///
/// Each hypothesis may carry the recurrent state its expansion needs when
/// the search runs with [`StateMode::Cached`].
#[derive(Debug, Clone)]
pub struct Beam<S = ()> {
    capacity: usize,
    hypotheses: Vec<Hypothesis>,
    states: Vec<Option<S>>,
}

impl<S> Beam<S> {
    /// Beam holding only the root hypothesis.
    pub fn root(start_token_id: u32, capacity: usize, state: Option<S>) -> Self {
        Self {
            capacity,
            hypotheses: vec![Hypothesis::root(start_token_id)],
            states: vec![state],
        }
    }

    /// Sort a candidate pool by descending score and keep the best `capacity`.
    ///
    /// The sort is stable: among equal scores, earlier entries of `pool`
    /// survive first.
    pub fn from_candidates(mut pool: Vec<(Hypothesis, Option<S>)>, capacity: usize) -> Self {
        pool.sort_by(|a, b| b.0.score.total_cmp(&a.0.score));
        pool.truncate(capacity);
        let (hypotheses, states) = pool.into_iter().unzip();
        Self {
            capacity,
            hypotheses,
            states,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    /// Rank-0 hypothesis.
    pub fn best(&self) -> Option<&Hypothesis> {
        self.hypotheses.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Hypothesis, Option<&S>)> {
        self.hypotheses
            .iter()
            .zip(self.states.iter().map(Option::as_ref))
    }

    pub fn into_hypotheses(self) -> Vec<Hypothesis> {
        self.hypotheses
    }
}

/// Receives the beam after every expansion + prune step.
pub trait BeamObserver {
    fn on_step(&mut self, step: usize, beam: &[Hypothesis]);
}

/// Observer that ignores every step.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BeamObserver for NoopObserver {
    fn on_step(&mut self, _step: usize, _beam: &[Hypothesis]) {}
}

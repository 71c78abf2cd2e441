use candle_core::Tensor;

use super::{ValueNetwork, ValueOracleAdapter};
use crate::config::ValueFallback;
use crate::decoding::{Candidate, Hypothesis};
use crate::error::DecodeError;

/// Next-token candidates proposed for one hypothesis, in proposal order.
#[derive(Debug, Clone)]
pub struct CandidateSet<'a> {
    hypothesis: &'a Hypothesis,
    candidates: Vec<Candidate>,
}

impl<'a> CandidateSet<'a> {
    pub fn new(hypothesis: &'a Hypothesis, candidates: Vec<Candidate>) -> Self {
        Self {
            hypothesis,
            candidates,
        }
    }

    pub fn hypothesis(&self) -> &'a Hypothesis {
        self.hypothesis
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Hypothesis prefix + candidate token, one per candidate.
    pub fn prospective_sequences(&self) -> Vec<Vec<u32>> {
        self.candidates
            .iter()
            .map(|c| self.hypothesis.with_token(c.token_id))
            .collect()
    }
}

/// Value scores for one candidate set.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateScores {
    /// `values[i]` belongs to `candidates()[i]`.
    Valued(Vec<f32>),
    /// The oracle failed and the fallback policy allows ranking by
    /// probability alone.
    LikelihoodOnly,
}

/// Obtains value estimates for every candidate of every hypothesis.
///
/// Each hypothesis' candidates form one adapter request, paired with the
/// same source image.
pub struct CandidateValueDispatcher<'a, N> {
    adapter: &'a ValueOracleAdapter<N>,
    fallback: ValueFallback,
}

impl<'a, N: ValueNetwork> CandidateValueDispatcher<'a, N> {
    pub fn new(adapter: &'a ValueOracleAdapter<N>, fallback: ValueFallback) -> Self {
        Self { adapter, fallback }
    }

    /// Scores for each set, in the order of `sets`.
    pub fn dispatch(
        &self,
        image: &Tensor,
        sets: &[CandidateSet<'_>],
    ) -> Result<Vec<CandidateScores>, DecodeError> {
        let mut scores = Vec::with_capacity(sets.len());

        for (hyp_idx, set) in sets.iter().enumerate() {
            let sequences = set.prospective_sequences();
            match self.adapter.evaluate(image, &sequences) {
                Ok(values) => {
                    if values.len() != sequences.len() {
                        return Err(DecodeError::ValueCountMismatch {
                            expected: sequences.len(),
                            found: values.len(),
                        });
                    }
                    scores.push(CandidateScores::Valued(values));
                }
                Err(DecodeError::ValueOracle(err))
                    if self.fallback == ValueFallback::LikelihoodOnly =>
                {
                    tracing::warn!(
                        hyp_idx,
                        error = %err,
                        "value oracle failed, ranking candidates by probability"
                    );
                    scores.push(CandidateScores::LikelihoodOnly);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(scores)
    }
}

//! Value-guided beam search.
//!
//! Like likelihood-only beam search, but each hypothesis proposes a wider
//! pool of `candidate_range` tokens. Those are scored by the value oracle,
//! ranked by `alpha * prob + (1 - alpha) * value`, and the best
//! `beam_width` survive into the cross-hypothesis merge. The score carried
//! forward is still the accumulated log probability; the blended score is
//! only used to choose candidates within a hypothesis.

use candle_core::Tensor;

use super::beam::{
    safe_ln, top_k_candidates, Beam, BeamObserver, BeamSearchConfig, Candidate, Hypothesis,
    NoopObserver,
};
use super::search::{best_tokens, carry, expand_entry, initial_beam, log_step};
use crate::config::ValueFallback;
use crate::error::DecodeError;
use crate::model::RecurrentStep;
use crate::value::{
    CandidateScores, CandidateSet, CandidateValueDispatcher, ValueNetwork, ValueOracleAdapter,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ValueGuidedConfig {
    pub search: BeamSearchConfig,
    /// Candidates per hypothesis sent to the value oracle; must be at least
    /// `search.beam_width`.
    pub candidate_range: usize,
    /// Weight of the step probability in the blended score, in `[0, 1]`.
    pub alpha: f32,
    pub fallback: ValueFallback,
}

impl Default for ValueGuidedConfig {
    fn default() -> Self {
        Self {
            search: BeamSearchConfig::default(),
            candidate_range: 10,
            alpha: 0.5,
            fallback: ValueFallback::Fail,
        }
    }
}

impl ValueGuidedConfig {
    pub fn validate(&self, vocab_size: usize) -> Result<(), DecodeError> {
        self.search.validate(vocab_size)?;
        if self.candidate_range < self.search.beam_width {
            return Err(DecodeError::config(format!(
                "candidate_range ({}) must be >= beam_width ({})",
                self.candidate_range, self.search.beam_width
            )));
        }
        if self.candidate_range > vocab_size {
            return Err(DecodeError::config(format!(
                "candidate_range ({}) exceeds vocabulary size ({vocab_size})",
                self.candidate_range
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(DecodeError::config(format!(
                "alpha must be within [0, 1], got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Convex combination of step probability and value estimate.
pub fn blend(alpha: f32, prob: f32, value: f32) -> f32 {
    alpha * prob + (1.0 - alpha) * value
}

/// Best `k` candidates by blended score, ties kept in proposal order.
pub fn select_candidates(
    candidates: &[Candidate],
    scores: &CandidateScores,
    alpha: f32,
    k: usize,
) -> Vec<Candidate> {
    let ranking: Vec<f32> = match scores {
        CandidateScores::Valued(values) => candidates
            .iter()
            .zip(values)
            .map(|(c, &v)| blend(alpha, c.prob, v))
            .collect(),
        CandidateScores::LikelihoodOnly => candidates.iter().map(|c| c.prob).collect(),
    };

    let mut order: Vec<usize> = (0..ranking.len()).collect();
    order.sort_by(|&a, &b| ranking[b].total_cmp(&ranking[a]));
    order.truncate(k);
    order.into_iter().map(|i| candidates[i]).collect()
}

/// Run value-guided beam search and return the final beam, best first.
///
/// `image` is the source image without a batch dimension; it is paired
/// with every prospective sequence sent to the value oracle.
pub fn value_guided_beam_search<M, N>(
    model: &M,
    image: &Tensor,
    features: &Tensor,
    config: &ValueGuidedConfig,
    oracle: &ValueOracleAdapter<N>,
    observer: &mut dyn BeamObserver,
) -> Result<Vec<Hypothesis>, DecodeError>
where
    M: RecurrentStep,
    N: ValueNetwork,
{
    config.validate(model.vocab_size())?;
    let search = &config.search;
    let _span = tracing::debug_span!(
        "value_guided_beam_search",
        beam_width = search.beam_width,
        candidate_range = config.candidate_range,
        alpha = config.alpha,
        max_length = search.max_length,
    )
    .entered();

    let dispatcher = CandidateValueDispatcher::new(oracle, config.fallback);
    let mut beam = initial_beam(model, features, search)?;

    for step in 0..search.max_length {
        let mut sets = Vec::with_capacity(beam.len());
        let mut carried = Vec::with_capacity(beam.len());

        for (hypothesis, cached) in beam.iter() {
            let (state, probs) = expand_entry(model, features, hypothesis, cached)?;
            let candidates = top_k_candidates(&probs, config.candidate_range);
            sets.push(CandidateSet::new(hypothesis, candidates));
            carried.push(carry(state, search.state_mode));
        }

        let scores = dispatcher.dispatch(image, &sets)?;
        if scores.len() != sets.len() {
            return Err(DecodeError::ValueCountMismatch {
                expected: sets.len(),
                found: scores.len(),
            });
        }

        let mut pool = Vec::with_capacity(sets.len() * search.beam_width);
        for ((set, state), set_scores) in sets.iter().zip(carried).zip(&scores) {
            let parent = set.hypothesis();
            for candidate in
                select_candidates(set.candidates(), set_scores, config.alpha, search.beam_width)
            {
                let score = parent.score() + safe_ln(candidate.prob);
                pool.push((parent.extend(candidate.token_id, score), state.clone()));
            }
        }

        beam = Beam::from_candidates(pool, search.beam_width);
        log_step(step, beam.hypotheses());
        observer.on_step(step, beam.hypotheses());
    }

    if beam.is_empty() {
        return Err(DecodeError::EmptyBeam);
    }
    Ok(beam.into_hypotheses())
}

/// Value-guided beam search returning the best hypothesis' tokens, start
/// token excluded.
pub fn value_guided_beam_decode<M, N>(
    model: &M,
    image: &Tensor,
    features: &Tensor,
    config: &ValueGuidedConfig,
    oracle: &ValueOracleAdapter<N>,
) -> Result<Vec<u32>, DecodeError>
where
    M: RecurrentStep,
    N: ValueNetwork,
{
    let beam =
        value_guided_beam_search(model, image, features, config, oracle, &mut NoopObserver)?;
    best_tokens(&beam)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateMode;
    use crate::decoding::beam_decode;
    use crate::testing::{
        dummy_features, dummy_image, FailingValueNetwork, LastTokenValueNetwork,
        LengthValueNetwork, RecordingValueNetwork, ScriptedStep,
    };

    fn config(
        beam_width: usize,
        candidate_range: usize,
        alpha: f32,
        max_length: usize,
    ) -> ValueGuidedConfig {
        ValueGuidedConfig {
            search: BeamSearchConfig {
                beam_width,
                max_length,
                start_token_id: 0,
                state_mode: StateMode::Replay,
            },
            candidate_range,
            alpha,
            fallback: ValueFallback::Fail,
        }
    }

    /// Token 4 is always the least likely continuation.
    fn descending_model() -> ScriptedStep {
        ScriptedStep::new(5, vec![0.3, 0.25, 0.2, 0.15, 0.1])
    }

    #[test]
    fn test_blend() {
        assert_eq!(blend(1.0, 0.4, 9.0), 0.4);
        assert_eq!(blend(0.0, 0.4, 9.0), 9.0);
        assert!((blend(0.25, 0.4, 2.0) - 1.6).abs() < 1e-6);
    }

    #[test]
    fn test_select_candidates_ranks_by_blend() {
        let candidates = vec![
            Candidate { token_id: 0, prob: 0.6 },
            Candidate { token_id: 1, prob: 0.3 },
            Candidate { token_id: 2, prob: 0.1 },
        ];
        let scores = CandidateScores::Valued(vec![0.0, 0.0, 1.0]);

        // 0.5*0.6 = 0.30, 0.5*0.3 = 0.15, 0.5*0.1 + 0.5 = 0.55
        let picked: Vec<u32> = select_candidates(&candidates, &scores, 0.5, 2)
            .iter()
            .map(|c| c.token_id)
            .collect();
        assert_eq!(picked, vec![2, 0]);

        let by_prob: Vec<u32> =
            select_candidates(&candidates, &CandidateScores::LikelihoodOnly, 0.5, 2)
                .iter()
                .map(|c| c.token_id)
                .collect();
        assert_eq!(by_prob, vec![0, 1]);
    }

    #[test]
    fn test_oracle_steers_selection() {
        let model = descending_model();
        let oracle = ValueOracleAdapter::new(LastTokenValueNetwork::prefer(4), 10).unwrap();

        let ids = value_guided_beam_decode(
            &model,
            &dummy_image(),
            &dummy_features(),
            &config(1, 5, 0.0, 3),
            &oracle,
        )
        .unwrap();
        assert_eq!(ids, vec![4, 4, 4]);

        let plain = beam_decode(&model, &dummy_features(), &config(1, 5, 0.0, 3).search).unwrap();
        assert_eq!(plain, vec![0, 0, 0]);
    }

    #[test]
    fn test_carried_score_is_log_probability() {
        let model = descending_model();
        let oracle = ValueOracleAdapter::new(LastTokenValueNetwork::prefer(4), 10).unwrap();
        let beam = value_guided_beam_search(
            &model,
            &dummy_image(),
            &dummy_features(),
            &config(1, 5, 0.0, 3),
            &oracle,
            &mut NoopObserver,
        )
        .unwrap();

        let expected = 3.0 * 0.1f32.ln();
        assert!((beam[0].score() - expected).abs() < 1e-5);
    }

    #[test]
    fn test_length_oracle_keeps_likelihood_ranking() {
        // value(seq) = len(seq) is constant within a hypothesis' candidates,
        // so ranking falls back to probability order.
        let model = ScriptedStep::new(5, vec![0.2; 5])
            .with_rule(&[0], vec![0.0, 0.5, 0.3, 0.15, 0.05])
            .with_rule(&[0, 1], vec![0.1, 0.1, 0.1, 0.1, 0.6])
            .with_rule(&[0, 2], vec![0.0, 0.9, 0.05, 0.05, 0.0])
            .with_rule(&[0, 2, 1], vec![0.0, 0.0, 0.0, 0.95, 0.05]);
        let oracle = ValueOracleAdapter::new(LengthValueNetwork, 10).unwrap();
        let cfg = config(2, 4, 0.5, 3);

        let guided =
            value_guided_beam_decode(&model, &dummy_image(), &dummy_features(), &cfg, &oracle)
                .unwrap();
        let plain = beam_decode(&model, &dummy_features(), &cfg.search).unwrap();
        assert_eq!(guided, vec![2, 1, 3]);
        assert_eq!(guided, plain);
    }

    #[test]
    fn test_oracle_receives_prefix_plus_candidate() {
        let model = descending_model();
        let network = RecordingValueNetwork::new(LengthValueNetwork);
        let oracle = ValueOracleAdapter::new(&network, 10).unwrap();

        value_guided_beam_decode(
            &model,
            &dummy_image(),
            &dummy_features(),
            &config(2, 3, 0.5, 2),
            &oracle,
        )
        .unwrap();

        let requests = network.sequences();
        // Step 0: root expanded into its 3 most likely tokens.
        assert_eq!(requests[0], vec![vec![0, 0], vec![0, 1], vec![0, 2]]);
        // Step 1: two hypotheses, one request each.
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[1], vec![vec![0, 0, 0], vec![0, 0, 1], vec![0, 0, 2]]);
        assert_eq!(requests[2], vec![vec![0, 1, 0], vec![0, 1, 1], vec![0, 1, 2]]);
    }

    #[test]
    fn test_oracle_failure_fails_search() {
        let model = descending_model();
        let oracle = ValueOracleAdapter::new(FailingValueNetwork::default(), 10).unwrap();
        let err = value_guided_beam_decode(
            &model,
            &dummy_image(),
            &dummy_features(),
            &config(2, 3, 0.5, 3),
            &oracle,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::ValueOracle(_)));
    }

    #[test]
    fn test_explicit_fallback_matches_likelihood_search() {
        let model = descending_model();
        let oracle = ValueOracleAdapter::new(FailingValueNetwork::default(), 10).unwrap();
        let cfg = ValueGuidedConfig {
            fallback: ValueFallback::LikelihoodOnly,
            ..config(2, 3, 0.5, 3)
        };

        let guided =
            value_guided_beam_decode(&model, &dummy_image(), &dummy_features(), &cfg, &oracle)
                .unwrap();
        let plain = beam_decode(&model, &dummy_features(), &cfg.search).unwrap();
        assert_eq!(guided, plain);
    }

    #[test]
    fn test_candidate_range_below_beam_width_is_rejected() {
        let model = descending_model();
        let network = RecordingValueNetwork::new(LengthValueNetwork);
        let oracle = ValueOracleAdapter::new(&network, 10).unwrap();

        let err = value_guided_beam_decode(
            &model,
            &dummy_image(),
            &dummy_features(),
            &config(3, 2, 0.5, 3),
            &oracle,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidConfig(_)));
        assert_eq!(model.calls(), 0);
        assert!(network.batch_sizes().is_empty());
    }

    #[test]
    fn test_alpha_out_of_range_is_rejected() {
        assert!(config(2, 3, 1.5, 3).validate(5).is_err());
        assert!(config(2, 3, f32::NAN, 3).validate(5).is_err());
        assert!(config(2, 3, 0.0, 3).validate(5).is_ok());
        assert!(config(2, 6, 0.5, 3).validate(5).is_err());
    }
}

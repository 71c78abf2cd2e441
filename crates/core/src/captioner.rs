use candle_core::Tensor;

use crate::config::DecodingConfig;
use crate::decoding::{beam_decode, greedy_decode, value_guided_beam_decode};
use crate::error::DecodeError;
use crate::model::RecurrentStep;
use crate::value::{ValueNetwork, ValueOracleAdapter};
use crate::vocab::Vocabulary;

/// A step function bundled with its decoding settings and, optionally, the
/// vocabulary used to turn token ids back into text.
pub struct Captioner<M> {
    model: M,
    config: DecodingConfig,
    vocab: Option<Vocabulary>,
}

impl<M: RecurrentStep> Captioner<M> {
    /// Checks the greedy and beam limits of `config` against the model's
    /// vocabulary size. Value-guided limits are checked by `value_guided`.
    pub fn new(model: M, config: DecodingConfig) -> Result<Self, DecodeError> {
        config.beam_config().validate(model.vocab_size())?;
        Ok(Self {
            model,
            config,
            vocab: None,
        })
    }

    /// Attach a vocabulary; it must cover the model's output layer.
    pub fn with_vocabulary(mut self, vocab: Vocabulary) -> Result<Self, DecodeError> {
        if vocab.len() != self.model.vocab_size() {
            return Err(DecodeError::Vocabulary(format!(
                "vocabulary has {} words, model predicts {} tokens",
                vocab.len(),
                self.model.vocab_size()
            )));
        }
        self.vocab = Some(vocab);
        Ok(self)
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &DecodingConfig {
        &self.config
    }

    pub fn vocabulary(&self) -> Option<&Vocabulary> {
        self.vocab.as_ref()
    }

    pub fn greedy(&self, features: &Tensor) -> Result<Vec<u32>, DecodeError> {
        greedy_decode(&self.model, features, self.config.max_length)
    }

    pub fn beam(&self, features: &Tensor) -> Result<Vec<u32>, DecodeError> {
        beam_decode(&self.model, features, &self.config.beam_config())
    }

    pub fn value_guided<N: ValueNetwork>(
        &self,
        image: &Tensor,
        features: &Tensor,
        oracle: &ValueOracleAdapter<N>,
    ) -> Result<Vec<u32>, DecodeError> {
        let config = self.config.value_guided_config();
        config.validate(self.model.vocab_size())?;
        value_guided_beam_decode(&self.model, image, features, &config, oracle)
    }

    /// Words for `ids`, or the ids themselves when no vocabulary is attached.
    pub fn render(&self, ids: &[u32]) -> String {
        match &self.vocab {
            Some(vocab) => vocab.render(ids),
            None => ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        dummy_features, dummy_image, LengthValueNetwork, RecordingValueNetwork, SeededStep,
    };

    fn config() -> DecodingConfig {
        DecodingConfig {
            max_length: 5,
            beam_width: 2,
            candidate_range: 4,
            ..DecodingConfig::default()
        }
    }

    #[test]
    fn test_strategies_produce_max_length_tokens() {
        let captioner = Captioner::new(SeededStep::new(10, 1), config()).unwrap();
        let features = dummy_features();
        let oracle = ValueOracleAdapter::with_default_batch_size(LengthValueNetwork);

        assert_eq!(captioner.greedy(&features).unwrap().len(), 5);
        assert_eq!(captioner.beam(&features).unwrap().len(), 5);
        let ids = captioner
            .value_guided(&dummy_image(), &features, &oracle)
            .unwrap();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_length_oracle_matches_plain_beam() {
        // A value that is equal for all candidates leaves the ranking to
        // the probabilities.
        let captioner = Captioner::new(SeededStep::new(10, 4), config()).unwrap();
        let oracle = ValueOracleAdapter::with_default_batch_size(LengthValueNetwork);
        let features = dummy_features();
        assert_eq!(
            captioner
                .value_guided(&dummy_image(), &features, &oracle)
                .unwrap(),
            captioner.beam(&features).unwrap()
        );
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let config = DecodingConfig {
            max_length: 0,
            ..config()
        };
        assert!(matches!(
            Captioner::new(SeededStep::new(10, 1), config),
            Err(DecodeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_small_vocabulary_allows_greedy_and_beam() {
        // Default candidate_range (10) and beam_width (3) both exceed the
        // vocabulary; only value-guided search depends on them.
        let captioner = Captioner::new(SeededStep::new(2, 9), DecodingConfig::default()).unwrap();
        let features = dummy_features();
        assert_eq!(captioner.greedy(&features).unwrap().len(), 15);
        assert_eq!(captioner.beam(&features).unwrap().len(), 15);

        let network = RecordingValueNetwork::new(LengthValueNetwork);
        let oracle = ValueOracleAdapter::with_default_batch_size(&network);
        assert!(matches!(
            captioner.value_guided(&dummy_image(), &features, &oracle),
            Err(DecodeError::InvalidConfig(_))
        ));
        assert!(network.batch_sizes().is_empty());
    }

    #[test]
    fn test_render_with_and_without_vocabulary() {
        let captioner = Captioner::new(SeededStep::new(10, 1), config()).unwrap();
        assert_eq!(captioner.render(&[4, 5, 2]), "4 5 2");

        let captioner = captioner
            .with_vocabulary(Vocabulary::for_testing(10))
            .unwrap();
        assert_eq!(captioner.render(&[4, 5, 2, 6]), "w4 w5");
    }

    #[test]
    fn test_vocabulary_size_must_match_model() {
        let captioner = Captioner::new(SeededStep::new(10, 1), config()).unwrap();
        assert!(matches!(
            captioner.with_vocabulary(Vocabulary::for_testing(8)),
            Err(DecodeError::Vocabulary(_))
        ));
    }
}

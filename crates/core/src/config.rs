use serde::{Deserialize, Serialize};

use crate::decoding::{BeamSearchConfig, ValueGuidedConfig};
use crate::error::DecodeError;

/// Shape of the recurrent caption decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderModelConfig {
    /// Width of token embeddings and of the image feature vector.
    pub embed_size: usize,
    pub hidden_size: usize,
    /// Number of stacked LSTM layers.
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,
    pub vocab_size: usize,
}

fn default_num_layers() -> usize {
    2
}

impl Default for DecoderModelConfig {
    fn default() -> Self {
        Self {
            embed_size: 256,
            hidden_size: 512,
            num_layers: 2,
            vocab_size: 0,
        }
    }
}

impl DecoderModelConfig {
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.embed_size == 0 || self.hidden_size == 0 {
            return Err(DecodeError::config("embed_size and hidden_size must be > 0"));
        }
        if self.num_layers == 0 {
            return Err(DecodeError::config("num_layers must be > 0"));
        }
        if self.vocab_size == 0 {
            return Err(DecodeError::config("vocab_size must be > 0"));
        }
        Ok(())
    }
}

/// How a beam entry obtains its recurrent state before expansion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateMode {
    /// Feed the features and the whole prefix through the step function
    /// for every hypothesis at every step.
    #[default]
    Replay,
    /// Keep the parent's recurrent state next to each hypothesis and advance
    /// it by a single step.
    Cached,
}

/// What value-guided search does when the value network fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFallback {
    /// Abort the whole decode.
    #[default]
    Fail,
    /// Rank the affected hypothesis' candidates by probability alone.
    LikelihoodOnly,
}

/// Knobs shared by every decoding strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingConfig {
    /// Number of tokens emitted after the start token.
    pub max_length: usize,
    pub beam_width: usize,
    /// Candidates per hypothesis scored by the value oracle (value-guided only).
    pub candidate_range: usize,
    /// Weight of the step probability in the blended score; the value
    /// estimate gets `1 - alpha`.
    pub alpha: f32,
    pub start_token_id: u32,
    /// Sub-batch size used when querying the value network.
    pub value_batch_size: usize,
    pub state_mode: StateMode,
    pub value_fallback: ValueFallback,
}

impl Default for DecodingConfig {
    fn default() -> Self {
        Self {
            max_length: 15,
            beam_width: 3,
            candidate_range: 10,
            alpha: 0.5,
            start_token_id: 1,
            value_batch_size: 10,
            state_mode: StateMode::Replay,
            value_fallback: ValueFallback::Fail,
        }
    }
}

impl DecodingConfig {
    pub fn from_json(json: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(json).map_err(|e| DecodeError::config(e.to_string()))
    }

    pub fn beam_config(&self) -> BeamSearchConfig {
        BeamSearchConfig {
            beam_width: self.beam_width,
            max_length: self.max_length,
            start_token_id: self.start_token_id,
            state_mode: self.state_mode,
        }
    }

    pub fn value_guided_config(&self) -> ValueGuidedConfig {
        ValueGuidedConfig {
            search: self.beam_config(),
            candidate_range: self.candidate_range,
            alpha: self.alpha,
            fallback: self.value_fallback,
        }
    }

    /// Check every strategy's constraints against a vocabulary size.
    pub fn validate(&self, vocab_size: usize) -> Result<(), DecodeError> {
        self.value_guided_config().validate(vocab_size)?;
        if self.value_batch_size == 0 {
            return Err(DecodeError::config("value_batch_size must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECODER_CONFIG: &str = r#"{
        "embed_size": 256,
        "hidden_size": 512,
        "vocab_size": 2981
    }"#;

    #[test]
    fn parse_decoder_config_with_default_layers() {
        let config: DecoderModelConfig =
            serde_json::from_str(DECODER_CONFIG).expect("failed to parse config");
        assert_eq!(config.embed_size, 256);
        assert_eq!(config.hidden_size, 512);
        assert_eq!(config.num_layers, 2);
        assert_eq!(config.vocab_size, 2981);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn decoder_config_rejects_empty_vocab() {
        let config = DecoderModelConfig::default();
        assert!(matches!(
            config.validate(),
            Err(DecodeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn decoding_config_partial_json_uses_defaults() {
        let config = DecodingConfig::from_json(
            r#"{"beam_width": 5, "state_mode": "cached", "value_fallback": "likelihood_only"}"#,
        )
        .unwrap();
        assert_eq!(config.beam_width, 5);
        assert_eq!(config.max_length, 15);
        assert_eq!(config.candidate_range, 10);
        assert_eq!(config.state_mode, StateMode::Cached);
        assert_eq!(config.value_fallback, ValueFallback::LikelihoodOnly);
    }

    #[test]
    fn decoding_config_rejects_unknown_state_mode() {
        let err = DecodingConfig::from_json(r#"{"state_mode": "sometimes"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidConfig(_)));
    }

    #[test]
    fn default_decoding_config_is_valid() {
        assert!(DecodingConfig::default().validate(100).is_ok());
    }

    #[test]
    fn candidate_range_below_beam_width_is_rejected() {
        let config = DecodingConfig {
            beam_width: 4,
            candidate_range: 3,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(100),
            Err(DecodeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_value_batch_size_is_rejected() {
        let config = DecodingConfig {
            value_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate(100).is_err());
    }
}

//! Configuration persistence for the captioner CLI.
//!
//! Settings are resolved with the following priority:
//! 1. Command-line flags (highest priority)
//! 2. Config file (~/.config/captioner/config.toml, or `--config`)
//! 3. Default values (lowest priority)

use std::fs;
use std::path::{Path, PathBuf};

use captioner_core::{DecoderModelConfig, DecodingConfig, StateMode};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Search strategy exposed on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Greedy,
    #[default]
    Beam,
}

/// Persistent configuration stored in TOML format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Decoder weights (safetensors).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<PathBuf>,

    /// Vocabulary JSON file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocab: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub beam_width: Option<usize>,

    /// Number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_token_id: Option<u32>,

    /// Keep recurrent state per hypothesis instead of replaying prefixes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_state: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed_size: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden_size: Option<usize>,

    /// Number of stacked LSTM layers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_layers: Option<usize>,

    /// Output vocabulary size; taken from the vocabulary file when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocab_size: Option<usize>,
}

impl CliConfig {
    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("captioner").join("config.toml"))
    }

    /// Load configuration from the default path, or defaults when it is
    /// missing or unreadable.
    pub fn load() -> Self {
        Self::default_path()
            .and_then(|path| Self::load_from(&path).ok())
            .unwrap_or_default()
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }

        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        fs::write(path, content).map_err(ConfigError::Io)?;
        Ok(())
    }

    /// Merge with another config, preferring values from `other`.
    pub fn merge(&mut self, other: &CliConfig) {
        if other.weights.is_some() {
            self.weights = other.weights.clone();
        }
        if other.vocab.is_some() {
            self.vocab = other.vocab.clone();
        }
        if other.strategy.is_some() {
            self.strategy = other.strategy;
        }
        if other.beam_width.is_some() {
            self.beam_width = other.beam_width;
        }
        if other.max_length.is_some() {
            self.max_length = other.max_length;
        }
        if other.start_token_id.is_some() {
            self.start_token_id = other.start_token_id;
        }
        if other.cached_state.is_some() {
            self.cached_state = other.cached_state;
        }
        if other.embed_size.is_some() {
            self.embed_size = other.embed_size;
        }
        if other.hidden_size.is_some() {
            self.hidden_size = other.hidden_size;
        }
        if other.num_layers.is_some() {
            self.num_layers = other.num_layers;
        }
        if other.vocab_size.is_some() {
            self.vocab_size = other.vocab_size;
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy.unwrap_or_default()
    }

    /// Decoding settings with unset fields left at their defaults.
    pub fn decoding_config(&self) -> DecodingConfig {
        let defaults = DecodingConfig::default();
        let state_mode = match self.cached_state {
            Some(true) => StateMode::Cached,
            Some(false) => StateMode::Replay,
            None => defaults.state_mode,
        };
        DecodingConfig {
            beam_width: self.beam_width.unwrap_or(defaults.beam_width),
            max_length: self.max_length.unwrap_or(defaults.max_length),
            start_token_id: self.start_token_id.unwrap_or(defaults.start_token_id),
            state_mode,
            ..defaults
        }
    }

    /// Decoder shape for a model predicting `vocab_size` tokens.
    pub fn decoder_config(&self, vocab_size: usize) -> DecoderModelConfig {
        let defaults = DecoderModelConfig::default();
        DecoderModelConfig {
            embed_size: self.embed_size.unwrap_or(defaults.embed_size),
            hidden_size: self.hidden_size.unwrap_or(defaults.hidden_size),
            num_layers: self.num_layers.unwrap_or(defaults.num_layers),
            vocab_size,
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading/writing config file.
    Io(std::io::Error),
    /// Error parsing TOML.
    Parse(toml::de::Error),
    /// Error serializing to TOML.
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = CliConfig {
            weights: Some(PathBuf::from("/models/decoder.safetensors")),
            strategy: Some(Strategy::Greedy),
            max_length: Some(20),
            cached_state: Some(true),
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        let loaded = CliConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unset_fields_are_not_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        CliConfig {
            beam_width: Some(5),
            ..Default::default()
        }
        .save_to(&path)
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "beam_width = 5");
    }

    #[test]
    fn test_parse_error_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "beam_width = \"wide\"").unwrap();

        let err = CliConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().starts_with("Parse error"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = CliConfig::load_from(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_merge() {
        let mut base = CliConfig {
            weights: Some(PathBuf::from("base.safetensors")),
            beam_width: Some(3),
            ..Default::default()
        };

        let flags = CliConfig {
            beam_width: Some(7),
            strategy: Some(Strategy::Greedy),
            ..Default::default()
        };

        base.merge(&flags);

        assert_eq!(base.weights, Some(PathBuf::from("base.safetensors"))); // Unchanged
        assert_eq!(base.beam_width, Some(7)); // Overridden
        assert_eq!(base.strategy(), Strategy::Greedy); // Added
    }

    #[test]
    fn test_decoding_config_defaults() {
        let decoding = CliConfig::default().decoding_config();
        assert_eq!(decoding, DecodingConfig::default());
    }

    #[test]
    fn test_decoding_config_overrides() {
        let config = CliConfig {
            beam_width: Some(12),
            max_length: Some(4),
            start_token_id: Some(0),
            cached_state: Some(true),
            ..Default::default()
        };
        let decoding = config.decoding_config();

        assert_eq!(decoding.beam_width, 12);
        assert_eq!(decoding.max_length, 4);
        assert_eq!(decoding.start_token_id, 0);
        assert_eq!(decoding.state_mode, StateMode::Cached);
        // Greedy and beam limits only; the width may exceed a small
        // vocabulary.
        assert!(decoding.beam_config().validate(6).is_ok());
    }

    #[test]
    fn test_cached_state_false_overrides_file() {
        let mut file = CliConfig {
            cached_state: Some(true),
            ..Default::default()
        };
        assert_eq!(file.decoding_config().state_mode, StateMode::Cached);

        file.merge(&CliConfig {
            cached_state: Some(false),
            ..Default::default()
        });
        assert_eq!(file.decoding_config().state_mode, StateMode::Replay);
    }

    #[test]
    fn test_decoder_config_uses_given_vocab_size() {
        let config = CliConfig {
            hidden_size: Some(64),
            ..Default::default()
        };
        let decoder = config.decoder_config(2981);
        assert_eq!(decoder.embed_size, 256);
        assert_eq!(decoder.hidden_size, 64);
        assert_eq!(decoder.num_layers, 2);
        assert_eq!(decoder.vocab_size, 2981);
    }
}

//! Shared test utilities for captioner-core.
//!
//! This module provides scripted step functions, stub value networks and
//! tiny model configurations for unit and integration tests.

mod mock_step;
mod mock_value;
mod tiny_config;

pub use mock_step::{dummy_features, BeamTrace, ScriptedStep, SeededStep};
pub use mock_value::{
    dummy_image, FailingValueNetwork, LastTokenValueNetwork, LengthValueNetwork,
    RecordingValueNetwork, ShortValueNetwork, TokenSumValueNetwork,
};
pub use tiny_config::{tiny_decoder_config, tiny_lstm_decoder};

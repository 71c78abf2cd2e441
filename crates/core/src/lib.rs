//! Caption generation over a recurrent decoder.
//!
//! The search strategies in [`decoding`] drive any [`model::RecurrentStep`]
//! implementation; [`value`] connects an injected value network for
//! value-guided beam search.

pub mod captioner;
pub mod config;
pub mod decoding;
pub mod error;
pub mod model;
pub mod value;
pub mod vocab;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use captioner::Captioner;
pub use config::{DecoderModelConfig, DecodingConfig, StateMode, ValueFallback};
pub use error::{DecodeError, ValueNetworkError};
pub use model::{LstmCaptionDecoder, RecurrentStep, StepInput};
pub use value::{ValueNetwork, ValueOracleAdapter};
pub use vocab::Vocabulary;

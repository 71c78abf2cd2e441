use thiserror::Error;

/// Failure reported by an injected value network.
#[derive(Error, Debug)]
pub enum ValueNetworkError {
    #[error("value network unavailable: {0}")]
    Unavailable(String),

    #[error("value network failed: {0}")]
    Failed(String),

    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid decoding configuration: {0}")]
    InvalidConfig(String),

    #[error("step function returned an empty distribution")]
    EmptyDistribution,

    #[error("distribution size mismatch: expected {expected}, found {found}")]
    DistributionSize { expected: usize, found: usize },

    #[error("token {token_id} is outside the vocabulary (size {vocab_size})")]
    InvalidToken { token_id: u32, vocab_size: usize },

    #[error("invalid feature vector: {0}")]
    FeatureShape(String),

    #[error("beam is empty after expansion")]
    EmptyBeam,

    #[error("value oracle error: {0}")]
    ValueOracle(#[from] ValueNetworkError),

    #[error("value count mismatch: requested {expected}, received {found}")]
    ValueCountMismatch { expected: usize, found: usize },

    #[error("value oracle returned a non-finite value at index {index}")]
    NonFiniteValue { index: usize },

    #[error("vocabulary error: {0}")]
    Vocabulary(String),

    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl DecodeError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

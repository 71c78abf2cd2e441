//! Stacked-LSTM caption decoder.
//!
//! Weight layout:
//! - `embed.weight`: [vocab_size, embed_size]
//! - `lstm.weight_ih_l{k}`, `lstm.weight_hh_l{k}`, `lstm.bias_ih_l{k}`, `lstm.bias_hh_l{k}`
//! - `linear.weight`: [vocab_size, hidden_size], `linear.bias`: [vocab_size]
//!
//! The image feature vector is fed as the first input; every later input is
//! the embedding of a token.

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::rnn::{lstm, LSTMConfig, LSTMState, LSTM, RNN};
use candle_nn::{embedding, linear, Embedding, Linear, VarBuilder};

use super::{RecurrentStep, StepInput};
use crate::config::DecoderModelConfig;
use crate::error::DecodeError;

/// Hidden and cell state of every layer, batch size 1.
#[derive(Debug, Clone)]
pub struct LstmState {
    layers: Vec<LSTMState>,
}

impl LstmState {
    pub fn layers(&self) -> &[LSTMState] {
        &self.layers
    }

    /// Hidden state of the top layer.
    pub fn output(&self) -> Option<&Tensor> {
        self.layers.last().map(|s| &s.h)
    }
}

#[derive(Debug, Clone)]
pub struct LstmCaptionDecoder {
    embed: Embedding,
    layers: Vec<LSTM>,
    linear: Linear,
    config: DecoderModelConfig,
    device: Device,
    dtype: DType,
}

impl LstmCaptionDecoder {
    pub fn new(config: &DecoderModelConfig, vb: VarBuilder) -> Result<Self, DecodeError> {
        config.validate()?;

        let embed = embedding(config.vocab_size, config.embed_size, vb.pp("embed"))?;

        let lstm_vb = vb.pp("lstm");
        let mut layers = Vec::with_capacity(config.num_layers);
        for layer_idx in 0..config.num_layers {
            let in_dim = if layer_idx == 0 {
                config.embed_size
            } else {
                config.hidden_size
            };
            let layer_config = LSTMConfig {
                layer_idx,
                ..Default::default()
            };
            layers.push(lstm(
                in_dim,
                config.hidden_size,
                layer_config,
                lstm_vb.clone(),
            )?);
        }

        let linear = linear(config.hidden_size, config.vocab_size, vb.pp("linear"))?;

        Ok(Self {
            embed,
            layers,
            linear,
            config: config.clone(),
            device: vb.device().clone(),
            dtype: vb.dtype(),
        })
    }

    pub fn config(&self) -> &DecoderModelConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn zero_state(&self) -> Result<LstmState, DecodeError> {
        let layers = self
            .layers
            .iter()
            .map(|layer| layer.zero_state(1))
            .collect::<candle_core::Result<Vec<_>>>()?;
        Ok(LstmState { layers })
    }

    /// Normalize features to a `(1, embed_size)` row on the model's device.
    fn feature_row(&self, features: &Tensor) -> Result<Tensor, DecodeError> {
        let row = match features.rank() {
            1 => features.unsqueeze(0)?,
            2 => features.clone(),
            rank => {
                return Err(DecodeError::FeatureShape(format!(
                    "expected rank 1 or 2, got rank {rank}"
                )))
            }
        };
        let (rows, width) = row.dims2()?;
        if rows != 1 || width != self.config.embed_size {
            return Err(DecodeError::FeatureShape(format!(
                "expected (1, {}), got ({rows}, {width})",
                self.config.embed_size
            )));
        }
        Ok(row.to_device(&self.device)?.to_dtype(self.dtype)?)
    }

    fn token_row(&self, token_id: u32) -> Result<Tensor, DecodeError> {
        if token_id as usize >= self.config.vocab_size {
            return Err(DecodeError::InvalidToken {
                token_id,
                vocab_size: self.config.vocab_size,
            });
        }
        let ids = Tensor::new(&[token_id], &self.device)?;
        Ok(self.embed.forward(&ids)?)
    }
}

impl RecurrentStep for LstmCaptionDecoder {
    type State = LstmState;

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn step(
        &self,
        state: Option<&LstmState>,
        input: StepInput<'_>,
    ) -> Result<(LstmState, Vec<f32>), DecodeError> {
        let mut hidden = match input {
            StepInput::Features(features) => self.feature_row(features)?,
            StepInput::Token(token_id) => self.token_row(token_id)?,
        };

        let state = match state {
            Some(state) => state.clone(),
            None => self.zero_state()?,
        };

        let mut next = Vec::with_capacity(self.layers.len());
        for (layer, layer_state) in self.layers.iter().zip(state.layers.iter()) {
            let out = layer.step(&hidden, layer_state)?;
            hidden = out.h.clone();
            next.push(out);
        }

        let logits = self.linear.forward(&hidden)?;
        let probs = candle_nn::ops::softmax_last_dim(&logits)?
            .squeeze(0)?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;

        Ok((LstmState { layers: next }, probs))
    }
}

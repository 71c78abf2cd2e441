use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};

use crate::config::DecoderModelConfig;
use crate::model::LstmCaptionDecoder;

/// Create a tiny decoder config for testing (2 layers, 8 embed, 16 hidden,
/// 12 tokens). Feature vectors for it have width 8.
pub fn tiny_decoder_config() -> DecoderModelConfig {
    DecoderModelConfig {
        embed_size: 8,
        hidden_size: 16,
        num_layers: 2,
        vocab_size: 12,
    }
}

/// Tiny LSTM decoder with randomly initialized weights on the CPU.
///
/// The `VarMap` owns the weights and must outlive the decoder's use.
pub fn tiny_lstm_decoder() -> (LstmCaptionDecoder, VarMap) {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let decoder =
        LstmCaptionDecoder::new(&tiny_decoder_config(), vb).expect("build tiny decoder");
    (decoder, varmap)
}

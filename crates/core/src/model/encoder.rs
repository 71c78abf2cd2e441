//! Image encoder head.
//!
//! The convolutional backbone is injected; this module only owns the
//! projection from backbone features to the decoder's embedding width:
//! `Linear(backbone_dim, embed_size)` followed by batch normalization with
//! running statistics.

use candle_core::{Module, ModuleT, Tensor};
use candle_nn::{batch_norm, linear, BatchNorm, BatchNormConfig, Linear, VarBuilder};

use crate::error::DecodeError;

/// Opaque feature extractor (e.g. a pretrained CNN without its classifier).
pub trait FeatureBackbone {
    /// Width of one flattened feature row.
    fn output_dim(&self) -> usize;

    /// Map a batch of preprocessed images to features of shape
    /// `(batch, output_dim)` or `(batch, output_dim, 1, 1)`.
    fn extract(&self, images: &Tensor) -> Result<Tensor, DecodeError>;
}

/// Maps a batch of images to one feature vector per image.
pub trait ImageEncoder {
    fn embed_size(&self) -> usize;

    /// Returns features of shape `(batch, embed_size)`.
    fn encode(&self, images: &Tensor) -> Result<Tensor, DecodeError>;
}

pub struct ProjectionEncoder<B> {
    backbone: B,
    linear: Linear,
    bn: BatchNorm,
    embed_size: usize,
}

impl<B: FeatureBackbone> ProjectionEncoder<B> {
    pub fn new(backbone: B, embed_size: usize, vb: VarBuilder) -> Result<Self, DecodeError> {
        if embed_size == 0 {
            return Err(DecodeError::config("embed_size must be > 0"));
        }
        let linear = linear(backbone.output_dim(), embed_size, vb.pp("linear"))?;
        let bn_config = BatchNormConfig {
            eps: 1e-5,
            remove_mean: true,
            affine: true,
            momentum: 0.01,
        };
        let bn = batch_norm(embed_size, bn_config, vb.pp("bn"))?;
        Ok(Self {
            backbone,
            linear,
            bn,
            embed_size,
        })
    }

    pub fn backbone(&self) -> &B {
        &self.backbone
    }
}

impl<B: FeatureBackbone> ImageEncoder for ProjectionEncoder<B> {
    fn embed_size(&self) -> usize {
        self.embed_size
    }

    fn encode(&self, images: &Tensor) -> Result<Tensor, DecodeError> {
        let features = self.backbone.extract(images)?.detach();
        let batch = features.dim(0)?;
        let features = features.reshape((batch, ()))?;
        let width = features.dim(1)?;
        if width != self.backbone.output_dim() {
            return Err(DecodeError::FeatureShape(format!(
                "backbone produced width {width}, expected {}",
                self.backbone.output_dim()
            )));
        }
        let projected = self.linear.forward(&features)?;
        Ok(self.bn.forward_t(&projected, false)?)
    }
}

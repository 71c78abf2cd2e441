//! Precomputed image features supplied on the command line.
//!
//! The file holds the output of the image encoder for a single image:
//! `{"features": [0.12, -0.4, ...]}`.

use std::path::Path;

use anyhow::{bail, Context};
use candle_core::{Device, Tensor};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct FeaturesFile {
    features: Vec<f32>,
}

/// Parse a features document into a `(embed_size,)` tensor.
pub fn parse_features(json: &str, device: &Device) -> anyhow::Result<Tensor> {
    let file: FeaturesFile = serde_json::from_str(json).context("invalid features JSON")?;
    if file.features.is_empty() {
        bail!("features must not be empty");
    }
    if let Some(index) = file.features.iter().position(|v| !v.is_finite()) {
        bail!("feature {index} is not finite");
    }
    let len = file.features.len();
    Ok(Tensor::from_vec(file.features, len, device)?)
}

pub fn load_features(path: &Path, device: &Device) -> anyhow::Result<Tensor> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read features from {}", path.display()))?;
    parse_features(&content, device)
}

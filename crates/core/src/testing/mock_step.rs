use std::cell::Cell;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use candle_core::{DType, Device, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::decoding::{BeamObserver, Hypothesis};
use crate::error::DecodeError;
use crate::model::{RecurrentStep, StepInput};

/// Eight zero features; scripted step functions ignore their values.
pub fn dummy_features() -> Tensor {
    Tensor::zeros(8, DType::F32, &Device::Cpu).expect("allocate dummy features")
}

/// Step function whose distribution is looked up by the tokens fed so far
/// (features excluded). The state is that token history.
///
/// With replay-based beam search, the rule for a hypothesis is keyed by
/// its full prefix including the start token.
pub struct ScriptedStep {
    vocab_size: usize,
    default: Vec<f32>,
    rules: HashMap<Vec<u32>, Vec<f32>>,
    calls: Cell<usize>,
}

impl ScriptedStep {
    pub fn new(vocab_size: usize, default: Vec<f32>) -> Self {
        Self {
            vocab_size,
            default,
            rules: HashMap::new(),
            calls: Cell::new(0),
        }
    }

    pub fn with_rule(mut self, fed: &[u32], probs: Vec<f32>) -> Self {
        self.rules.insert(fed.to_vec(), probs);
        self
    }

    /// Number of `step` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl RecurrentStep for ScriptedStep {
    type State = Vec<u32>;

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn step(
        &self,
        state: Option<&Vec<u32>>,
        input: StepInput<'_>,
    ) -> Result<(Vec<u32>, Vec<f32>), DecodeError> {
        self.calls.set(self.calls.get() + 1);
        let mut fed = state.cloned().unwrap_or_default();
        if let StepInput::Token(token_id) = input {
            fed.push(token_id);
        }
        let probs = self.rules.get(&fed).unwrap_or(&self.default).clone();
        Ok((fed, probs))
    }
}

/// Step function producing a pseudo-random but reproducible distribution
/// for every token history.
pub struct SeededStep {
    vocab_size: usize,
    seed: u64,
}

impl SeededStep {
    pub fn new(vocab_size: usize, seed: u64) -> Self {
        Self { vocab_size, seed }
    }
}

impl RecurrentStep for SeededStep {
    type State = Vec<u32>;

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn step(
        &self,
        state: Option<&Vec<u32>>,
        input: StepInput<'_>,
    ) -> Result<(Vec<u32>, Vec<f32>), DecodeError> {
        let mut fed = state.cloned().unwrap_or_default();
        if let StepInput::Token(token_id) = input {
            fed.push(token_id);
        }

        let mut hasher = DefaultHasher::new();
        fed.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(self.seed ^ hasher.finish());

        let weights: Vec<f32> = (0..self.vocab_size)
            .map(|_| rng.gen::<f32>() + 0.01)
            .collect();
        let total: f32 = weights.iter().sum();
        let probs = weights.into_iter().map(|w| w / total).collect();
        Ok((fed, probs))
    }
}

/// Records the beam after every step.
#[derive(Debug, Default)]
pub struct BeamTrace {
    pub steps: Vec<Vec<Hypothesis>>,
}

impl BeamTrace {
    /// Token sequences of the beam after `step`, best first.
    pub fn tokens_at(&self, step: usize) -> Vec<Vec<u32>> {
        self.steps[step]
            .iter()
            .map(|h| h.tokens().to_vec())
            .collect()
    }
}

impl BeamObserver for BeamTrace {
    fn on_step(&mut self, step: usize, beam: &[Hypothesis]) {
        assert_eq!(step, self.steps.len(), "steps must be reported in order");
        self.steps.push(beam.to_vec());
    }
}

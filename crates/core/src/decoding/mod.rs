//! Caption decoding strategies.
//!
//! This module provides:
//! - Greedy decoding (argmax at every step)
//! - Likelihood-only beam search over accumulated log probabilities
//! - Value-guided beam search that ranks each hypothesis' candidates by a
//!   blend of step probability and a learned value estimate
//!
//! All strategies emit exactly `max_length` tokens; none stops early on an
//! end token.

mod beam;
mod greedy;
mod search;
mod value_guided;

pub use beam::{
    argmax, safe_ln, top_k_candidates, Beam, BeamObserver, BeamSearchConfig, Candidate,
    Hypothesis, NoopObserver, PROB_EPSILON,
};
pub use greedy::greedy_decode;
pub use search::{beam_decode, beam_search};
pub use value_guided::{
    blend, select_candidates, value_guided_beam_decode, value_guided_beam_search,
    ValueGuidedConfig,
};

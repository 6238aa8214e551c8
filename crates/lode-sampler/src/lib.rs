//! `lode-sampler` - composable token selection.
//!
//! A [`SamplerChain`] turns a logit vector into one chosen token ID. Stages
//! are stateful: the repetition stage tracks accepted tokens and the random
//! selector owns an advancing seeded RNG, so one chain drives one generation.

pub mod chain;
pub mod repetition;
pub mod select;
pub mod temperature;
pub mod top_p;

pub use chain::{Sampler, SamplerChain, SamplingParams, TokenLogit};
pub use repetition::RepeatPenalty;
pub use select::{Greedy, RandomSelect};
pub use temperature::Temperature;
pub use top_p::TopP;

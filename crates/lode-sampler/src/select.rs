use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::chain::{Sampler, TokenLogit};

/// Selects the single highest-logit token. Ties break toward the lower
/// token ID.
pub struct Greedy;

impl Sampler for Greedy {
    fn name(&self) -> &str {
        "greedy"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>) {
        let Some(best) = logits
            .iter()
            .enumerate()
            .max_by(|(ai, a), (bi, b)| {
                a.logit
                    .partial_cmp(&b.logit)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(bi.cmp(ai))
            })
            .map(|(i, _)| i)
        else {
            return;
        };
        let chosen = logits.swap_remove(best);
        logits.clear();
        logits.push(chosen);
    }
}

/// Softmaxes the surviving candidates and draws one with a seeded RNG.
///
/// The RNG is owned and advances across calls, so a fixed seed gives a
/// reproducible token sequence, not a constant token.
pub struct RandomSelect {
    rng: StdRng,
}

impl RandomSelect {
    pub fn new(seed: u64) -> RandomSelect {
        RandomSelect {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sampler for RandomSelect {
    fn name(&self) -> &str {
        "random_select"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>) {
        if logits.is_empty() {
            return;
        }

        let max_logit = logits
            .iter()
            .map(|t| t.logit)
            .fold(f32::NEG_INFINITY, f32::max);
        let weights: Vec<f32> = logits.iter().map(|t| (t.logit - max_logit).exp()).collect();

        let chosen = match WeightedIndex::new(&weights) {
            Ok(dist) => dist.sample(&mut self.rng),
            // Degenerate weights (all zero after underflow) fall back to
            // the best candidate.
            Err(_) => 0,
        };

        let selected = logits.swap_remove(chosen);
        logits.clear();
        logits.push(selected);
    }
}

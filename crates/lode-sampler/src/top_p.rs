use crate::chain::{Sampler, TokenLogit};

/// Nucleus truncation: keeps the smallest prefix of tokens (by descending
/// probability) whose cumulative probability reaches `p`.
pub struct TopP {
    p: f32,
}

impl TopP {
    pub fn new(p: f32) -> TopP {
        TopP { p }
    }
}

impl Sampler for TopP {
    fn name(&self) -> &str {
        "top_p"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>) {
        if logits.is_empty() || self.p >= 1.0 {
            return;
        }

        logits.sort_by(|a, b| {
            b.logit
                .partial_cmp(&a.logit)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let max_logit = logits[0].logit;
        let exps: Vec<f32> = logits.iter().map(|t| (t.logit - max_logit).exp()).collect();
        let sum: f32 = exps.iter().sum();

        let mut cumulative = 0.0;
        let mut cutoff = logits.len();
        for (i, e) in exps.iter().enumerate() {
            cumulative += e / sum;
            if cumulative >= self.p {
                cutoff = i + 1;
                break;
            }
        }

        // The best token always survives.
        logits.truncate(cutoff.max(1));
    }
}

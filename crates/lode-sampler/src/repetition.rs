use std::collections::VecDeque;

use crate::chain::{Sampler, TokenLogit};

/// Penalizes tokens generated within a sliding window of recent history.
///
/// Penalized positive logits are divided by the factor, negative ones
/// multiplied, so the penalty always pushes toward zero probability.
pub struct RepeatPenalty {
    penalty: f32,
    window: usize,
    recent: VecDeque<u32>,
}

impl RepeatPenalty {
    /// `penalty` of 1.0 disables the stage; `window` bounds how many
    /// accepted tokens are remembered.
    pub fn new(penalty: f32, window: usize) -> RepeatPenalty {
        RepeatPenalty {
            penalty,
            window,
            recent: VecDeque::with_capacity(window),
        }
    }
}

impl Sampler for RepeatPenalty {
    fn name(&self) -> &str {
        "repeat_penalty"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>) {
        if self.penalty == 1.0 || self.recent.is_empty() {
            return;
        }
        for candidate in logits.iter_mut() {
            if self.recent.contains(&candidate.token_id) {
                if candidate.logit > 0.0 {
                    candidate.logit /= self.penalty;
                } else {
                    candidate.logit *= self.penalty;
                }
            }
        }
    }

    fn observe(&mut self, token: u32) {
        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(token);
    }

    fn reset(&mut self) {
        self.recent.clear();
    }
}

use crate::chain::{Sampler, TokenLogit};

/// Divides every logit by the temperature.
///
/// Values below 1 sharpen the distribution, values above 1 flatten it.
/// Callers route temperature 0 to the greedy selector instead, but a
/// non-positive value here still clamps rather than dividing by zero.
pub struct Temperature {
    temperature: f32,
}

impl Temperature {
    pub fn new(temperature: f32) -> Temperature {
        Temperature { temperature }
    }
}

impl Sampler for Temperature {
    fn name(&self) -> &str {
        "temperature"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>) {
        let temp = self.temperature.max(1e-7);
        for candidate in logits.iter_mut() {
            candidate.logit /= temp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scales_logits() {
        let mut stage = Temperature::new(0.5);
        let mut l = vec![TokenLogit {
            token_id: 0,
            logit: 3.0,
        }];
        stage.apply(&mut l);
        assert_relative_eq!(l[0].logit, 6.0);
    }

    #[test]
    fn non_positive_temperature_clamps() {
        let mut stage = Temperature::new(0.0);
        let mut l = vec![TokenLogit {
            token_id: 0,
            logit: 1.0,
        }];
        stage.apply(&mut l);
        assert!(l[0].logit.is_finite());
    }
}

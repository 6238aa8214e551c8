/// A token ID paired with its logit value.
#[derive(Debug, Clone)]
pub struct TokenLogit {
    pub token_id: u32,
    pub logit: f32,
}

/// One stage of the sampling pipeline.
///
/// Stages take `&mut self` so they can carry per-generation state (penalty
/// history, RNG position). `observe` is called once per accepted token,
/// whether it came from the prompt or from sampling.
pub trait Sampler: Send {
    /// Name of this stage, for diagnostics.
    fn name(&self) -> &str;

    /// Filter, scale, or select among the candidates in place.
    fn apply(&mut self, logits: &mut Vec<TokenLogit>);

    /// Record an accepted token. Default does nothing.
    fn observe(&mut self, _token: u32) {}

    /// Clear internal state for a fresh generation. Default does nothing.
    fn reset(&mut self) {}
}

/// Sampling knobs, as they arrive from the caller.
#[derive(Debug, Clone, Copy)]
pub struct SamplingParams {
    /// Softmax temperature; 0 selects greedily.
    pub temperature: f32,
    /// Nucleus threshold in (0, 1].
    pub top_p: f32,
    /// Repetition penalty; 1.0 disables it.
    pub repeat_penalty: f32,
    /// RNG seed for the random selector.
    pub seed: u64,
}

/// Number of recent tokens the repetition stage looks back over.
pub const REPEAT_WINDOW: usize = 64;

/// An ordered pipeline of sampling stages ending in a selector.
pub struct SamplerChain {
    stages: Vec<Box<dyn Sampler>>,
}

impl SamplerChain {
    /// An empty chain. `sample` on it returns token 0.
    pub fn new() -> SamplerChain {
        SamplerChain { stages: Vec::new() }
    }

    /// Append a stage, builder style.
    pub fn with(mut self, stage: Box<dyn Sampler>) -> SamplerChain {
        self.stages.push(stage);
        self
    }

    /// The conventional pipeline for the given knobs.
    ///
    /// Repetition penalty first (on raw logits), then either a greedy
    /// selector (temperature 0) or temperature scaling, nucleus truncation,
    /// and a seeded weighted draw.
    pub fn standard(params: SamplingParams) -> SamplerChain {
        let chain = SamplerChain::new().with(Box::new(crate::RepeatPenalty::new(
            params.repeat_penalty,
            REPEAT_WINDOW,
        )));
        if params.temperature <= 0.0 {
            chain.with(Box::new(crate::Greedy))
        } else {
            chain
                .with(Box::new(crate::Temperature::new(params.temperature)))
                .with(Box::new(crate::TopP::new(params.top_p)))
                .with(Box::new(crate::RandomSelect::new(params.seed)))
        }
    }

    /// Run every stage over the raw logit vector and return the selected
    /// token ID (index into `logits`).
    pub fn sample(&mut self, logits: &[f32]) -> u32 {
        let mut candidates: Vec<TokenLogit> = logits
            .iter()
            .enumerate()
            .map(|(i, &logit)| TokenLogit {
                token_id: i as u32,
                logit,
            })
            .collect();

        for stage in &mut self.stages {
            stage.apply(&mut candidates);
        }

        candidates.first().map(|t| t.token_id).unwrap_or(0)
    }

    /// Feed an accepted token to every stage.
    pub fn accept(&mut self, token: u32) {
        for stage in &mut self.stages {
            stage.observe(token);
        }
    }

    /// Reset every stage for a fresh generation.
    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
    }
}

impl Default for SamplerChain {
    fn default() -> Self {
        SamplerChain::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(temperature: f32) -> SamplingParams {
        SamplingParams {
            temperature,
            top_p: 0.9,
            repeat_penalty: 1.1,
            seed: 42,
        }
    }

    #[test]
    fn zero_temperature_is_greedy() {
        let mut chain = SamplerChain::standard(params(0.0));
        assert_eq!(chain.sample(&[0.1, 2.0, 0.3]), 1);
        assert_eq!(chain.sample(&[0.1, 2.0, 0.3]), 1);
    }

    #[test]
    fn same_seed_same_draws() {
        let logits = [1.0, 0.5, 0.2, -0.4];
        let mut a = SamplerChain::standard(params(0.8));
        let mut b = SamplerChain::standard(params(0.8));
        for _ in 0..16 {
            let t = a.sample(&logits);
            assert_eq!(t, b.sample(&logits));
            a.accept(t);
            b.accept(t);
        }
    }

    #[test]
    fn empty_logits_select_token_zero() {
        let mut chain = SamplerChain::standard(params(0.7));
        assert_eq!(chain.sample(&[]), 0);
    }

    #[test]
    fn accepted_tokens_are_penalized() {
        // Token 0 leads slightly; after repeated acceptance the penalty
        // must push greedy selection to token 1.
        let logits = [1.0, 0.95];
        let mut chain = SamplerChain::standard(params(0.0));
        assert_eq!(chain.sample(&logits), 0);
        chain.accept(0);
        assert_eq!(chain.sample(&logits), 1);
    }

    #[test]
    fn reset_clears_penalty_history() {
        let logits = [1.0, 0.95];
        let mut chain = SamplerChain::standard(params(0.0));
        chain.accept(0);
        assert_eq!(chain.sample(&logits), 1);
        chain.reset();
        assert_eq!(chain.sample(&logits), 0);
    }
}

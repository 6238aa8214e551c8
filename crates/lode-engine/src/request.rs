use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lode_sampler::SamplingParams;

use crate::error::{EngineError, Result};

/// Shared flag that stops a running generation at the next decode step.
///
/// Cloning produces another handle to the same flag, so a caller can keep
/// one handle and move the other into the request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    /// Request cancellation. Safe to call from any thread, at any time.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// One generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// User prompt text.
    pub prompt: String,
    /// System prompt; when empty the user prompt is fed raw, with no chat
    /// template applied.
    pub system_prompt: String,
    /// Maximum number of tokens to produce.
    pub n_predict: usize,
    /// Softmax temperature; 0 selects greedily.
    pub temperature: f32,
    /// Nucleus threshold in (0, 1].
    pub top_p: f32,
    /// Repetition penalty; 1.0 disables it.
    pub repeat_penalty: f32,
    /// RNG seed for reproducible sampling.
    pub seed: u64,
    /// Cooperative cancellation flag.
    pub cancel: CancelToken,
}

impl Default for GenerationRequest {
    fn default() -> GenerationRequest {
        GenerationRequest {
            prompt: String::new(),
            system_prompt: String::new(),
            n_predict: 256,
            temperature: 0.7,
            top_p: 0.9,
            repeat_penalty: 1.1,
            seed: 42,
            cancel: CancelToken::new(),
        }
    }
}

impl GenerationRequest {
    /// A default-parameter request for the given prompt.
    pub fn new(prompt: impl Into<String>) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.into(),
            ..GenerationRequest::default()
        }
    }

    /// Reject out-of-range sampling knobs.
    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "temperature must be >= 0, got {}",
                self.temperature
            )));
        }
        if !self.top_p.is_finite() || self.top_p <= 0.0 || self.top_p > 1.0 {
            return Err(EngineError::InvalidConfig(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if !self.repeat_penalty.is_finite() || self.repeat_penalty <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "repeat_penalty must be > 0, got {}",
                self.repeat_penalty
            )));
        }
        Ok(())
    }

    /// The sampling knobs of this request.
    pub fn sampling_params(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
            repeat_penalty: self.repeat_penalty,
            seed: self.seed,
        }
    }
}

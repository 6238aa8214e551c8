use std::path::PathBuf;

use lode_compute::GpuLayers;
use tracing::warn;

use crate::error::{EngineError, Result};

/// Default pre-fill chunk size, overridable via `LODE_BATCH`.
pub const DEFAULT_BATCH: usize = 256;
/// Default number of context positions reserved for generation headroom,
/// overridable via `LODE_SAFETY`.
pub const DEFAULT_SAFETY_MARGIN: usize = 16;

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the GGUF model file.
    pub model_path: PathBuf,
    /// Context window size in tokens.
    pub n_ctx: usize,
    /// Host threads for the CPU backend; 0 uses the system default.
    pub n_threads: usize,
    /// Requested accelerator layer placement.
    pub n_gpu_layers: GpuLayers,
    /// Pre-fill chunk size in tokens.
    pub n_batch: usize,
    /// Context positions withheld from the prompt so decode has headroom.
    pub safety_margin: usize,
}

impl EngineConfig {
    /// A config with conventional defaults for the given model file.
    pub fn new(model_path: impl Into<PathBuf>) -> EngineConfig {
        EngineConfig {
            model_path: model_path.into(),
            n_ctx: 2048,
            n_threads: 0,
            n_gpu_layers: GpuLayers::Auto,
            n_batch: env_usize("LODE_BATCH", DEFAULT_BATCH),
            safety_margin: env_usize("LODE_SAFETY", DEFAULT_SAFETY_MARGIN),
        }
    }

    /// Reject parameter combinations that cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.n_ctx == 0 {
            return Err(EngineError::InvalidConfig("n_ctx must be > 0".to_string()));
        }
        if self.n_batch == 0 {
            return Err(EngineError::InvalidConfig(
                "n_batch must be > 0".to_string(),
            ));
        }
        if self.safety_margin >= self.n_ctx {
            return Err(EngineError::InvalidConfig(format!(
                "safety_margin ({}) must be smaller than n_ctx ({})",
                self.safety_margin, self.n_ctx
            )));
        }
        Ok(())
    }
}

/// Read a usize override from the environment, keeping the default on
/// missing or unparseable values.
fn env_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparseable environment override");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(EngineConfig::new("model.gguf").validate().is_ok());
    }

    #[test]
    fn zero_context_rejected() {
        let mut cfg = EngineConfig::new("model.gguf");
        cfg.n_ctx = 0;
        assert!(matches!(
            cfg.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn margin_must_leave_room() {
        let mut cfg = EngineConfig::new("model.gguf");
        cfg.n_ctx = 16;
        cfg.safety_margin = 16;
        assert!(cfg.validate().is_err());
        cfg.safety_margin = 15;
        assert!(cfg.validate().is_ok());
    }
}

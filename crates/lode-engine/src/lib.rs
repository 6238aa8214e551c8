//! `lode-engine` - the public generation API.
//!
//! An [`Engine`] owns one loaded model, a per-layer device dispatch, and one
//! execution context. Generation is exposed three ways over the same loop:
//! [`Engine::stream`] returns a lazy [`TokenStream`] of text fragments,
//! [`Engine::generate`] drains it into a [`Generation`], and
//! [`Engine::generate_with`] additionally hands each fragment to a callback.
//!
//! ```no_run
//! use lode_engine::{Engine, EngineConfig, GenerationRequest};
//!
//! let engine = Engine::new(EngineConfig::new("model.gguf"))?;
//! let out = engine.generate(&GenerationRequest::new("The capital of France is"))?;
//! println!("{}", out.text);
//! # Ok::<(), lode_engine::EngineError>(())
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod request;
mod runtime;
pub mod stream;
pub mod template;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use lode_compute::GpuLayers;
pub use request::{CancelToken, GenerationRequest};
pub use stream::{StopReason, TokenStream};

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lode_compute::{
    ComputeBackend, CpuBackend, DeviceProbe, LayerDispatch, PlacementPlan, SystemProbe,
};
use lode_model::{BpeTokenizer, GgufFile, LlamaModel, ModelArchitecture};
use lode_sampler::SamplerChain;
use tracing::{info, warn};

use crate::context::ExecutionContext;

/// The result of a drained generation.
#[derive(Debug)]
pub struct Generation {
    /// Concatenated output text.
    pub text: String,
    /// Tokens produced, including a sampled end-of-sequence token.
    pub n_tokens: usize,
    /// Prompt tokens consumed during pre-fill.
    pub prompt_tokens: usize,
    /// Why generation stopped.
    pub stop: StopReason,
    /// Wall time spent pre-filling the prompt.
    pub prefill_time: Duration,
    /// Wall time spent in decode steps.
    pub decode_time: Duration,
}

/// A loaded model plus everything needed to generate from it.
///
/// The engine serializes generations: while one [`TokenStream`] is live,
/// further calls report [`EngineError::Busy`] instead of blocking.
pub struct Engine {
    model: Arc<LlamaModel>,
    tokenizer: BpeTokenizer,
    dispatch: LayerDispatch,
    session: Mutex<ExecutionContext>,
    config: EngineConfig,
    n_ctx: usize,
}

impl Engine {
    /// Load a model and prepare a generation context, probing the system
    /// for an accelerator.
    pub fn new(config: EngineConfig) -> Result<Engine> {
        Engine::with_probe(config, &SystemProbe)
    }

    /// Like [`Engine::new`] with an injected device probe.
    pub fn with_probe(config: EngineConfig, probe: &dyn DeviceProbe) -> Result<Engine> {
        config.validate()?;
        runtime::init(probe);

        // Explicitly counted offload is a hard ask; auto placement degrades
        // instead.
        if let lode_compute::GpuLayers::Count(n) = config.n_gpu_layers {
            if n > 0 && probe.accelerator().is_none() {
                return Err(EngineError::BackendUnavailable(format!(
                    "{n} accelerator layers requested but no accelerator is present"
                )));
            }
        }

        let started = Instant::now();
        let gguf = GgufFile::open(&config.model_path).map_err(EngineError::Load)?;
        let tokenizer = BpeTokenizer::from_gguf(&gguf.metadata).map_err(EngineError::Load)?;
        let model = LlamaModel::from_gguf(&gguf).map_err(EngineError::Load)?;
        info!(
            path = %config.model_path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "model and tokenizer loaded"
        );

        let n_ctx = if config.n_ctx > model.context_limit() {
            warn!(
                requested = config.n_ctx,
                limit = model.context_limit(),
                "clamping context window to the model's trained limit"
            );
            model.context_limit()
        } else {
            config.n_ctx
        };

        let host: Arc<dyn ComputeBackend> = Arc::new(
            CpuBackend::with_threads(config.n_threads)
                .map_err(|e| EngineError::InvalidConfig(e.to_string()))?,
        );
        let plan = PlacementPlan::resolve(
            config.n_gpu_layers,
            model.n_layers(),
            model.layer_bytes(),
            probe,
        );
        // No resident accelerator backend is implemented yet; bind()
        // degrades planned accelerator layers to the host.
        let dispatch = LayerDispatch::bind(&plan, host, None);

        let session = Mutex::new(ExecutionContext::new(model.new_cache(n_ctx), n_ctx));

        Ok(Engine {
            model: Arc::new(model),
            tokenizer,
            dispatch,
            session,
            config,
            n_ctx,
        })
    }

    /// Start a generation and return its lazy fragment stream.
    ///
    /// The stream holds the engine's single context for its lifetime;
    /// concurrent calls get [`EngineError::Busy`].
    pub fn stream(&self, req: &GenerationRequest) -> Result<TokenStream<'_>> {
        req.validate()?;
        let guard = self.session.try_lock().map_err(|_| EngineError::Busy)?;

        let rendered = template::render_prompt(&req.prompt, &req.system_prompt);
        let mut prompt = self.tokenizer.encode(&rendered);
        prompt.insert(0, self.tokenizer.bos_id());

        // Keep the most recent tokens when the prompt cannot fit alongside
        // the decode headroom. The clamped window can be smaller than the
        // configured margin, so the budget saturates at one token.
        let max_prompt = self.n_ctx.saturating_sub(self.config.safety_margin).max(1);
        if prompt.len() > max_prompt {
            warn!(
                prompt_tokens = prompt.len(),
                max_prompt, "prompt exceeds context budget, dropping oldest tokens"
            );
            prompt.drain(..prompt.len() - max_prompt);
        }

        Ok(TokenStream::new(
            self.model.as_ref(),
            &self.tokenizer,
            &self.dispatch,
            guard,
            SamplerChain::standard(req.sampling_params()),
            prompt,
            self.config.n_batch,
            req.n_predict,
            req.cancel.clone(),
        ))
    }

    /// Run a generation to completion and return the aggregate result.
    pub fn generate(&self, req: &GenerationRequest) -> Result<Generation> {
        self.generate_with(req, |_| {})
    }

    /// Run a generation to completion, handing each text fragment to
    /// `on_fragment` as it is produced (synchronously, on this thread).
    pub fn generate_with(
        &self,
        req: &GenerationRequest,
        mut on_fragment: impl FnMut(&str),
    ) -> Result<Generation> {
        let mut stream = self.stream(req)?;

        let mut text = String::new();
        for fragment in &mut stream {
            let fragment = fragment?;
            on_fragment(&fragment);
            text.push_str(&fragment);
        }

        // A fully drained stream always recorded its stop.
        let stop = stream.stop_reason().unwrap_or(StopReason::Length);
        Ok(Generation {
            text,
            n_tokens: stream.n_tokens(),
            prompt_tokens: stream.prompt_tokens(),
            stop,
            prefill_time: stream.prefill_time(),
            decode_time: stream.decode_time(),
        })
    }

    /// The effective context window (possibly clamped to the model limit).
    pub fn n_ctx(&self) -> usize {
        self.n_ctx
    }

    /// The loaded tokenizer.
    pub fn tokenizer(&self) -> &BpeTokenizer {
        &self.tokenizer
    }
}

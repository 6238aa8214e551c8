pub mod config;
pub mod kv_cache;
pub mod weights;

pub use config::LlamaConfig;
pub use kv_cache::KvCache;
pub use weights::{LlamaLayer, LlamaWeights};

use std::path::Path;

use lode_compute::LayerDispatch;
use tracing::info;

use crate::architecture::ModelArchitecture;
use crate::error::{ModelError, Result};
use crate::gguf::reader::GgufFile;

/// A LLaMA-family transformer loaded from a GGUF file.
///
/// Holds hyperparameters and dequantized f32 weights only. The model never
/// mutates after load; sequence state lives in the [`KvCache`] each caller
/// passes to [`ModelArchitecture::step`].
pub struct LlamaModel {
    /// Model hyperparameters.
    pub config: LlamaConfig,
    /// All weight tensors.
    pub weights: LlamaWeights,
}

impl LlamaModel {
    /// Load a model from a parsed GGUF file.
    pub fn from_gguf(gguf: &GgufFile) -> Result<LlamaModel> {
        let config = LlamaConfig::from_gguf(&gguf.metadata)?;
        let weights = LlamaWeights::from_gguf(gguf, &config)?;
        info!(
            n_layers = config.n_layers,
            n_vocab = config.n_vocab,
            n_embd = config.n_embd,
            n_ctx_train = config.n_ctx_train,
            "model loaded"
        );
        Ok(LlamaModel { config, weights })
    }

    /// Open and load a model from a GGUF file on disk.
    pub fn load(path: &Path) -> Result<LlamaModel> {
        let gguf = GgufFile::open(path)?;
        LlamaModel::from_gguf(&gguf)
    }
}

impl ModelArchitecture for LlamaModel {
    /// Full transformer pass: embedding lookup, each layer's attention and
    /// SwiGLU FFN with residual connections (grouped-query attention when
    /// n_kv_heads < n_heads), final norm, LM head. Logits are produced for
    /// the last token only.
    fn step(
        &self,
        tokens: &[u32],
        pos: usize,
        cache: &mut KvCache,
        dispatch: &LayerDispatch,
    ) -> Result<Vec<f32>> {
        let cfg = &self.config;
        let n_embd = cfg.n_embd;
        let head_dim = cfg.head_dim;
        let q_dim = cfg.n_heads * head_dim;
        let kv_dim = cfg.n_kv_heads * head_dim;
        let heads_per_kv = cfg.n_heads / cfg.n_kv_heads;

        if tokens.is_empty() {
            return Err(ModelError::Other("no tokens to process".to_string()));
        }
        // Fail before any cache write so an overflowing call leaves the
        // sequence state untouched.
        if pos + tokens.len() > cache.capacity() {
            return Err(ModelError::ContextOverflow {
                pos: pos + tokens.len(),
                max: cache.capacity(),
            });
        }

        let mut logits = Vec::new();

        for (t_idx, &token_id) in tokens.iter().enumerate() {
            let cur_pos = pos + t_idx;

            if token_id as usize >= cfg.n_vocab {
                return Err(ModelError::Other(format!(
                    "token id {} exceeds vocab size {}",
                    token_id, cfg.n_vocab
                )));
            }
            let embd = token_id as usize * n_embd;
            let mut hidden = self.weights.token_embd[embd..embd + n_embd].to_vec();

            let mut prev_layer = None;
            for (layer_idx, layer) in self.weights.layers.iter().enumerate() {
                hidden = dispatch.carry(prev_layer, layer_idx, hidden);
                let backend = dispatch.layer(layer_idx);

                // Attention sub-layer.
                let normed = backend.rms_norm(&hidden, &layer.attn_norm, cfg.norm_eps, n_embd)?;

                // GGUF stores projections as [out_dim, in_dim] row-major, so
                // W @ x is matmul(W, x, out_dim, in_dim, 1).
                let q = backend.matmul(&layer.wq, &normed, q_dim, n_embd, 1)?;
                let k = backend.matmul(&layer.wk, &normed, kv_dim, n_embd, 1)?;
                let v = backend.matmul(&layer.wv, &normed, kv_dim, n_embd, 1)?;

                let (q, k) = backend.rope(
                    &q,
                    &k,
                    head_dim,
                    cur_pos,
                    cfg.n_heads,
                    cfg.n_kv_heads,
                    cfg.rope_theta,
                )?;

                cache.update(layer_idx, &k, &v, cur_pos);
                let seq_len = cur_pos + 1;
                let cached_k = cache.keys(layer_idx, seq_len);
                let cached_v = cache.values(layer_idx, seq_len);

                // Causal masking is implicit: the cache holds only positions
                // up to cur_pos.
                let scale = 1.0 / (head_dim as f32).sqrt();
                let mut attn = vec![0.0; q_dim];
                for h in 0..cfg.n_heads {
                    let kv_h = h / heads_per_kv;
                    let q_head = &q[h * head_dim..(h + 1) * head_dim];

                    let mut scores = Vec::with_capacity(seq_len);
                    for s in 0..seq_len {
                        let k_off = s * kv_dim + kv_h * head_dim;
                        let dot: f32 = q_head
                            .iter()
                            .zip(&cached_k[k_off..k_off + head_dim])
                            .map(|(a, b)| a * b)
                            .sum();
                        scores.push(dot * scale);
                    }
                    let probs = backend.softmax(&scores, seq_len)?;

                    let out = &mut attn[h * head_dim..(h + 1) * head_dim];
                    for (s, &p) in probs.iter().enumerate() {
                        let v_off = s * kv_dim + kv_h * head_dim;
                        for d in 0..head_dim {
                            out[d] += p * cached_v[v_off + d];
                        }
                    }
                }

                let attn_proj = backend.matmul(&layer.wo, &attn, n_embd, q_dim, 1)?;
                hidden = backend.add(&hidden, &attn_proj)?;

                // SwiGLU FFN sub-layer.
                let normed = backend.rms_norm(&hidden, &layer.ffn_norm, cfg.norm_eps, n_embd)?;
                let gate = backend.matmul(&layer.ffn_gate, &normed, cfg.n_ff, n_embd, 1)?;
                let up = backend.matmul(&layer.ffn_up, &normed, cfg.n_ff, n_embd, 1)?;
                let gated = backend.mul(&backend.silu(&gate)?, &up)?;
                let ffn_out = backend.matmul(&layer.ffn_down, &gated, n_embd, cfg.n_ff, 1)?;
                hidden = backend.add(&hidden, &ffn_out)?;

                prev_layer = Some(layer_idx);
            }

            // Final norm and LM head, for the last token only.
            if t_idx == tokens.len() - 1 {
                let head = dispatch.head();
                let normed =
                    head.rms_norm(&hidden, &self.weights.output_norm, cfg.norm_eps, n_embd)?;
                logits = head.matmul(&self.weights.output, &normed, cfg.n_vocab, n_embd, 1)?;
            }
        }

        Ok(logits)
    }

    fn vocab_size(&self) -> usize {
        self.config.n_vocab
    }

    fn n_layers(&self) -> usize {
        self.config.n_layers
    }

    fn context_limit(&self) -> usize {
        self.config.n_ctx_train
    }

    fn new_cache(&self, n_ctx: usize) -> KvCache {
        KvCache::new(
            self.config.n_layers,
            self.config.n_kv_heads,
            self.config.head_dim,
            n_ctx,
        )
    }

    fn layer_bytes(&self) -> u64 {
        self.weights
            .layers
            .first()
            .map(LlamaLayer::resident_bytes)
            .unwrap_or(0)
    }
}

use tracing::debug;

use crate::error::Result;
use crate::gguf::reader::GgufFile;

use super::config::LlamaConfig;

/// Weight tensors of one transformer layer, dequantized to flat row-major
/// f32 vectors.
pub struct LlamaLayer {
    /// Attention RMS norm weights, length n_embd.
    pub attn_norm: Vec<f32>,
    /// Query projection, shape [n_heads * head_dim, n_embd].
    pub wq: Vec<f32>,
    /// Key projection, shape [n_kv_heads * head_dim, n_embd].
    pub wk: Vec<f32>,
    /// Value projection, shape [n_kv_heads * head_dim, n_embd].
    pub wv: Vec<f32>,
    /// Attention output projection, shape [n_embd, n_heads * head_dim].
    pub wo: Vec<f32>,
    /// FFN RMS norm weights, length n_embd.
    pub ffn_norm: Vec<f32>,
    /// Gate projection, shape [n_ff, n_embd].
    pub ffn_gate: Vec<f32>,
    /// Up projection, shape [n_ff, n_embd].
    pub ffn_up: Vec<f32>,
    /// Down projection, shape [n_embd, n_ff].
    pub ffn_down: Vec<f32>,
}

impl LlamaLayer {
    /// Resident bytes of this layer's f32 weights.
    pub fn resident_bytes(&self) -> u64 {
        let elems = self.attn_norm.len()
            + self.wq.len()
            + self.wk.len()
            + self.wv.len()
            + self.wo.len()
            + self.ffn_norm.len()
            + self.ffn_gate.len()
            + self.ffn_up.len()
            + self.ffn_down.len();
        (elems * std::mem::size_of::<f32>()) as u64
    }
}

/// All weight tensors of a model.
pub struct LlamaWeights {
    /// Token embedding matrix, shape [n_vocab, n_embd].
    pub token_embd: Vec<f32>,
    /// Final RMS norm weights, length n_embd.
    pub output_norm: Vec<f32>,
    /// LM head projection, shape [n_vocab, n_embd]. Shares data with
    /// `token_embd` when the file ties embeddings.
    pub output: Vec<f32>,
    /// Per-layer weights.
    pub layers: Vec<LlamaLayer>,
}

impl LlamaWeights {
    /// Load and dequantize every weight tensor.
    ///
    /// Tensor names follow the GGUF convention: `token_embd.weight`,
    /// `output_norm.weight`, `output.weight` (absent for tied embeddings),
    /// and `blk.{i}.{attn_norm,attn_q,attn_k,attn_v,attn_output,ffn_norm,
    /// ffn_gate,ffn_up,ffn_down}.weight`.
    pub fn from_gguf(gguf: &GgufFile, config: &LlamaConfig) -> Result<LlamaWeights> {
        let token_embd = gguf.tensor_f32("token_embd.weight")?;
        let output_norm = gguf.tensor_f32("output_norm.weight")?;
        let output = match gguf.tensor_f32("output.weight") {
            Ok(t) => t,
            Err(_) => {
                debug!("no output.weight tensor, tying LM head to token embeddings");
                token_embd.clone()
            }
        };

        let mut layers = Vec::with_capacity(config.n_layers);
        for i in 0..config.n_layers {
            layers.push(LlamaLayer {
                attn_norm: gguf.tensor_f32(&format!("blk.{i}.attn_norm.weight"))?,
                wq: gguf.tensor_f32(&format!("blk.{i}.attn_q.weight"))?,
                wk: gguf.tensor_f32(&format!("blk.{i}.attn_k.weight"))?,
                wv: gguf.tensor_f32(&format!("blk.{i}.attn_v.weight"))?,
                wo: gguf.tensor_f32(&format!("blk.{i}.attn_output.weight"))?,
                ffn_norm: gguf.tensor_f32(&format!("blk.{i}.ffn_norm.weight"))?,
                ffn_gate: gguf.tensor_f32(&format!("blk.{i}.ffn_gate.weight"))?,
                ffn_up: gguf.tensor_f32(&format!("blk.{i}.ffn_up.weight"))?,
                ffn_down: gguf.tensor_f32(&format!("blk.{i}.ffn_down.weight"))?,
            });
        }

        Ok(LlamaWeights {
            token_embd,
            output_norm,
            output,
            layers,
        })
    }
}

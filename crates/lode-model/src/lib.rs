//! `lode-model` - GGUF weight store, tokenizer, and LLaMA forward pass.
//!
//! A loaded [`llama::LlamaModel`] is immutable and can be shared by any
//! number of execution contexts; all per-generation state lives in the
//! [`llama::KvCache`] the caller owns.

pub mod architecture;
pub mod error;
pub mod gguf;
pub mod llama;
pub mod tokenizer;

pub use architecture::ModelArchitecture;
pub use error::{ModelError, Result};
pub use gguf::GgufFile;
pub use llama::{KvCache, LlamaModel};
pub use tokenizer::BpeTokenizer;

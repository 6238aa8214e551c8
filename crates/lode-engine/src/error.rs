use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The model file could not be opened, parsed, or loaded.
    ///
    /// Deliberately not a `From` impl: a `ModelError` after load time is an
    /// `Inference` failure, so every conversion site chooses explicitly.
    #[error("model load failed: {0}")]
    Load(lode_model::ModelError),
    /// An engine or request parameter is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A token append would exceed the context window.
    #[error("context overflow: position {pos} exceeds window of {max}")]
    ContextOverflow { pos: usize, max: usize },
    /// An explicitly requested accelerator is not present.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    /// Another generation already holds this engine's context.
    #[error("engine is busy with another generation")]
    Busy,
    /// The forward pass failed mid-generation.
    #[error("inference failed: {0}")]
    Inference(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

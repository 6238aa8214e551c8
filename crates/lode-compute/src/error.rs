use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComputeError {
    #[error("length mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("matmul dimension mismatch: a.len()={a_len}, b.len()={b_len} for [{m}x{k}] @ [{k}x{n}]")]
    MatmulMismatch {
        a_len: usize,
        b_len: usize,
        m: usize,
        k: usize,
        n: usize,
    },
    #[error("thread pool setup failed: {0}")]
    ThreadPool(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ComputeError>;

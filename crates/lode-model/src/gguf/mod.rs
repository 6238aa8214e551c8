pub mod dtype;
pub mod header;
pub mod metadata;
mod read;
pub mod reader;
pub mod tensor_info;

pub use dtype::GgufDType;
pub use header::{GgufHeader, GGUF_DEFAULT_ALIGNMENT, GGUF_MAGIC};
pub use metadata::{GgufMetadata, GgufValue};
pub use reader::GgufFile;
pub use tensor_info::GgufTensorInfo;

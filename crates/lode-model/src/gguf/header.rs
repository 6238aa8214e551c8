use std::io::Read;

use crate::error::{ModelError, Result};

use super::read::{read_u32, read_u64};

/// The four-byte magic identifying a GGUF file: ASCII "GGUF".
pub const GGUF_MAGIC: [u8; 4] = *b"GGUF";

/// Alignment (in bytes) of the tensor data section.
pub const GGUF_DEFAULT_ALIGNMENT: usize = 32;

/// The only container version this loader accepts. Unknown or future
/// versions are rejected rather than parsed on a guess.
pub const GGUF_SUPPORTED_VERSION: u32 = 3;

/// Parsed GGUF file header.
pub struct GgufHeader {
    /// Container format version.
    pub version: u32,
    /// Number of tensors stored in the file.
    pub n_tensors: u64,
    /// Number of key-value metadata entries.
    pub n_kv: u64,
}

impl GgufHeader {
    /// Parse and validate the header at the start of a reader.
    pub fn parse(reader: &mut impl Read) -> Result<GgufHeader> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != GGUF_MAGIC {
            return Err(ModelError::InvalidMagic(magic));
        }

        let version = read_u32(reader)?;
        if version != GGUF_SUPPORTED_VERSION {
            return Err(ModelError::UnsupportedVersion(version));
        }

        Ok(GgufHeader {
            version,
            n_tensors: read_u64(reader)?,
            n_kv: read_u64(reader)?,
        })
    }
}

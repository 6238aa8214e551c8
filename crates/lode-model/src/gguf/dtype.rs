use std::fmt;

/// On-disk tensor data types this loader can dequantize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GgufDType {
    /// 32-bit floating point.
    F32,
    /// 16-bit floating point (IEEE 754 half-precision).
    F16,
    /// 4-bit quantized blocks (GGUF Q4_0).
    Q4_0,
    /// 8-bit quantized blocks (GGUF Q8_0).
    Q8_0,
}

impl GgufDType {
    /// Maps a GGUF tensor type ID to a dtype; unknown IDs are rejected by
    /// the caller with `UnsupportedGgufType`.
    pub fn from_gguf_type(id: u32) -> Option<GgufDType> {
        match id {
            0 => Some(GgufDType::F32),
            1 => Some(GgufDType::F16),
            2 => Some(GgufDType::Q4_0),
            8 => Some(GgufDType::Q8_0),
            _ => None,
        }
    }

    /// The GGUF tensor type ID for this dtype.
    pub fn to_gguf_type(&self) -> u32 {
        match self {
            GgufDType::F32 => 0,
            GgufDType::F16 => 1,
            GgufDType::Q4_0 => 2,
            GgufDType::Q8_0 => 8,
        }
    }

    /// Elements per storage block (1 for scalar types).
    pub fn block_size(&self) -> usize {
        match self {
            GgufDType::F32 | GgufDType::F16 => 1,
            GgufDType::Q4_0 | GgufDType::Q8_0 => 32,
        }
    }

    /// Bytes per element for scalar types, bytes per block for quantized
    /// ones (Q4_0: 2-byte f16 scale + 16 nibble bytes; Q8_0: 2-byte scale
    /// + 32 quant bytes).
    pub fn bytes_per_block(&self) -> usize {
        match self {
            GgufDType::F32 => 4,
            GgufDType::F16 => 2,
            GgufDType::Q4_0 => 18,
            GgufDType::Q8_0 => 34,
        }
    }

    /// Whether this dtype stores quantized blocks.
    pub fn is_quantized(&self) -> bool {
        matches!(self, GgufDType::Q4_0 | GgufDType::Q8_0)
    }
}

impl fmt::Display for GgufDType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GgufDType::F32 => write!(f, "f32"),
            GgufDType::F16 => write!(f, "f16"),
            GgufDType::Q4_0 => write!(f, "q4_0"),
            GgufDType::Q8_0 => write!(f, "q8_0"),
        }
    }
}

use std::io::Read;

use crate::error::{ModelError, Result};

use super::dtype::GgufDType;
use super::read;

/// Describes a single tensor stored within a GGUF file.
pub struct GgufTensorInfo {
    /// Tensor name (e.g. "blk.0.attn_q.weight").
    pub name: String,
    /// Size of each dimension.
    pub dims: Vec<u64>,
    /// Data type of the stored tensor data.
    pub dtype: GgufDType,
    /// Byte offset from the start of the tensor data section.
    pub offset: u64,
}

impl GgufTensorInfo {
    /// Total number of elements in this tensor.
    pub fn numel(&self) -> usize {
        self.dims.iter().map(|&d| d as usize).product()
    }

    /// Byte size of this tensor's raw data in the file, rounded up to
    /// whole quantization blocks.
    pub fn data_size(&self) -> usize {
        let n_blocks = self.numel().div_ceil(self.dtype.block_size());
        n_blocks * self.dtype.bytes_per_block()
    }
}

/// Parse `n_tensors` tensor info entries.
///
/// Each entry: GGUF string name, u32 dimension count, that many u64
/// dimension sizes, u32 GGUF type ID, u64 data offset.
pub fn parse_tensor_infos(reader: &mut impl Read, n_tensors: u64) -> Result<Vec<GgufTensorInfo>> {
    let mut infos = Vec::with_capacity(n_tensors as usize);
    for _ in 0..n_tensors {
        let name = read::read_string(reader)?;

        let n_dims = read::read_u32(reader)? as usize;
        let mut dims = Vec::with_capacity(n_dims);
        for _ in 0..n_dims {
            dims.push(read::read_u64(reader)?);
        }

        let type_id = read::read_u32(reader)?;
        let dtype = GgufDType::from_gguf_type(type_id)
            .ok_or(ModelError::UnsupportedGgufType(type_id))?;

        let offset = read::read_u64(reader)?;

        infos.push(GgufTensorInfo {
            name,
            dims,
            dtype,
            offset,
        });
    }
    Ok(infos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_size_rounds_to_blocks() {
        let info = GgufTensorInfo {
            name: "t".to_string(),
            dims: vec![33],
            dtype: GgufDType::Q4_0,
            offset: 0,
        };
        // 33 elements span two 32-element blocks of 18 bytes each.
        assert_eq!(info.data_size(), 36);

        let f32_info = GgufTensorInfo {
            name: "t".to_string(),
            dims: vec![4, 3],
            dtype: GgufDType::F32,
            offset: 0,
        };
        assert_eq!(f32_info.numel(), 12);
        assert_eq!(f32_info.data_size(), 48);
    }
}

use std::io::{BufReader, Seek};
use std::path::Path;

use memmap2::Mmap;

use crate::error::{ModelError, Result};

use super::dtype::GgufDType;
use super::header::{GgufHeader, GGUF_DEFAULT_ALIGNMENT};
use super::metadata::GgufMetadata;
use super::tensor_info::{self, GgufTensorInfo};

/// A parsed GGUF file backed by a memory-mapped region.
///
/// The header, metadata, and tensor info table are parsed with buffered
/// reads; the file is then memory-mapped so tensor data is available as
/// slices without further I/O.
pub struct GgufFile {
    /// Parsed header (version, tensor/KV counts).
    pub header: GgufHeader,
    /// Parsed metadata key-value entries.
    pub metadata: GgufMetadata,
    /// Parsed tensor info entries (name, dims, dtype, offset).
    pub tensor_infos: Vec<GgufTensorInfo>,
    mmap: Mmap,
    /// Byte offset where the aligned tensor data section begins.
    data_offset: usize,
}

impl GgufFile {
    /// Open and parse a GGUF file from disk.
    pub fn open(path: &Path) -> Result<GgufFile> {
        let file = std::fs::File::open(path)?;
        let mut reader = BufReader::new(&file);

        let header = GgufHeader::parse(&mut reader)?;
        let metadata = GgufMetadata::parse_kv(&mut reader, header.n_kv)?;
        let tensor_infos = tensor_info::parse_tensor_infos(&mut reader, header.n_tensors)?;

        // Tensor data starts at the next alignment boundary after the
        // info table.
        let table_end = reader.stream_position()? as usize;
        let data_offset =
            (table_end + GGUF_DEFAULT_ALIGNMENT - 1) & !(GGUF_DEFAULT_ALIGNMENT - 1);

        let mmap = unsafe { Mmap::map(&file)? };

        Ok(GgufFile {
            header,
            metadata,
            tensor_infos,
            mmap,
            data_offset,
        })
    }

    /// Raw byte slice for a tensor's data within the mapped file.
    ///
    /// Fails rather than slicing out of bounds when the file is shorter
    /// than its tensor table claims.
    pub fn tensor_data(&self, info: &GgufTensorInfo) -> Result<&[u8]> {
        let start = self.data_offset + info.offset as usize;
        let end = start + info.data_size();
        if end > self.mmap.len() {
            return Err(ModelError::TensorOutOfBounds {
                name: info.name.clone(),
                end,
                len: self.mmap.len(),
            });
        }
        Ok(&self.mmap[start..end])
    }

    /// Load a tensor by name as f32, dequantizing if needed.
    pub fn tensor_f32(&self, name: &str) -> Result<Vec<f32>> {
        let info = self
            .tensor_infos
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ModelError::TensorNotFound(name.to_string()))?;

        let raw = self.tensor_data(info)?;
        let numel = info.numel();

        Ok(match info.dtype {
            GgufDType::F32 => dequantize_f32(raw, numel),
            GgufDType::F16 => dequantize_f16(raw, numel),
            GgufDType::Q4_0 => dequantize_q4_0(raw, numel),
            GgufDType::Q8_0 => dequantize_q8_0(raw, numel),
        })
    }
}

/// Reinterpret raw little-endian bytes as f32 values.
fn dequantize_f32(data: &[u8], numel: usize) -> Vec<f32> {
    data.chunks_exact(4)
        .take(numel)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Widen f16 values to f32.
fn dequantize_f16(data: &[u8], numel: usize) -> Vec<f32> {
    data.chunks_exact(2)
        .take(numel)
        .map(|b| half::f16::from_le_bytes([b[0], b[1]]).to_f32())
        .collect()
}

/// Dequantize Q4_0 blocks: per 32-element block, an f16 scale followed by
/// 16 bytes of packed nibbles (lower nibble first); value = (nibble - 8) * scale.
fn dequantize_q4_0(data: &[u8], numel: usize) -> Vec<f32> {
    const BLOCK_BYTES: usize = 18;

    let mut out = Vec::with_capacity(numel);
    for block in data.chunks_exact(BLOCK_BYTES) {
        let scale = half::f16::from_le_bytes([block[0], block[1]]).to_f32();
        for &byte in &block[2..] {
            let lo = (byte & 0x0F) as i32 - 8;
            let hi = ((byte >> 4) & 0x0F) as i32 - 8;
            out.push(lo as f32 * scale);
            out.push(hi as f32 * scale);
        }
    }
    // The last block may carry padding.
    out.truncate(numel);
    out
}

/// Dequantize Q8_0 blocks: per 32-element block, an f16 scale followed by
/// 32 signed bytes; value = quant * scale.
fn dequantize_q8_0(data: &[u8], numel: usize) -> Vec<f32> {
    const BLOCK_BYTES: usize = 34;

    let mut out = Vec::with_capacity(numel);
    for block in data.chunks_exact(BLOCK_BYTES) {
        let scale = half::f16::from_le_bytes([block[0], block[1]]).to_f32();
        for &byte in &block[2..] {
            out.push(byte as i8 as f32 * scale);
        }
    }
    out.truncate(numel);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    /// A one-tensor GGUF v3 file: key "general.name" = "tiny", tensor "w"
    /// of four f32 values.
    fn tiny_gguf() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"GGUF");
        buf.extend_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(&1u64.to_le_bytes()); // n_tensors
        buf.extend_from_slice(&1u64.to_le_bytes()); // n_kv

        buf.extend_from_slice(&12u64.to_le_bytes());
        buf.extend_from_slice(b"general.name");
        buf.extend_from_slice(&8u32.to_le_bytes()); // String
        buf.extend_from_slice(&4u64.to_le_bytes());
        buf.extend_from_slice(b"tiny");

        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(b"w");
        buf.extend_from_slice(&1u32.to_le_bytes()); // n_dims
        buf.extend_from_slice(&4u64.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // F32
        buf.extend_from_slice(&0u64.to_le_bytes()); // offset

        // Pad to the data-section alignment boundary.
        while buf.len() % GGUF_DEFAULT_ALIGNMENT != 0 {
            buf.push(0);
        }
        for v in [1.0f32, 2.0, -3.0, 0.5] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn opens_and_reads_tensor_from_disk() {
        let file = write_temp(&tiny_gguf());
        let gguf = GgufFile::open(file.path()).unwrap();

        assert_eq!(gguf.header.n_tensors, 1);
        assert_eq!(gguf.metadata.get_string("general.name").unwrap(), "tiny");

        let w = gguf.tensor_f32("w").unwrap();
        assert_eq!(w.len(), 4);
        assert_relative_eq!(w[1], 2.0);
        assert_relative_eq!(w[2], -3.0);

        assert!(matches!(
            gguf.tensor_f32("missing"),
            Err(ModelError::TensorNotFound(_))
        ));
    }

    #[test]
    fn short_data_section_is_caught() {
        let bytes = tiny_gguf();
        // Drop the last tensor value so the info table overruns the file.
        let file = write_temp(&bytes[..bytes.len() - 4]);
        let gguf = GgufFile::open(file.path()).unwrap();
        assert!(matches!(
            gguf.tensor_f32("w"),
            Err(ModelError::TensorOutOfBounds { .. })
        ));
    }

    #[test]
    fn q4_0_roundtrip_of_known_block() {
        // One block: scale 1.0, all nibbles 0x8 -> dequantized value 0.0,
        // except the first byte 0x09 -> lo=1, hi=-8... build explicitly.
        let scale = half::f16::from_f32(2.0);
        let mut block = Vec::new();
        block.extend_from_slice(&scale.to_le_bytes());
        block.push(0x09); // lo nibble 9 -> 1, hi nibble 0 -> -8
        block.extend_from_slice(&[0x88; 15]); // both nibbles 8 -> 0

        let out = dequantize_q4_0(&block, 32);
        assert_eq!(out.len(), 32);
        assert_eq!(out[0], 2.0); // (9 - 8) * 2.0
        assert_eq!(out[1], -16.0); // (0 - 8) * 2.0
        assert!(out[2..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn q8_0_applies_scale() {
        let scale = half::f16::from_f32(0.5);
        let mut block = Vec::new();
        block.extend_from_slice(&scale.to_le_bytes());
        block.push(4u8);
        block.push((-6i8) as u8);
        block.extend_from_slice(&[0u8; 30]);

        let out = dequantize_q8_0(&block, 32);
        assert_eq!(out[0], 2.0);
        assert_eq!(out[1], -3.0);
    }

    #[test]
    fn f16_widening() {
        let mut data = Vec::new();
        for v in [1.5f32, -2.0, 0.0] {
            data.extend_from_slice(&half::f16::from_f32(v).to_le_bytes());
        }
        assert_eq!(dequantize_f16(&data, 3), vec![1.5, -2.0, 0.0]);
    }
}

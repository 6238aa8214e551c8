//! Little-endian primitive readers shared by the GGUF parsing modules.

use std::io::Read;

use crate::error::{ModelError, Result};

pub(super) fn read_u8(reader: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub(super) fn read_u16(reader: &mut impl Read) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(super) fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(super) fn read_u64(reader: &mut impl Read) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(super) fn read_f32(reader: &mut impl Read) -> Result<f32> {
    Ok(f32::from_bits(read_u32(reader)?))
}

pub(super) fn read_f64(reader: &mut impl Read) -> Result<f64> {
    Ok(f64::from_bits(read_u64(reader)?))
}

/// A GGUF string: u64 byte length followed by UTF-8 data.
pub(super) fn read_string(reader: &mut impl Read) -> Result<String> {
    let len = read_u64(reader)? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|e| ModelError::Other(format!("invalid UTF-8 in GGUF string: {}", e)))
}

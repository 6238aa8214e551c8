use std::collections::HashMap;
use std::io::Read;

use crate::error::{ModelError, Result};

use super::read;

/// A single GGUF metadata value.
///
/// GGUF value type IDs:
///   0=U8, 1=I8, 2=U16, 3=I16, 4=U32, 5=I32, 6=F32, 7=Bool,
///   8=String, 9=Array, 10=U64, 11=I64, 12=F64
#[derive(Debug, Clone)]
pub enum GgufValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Array(Vec<GgufValue>),
}

impl GgufValue {
    fn type_name(&self) -> &'static str {
        match self {
            GgufValue::U8(_) => "U8",
            GgufValue::I8(_) => "I8",
            GgufValue::U16(_) => "U16",
            GgufValue::I16(_) => "I16",
            GgufValue::U32(_) => "U32",
            GgufValue::I32(_) => "I32",
            GgufValue::U64(_) => "U64",
            GgufValue::I64(_) => "I64",
            GgufValue::F32(_) => "F32",
            GgufValue::F64(_) => "F64",
            GgufValue::Bool(_) => "Bool",
            GgufValue::String(_) => "String",
            GgufValue::Array(_) => "Array",
        }
    }

    fn parse(reader: &mut impl Read, type_id: u32) -> Result<GgufValue> {
        Ok(match type_id {
            0 => GgufValue::U8(read::read_u8(reader)?),
            1 => GgufValue::I8(read::read_u8(reader)? as i8),
            2 => GgufValue::U16(read::read_u16(reader)?),
            3 => GgufValue::I16(read::read_u16(reader)? as i16),
            4 => GgufValue::U32(read::read_u32(reader)?),
            5 => GgufValue::I32(read::read_u32(reader)? as i32),
            6 => GgufValue::F32(read::read_f32(reader)?),
            7 => GgufValue::Bool(read::read_u8(reader)? != 0),
            8 => GgufValue::String(read::read_string(reader)?),
            9 => {
                let elem_type = read::read_u32(reader)?;
                let count = read::read_u64(reader)? as usize;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(GgufValue::parse(reader, elem_type)?);
                }
                GgufValue::Array(values)
            }
            10 => GgufValue::U64(read::read_u64(reader)?),
            11 => GgufValue::I64(read::read_u64(reader)? as i64),
            12 => GgufValue::F64(read::read_f64(reader)?),
            other => return Err(ModelError::UnsupportedGgufType(other)),
        })
    }
}

/// The metadata key-value table of a GGUF file.
#[derive(Default)]
pub struct GgufMetadata {
    pub entries: HashMap<String, GgufValue>,
}

impl GgufMetadata {
    /// Insert or replace an entry. Mostly useful for building tables in
    /// memory instead of parsing them from a file.
    pub fn insert(&mut self, key: &str, value: GgufValue) {
        self.entries.insert(key.to_string(), value);
    }

    /// Remove an entry by key.
    pub fn remove(&mut self, key: &str) -> Option<GgufValue> {
        self.entries.remove(key)
    }

    /// Parse `n_kv` metadata entries: each is a GGUF string key, a u32
    /// value type ID, and the type-dependent payload.
    pub fn parse_kv(reader: &mut impl Read, n_kv: u64) -> Result<GgufMetadata> {
        let mut entries = HashMap::new();
        for _ in 0..n_kv {
            let key = read::read_string(reader)?;
            let type_id = read::read_u32(reader)?;
            entries.insert(key, GgufValue::parse(reader, type_id)?);
        }
        Ok(GgufMetadata { entries })
    }

    fn get(&self, key: &str) -> Result<&GgufValue> {
        self.entries
            .get(key)
            .ok_or_else(|| ModelError::MissingKey(key.to_string()))
    }

    fn mismatch(&self, key: &str, expected: &'static str, got: &GgufValue) -> ModelError {
        ModelError::TypeMismatch {
            key: key.to_string(),
            expected,
            got: got.type_name(),
        }
    }

    /// Retrieve a string value by key.
    pub fn get_string(&self, key: &str) -> Result<&str> {
        match self.get(key)? {
            GgufValue::String(s) => Ok(s.as_str()),
            other => Err(self.mismatch(key, "String", other)),
        }
    }

    /// Retrieve a u32 value by key.
    pub fn get_u32(&self, key: &str) -> Result<u32> {
        match self.get(key)? {
            GgufValue::U32(v) => Ok(*v),
            other => Err(self.mismatch(key, "U32", other)),
        }
    }

    /// Retrieve an f32 value by key.
    pub fn get_f32(&self, key: &str) -> Result<f32> {
        match self.get(key)? {
            GgufValue::F32(v) => Ok(*v),
            other => Err(self.mismatch(key, "F32", other)),
        }
    }

    /// Retrieve a string array by key.
    pub fn get_string_array(&self, key: &str) -> Result<Vec<String>> {
        match self.get(key)? {
            GgufValue::Array(arr) => arr
                .iter()
                .map(|v| match v {
                    GgufValue::String(s) => Ok(s.clone()),
                    other => Err(self.mismatch(key, "String", other)),
                })
                .collect(),
            other => Err(self.mismatch(key, "Array", other)),
        }
    }

    /// Retrieve an f32 array by key.
    pub fn get_f32_array(&self, key: &str) -> Result<Vec<f32>> {
        match self.get(key)? {
            GgufValue::Array(arr) => arr
                .iter()
                .map(|v| match v {
                    GgufValue::F32(f) => Ok(*f),
                    other => Err(self.mismatch(key, "F32", other)),
                })
                .collect(),
            other => Err(self.mismatch(key, "Array", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kv_bytes() -> Vec<u8> {
        // One u32 entry ("n" = 7) and one string-array entry ("v" = ["a","b"]).
        let mut buf = Vec::new();

        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(b"n");
        buf.extend_from_slice(&4u32.to_le_bytes()); // type: U32
        buf.extend_from_slice(&7u32.to_le_bytes());

        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(b"v");
        buf.extend_from_slice(&9u32.to_le_bytes()); // type: Array
        buf.extend_from_slice(&8u32.to_le_bytes()); // elem type: String
        buf.extend_from_slice(&2u64.to_le_bytes());
        for s in ["a", "b"] {
            buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }
        buf
    }

    #[test]
    fn parses_scalar_and_array() {
        let buf = kv_bytes();
        let md = GgufMetadata::parse_kv(&mut buf.as_slice(), 2).unwrap();
        assert_eq!(md.get_u32("n").unwrap(), 7);
        assert_eq!(md.get_string_array("v").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn missing_key() {
        let md = GgufMetadata {
            entries: HashMap::new(),
        };
        assert!(matches!(
            md.get_u32("absent"),
            Err(ModelError::MissingKey(_))
        ));
    }

    #[test]
    fn type_mismatch() {
        let buf = kv_bytes();
        let md = GgufMetadata::parse_kv(&mut buf.as_slice(), 2).unwrap();
        assert!(matches!(
            md.get_string("n"),
            Err(ModelError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn unknown_value_type() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(b"k");
        buf.extend_from_slice(&99u32.to_le_bytes());
        assert!(matches!(
            GgufMetadata::parse_kv(&mut buf.as_slice(), 1),
            Err(ModelError::UnsupportedGgufType(99))
        ));
    }
}

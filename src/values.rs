use crate::error::{Error, Result};
use crate::metadata::DataType;

/// A flat, row-major buffer of element values with a dynamic kind.
///
/// Payloads are carried in the widest member of their kind; validation and
/// narrowing to the dataset's [DataType] happen per element at the write
/// boundary, so an out-of-range value is rejected rather than wrapped.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValues {
    UInt(Vec<u64>),
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl ArrayValues {
    pub fn len(&self) -> usize {
        match self {
            ArrayValues::UInt(v) => v.len(),
            ArrayValues::Int(v) => v.len(),
            ArrayValues::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            ArrayValues::UInt(_) => "unsigned integer",
            ArrayValues::Int(_) => "signed integer",
            ArrayValues::Float(_) => "floating-point",
        }
    }

    /// Validate every element against `data_type` and encode the buffer as
    /// big-endian element bytes.
    ///
    /// Floating-point payloads cannot be written into integer datasets
    /// ([Error::TypeMismatch]); integer payloads may be written into float
    /// datasets. Values outside the representable range of `data_type` fail
    /// with [Error::ValueOverflow] before any byte is produced.
    pub fn encode_be(&self, data_type: DataType) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.len() * data_type.size_of());
        if data_type.is_float() {
            match self {
                ArrayValues::UInt(vals) => {
                    for &v in vals {
                        push_float(data_type, v as f64, &mut out);
                    }
                }
                ArrayValues::Int(vals) => {
                    for &v in vals {
                        push_float(data_type, v as f64, &mut out);
                    }
                }
                ArrayValues::Float(vals) => {
                    for &v in vals {
                        push_float(data_type, v, &mut out);
                    }
                }
            }
        } else {
            match self {
                ArrayValues::UInt(vals) => {
                    for &v in vals {
                        if v > data_type.int_max() {
                            return Err(overflow(v, data_type));
                        }
                        push_int(data_type, v, &mut out);
                    }
                }
                ArrayValues::Int(vals) => {
                    for &v in vals {
                        if v < data_type.int_min()
                            || (v >= 0 && v as u64 > data_type.int_max())
                        {
                            return Err(overflow(v, data_type));
                        }
                        // Two's complement truncation preserves range-checked
                        // signed values.
                        push_int(data_type, v as u64, &mut out);
                    }
                }
                ArrayValues::Float(_) => {
                    return Err(Error::TypeMismatch {
                        payload: self.kind_name(),
                        data_type,
                    });
                }
            }
        }
        Ok(out)
    }

    /// Decode big-endian element bytes into the widened kind of `data_type`.
    pub fn decode_be(data_type: DataType, bytes: &[u8]) -> Result<Self> {
        let width = data_type.size_of();
        if bytes.len() % width != 0 {
            return Err(Error::incompatible(format!(
                "payload of {} bytes is not a multiple of the {width}-byte element width",
                bytes.len()
            )));
        }
        let chunks = bytes.chunks_exact(width);
        let out = match data_type {
            DataType::UInt8 => ArrayValues::UInt(chunks.map(|c| c[0] as u64).collect()),
            DataType::UInt16 => ArrayValues::UInt(
                chunks
                    .map(|c| u16::from_be_bytes(c.try_into().unwrap()) as u64)
                    .collect(),
            ),
            DataType::UInt32 => ArrayValues::UInt(
                chunks
                    .map(|c| u32::from_be_bytes(c.try_into().unwrap()) as u64)
                    .collect(),
            ),
            DataType::UInt64 => ArrayValues::UInt(
                chunks
                    .map(|c| u64::from_be_bytes(c.try_into().unwrap()))
                    .collect(),
            ),
            DataType::Int8 => ArrayValues::Int(chunks.map(|c| c[0] as i8 as i64).collect()),
            DataType::Int16 => ArrayValues::Int(
                chunks
                    .map(|c| i16::from_be_bytes(c.try_into().unwrap()) as i64)
                    .collect(),
            ),
            DataType::Int32 => ArrayValues::Int(
                chunks
                    .map(|c| i32::from_be_bytes(c.try_into().unwrap()) as i64)
                    .collect(),
            ),
            DataType::Int64 => ArrayValues::Int(
                chunks
                    .map(|c| i64::from_be_bytes(c.try_into().unwrap()))
                    .collect(),
            ),
            DataType::Float32 => ArrayValues::Float(
                chunks
                    .map(|c| f32::from_be_bytes(c.try_into().unwrap()) as f64)
                    .collect(),
            ),
            DataType::Float64 => ArrayValues::Float(
                chunks
                    .map(|c| f64::from_be_bytes(c.try_into().unwrap()))
                    .collect(),
            ),
        };
        Ok(out)
    }
}

impl From<Vec<u64>> for ArrayValues {
    fn from(v: Vec<u64>) -> Self {
        Self::UInt(v)
    }
}

impl From<Vec<i64>> for ArrayValues {
    fn from(v: Vec<i64>) -> Self {
        Self::Int(v)
    }
}

impl From<Vec<f64>> for ArrayValues {
    fn from(v: Vec<f64>) -> Self {
        Self::Float(v)
    }
}

fn overflow(value: impl std::fmt::Display, data_type: DataType) -> Error {
    Error::ValueOverflow {
        value: value.to_string(),
        data_type,
    }
}

fn push_float(data_type: DataType, v: f64, out: &mut Vec<u8>) {
    match data_type {
        DataType::Float32 => out.extend_from_slice(&(v as f32).to_be_bytes()),
        DataType::Float64 => out.extend_from_slice(&v.to_be_bytes()),
        _ => unreachable!("push_float called with integer data type"),
    }
}

fn push_int(data_type: DataType, v: u64, out: &mut Vec<u8>) {
    match data_type.size_of() {
        1 => out.push(v as u8),
        2 => out.extend_from_slice(&(v as u16).to_be_bytes()),
        4 => out.extend_from_slice(&(v as u32).to_be_bytes()),
        8 => out.extend_from_slice(&v.to_be_bytes()),
        _ => unreachable!("element widths are 1, 2, 4 or 8"),
    }
}

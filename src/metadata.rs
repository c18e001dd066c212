use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// The attribute keys that mark a directory as a dataset.
///
/// They are structural metadata, not user data: once all four are present the
/// generic attribute surface hides them and rejects their mutation.
pub const RESERVED_KEYS: [&str; 4] = ["dimensions", "blockSize", "dataType", "compression"];

/// Target byte budget per chunk for the automatic chunk shape estimator.
const CHUNK_BYTE_TARGET: u64 = 1 << 20;

/// Element type of a dataset.
///
/// The ten numeric kinds N5 defines. The descriptor methods ([size_of](Self::size_of),
/// [is_float](Self::is_float), [is_signed](Self::is_signed), integer bounds) are the single
/// source of truth for all range and kind checking; there is no per-type
/// dataset wrapper anywhere in the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    pub const ALL: [DataType; 10] = [
        DataType::UInt8,
        DataType::UInt16,
        DataType::UInt32,
        DataType::UInt64,
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::Float32,
        DataType::Float64,
    ];

    /// Canonical name, as written to `dataType` metadata.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::UInt8 => "UINT8",
            DataType::UInt16 => "UINT16",
            DataType::UInt32 => "UINT32",
            DataType::UInt64 => "UINT64",
            DataType::Int8 => "INT8",
            DataType::Int16 => "INT16",
            DataType::Int32 => "INT32",
            DataType::Int64 => "INT64",
            DataType::Float32 => "FLOAT32",
            DataType::Float64 => "FLOAT64",
        }
    }

    /// Parse a `dataType` string, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|dt| dt.name().eq_ignore_ascii_case(s))
    }

    /// Width of one element in bytes.
    pub fn size_of(&self) -> usize {
        match self {
            DataType::UInt8 | DataType::Int8 => 1,
            DataType::UInt16 | DataType::Int16 => 2,
            DataType::UInt32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::UInt64 | DataType::Int64 | DataType::Float64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::Float32
                | DataType::Float64
        )
    }

    /// Inclusive maximum of an integer kind, as u64. Meaningless for floats.
    pub(crate) fn int_max(&self) -> u64 {
        match self {
            DataType::UInt8 => u8::MAX as u64,
            DataType::UInt16 => u16::MAX as u64,
            DataType::UInt32 => u32::MAX as u64,
            DataType::UInt64 => u64::MAX,
            DataType::Int8 => i8::MAX as u64,
            DataType::Int16 => i16::MAX as u64,
            DataType::Int32 => i32::MAX as u64,
            DataType::Int64 => i64::MAX as u64,
            DataType::Float32 | DataType::Float64 => u64::MAX,
        }
    }

    /// Inclusive minimum of an integer kind, as i64. Meaningless for floats.
    pub(crate) fn int_min(&self) -> i64 {
        match self {
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64 => 0,
            DataType::Int8 => i8::MIN as i64,
            DataType::Int16 => i16::MIN as i64,
            DataType::Int32 => i32::MIN as i64,
            DataType::Int64 => i64::MIN,
            DataType::Float32 | DataType::Float64 => i64::MIN,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unrecognized data type {s:?}")))
    }
}

/// Chunk compression configuration.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Compression {
    /// Uncompressed.
    Raw,
    Bzip2 {
        /// Work factor block size. Default 9. Must be in the range 1..=9.
        #[serde(default = "default_bzip2_block_size")]
        block_size: u8,
    },
    Gzip {
        /// Default -1, meaning "implementation default" (usually 6).
        #[serde(default = "default_gzip_level")]
        level: i8,
    },
}

fn default_bzip2_block_size() -> u8 {
    9
}

fn default_gzip_level() -> i8 {
    -1
}

impl Default for Compression {
    fn default() -> Self {
        Self::Gzip {
            level: default_gzip_level(),
        }
    }
}

/// The reserved dataset metadata, exactly as stored in `attributes.json`.
///
/// `dimensions` and `block_size` are in the format's native axis order, the
/// reverse of the logical row-major order the dataset API exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetMetadata {
    pub dimensions: Vec<u64>,
    pub block_size: Vec<u64>,
    pub data_type: DataType,
    pub compression: Compression,
}

impl DatasetMetadata {
    /// Build metadata from logical (row-major) shape and chunk shape.
    pub fn new_logical(
        shape: &[u64],
        chunk_shape: &[u64],
        data_type: DataType,
        compression: Compression,
    ) -> Result<Self> {
        let meta = Self {
            dimensions: shape.iter().rev().copied().collect(),
            block_size: chunk_shape.iter().rev().copied().collect(),
            data_type,
            compression,
        };
        meta.validate()?;
        Ok(meta)
    }

    /// Dataset shape in logical row-major order.
    pub fn shape(&self) -> Vec<u64> {
        self.dimensions.iter().rev().copied().collect()
    }

    /// Chunk shape in logical row-major order.
    pub fn chunk_shape(&self) -> Vec<u64> {
        self.block_size.iter().rev().copied().collect()
    }

    pub fn ndim(&self) -> usize {
        self.dimensions.len()
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimensions.is_empty() {
            return Err(Error::incompatible("dataset must have at least one axis"));
        }
        if self.dimensions.len() != self.block_size.len() {
            return Err(Error::incompatible(format!(
                "dimensions have {} axes but blockSize has {}",
                self.dimensions.len(),
                self.block_size.len()
            )));
        }
        if self.block_size.iter().any(|&b| b == 0) {
            return Err(Error::incompatible("blockSize axes must be non-zero"));
        }
        // Chunk file headers store per-axis extents as u32.
        if self.block_size.iter().any(|&b| b > u32::MAX as u64) {
            return Err(Error::incompatible("blockSize axes must fit in u32"));
        }
        Ok(())
    }
}

/// Propose a chunk shape for `shape` (logical order) approximating
/// [CHUNK_BYTE_TARGET] bytes per chunk.
///
/// Starts from the whole shape and repeatedly halves the largest axis until
/// the chunk fits the budget, so small datasets stay single-chunk and large
/// ones get roughly cubical chunks clipped to the dataset extent.
pub fn estimate_chunk_shape(shape: &[u64], data_type: DataType) -> Vec<u64> {
    let mut chunk: Vec<u64> = shape.iter().map(|&s| s.max(1)).collect();
    let elem = data_type.size_of() as u64;
    loop {
        let bytes = chunk.iter().product::<u64>().saturating_mul(elem);
        if bytes <= CHUNK_BYTE_TARGET {
            return chunk;
        }
        let largest = chunk
            .iter()
            .enumerate()
            .max_by_key(|&(_, &c)| c)
            .map(|(i, _)| i)
            .unwrap_or(0);
        if chunk[largest] <= 1 {
            return chunk;
        }
        chunk[largest] = chunk[largest].div_ceil(2);
    }
}

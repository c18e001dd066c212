use crate::error::{Error, Result};

/// Header of an N5 chunk file: a mode discriminator, the dimensionality and
/// the per-axis extent of the stored block, all big-endian.
///
/// The extents are in the format's native axis order and may be smaller than
/// the dataset's block size for chunks at the upper dataset boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkHeader {
    pub(crate) mode: ChunkMode,
    pub(crate) shape: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub(crate) enum ChunkMode {
    Default = 0,
    VarLen { num_el: u32 } = 1,
    Object = 2,
}

impl ChunkHeader {
    pub(crate) fn new_default(shape: Vec<u32>) -> Self {
        Self {
            mode: ChunkMode::Default,
            shape,
        }
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut offset = 0usize;
        let mut read_u16 = |bytes: &[u8]| -> Result<u16> {
            let end = offset + size_of::<u16>();
            let out = bytes
                .get(offset..end)
                .map(|b| u16::from_be_bytes(b.try_into().unwrap()))
                .ok_or_else(|| truncated(bytes.len()))?;
            offset = end;
            Ok(out)
        };
        let mode_num = read_u16(bytes)?;
        let ndim = read_u16(bytes)?;

        let mut read_u32 = |bytes: &[u8]| -> Result<u32> {
            let end = offset + size_of::<u32>();
            let out = bytes
                .get(offset..end)
                .map(|b| u32::from_be_bytes(b.try_into().unwrap()))
                .ok_or_else(|| truncated(bytes.len()))?;
            offset = end;
            Ok(out)
        };
        let mut shape = Vec::with_capacity(ndim as usize);
        for _ in 0..ndim {
            shape.push(read_u32(bytes)?);
        }

        let mode = match mode_num {
            0 => ChunkMode::Default,
            1 => ChunkMode::VarLen {
                num_el: read_u32(bytes)?,
            },
            2 => ChunkMode::Object,
            n => {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid N5 chunk mode {n}"),
                )));
            }
        };
        Ok(Self { mode, shape })
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data_offset());
        let mode_num: u16 = match self.mode {
            ChunkMode::Default => 0,
            ChunkMode::VarLen { .. } => 1,
            ChunkMode::Object => 2,
        };
        out.extend_from_slice(&mode_num.to_be_bytes());
        out.extend_from_slice(&(self.shape.len() as u16).to_be_bytes());
        for &dim in &self.shape {
            out.extend_from_slice(&dim.to_be_bytes());
        }
        if let ChunkMode::VarLen { num_el } = self.mode {
            out.extend_from_slice(&num_el.to_be_bytes());
        }
        out
    }

    /// Byte offset of the compressed payload within the chunk file.
    pub(crate) fn data_offset(&self) -> usize {
        size_of::<u16>() // mode discriminator
            + size_of::<u16>() // ndim
            + self.shape.len() * size_of::<u32>()
            + match self.mode {
                ChunkMode::VarLen { .. } => size_of::<u32>(),
                _ => 0,
            }
    }

    pub(crate) fn shape_u64(&self) -> Vec<u64> {
        self.shape.iter().map(|&s| s as u64).collect()
    }
}

fn truncated(len: usize) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        format!("chunk file header truncated at {len} bytes"),
    ))
}

//! Block storage: the collaborator that persists individual chunks.
//!
//! The read/write engine only relies on the [BlockStore] contract; the
//! filesystem implementation below owns the N5 chunk file format (header +
//! codec-compressed big-endian payload, one file per non-empty chunk).

use std::io::Read;
use std::path::PathBuf;

use bytes::Bytes;

use crate::chunk::{ChunkHeader, ChunkMode};
use crate::error::{Error, Result};
use crate::metadata::{Compression, DatasetMetadata};
use crate::subset::copy_region;

/// Reads and writes rectangular blocks of element bytes by chunk coordinate.
///
/// Positions and shapes are in logical row-major order; payloads are
/// big-endian element bytes in row-major order over the block shape. A chunk
/// that was never written reads as `None` and is defined to be all zero.
pub trait BlockStore: Send + Sync {
    fn read_block(&self, grid_position: &[u64], block_shape: &[u64]) -> Result<Option<Vec<u8>>>;

    fn write_block(&self, grid_position: &[u64], block_shape: &[u64], payload: &[u8]) -> Result<()>;
}

/// [BlockStore] over a dataset directory, one nested-path file per chunk.
///
/// Chunk file paths and header extents use the format's native axis order,
/// the reverse of the logical order of the [BlockStore] contract, so logical
/// chunk `(i, j, k)` lives at `<dataset>/k/j/i`. Payload bytes are stored in
/// row-major order unchanged.
pub struct FilesystemBlockStore {
    dataset_path: PathBuf,
    elem_size: usize,
    compression: Compression,
}

impl FilesystemBlockStore {
    pub fn new(dataset_path: PathBuf, metadata: &DatasetMetadata) -> Self {
        Self {
            dataset_path,
            elem_size: metadata.data_type.size_of(),
            compression: metadata.compression,
        }
    }

    fn chunk_path(&self, grid_position: &[u64]) -> PathBuf {
        let mut path = self.dataset_path.clone();
        for coord in grid_position.iter().rev() {
            path.push(coord.to_string());
        }
        path
    }
}

impl BlockStore for FilesystemBlockStore {
    fn read_block(&self, grid_position: &[u64], block_shape: &[u64]) -> Result<Option<Vec<u8>>> {
        let path = self.chunk_path(grid_position);
        let raw = match std::fs::read(&path) {
            Ok(bytes) => Bytes::from_owner(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let header = ChunkHeader::from_bytes(&raw)?;
        if !matches!(header.mode, ChunkMode::Default) {
            return Err(Error::UnsupportedOperation(
                "only default-mode chunk files are supported",
            ));
        }
        if header.shape.len() != block_shape.len() {
            return Err(invalid_chunk(
                &path,
                format!(
                    "chunk has {} axes, dataset has {}",
                    header.shape.len(),
                    block_shape.len()
                ),
            ));
        }

        let payload = decompress(self.compression, &raw[header.data_offset()..])?;
        // Header extents are native order; flip back to logical.
        let mut stored_shape = header.shape_u64();
        stored_shape.reverse();
        let expected = stored_shape.iter().product::<u64>() as usize * self.elem_size;
        if payload.len() != expected {
            return Err(invalid_chunk(
                &path,
                format!("payload is {} bytes, expected {expected}", payload.len()),
            ));
        }

        if stored_shape == block_shape {
            return Ok(Some(payload));
        }

        // Another writer may have stored this block with a different extent
        // (e.g. an untruncated boundary chunk). Re-window it onto the
        // requested shape, zero-filling anything not stored.
        let mut out =
            vec![0u8; block_shape.iter().product::<u64>() as usize * self.elem_size];
        let common: Vec<u64> = stored_shape
            .iter()
            .zip(block_shape)
            .map(|(&a, &b)| a.min(b))
            .collect();
        let zeros = vec![0u64; block_shape.len()];
        copy_region(
            &payload,
            &stored_shape,
            &zeros,
            &mut out,
            block_shape,
            &zeros,
            &common,
            self.elem_size,
        );
        Ok(Some(out))
    }

    fn write_block(&self, grid_position: &[u64], block_shape: &[u64], payload: &[u8]) -> Result<()> {
        let expected = block_shape.iter().product::<u64>() as usize * self.elem_size;
        if payload.len() != expected {
            return Err(Error::incompatible(format!(
                "block payload is {} bytes, shape {block_shape:?} requires {expected}",
                payload.len()
            )));
        }

        let path = self.chunk_path(grid_position);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let header =
            ChunkHeader::new_default(block_shape.iter().rev().map(|&s| s as u32).collect());
        let mut file = header.to_bytes();
        file.extend_from_slice(&compress(self.compression, payload)?);
        std::fs::write(&path, file)?;
        Ok(())
    }
}

fn compress(compression: Compression, payload: &[u8]) -> Result<Vec<u8>> {
    use std::io::Write;
    match compression {
        Compression::Raw => Ok(payload.to_vec()),
        Compression::Gzip { level } => {
            let level = if level < 0 {
                flate2::Compression::default()
            } else {
                flate2::Compression::new(level as u32)
            };
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), level);
            encoder.write_all(payload)?;
            Ok(encoder.finish()?)
        }
        Compression::Bzip2 { block_size } => {
            let mut encoder = bzip2::write::BzEncoder::new(
                Vec::new(),
                bzip2::Compression::new(block_size.clamp(1, 9) as u32),
            );
            encoder.write_all(payload)?;
            Ok(encoder.finish()?)
        }
    }
}

fn decompress(compression: Compression, bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    match compression {
        Compression::Raw => out.extend_from_slice(bytes),
        Compression::Gzip { .. } => {
            flate2::read::GzDecoder::new(bytes).read_to_end(&mut out)?;
        }
        Compression::Bzip2 { .. } => {
            bzip2::read::BzDecoder::new(bytes).read_to_end(&mut out)?;
        }
    }
    Ok(out)
}

fn invalid_chunk(path: &std::path::Path, reason: String) -> Error {
    Error::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("corrupt chunk file {}: {reason}", path.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::DataType;

    fn store(dir: &std::path::Path, compression: Compression) -> FilesystemBlockStore {
        let metadata = DatasetMetadata::new_logical(
            &[10, 10],
            &[4, 4],
            DataType::UInt16,
            compression,
        )
        .unwrap();
        FilesystemBlockStore::new(dir.to_path_buf(), &metadata)
    }

    #[test]
    fn absent_chunks_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), Compression::Raw);
        assert!(store.read_block(&[0, 0], &[4, 4]).unwrap().is_none());
    }

    #[test]
    fn round_trips_each_codec() {
        for compression in [
            Compression::Raw,
            Compression::Gzip { level: -1 },
            Compression::Gzip { level: 2 },
            Compression::Bzip2 { block_size: 9 },
        ] {
            let dir = tempfile::tempdir().unwrap();
            let store = store(dir.path(), compression);
            let payload: Vec<u8> = (0..32).collect();
            store.write_block(&[1, 2], &[4, 4], &payload).unwrap();
            assert_eq!(
                store.read_block(&[1, 2], &[4, 4]).unwrap(),
                Some(payload),
                "{compression:?}"
            );
            assert!(dir.path().join("2").join("1").is_file());
        }
    }

    #[test]
    fn paths_and_headers_are_native_order_payload_is_not() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), Compression::Raw);
        let payload: Vec<u8> = (0..16).collect();
        store.write_block(&[3, 1], &[2, 4], &payload).unwrap();

        // Logical position (3, 1) maps to path 1/3; the header carries the
        // reversed extents while the payload bytes stay row-major.
        let raw = std::fs::read(dir.path().join("1").join("3")).unwrap();
        assert_eq!(&raw[..12], &[0, 0, 0, 2, 0, 0, 0, 4, 0, 0, 0, 2]);
        assert_eq!(&raw[12..], &payload[..]);
        assert_eq!(store.read_block(&[3, 1], &[2, 4]).unwrap(), Some(payload));
    }

    #[test]
    fn rewindows_blocks_with_differing_stored_shape() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), Compression::Raw);
        // A 2x2 truncated block; reading it back as 4x4 zero-pads.
        let payload: Vec<u8> = vec![0, 1, 0, 2, 0, 3, 0, 4];
        store.write_block(&[0, 0], &[2, 2], &payload).unwrap();
        let out = store.read_block(&[0, 0], &[4, 4]).unwrap().unwrap();
        assert_eq!(out.len(), 32);
        assert_eq!(&out[..4], &[0, 1, 0, 2]);
        assert_eq!(&out[4..8], &[0, 0, 0, 0]);
        assert_eq!(&out[8..12], &[0, 3, 0, 4]);
    }

    #[test]
    fn payload_length_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), Compression::Raw);
        assert!(store.write_block(&[0, 0], &[4, 4], &[0u8; 3]).is_err());
    }
}

//! The bounded read/write engine: decomposes whole-box requests into
//! per-chunk block operations and reconciles partial overlaps.
//!
//! Everything here works in logical row-major coordinates; the block store
//! owns the on-disk axis convention.

use itertools::izip;
use rayon::prelude::*;

use crate::block::BlockStore;
use crate::error::Result;
use crate::subset::{BoundingBox, ChunkOverlap, chunks_overlapping, copy_region, extract_region};

pub(crate) struct ReadWriteEngine<'a> {
    store: &'a dyn BlockStore,
    /// Dataset shape, logical row-major order.
    dimensions: &'a [u64],
    /// Chunk shape, logical row-major order.
    block_size: &'a [u64],
    elem_size: usize,
    /// Fan-out pool for independent per-chunk work; `None` runs everything
    /// sequentially in the issuing thread.
    pool: Option<&'a rayon::ThreadPool>,
}

impl<'a> ReadWriteEngine<'a> {
    pub(crate) fn new(
        store: &'a dyn BlockStore,
        dimensions: &'a [u64],
        block_size: &'a [u64],
        elem_size: usize,
        pool: Option<&'a rayon::ThreadPool>,
    ) -> Self {
        Self {
            store,
            dimensions,
            block_size,
            elem_size,
            pool,
        }
    }

    /// Extent of the block actually stored for `chunk`: the chunk shape,
    /// clipped to the dataset shape at the upper boundary.
    fn effective_block_shape(&self, chunk: &[i64]) -> Vec<u64> {
        izip!(chunk, self.block_size, self.dimensions)
            .map(|(&c, &bs, &dim)| bs.min(dim.saturating_sub(c as u64 * bs)))
            .collect()
    }

    fn grid_position(chunk: &[i64]) -> Vec<u64> {
        debug_assert!(chunk.iter().all(|&c| c >= 0));
        chunk.iter().map(|&c| c as u64).collect()
    }

    /// Read `region` into a freshly allocated row-major element buffer.
    ///
    /// Chunks that were never written contribute zeros.
    pub(crate) fn read(&self, region: &BoundingBox) -> Result<Vec<u8>> {
        debug_assert!(region.inbounds(self.dimensions));
        let overlaps = chunks_overlapping(region, self.block_size)?;
        let mut out = vec![0u8; region.num_elements() as usize * self.elem_size];

        let blocks: Vec<Option<Vec<u8>>> = match self.pool {
            Some(pool) if overlaps.len() > 1 => pool.install(|| {
                overlaps
                    .par_iter()
                    .map(|o| self.fetch_block(o))
                    .collect::<Result<_>>()
            })?,
            _ => overlaps
                .iter()
                .map(|o| self.fetch_block(o))
                .collect::<Result<_>>()?,
        };

        for (overlap, block) in izip!(&overlaps, blocks) {
            let Some(block) = block else {
                continue;
            };
            let block_shape = self.effective_block_shape(&overlap.chunk);
            copy_region(
                &block,
                &block_shape,
                &overlap.in_chunk.start_u64(),
                &mut out,
                region.shape(),
                &overlap.in_request.start_u64(),
                overlap.in_chunk.shape(),
                self.elem_size,
            );
        }
        Ok(out)
    }

    fn fetch_block(&self, overlap: &ChunkOverlap) -> Result<Option<Vec<u8>>> {
        let block_shape = self.effective_block_shape(&overlap.chunk);
        self.store
            .read_block(&Self::grid_position(&overlap.chunk), &block_shape)
    }

    /// Write `data` (a row-major element buffer of `region`'s extent) over
    /// `region`.
    ///
    /// Chunks fully covered by the region are overwritten wholesale; chunks
    /// only partially covered are read, spliced and written back. There is
    /// no atomicity across chunks: a failure partway leaves already-written
    /// chunks in their new state.
    pub(crate) fn write(&self, region: &BoundingBox, data: &[u8]) -> Result<()> {
        debug_assert!(region.inbounds(self.dimensions));
        debug_assert_eq!(
            data.len(),
            region.num_elements() as usize * self.elem_size
        );
        let overlaps = chunks_overlapping(region, self.block_size)?;

        match self.pool {
            Some(pool) if overlaps.len() > 1 => pool.install(|| {
                overlaps
                    .par_iter()
                    .try_for_each(|o| self.write_chunk(region, data, o))
            }),
            _ => overlaps
                .iter()
                .try_for_each(|o| self.write_chunk(region, data, o)),
        }
    }

    fn write_chunk(&self, region: &BoundingBox, data: &[u8], overlap: &ChunkOverlap) -> Result<()> {
        let block_shape = self.effective_block_shape(&overlap.chunk);
        let grid_position = Self::grid_position(&overlap.chunk);

        let fully_covered = overlap.in_chunk.start().iter().all(|&s| s == 0)
            && overlap.in_chunk.shape() == block_shape;

        let payload = if fully_covered {
            // Write-only fast path: no existing data can survive, so nothing
            // is read.
            extract_region(data, region.shape(), &overlap.in_request, self.elem_size)
        } else {
            // Read-modify-write: splice the covered region into whatever the
            // chunk already holds.
            let mut existing = self
                .store
                .read_block(&grid_position, &block_shape)?
                .unwrap_or_else(|| {
                    vec![0u8; block_shape.iter().product::<u64>() as usize * self.elem_size]
                });
            copy_region(
                data,
                region.shape(),
                &overlap.in_request.start_u64(),
                &mut existing,
                &block_shape,
                &overlap.in_chunk.start_u64(),
                overlap.in_request.shape(),
                self.elem_size,
            );
            existing
        };

        self.store.write_block(&grid_position, &block_shape, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory block store tracking how many reads the engine issues.
    struct MemoryStore {
        blocks: Mutex<HashMap<Vec<u64>, Vec<u8>>>,
        reads: AtomicUsize,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                blocks: Mutex::new(HashMap::new()),
                reads: AtomicUsize::new(0),
            }
        }
    }

    impl BlockStore for MemoryStore {
        fn read_block(&self, grid_position: &[u64], _shape: &[u64]) -> Result<Option<Vec<u8>>> {
            self.reads.fetch_add(1, Ordering::Relaxed);
            Ok(self.blocks.lock().unwrap().get(grid_position).cloned())
        }

        fn write_block(&self, grid_position: &[u64], _shape: &[u64], payload: &[u8]) -> Result<()> {
            self.blocks
                .lock()
                .unwrap()
                .insert(grid_position.to_vec(), payload.to_vec());
            Ok(())
        }
    }

    fn region(start: &[i64], shape: &[u64]) -> BoundingBox {
        BoundingBox::new(start.to_vec(), shape.to_vec()).unwrap()
    }

    #[test]
    fn round_trip_unaligned() {
        let store = MemoryStore::new();
        let dims = [10u64, 10];
        let blocks = [4u64, 4];
        let engine = ReadWriteEngine::new(&store, &dims, &blocks, 1, None);

        let r = region(&[1, 3], &[6, 5]);
        let data: Vec<u8> = (0..30).collect();
        engine.write(&r, &data).unwrap();
        assert_eq!(engine.read(&r).unwrap(), data);
    }

    #[test]
    fn unwritten_chunks_read_zero() {
        let store = MemoryStore::new();
        let dims = [10u64, 10];
        let blocks = [4u64, 4];
        let engine = ReadWriteEngine::new(&store, &dims, &blocks, 1, None);
        assert_eq!(
            engine.read(&region(&[2, 2], &[3, 3])).unwrap(),
            vec![0u8; 9]
        );
    }

    #[test]
    fn partial_write_preserves_existing_data() {
        let store = MemoryStore::new();
        let dims = [8u64];
        let blocks = [4u64];
        let engine = ReadWriteEngine::new(&store, &dims, &blocks, 1, None);

        engine.write(&region(&[0], &[8]), &[1u8; 8]).unwrap();
        engine.write(&region(&[3], &[2]), &[9u8, 9]).unwrap();
        assert_eq!(
            engine.read(&region(&[0], &[8])).unwrap(),
            vec![1, 1, 1, 9, 9, 1, 1, 1]
        );
    }

    #[test]
    fn aligned_write_never_reads() {
        let store = MemoryStore::new();
        let dims = [8u64, 8];
        let blocks = [2u64, 2];
        let engine = ReadWriteEngine::new(&store, &dims, &blocks, 1, None);

        // Pre-populate so a mistaken read-modify-write would be visible.
        engine.write(&region(&[0, 0], &[8, 8]), &[7u8; 64]).unwrap();
        store.reads.store(0, Ordering::Relaxed);

        // Exactly chunk-aligned: eligible for the full-overwrite fast path.
        engine.write(&region(&[2, 4], &[4, 2]), &[1u8; 8]).unwrap();
        assert_eq!(store.reads.load(Ordering::Relaxed), 0);

        // Boundary chunks clipped by the dataset shape count as aligned too.
        let store = MemoryStore::new();
        let dims = [5u64];
        let engine = ReadWriteEngine::new(&store, &dims, &[4u64], 1, None);
        engine.write(&region(&[4], &[1]), &[3u8]).unwrap();
        assert_eq!(store.reads.load(Ordering::Relaxed), 0);
        assert_eq!(engine.read(&region(&[4], &[1])).unwrap(), vec![3]);
    }

    #[test]
    fn partial_write_reads_before_writing() {
        let store = MemoryStore::new();
        let dims = [8u64];
        let engine = ReadWriteEngine::new(&store, &dims, &[4u64], 1, None);
        engine.write(&region(&[1], &[2]), &[5u8, 5]).unwrap();
        assert_eq!(store.reads.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn fan_out_matches_sequential() {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .build()
            .unwrap();
        let dims = [9u64, 9, 9];
        let blocks = [2u64, 2, 2];
        let data: Vec<u8> = (0..9 * 9 * 9).map(|i| (i % 251) as u8).collect();
        let r = region(&[0, 0, 0], &[9, 9, 9]);
        let sub = region(&[1, 2, 3], &[5, 4, 3]);

        let sequential = MemoryStore::new();
        let engine = ReadWriteEngine::new(&sequential, &dims, &blocks, 1, None);
        engine.write(&r, &data).unwrap();
        let expect_all = engine.read(&r).unwrap();
        let expect_sub = engine.read(&sub).unwrap();

        let parallel = MemoryStore::new();
        let engine = ReadWriteEngine::new(&parallel, &dims, &blocks, 1, Some(&pool));
        engine.write(&r, &data).unwrap();
        assert_eq!(engine.read(&r).unwrap(), expect_all);
        assert_eq!(engine.read(&sub).unwrap(), expect_sub);
    }
}

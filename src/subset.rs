//! Bounding boxes and chunk addressing.
//!
//! All arithmetic here is pure and holds for negative-origin and
//! out-of-bounds boxes; clamping a request to a dataset's shape is the
//! caller's job.

use itertools::izip;

use crate::error::{Error, Result};

/// A rectangular region of an n-dimensional array: an origin and an extent
/// per axis.
///
/// The origin is signed so that the addressing arithmetic below is defined
/// for boxes outside an array's domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundingBox {
    start: Vec<i64>,
    shape: Vec<u64>,
}

impl BoundingBox {
    pub fn new(start: Vec<i64>, shape: Vec<u64>) -> Result<Self> {
        if start.len() != shape.len() {
            return Err(Error::incompatible(format!(
                "origin has {} axes but extent has {}",
                start.len(),
                shape.len()
            )));
        }
        Ok(Self { start, shape })
    }

    /// A box of `shape` anchored at the origin.
    pub fn with_shape(shape: Vec<u64>) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape,
        }
    }

    pub fn start(&self) -> &[i64] {
        &self.start
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.start.len()
    }

    /// Exclusive end per axis.
    pub fn end_exc(&self) -> Vec<i64> {
        izip!(&self.start, &self.shape)
            .map(|(&s, &n)| s + n as i64)
            .collect()
    }

    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|&n| n == 0)
    }

    /// The intersection with `other`; empty (zero extent on some axis) when
    /// they do not overlap.
    pub fn overlap(&self, other: &Self) -> Result<Self> {
        if other.ndim() != self.ndim() {
            return Err(Error::incompatible(format!(
                "cannot intersect boxes of {} and {} axes",
                self.ndim(),
                other.ndim()
            )));
        }
        let (start, shape) = izip!(&self.start, &self.shape, &other.start, &other.shape)
            .map(|(&a_start, &a_shape, &b_start, &b_shape)| {
                let lo = a_start.max(b_start);
                let hi = (a_start + a_shape as i64).min(b_start + b_shape as i64);
                (lo, hi.saturating_sub(lo).max(0) as u64)
            })
            .unzip();
        Ok(Self { start, shape })
    }

    /// The same box expressed relative to `offset`.
    pub fn relative_to(&self, offset: &[i64]) -> Result<Self> {
        if offset.len() != self.ndim() {
            return Err(Error::incompatible(format!(
                "offset has {} axes, box has {}",
                offset.len(),
                self.ndim()
            )));
        }
        let start = izip!(&self.start, offset).map(|(&s, &o)| s - o).collect();
        Ok(Self {
            start,
            shape: self.shape.clone(),
        })
    }

    /// Whether this box lies entirely within `[0, array_shape)`.
    pub fn inbounds(&self, array_shape: &[u64]) -> bool {
        self.ndim() == array_shape.len()
            && izip!(&self.start, &self.shape, array_shape)
                .all(|(&s, &n, &dim)| s >= 0 && s as u64 + n <= dim)
    }

    /// The origin as unsigned indices. Callers must have established that the
    /// box is in bounds.
    pub(crate) fn start_u64(&self) -> Vec<u64> {
        debug_assert!(self.start.iter().all(|&s| s >= 0));
        self.start.iter().map(|&s| s as u64).collect()
    }

}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ranges: Vec<String> = izip!(&self.start, &self.shape)
            .map(|(&s, &n)| format!("{}..{}", s, s + n as i64))
            .collect();
        write!(f, "[{}]", ranges.join(", "))
    }
}

/// One chunk's contribution to a bounding-box request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOverlap {
    /// Position of the chunk in chunk-grid space.
    pub chunk: Vec<i64>,
    /// The intersected region, relative to the chunk's origin.
    pub in_chunk: BoundingBox,
    /// The intersected region, relative to the request's origin.
    pub in_request: BoundingBox,
}

/// The inclusive range of chunk coordinates intersecting `region`, or `None`
/// when the region is empty.
pub fn chunk_range(region: &BoundingBox, chunk_shape: &[u64]) -> Result<Option<(Vec<i64>, Vec<i64>)>> {
    if chunk_shape.len() != region.ndim() {
        return Err(Error::incompatible(format!(
            "chunk shape has {} axes, region has {}",
            chunk_shape.len(),
            region.ndim()
        )));
    }
    if region.is_empty() {
        return Ok(None);
    }
    let first = izip!(region.start(), chunk_shape)
        .map(|(&s, &c)| s.div_euclid(c as i64))
        .collect();
    let last = izip!(region.end_exc(), chunk_shape)
        .map(|(e, &c)| (e - 1).div_euclid(c as i64))
        .collect();
    Ok(Some((first, last)))
}

/// Decompose `region` into per-chunk intersections.
///
/// Every returned overlap is non-empty; `in_chunk` and `in_request` have
/// non-negative origins by construction.
pub fn chunks_overlapping(region: &BoundingBox, chunk_shape: &[u64]) -> Result<Vec<ChunkOverlap>> {
    let Some((first, last)) = chunk_range(region, chunk_shape)? else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    let mut chunk = first.clone();
    loop {
        let chunk_origin: Vec<i64> = izip!(&chunk, chunk_shape)
            .map(|(&c, &cs)| c * cs as i64)
            .collect();
        let chunk_region = BoundingBox::new(chunk_origin.clone(), chunk_shape.to_vec())?;
        let intersection = region.overlap(&chunk_region)?;
        debug_assert!(!intersection.is_empty());
        out.push(ChunkOverlap {
            chunk: chunk.clone(),
            in_chunk: intersection.relative_to(&chunk_origin)?,
            in_request: intersection.relative_to(region.start())?,
        });

        // Odometer over the inclusive chunk coordinate ranges.
        let mut axis = chunk.len();
        loop {
            if axis == 0 {
                return Ok(out);
            }
            axis -= 1;
            if chunk[axis] < last[axis] {
                chunk[axis] += 1;
                break;
            }
            chunk[axis] = first[axis];
        }
    }
}

fn linear_index(shape: &[u64], index: &[u64]) -> usize {
    let mut out = 0usize;
    for (&dim, &i) in izip!(shape, index) {
        debug_assert!(i < dim);
        out = out * dim as usize + i as usize;
    }
    out
}

/// Copy a rectangular region between two flat row-major element buffers.
///
/// `region_shape` elements starting at `src_start` in `src` land at
/// `dst_start` in `dst`. Runs along the innermost axis are copied
/// contiguously.
pub(crate) fn copy_region(
    src: &[u8],
    src_shape: &[u64],
    src_start: &[u64],
    dst: &mut [u8],
    dst_shape: &[u64],
    dst_start: &[u64],
    region_shape: &[u64],
    elem_size: usize,
) {
    let ndim = region_shape.len();
    debug_assert_eq!(src_shape.len(), ndim);
    debug_assert_eq!(dst_shape.len(), ndim);
    if region_shape.iter().any(|&n| n == 0) {
        return;
    }
    let run = *region_shape.last().unwrap() as usize * elem_size;
    let rows: u64 = region_shape[..ndim - 1].iter().product();

    let mut row_index = vec![0u64; ndim];
    for _ in 0..rows.max(1) {
        let src_index: Vec<u64> = izip!(src_start, &row_index).map(|(&s, &i)| s + i).collect();
        let dst_index: Vec<u64> = izip!(dst_start, &row_index).map(|(&s, &i)| s + i).collect();
        let src_off = linear_index(src_shape, &src_index) * elem_size;
        let dst_off = linear_index(dst_shape, &dst_index) * elem_size;
        dst[dst_off..dst_off + run].copy_from_slice(&src[src_off..src_off + run]);

        // Advance all axes but the innermost.
        let mut axis = ndim.saturating_sub(1);
        while axis > 0 {
            axis -= 1;
            row_index[axis] += 1;
            if row_index[axis] < region_shape[axis] {
                break;
            }
            row_index[axis] = 0;
        }
    }
}

/// Extract a rectangular region of a flat row-major buffer into a new buffer.
pub(crate) fn extract_region(
    src: &[u8],
    src_shape: &[u64],
    region: &BoundingBox,
    elem_size: usize,
) -> Vec<u8> {
    let mut out = vec![0u8; region.num_elements() as usize * elem_size];
    copy_region(
        src,
        src_shape,
        &region.start_u64(),
        &mut out,
        region.shape(),
        &vec![0; region.ndim()],
        region.shape(),
        elem_size,
    );
    out
}

//! Groups, datasets and their directory-backed lifecycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use itertools::izip;

use crate::attributes::AttributeStore;
use crate::block::FilesystemBlockStore;
use crate::engine::ReadWriteEngine;
use crate::error::{Error, Result};
use crate::metadata::{
    Compression, DataType, DatasetMetadata, RESERVED_KEYS, estimate_chunk_shape,
};
use crate::subset::BoundingBox;
use crate::values::ArrayValues;

/// State shared by every handle into one open container.
pub(crate) struct ContainerContext {
    pub(crate) read_only: bool,
    /// Bounded pool for per-chunk fan-out within a single read or write
    /// call; `None` means strictly sequential execution.
    pub(crate) pool: Option<rayon::ThreadPool>,
}

/// How the chunk shape of a new dataset is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkPlan {
    /// One chunk spanning the whole dataset. Slow for anything but tiny
    /// arrays, so creation emits a performance advisory.
    WholeArray,
    /// Estimate a chunk shape targeting roughly 1 MiB per chunk.
    Auto,
    /// An explicit chunk shape, logical row-major order.
    Shape(Vec<u64>),
}

/// A named node of the hierarchy: exclusively a group or a dataset.
pub enum Node {
    Group(Group),
    Dataset(Dataset),
}

impl Node {
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Node::Group(g) => Some(g),
            Node::Dataset(_) => None,
        }
    }

    pub fn as_dataset(&self) -> Option<&Dataset> {
        match self {
            Node::Group(_) => None,
            Node::Dataset(d) => Some(d),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Node::Group(g) => g.path(),
            Node::Dataset(d) => d.path(),
        }
    }
}

/// A group: a directory that may hold child groups and datasets.
#[derive(Clone)]
pub struct Group {
    path: PathBuf,
    context: Arc<ContainerContext>,
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group").field("path", &self.path).finish()
    }
}

impl Group {
    pub(crate) fn new(path: PathBuf, context: Arc<ContainerContext>) -> Self {
        Self { path, context }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Basename of the group directory.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn attributes(&self) -> AttributeStore {
        AttributeStore::new(&self.path, self.context.read_only)
    }

    fn child_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains('/')
            || name.contains('\\')
        {
            return Err(Error::InvalidName(name.to_string()));
        }
        Ok(self.path.join(name))
    }

    /// Resolve an immediate child, classifying it from its on-disk
    /// attributes: all four reserved keys make a dataset, none make a group,
    /// and anything in between is broken metadata.
    pub fn child(&self, name: &str) -> Result<Node> {
        let path = self.child_path(name)?;
        if !path.exists() {
            return Err(Error::NotFound(path));
        }
        if !path.is_dir() {
            return Err(Error::NotADirectory(path));
        }
        let attrs = AttributeStore::new(&path, self.context.read_only);
        match attrs.reserved_key_count()? {
            0 => Ok(Node::Group(Group::new(path, self.context.clone()))),
            n if n == RESERVED_KEYS.len() => Ok(Node::Dataset(Dataset::open(
                path,
                self.context.clone(),
            )?)),
            n => Err(Error::InvalidDatasetMetadata {
                path,
                reason: format!(
                    "{n} of {} reserved metadata keys present",
                    RESERVED_KEYS.len()
                ),
            }),
        }
    }

    /// Immediate child basenames, in directory order.
    pub fn child_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn check_absent(&self, name: &str, path: &Path, creating: &'static str) -> Result<()> {
        match self.child(name) {
            Err(Error::NotFound(_)) => Ok(()),
            Ok(Node::Group(_)) => {
                if creating == "group" {
                    Err(Error::AlreadyExists(path.to_path_buf()))
                } else {
                    Err(Error::TypeConflict {
                        path: path.to_path_buf(),
                        found: "group",
                    })
                }
            }
            Ok(Node::Dataset(_)) => {
                if creating == "dataset" {
                    Err(Error::AlreadyExists(path.to_path_buf()))
                } else {
                    Err(Error::TypeConflict {
                        path: path.to_path_buf(),
                        found: "dataset",
                    })
                }
            }
            Err(e) => Err(e),
        }
    }

    pub fn create_group(&self, name: &str) -> Result<Group> {
        if self.context.read_only {
            return Err(Error::ReadOnly);
        }
        let path = self.child_path(name)?;
        self.check_absent(name, &path, "group")?;
        std::fs::create_dir(&path)?;
        // A group has no mandatory metadata; the attributes file appears
        // lazily on first write.
        Ok(Group::new(path, self.context.clone()))
    }

    /// Create a child dataset with a fixed shape, element type, chunk plan
    /// and compression (`None` means the format default, gzip).
    pub fn create_dataset(
        &self,
        name: &str,
        shape: &[u64],
        data_type: DataType,
        chunks: ChunkPlan,
        compression: Option<Compression>,
    ) -> Result<Dataset> {
        if self.context.read_only {
            return Err(Error::ReadOnly);
        }
        let path = self.child_path(name)?;
        self.check_absent(name, &path, "dataset")?;

        let chunk_shape = match chunks {
            ChunkPlan::Shape(chunk_shape) => chunk_shape,
            ChunkPlan::Auto => estimate_chunk_shape(shape, data_type),
            ChunkPlan::WholeArray => {
                log::warn!(
                    "dataset {} will be a single chunk; every access will \
                     serialize the entire array",
                    path.display()
                );
                shape.to_vec()
            }
        };
        let metadata = DatasetMetadata::new_logical(
            shape,
            &chunk_shape,
            data_type,
            compression.unwrap_or_default(),
        )?;

        std::fs::create_dir(&path)?;
        let serde_json::Value::Object(document) = serde_json::to_value(&metadata)? else {
            unreachable!("dataset metadata serializes to an object");
        };
        AttributeStore::new(&path, false).write_document(&document)?;
        Dataset::open(path, self.context.clone())
    }

    /// Recursively and irreversibly remove a child subtree.
    pub fn delete_child(&self, name: &str) -> Result<()> {
        if self.context.read_only {
            return Err(Error::ReadOnly);
        }
        let path = self.child_path(name)?;
        if !path.is_dir() {
            return Err(Error::NotFound(path));
        }
        std::fs::remove_dir_all(&path)?;
        Ok(())
    }
}

/// A dataset: a chunked n-dimensional array of one of the ten numeric
/// element types.
///
/// Shape, chunk shape, element type and compression are fixed at creation.
/// All coordinates are logical row-major; the format's native (reversed)
/// axis order only affects stored metadata, chunk file paths and chunk
/// headers, which the block store handles.
pub struct Dataset {
    path: PathBuf,
    metadata: DatasetMetadata,
    /// Logical row-major shape.
    shape: Vec<u64>,
    /// Logical row-major chunk shape.
    chunk_shape: Vec<u64>,
    store: FilesystemBlockStore,
    context: Arc<ContainerContext>,
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("path", &self.path)
            .field("shape", &self.shape)
            .field("chunk_shape", &self.chunk_shape)
            .field("data_type", &self.metadata.data_type)
            .finish()
    }
}

impl Dataset {
    pub(crate) fn open(path: PathBuf, context: Arc<ContainerContext>) -> Result<Self> {
        let attrs = AttributeStore::new(&path, context.read_only);
        let document = attrs.read_document()?;
        let metadata: DatasetMetadata =
            serde_json::from_value(serde_json::Value::Object(document)).map_err(|e| {
                Error::InvalidDatasetMetadata {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;
        metadata.validate().map_err(|e| Error::InvalidDatasetMetadata {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let store = FilesystemBlockStore::new(path.clone(), &metadata);
        Ok(Self {
            shape: metadata.shape(),
            chunk_shape: metadata.chunk_shape(),
            metadata,
            store,
            path,
            context,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Logical row-major shape.
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Logical row-major chunk shape.
    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    pub fn data_type(&self) -> DataType {
        self.metadata.data_type
    }

    pub fn compression(&self) -> Compression {
        self.metadata.compression
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// The reserved metadata exactly as stored.
    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn attributes(&self) -> AttributeStore {
        AttributeStore::new(&self.path, self.context.read_only)
    }

    /// Datasets have a fixed shape; any resize is a capability error.
    pub fn resize(&self, _shape: &[u64]) -> Result<()> {
        Err(Error::UnsupportedOperation("datasets cannot be resized"))
    }

    fn engine<'a>(&'a self) -> ReadWriteEngine<'a> {
        ReadWriteEngine::new(
            &self.store,
            &self.shape,
            &self.chunk_shape,
            self.metadata.data_type.size_of(),
            self.context.pool.as_ref(),
        )
    }

    /// Build and bounds-check the logical region `[origin, origin+extent)`.
    fn logical_region(&self, origin: &[u64], extent: &[u64]) -> Result<BoundingBox> {
        let region = BoundingBox::new(
            origin.iter().map(|&o| o as i64).collect(),
            extent.to_vec(),
        )?;
        if region.ndim() != self.ndim() || !region.inbounds(&self.shape) {
            return Err(Error::OutOfBounds {
                region: region.to_string(),
                shape: self.shape.clone(),
            });
        }
        Ok(region)
    }

    /// Read the values of `[origin, origin+extent)` as a flat row-major
    /// buffer. Never-written chunks read as zero.
    pub fn read(&self, origin: &[u64], extent: &[u64]) -> Result<ArrayValues> {
        let region = self.logical_region(origin, extent)?;
        let bytes = self.engine().read(&region)?;
        ArrayValues::decode_be(self.metadata.data_type, &bytes)
    }

    /// Write `values` (a flat row-major buffer of extent `extent`) at
    /// `origin`.
    ///
    /// The payload is validated in full against the dataset's element type
    /// before any chunk is touched, so a rejected payload leaves the dataset
    /// unchanged. A mid-write I/O failure, however, leaves already-written
    /// chunks in their new state; there is no cross-chunk rollback.
    pub fn write(&self, origin: &[u64], extent: &[u64], values: &ArrayValues) -> Result<()> {
        if self.context.read_only {
            return Err(Error::ReadOnly);
        }
        let region = self.logical_region(origin, extent)?;
        if values.len() as u64 != region.num_elements() {
            return Err(Error::incompatible(format!(
                "payload has {} elements, region {} has {}",
                values.len(),
                region,
                region.num_elements()
            )));
        }
        let payload = values.encode_be(self.metadata.data_type)?;
        self.engine().write(&region, &payload)
    }

    /// Read the whole (boundary-clipped) chunk at `grid_position`, logical
    /// row-major order.
    pub fn read_block(&self, grid_position: &[u64]) -> Result<ArrayValues> {
        let region = self.block_region(grid_position)?;
        self.read(&region.start_u64(), region.shape())
    }

    /// Overwrite the whole (boundary-clipped) chunk at `grid_position`.
    pub fn write_block(&self, grid_position: &[u64], values: &ArrayValues) -> Result<()> {
        let region = self.block_region(grid_position)?;
        self.write(&region.start_u64(), region.shape(), values)
    }

    fn block_region(&self, grid_position: &[u64]) -> Result<BoundingBox> {
        if grid_position.len() != self.ndim() {
            return Err(Error::incompatible(format!(
                "chunk coordinate has {} axes, dataset has {}",
                grid_position.len(),
                self.ndim()
            )));
        }
        let origin: Vec<u64> = izip!(grid_position, &self.chunk_shape)
            .map(|(&g, &c)| g * c)
            .collect();
        let extent: Vec<u64> = izip!(&origin, &self.chunk_shape, &self.shape)
            .map(|(&o, &c, &s)| c.min(s.saturating_sub(o)))
            .collect();
        let region = BoundingBox::new(origin.iter().map(|&o| o as i64).collect(), extent)?;
        if region.is_empty() {
            return Err(Error::OutOfBounds {
                region: region.to_string(),
                shape: self.shape.clone(),
            });
        }
        Ok(region)
    }
}

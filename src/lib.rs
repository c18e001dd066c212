//! Filesystem-backed N5 containers.
//!
//! An N5 container is a directory tree of named groups, each of which may
//! hold chunked n-dimensional datasets, with per-node JSON attributes. This
//! crate implements the hierarchy, the attribute store and the bounded
//! read/write engine that decomposes arbitrary rectangular requests into
//! per-chunk block I/O, including read-modify-write reconciliation of
//! partially covered chunks.
//!
//! Callers work in logical row-major ("C order") coordinates throughout; the
//! format's native reversed axis order is confined to stored metadata, chunk
//! file paths and chunk headers. Element bytes are stored in row-major order
//! unchanged.

pub mod attributes;
pub mod block;
mod chunk;
pub mod container;
mod engine;
mod error;
pub mod hierarchy;
pub mod metadata;
pub mod subset;
pub mod values;
pub mod version;

pub use attributes::AttributeStore;
pub use block::{BlockStore, FilesystemBlockStore};
pub use container::{Container, IoConcurrency, OpenMode};
pub use error::{Error, Result};
pub use hierarchy::{ChunkPlan, Dataset, Group, Node};
pub use metadata::{Compression, DataType, DatasetMetadata};
pub use subset::BoundingBox;
pub use values::ArrayValues;
pub use version::{FORMAT_VERSION, Version};

use std::path::PathBuf;

use crate::metadata::DataType;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors reported by container, hierarchy and dataset I/O operations.
///
/// Every variant is reported synchronously by the operation that detected it;
/// nothing is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A node already occupies the target path.
    #[error("a node already exists at {0}")]
    AlreadyExists(PathBuf),
    /// A node of the other kind (Group vs Dataset) occupies the target path.
    #[error("a {found} already exists at {path}")]
    TypeConflict { path: PathBuf, found: &'static str },
    /// The requested child or container does not exist.
    #[error("no such node: {0}")]
    NotFound(PathBuf),
    /// A regular file occupies the expected directory path.
    #[error("expected a directory at {0}, found a regular file")]
    NotADirectory(PathBuf),
    /// The container root has no `n5` version attribute.
    #[error("container root {0} has no N5 version attribute")]
    MissingVersion(PathBuf),
    /// The container's major format version differs from the supported one.
    #[error("container version {found} is incompatible with supported version {supported}")]
    VersionMismatch { found: String, supported: String },
    /// Attempted mutation of a reserved dataset-metadata key.
    #[error("attribute {0:?} is reserved dataset metadata and cannot be modified")]
    MetadataProtected(String),
    /// Lookup of an attribute key that is not present.
    #[error("no such attribute: {0:?}")]
    KeyNotFound(String),
    /// Reserved keys are present but incomplete or malformed.
    #[error("invalid dataset metadata at {path}: {reason}")]
    InvalidDatasetMetadata { path: PathBuf, reason: String },
    /// A payload value does not fit the dataset's data type.
    #[error("value {value} does not fit in {data_type}")]
    ValueOverflow { value: String, data_type: DataType },
    /// A payload's element kind is incompatible with the dataset's data type.
    #[error("cannot write {payload} values into a {data_type} dataset")]
    TypeMismatch {
        payload: &'static str,
        data_type: DataType,
    },
    /// A bounding box or chunk coordinate lies outside the dataset shape.
    #[error("region {region} is out of bounds of dataset shape {shape:?}")]
    OutOfBounds { region: String, shape: Vec<u64> },
    /// Mutation attempted through a read-only container handle.
    #[error("container is read-only")]
    ReadOnly,
    /// A child name that cannot map to a single directory entry.
    #[error("invalid node name {0:?}")]
    InvalidName(String),
    /// The operation is documented as unimplemented (e.g. resize).
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
    /// Bounding box, shape or payload arguments disagree in dimensionality or length.
    #[error("{0}")]
    IncompatibleArguments(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn incompatible(message: impl Into<String>) -> Self {
        Self::IncompatibleArguments(message.into())
    }
}

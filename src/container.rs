use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::attributes::AttributeStore;
use crate::error::{Error, Result};
use crate::hierarchy::{ContainerContext, Group};
use crate::version::{FORMAT_VERSION, VERSION_ATTRIBUTE_KEY, Version};

/// How [Container::open] treats the target directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Open an existing container; all mutation fails.
    ReadOnly,
    /// Open an existing container for reading and writing.
    ReadWrite,
    /// Open, creating the container if it does not exist.
    Create,
    /// Create a new container; fail if the path already exists.
    CreateExclusive,
    /// Create a new container, discarding anything already at the path.
    CreateTruncate,
}

/// Immutable I/O concurrency configuration, fixed at open time.
///
/// `threads` of zero or one means every read and write call runs its
/// per-chunk work sequentially in the issuing thread; anything larger fans
/// chunk work out across a bounded pool of that many workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IoConcurrency {
    threads: usize,
}

impl IoConcurrency {
    pub fn sequential() -> Self {
        Self { threads: 0 }
    }

    pub fn threads(threads: usize) -> Self {
        Self { threads }
    }
}

/// A container: the root of an N5 hierarchy on disk.
pub struct Container {
    root: Group,
    version: Version,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.root.path())
            .field("version", &self.version)
            .finish()
    }
}

impl Container {
    /// Open or create the container at `path`, sequential I/O.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Self::open_with(path, mode, IoConcurrency::default())
    }

    /// Open or create the container at `path`.
    ///
    /// On creation the root `n5` version attribute is written; on open it is
    /// checked: a differing major version aborts the open, a differing minor
    /// version only logs a warning, and a missing version attribute is an
    /// error.
    pub fn open_with(
        path: impl AsRef<Path>,
        mode: OpenMode,
        concurrency: IoConcurrency,
    ) -> Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if path.is_file() {
            return Err(Error::NotADirectory(path));
        }

        let created = if path.is_dir() {
            match mode {
                OpenMode::CreateExclusive => return Err(Error::AlreadyExists(path)),
                OpenMode::CreateTruncate => {
                    std::fs::remove_dir_all(&path)?;
                    std::fs::create_dir_all(&path)?;
                    true
                }
                _ => false,
            }
        } else {
            match mode {
                OpenMode::ReadOnly | OpenMode::ReadWrite => {
                    return Err(Error::NotFound(path));
                }
                _ => {
                    std::fs::create_dir_all(&path)?;
                    true
                }
            }
        };

        let version = if created {
            // The version attribute is written through an unconditionally
            // writable handle; creating modes are never read-only.
            let attrs = AttributeStore::new(&path, false);
            let mut document = attrs.read_document()?;
            document.insert(
                VERSION_ATTRIBUTE_KEY.to_string(),
                serde_json::Value::String(FORMAT_VERSION.to_string()),
            );
            attrs.write_document(&document)?;
            FORMAT_VERSION
        } else {
            negotiate_version(&path)?
        };

        let pool = match concurrency.threads {
            0 | 1 => None,
            threads => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(std::io::Error::other)?,
            ),
        };
        let context = Arc::new(ContainerContext {
            read_only: mode == OpenMode::ReadOnly,
            pool,
        });
        Ok(Self {
            root: Group::new(path, context),
            version,
        })
    }

    /// The root group of the hierarchy.
    pub fn root(&self) -> &Group {
        &self.root
    }

    /// The container's on-disk format version.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }
}

fn negotiate_version(path: &Path) -> Result<Version> {
    let attrs = AttributeStore::new(path, true);
    let raw = match attrs.get(VERSION_ATTRIBUTE_KEY) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(_) | Err(Error::KeyNotFound(_)) => {
            return Err(Error::MissingVersion(path.to_path_buf()));
        }
        Err(e) => return Err(e),
    };
    let version: Version = raw.parse().map_err(|_| Error::VersionMismatch {
        found: raw.clone(),
        supported: FORMAT_VERSION.to_string(),
    })?;
    if !version.is_compatible(&FORMAT_VERSION) {
        return Err(Error::VersionMismatch {
            found: version.to_string(),
            supported: FORMAT_VERSION.to_string(),
        });
    }
    if version.minor != FORMAT_VERSION.minor {
        log::warn!(
            "container {} has version {version}, expected {FORMAT_VERSION}; opening anyway",
            path.display()
        );
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_writes_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.n5");
        let container = Container::open(&path, OpenMode::Create).unwrap();
        assert_eq!(container.version(), FORMAT_VERSION);
        assert_eq!(
            container
                .root()
                .attributes()
                .get(VERSION_ATTRIBUTE_KEY)
                .unwrap(),
            serde_json::json!(FORMAT_VERSION.to_string())
        );

        // Reopening negotiates the stored version.
        let reopened = Container::open(&path, OpenMode::ReadWrite).unwrap();
        assert_eq!(reopened.version(), FORMAT_VERSION);
    }

    #[test]
    fn open_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.n5");
        assert!(matches!(
            Container::open(&path, OpenMode::ReadWrite),
            Err(Error::NotFound(_))
        ));
        Container::open(&path, OpenMode::CreateExclusive).unwrap();
        assert!(matches!(
            Container::open(&path, OpenMode::CreateExclusive),
            Err(Error::AlreadyExists(_))
        ));

        // Truncation discards prior content.
        Container::open(&path, OpenMode::ReadWrite)
            .unwrap()
            .root()
            .create_group("old")
            .unwrap();
        let truncated = Container::open(&path, OpenMode::CreateTruncate).unwrap();
        assert!(truncated.root().child_names().unwrap().is_empty());
    }

    #[test]
    fn regular_file_is_not_a_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.n5");
        std::fs::write(&path, b"hello").unwrap();
        assert!(matches!(
            Container::open(&path, OpenMode::Create),
            Err(Error::NotADirectory(_))
        ));
    }

    #[test]
    fn version_gate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.n5");
        Container::open(&path, OpenMode::Create).unwrap();
        let attrs = AttributeStore::new(&path, false);

        // Missing version: not openable.
        let mut doc = attrs.read_document().unwrap();
        doc.remove(VERSION_ATTRIBUTE_KEY);
        attrs.write_document(&doc).unwrap();
        assert!(matches!(
            Container::open(&path, OpenMode::ReadWrite),
            Err(Error::MissingVersion(_))
        ));

        // Major mismatch: fatal.
        doc.insert(VERSION_ATTRIBUTE_KEY.into(), serde_json::json!("3.0.0"));
        attrs.write_document(&doc).unwrap();
        assert!(matches!(
            Container::open(&path, OpenMode::ReadWrite),
            Err(Error::VersionMismatch { .. })
        ));

        // Minor mismatch: opens with a warning.
        doc.insert(VERSION_ATTRIBUTE_KEY.into(), serde_json::json!("2.1.0"));
        attrs.write_document(&doc).unwrap();
        let container = Container::open(&path, OpenMode::ReadWrite).unwrap();
        assert_eq!(container.version(), Version::new(2, 1, 0));
    }
}

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::metadata::RESERVED_KEYS;

/// Name of the per-directory attribute document.
pub const ATTRIBUTES_FILE: &str = "attributes.json";

/// JSON key/value attributes of one hierarchy node.
///
/// The whole document is read on every access and rewritten on every
/// mutation; last writer wins, and concurrent mutation of the same node must
/// be serialized by the caller. Once the directory qualifies as a dataset,
/// the four reserved metadata keys stay readable through [get](Self::get) but disappear
/// from [keys](Self::keys)/[contains](Self::contains) and reject mutation.
#[derive(Debug, Clone)]
pub struct AttributeStore {
    path: PathBuf,
    read_only: bool,
}

impl AttributeStore {
    pub(crate) fn new(node_dir: &Path, read_only: bool) -> Self {
        Self {
            path: node_dir.join(ATTRIBUTES_FILE),
            read_only,
        }
    }

    /// Path of the backing `attributes.json`.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw attribute document; a missing or malformed file reads as
    /// empty.
    pub(crate) fn read_document(&self) -> Result<Map<String, Value>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(map),
            // Not a JSON object (or not JSON at all): treat as empty rather
            // than failing every read on the node.
            Ok(_) | Err(_) => Ok(Map::new()),
        }
    }

    pub(crate) fn write_document(&self, document: &Map<String, Value>) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        let bytes = serde_json::to_vec(document)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    /// Whether the node currently qualifies as a dataset, re-derived from
    /// the on-disk document.
    pub fn is_dataset(&self) -> Result<bool> {
        let document = self.read_document()?;
        Ok(RESERVED_KEYS.iter().all(|k| document.contains_key(*k)))
    }

    /// Number of reserved keys present; a proper subset means the node's
    /// metadata is broken.
    pub(crate) fn reserved_key_count(&self) -> Result<usize> {
        let document = self.read_document()?;
        Ok(RESERVED_KEYS
            .iter()
            .filter(|k| document.contains_key(**k))
            .count())
    }

    /// Get an attribute value.
    ///
    /// Reserved dataset metadata stays readable here even though it is
    /// hidden from iteration.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.read_document()?
            .get(key)
            .cloned()
            .ok_or_else(|| Error::KeyNotFound(key.to_string()))
    }

    pub fn set(&self, key: &str, value: impl Serialize) -> Result<()> {
        self.guard_mutation(key)?;
        let mut document = self.read_document()?;
        document.insert(key.to_string(), serde_json::to_value(value)?);
        self.write_document(&document)
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.guard_mutation(key)?;
        let mut document = self.read_document()?;
        if document.remove(key).is_none() {
            return Err(Error::KeyNotFound(key.to_string()));
        }
        self.write_document(&document)
    }

    /// Attribute keys, excluding reserved dataset metadata.
    pub fn keys(&self) -> Result<Vec<String>> {
        let hide_reserved = self.is_dataset()?;
        Ok(self
            .read_document()?
            .keys()
            .filter(|k| !(hide_reserved && RESERVED_KEYS.contains(&k.as_str())))
            .cloned()
            .collect())
    }

    pub fn contains(&self, key: &str) -> Result<bool> {
        if self.is_dataset()? && RESERVED_KEYS.contains(&key) {
            return Ok(false);
        }
        Ok(self.read_document()?.contains_key(key))
    }

    /// Reject mutation of reserved keys on datasets, and any mutation
    /// through a read-only handle.
    fn guard_mutation(&self, key: &str) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        if RESERVED_KEYS.contains(&key) && self.is_dataset()? {
            return Err(Error::MetadataProtected(key.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group_attrs(dir: &Path) -> AttributeStore {
        AttributeStore::new(dir, false)
    }

    fn make_dataset(attrs: &AttributeStore) {
        let mut doc = Map::new();
        doc.insert("dimensions".into(), json!([10]));
        doc.insert("blockSize".into(), json!([2]));
        doc.insert("dataType".into(), json!("UINT8"));
        doc.insert("compression".into(), json!({"type": "raw"}));
        attrs.write_document(&doc).unwrap();
    }

    #[test]
    fn missing_and_malformed_files_read_empty() {
        let dir = tempfile::tempdir().unwrap();
        let attrs = group_attrs(dir.path());
        assert!(attrs.keys().unwrap().is_empty());
        assert!(matches!(attrs.get("x"), Err(Error::KeyNotFound(_))));

        std::fs::write(attrs.path(), b"{not json").unwrap();
        assert!(attrs.keys().unwrap().is_empty());

        // A write recreates the file.
        attrs.set("x", 1).unwrap();
        assert_eq!(attrs.get("x").unwrap(), json!(1));
    }

    #[test]
    fn set_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let attrs = group_attrs(dir.path());
        attrs.set("name", "sample").unwrap();
        attrs.set("resolution", vec![4.0, 4.0, 40.0]).unwrap();
        assert_eq!(attrs.get("resolution").unwrap(), json!([4.0, 4.0, 40.0]));
        assert!(attrs.contains("name").unwrap());
        attrs.delete("name").unwrap();
        assert!(!attrs.contains("name").unwrap());
        assert!(matches!(attrs.delete("name"), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn reserved_keys_hidden_and_protected_on_datasets() {
        let dir = tempfile::tempdir().unwrap();
        let attrs = group_attrs(dir.path());

        // Before the directory is a dataset, the names are ordinary keys.
        attrs.set("dataType", "anything").unwrap();
        attrs.delete("dataType").unwrap();

        make_dataset(&attrs);
        assert!(attrs.is_dataset().unwrap());

        // Hidden from the generic surface, still readable directly.
        assert!(attrs.keys().unwrap().is_empty());
        assert!(!attrs.contains("dimensions").unwrap());
        assert_eq!(attrs.get("dimensions").unwrap(), json!([10]));

        for key in RESERVED_KEYS {
            assert!(matches!(
                attrs.set(key, 1),
                Err(Error::MetadataProtected(_))
            ));
            assert!(matches!(
                attrs.delete(key),
                Err(Error::MetadataProtected(_))
            ));
        }

        // User attributes still work, and the raw file keeps everything.
        attrs.set("unit", "nm").unwrap();
        assert_eq!(attrs.keys().unwrap(), vec!["unit".to_string()]);
        let raw: Value =
            serde_json::from_slice(&std::fs::read(attrs.path()).unwrap()).unwrap();
        assert!(raw.get("dimensions").is_some());
        assert!(raw.get("unit").is_some());
    }

    #[test]
    fn read_only_handles_reject_mutation() {
        let dir = tempfile::tempdir().unwrap();
        group_attrs(dir.path()).set("a", 1).unwrap();
        let attrs = AttributeStore::new(dir.path(), true);
        assert_eq!(attrs.get("a").unwrap(), json!(1));
        assert!(matches!(attrs.set("a", 2), Err(Error::ReadOnly)));
        assert!(matches!(attrs.delete("a"), Err(Error::ReadOnly)));
    }
}

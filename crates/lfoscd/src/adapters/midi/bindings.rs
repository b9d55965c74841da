//! Persistent table of MIDI key bindings.
//!
//! The table maps an operation string to the note events that trigger it and
//! is stored as JSON: `{"<operation>": [{"key": 60, "status": 144}]}`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

/// Note number and status byte of a bound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyBinding {
    /// MIDI key number.
    pub key: u8,
    /// Status nibble, `0x80` or `0x90`.
    pub status: u8,
}

/// Key bindings loaded from, and saved back to, one JSON file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingTable {
    path: PathBuf,
    operations: BTreeMap<String, Vec<KeyBinding>>,
}

impl BindingTable {
    /// Loads the table at `path`. A missing file yields an empty table.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BindingsIo`] when the file cannot be read and
    /// [`ProtocolError::BindingsFormat`] when it is not a binding table.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ProtocolError> {
        let path = path.into();
        let operations = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => {
                serde_json::from_str(&text).map_err(|source| ProtocolError::BindingsFormat {
                    path: path.clone(),
                    source,
                })?
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(ProtocolError::BindingsIo { path, source }),
        };
        Ok(Self { path, operations })
    }

    /// Writes the table back to its file, replacing it atomically.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::BindingsIo`] when the file cannot be written.
    pub fn save(&self) -> Result<(), ProtocolError> {
        let io_error = |source| ProtocolError::BindingsIo {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string_pretty(&self.operations).map_err(|source| {
            ProtocolError::BindingsFormat {
                path: self.path.clone(),
                source,
            }
        })?;
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json).map_err(io_error)?;
        fs::rename(&staging, &self.path).map_err(io_error)
    }

    /// Removes every binding of `operation`.
    pub fn clear(&mut self, operation: &str) {
        self.operations.remove(operation);
    }

    /// Binds `binding` to `operation`, ignoring duplicates.
    pub fn add(&mut self, operation: &str, binding: KeyBinding) {
        let bound = self.operations.entry(operation.to_owned()).or_default();
        if !bound.contains(&binding) {
            bound.push(binding);
        }
    }

    /// Bindings of `operation`, in the order they were learned.
    #[must_use]
    pub fn bindings(&self, operation: &str) -> &[KeyBinding] {
        self.operations.get(operation).map_or(&[], Vec::as_slice)
    }

    /// Operations triggered by `binding`.
    pub fn operations_for(&self, binding: KeyBinding) -> impl Iterator<Item = &str> + '_ {
        self.operations
            .iter()
            .filter(move |(_, bound)| bound.contains(&binding))
            .map(|(operation, _)| operation.as_str())
    }

    /// Number of operations with at least one binding.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.values().filter(|bound| !bound.is_empty()).count()
    }

    /// Whether no operation is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    const PRESS: KeyBinding = KeyBinding {
        key: 60,
        status: 0x90,
    };
    const RELEASE: KeyBinding = KeyBinding {
        key: 60,
        status: 0x80,
    };

    #[fixture]
    fn dir() -> TempDir {
        TempDir::new().expect("create temp dir")
    }

    #[rstest]
    fn missing_files_load_empty(dir: TempDir) {
        let table = BindingTable::load(dir.path().join("absent.json")).expect("load");
        assert!(table.is_empty());
    }

    #[rstest]
    fn saved_tables_reload(dir: TempDir) {
        let path = dir.path().join("nested").join("map.json");
        let mut table = BindingTable::load(&path).expect("load");
        table.add("/osc/127.0.0.1:9000/go", PRESS);
        table.add("/osc/127.0.0.1:9000/go", RELEASE);
        table.add("/osc/127.0.0.1:9000/go", PRESS);
        table.save().expect("save");

        let reloaded = BindingTable::load(&path).expect("reload");
        assert_eq!(reloaded.bindings("/osc/127.0.0.1:9000/go"), &[PRESS, RELEASE]);
        assert_eq!(reloaded, table);
    }

    #[rstest]
    fn existing_json_uses_key_and_status(dir: TempDir) {
        let path = dir.path().join("map.json");
        fs::write(&path, r#"{"op": [{"key": 60, "status": 144}]}"#).expect("write");
        let table = BindingTable::load(&path).expect("load");
        assert_eq!(table.operations_for(PRESS).collect::<Vec<_>>(), vec!["op"]);
        assert_eq!(table.operations_for(RELEASE).count(), 0);
    }

    #[rstest]
    fn malformed_tables_are_rejected(dir: TempDir) {
        let path = dir.path().join("map.json");
        fs::write(&path, "[1, 2").expect("write");
        let error = BindingTable::load(&path).expect_err("malformed");
        assert!(matches!(error, ProtocolError::BindingsFormat { .. }));
    }

    #[rstest]
    fn clearing_forgets_an_operation(dir: TempDir) {
        let mut table = BindingTable::load(dir.path().join("map.json")).expect("load");
        table.add("a", PRESS);
        table.add("b", PRESS);
        table.clear("a");
        assert_eq!(table.operations_for(PRESS).collect::<Vec<_>>(), vec!["b"]);
        assert_eq!(table.len(), 1);
    }
}

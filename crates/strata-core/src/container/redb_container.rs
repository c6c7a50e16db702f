//! # redb-backed Container
//!
//! The substrate realized over the redb embedded database: copy-on-write
//! B-trees give crash safety and ACID commits with zero configuration,
//! and RAII on the write transaction guarantees that every exit path,
//! including error exits, leaves no partially written metadata behind.
//!
//! One table per structural concept:
//! - `groups`: canonical path -> marker
//! - `dimensions`: name -> serialized [`DimensionRecord`]
//! - `variables`: canonical path -> serialized [`VariableRecord`]
//! - `attributes`: (owner path, name) -> serialized [`AttrValue`]
//! - `rows`: (variable path, row index) -> serialized cell payload

use super::{CellValue, DimensionRecord, VariableRecord};
use crate::types::{AttrValue, StrataError};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Groups: canonical path -> marker byte.
const GROUPS: TableDefinition<&str, u8> = TableDefinition::new("groups");

/// Dimensions: name -> serialized DimensionRecord.
const DIMENSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("dimensions");

/// Variables: canonical path -> serialized VariableRecord.
const VARIABLES: TableDefinition<&str, &[u8]> = TableDefinition::new("variables");

/// Attributes: (owner path, name) -> serialized AttrValue.
const ATTRIBUTES: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("attributes");

/// Rows: (variable path, row index) -> serialized `Vec<CellValue>`.
const ROWS: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("rows");

fn store_err(e: impl std::fmt::Display) -> StrataError {
    StrataError::Storage(e.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StrataError> {
    postcard::to_stdvec(value).map_err(store_err)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StrataError> {
    postcard::from_bytes(bytes).map_err(store_err)
}

/// The hierarchical array store, exclusively owned by one writer for
/// the lifetime of the owning driver. Every method is a single
/// committed transaction.
pub struct RedbContainer {
    db: Database,
}

impl std::fmt::Debug for RedbContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbContainer").finish_non_exhaustive()
    }
}

impl RedbContainer {
    /// Create (or open) a container file at the given path.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, StrataError> {
        let db = Database::create(path.as_ref()).map_err(store_err)?;
        Self::with_database(db)
    }

    /// Open an existing container file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StrataError> {
        let db = Database::open(path.as_ref()).map_err(store_err)?;
        Self::with_database(db)
    }

    fn with_database(db: Database) -> Result<Self, StrataError> {
        // Initialize tables and the root group so later reads never see
        // a missing table.
        let txn = db.begin_write().map_err(store_err)?;
        {
            let mut groups = txn.open_table(GROUPS).map_err(store_err)?;
            groups.insert("/", 0u8).map_err(store_err)?;
            let _ = txn.open_table(DIMENSIONS).map_err(store_err)?;
            let _ = txn.open_table(VARIABLES).map_err(store_err)?;
            let _ = txn.open_table(ATTRIBUTES).map_err(store_err)?;
            let _ = txn.open_table(ROWS).map_err(store_err)?;
        }
        txn.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    // =========================================================================
    // GROUPS
    // =========================================================================

    /// Ensure the group at `path` and every ancestor exist. Idempotent.
    pub fn ensure_group(&self, path: &str) -> Result<(), StrataError> {
        let segments = crate::path::decompose(path);
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut groups = txn.open_table(GROUPS).map_err(store_err)?;
            let mut current = String::new();
            for segment in segments {
                current.push('/');
                current.push_str(segment);
                groups.insert(current.as_str(), 0u8).map_err(store_err)?;
            }
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }

    /// Whether a group exists at the canonical path.
    pub fn group_exists(&self, path: &str) -> Result<bool, StrataError> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let groups = txn.open_table(GROUPS).map_err(store_err)?;
        Ok(groups.get(path).map_err(store_err)?.is_some())
    }

    /// Names of the direct child groups of a group.
    pub fn child_groups(&self, path: &str) -> Result<Vec<String>, StrataError> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let groups = txn.open_table(GROUPS).map_err(store_err)?;
        children_of(&groups, path)
    }

    // =========================================================================
    // DIMENSIONS
    // =========================================================================

    /// Ensure a dimension exists. Idempotent: an existing dimension is
    /// left untouched (dimensions are never resized).
    pub fn ensure_dimension(
        &self,
        name: &str,
        length: u64,
        unlimited: bool,
    ) -> Result<(), StrataError> {
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut dimensions = txn.open_table(DIMENSIONS).map_err(store_err)?;
            if dimensions.get(name).map_err(store_err)?.is_none() {
                let record = DimensionRecord { length, unlimited };
                dimensions
                    .insert(name, encode(&record)?.as_slice())
                    .map_err(store_err)?;
            }
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }

    /// Look up a dimension by name.
    pub fn dimension(&self, name: &str) -> Result<Option<DimensionRecord>, StrataError> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let dimensions = txn.open_table(DIMENSIONS).map_err(store_err)?;
        match dimensions.get(name).map_err(store_err)? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // VARIABLES
    // =========================================================================

    /// Create a variable at the canonical path.
    ///
    /// Fails if a variable already exists there; the handler layer only
    /// creates after a read-bind reported nothing present.
    pub fn create_variable(
        &self,
        path: &str,
        dimensions: &[String],
        kind: super::CellKind,
    ) -> Result<(), StrataError> {
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut variables = txn.open_table(VARIABLES).map_err(store_err)?;
            if variables.get(path).map_err(store_err)?.is_some() {
                return Err(StrataError::Storage(format!(
                    "variable already exists at {path}"
                )));
            }
            let record = VariableRecord {
                dimensions: dimensions.to_vec(),
                kind,
                rows: 0,
            };
            variables
                .insert(path, encode(&record)?.as_slice())
                .map_err(store_err)?;
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }

    /// Look up a variable's metadata.
    pub fn variable(&self, path: &str) -> Result<Option<VariableRecord>, StrataError> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let variables = txn.open_table(VARIABLES).map_err(store_err)?;
        match variables.get(path).map_err(store_err)? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Names of the direct child variables of a group.
    pub fn child_variables(&self, path: &str) -> Result<Vec<String>, StrataError> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let variables = txn.open_table(VARIABLES).map_err(store_err)?;
        children_of(&variables, path)
    }

    // =========================================================================
    // ROWS
    // =========================================================================

    /// Write one entry's flattened cells at the given row index,
    /// overwriting any previous payload and growing the row count as
    /// needed.
    pub fn write_row(
        &self,
        path: &str,
        index: u64,
        cells: &[CellValue],
    ) -> Result<(), StrataError> {
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut variables = txn.open_table(VARIABLES).map_err(store_err)?;
            let mut record: VariableRecord = match variables.get(path).map_err(store_err)? {
                Some(guard) => decode(guard.value())?,
                None => {
                    return Err(StrataError::Storage(format!(
                        "no variable at {path} to write into"
                    )));
                }
            };
            if index + 1 > record.rows {
                record.rows = index + 1;
                variables
                    .insert(path, encode(&record)?.as_slice())
                    .map_err(store_err)?;
            }
            let mut rows = txn.open_table(ROWS).map_err(store_err)?;
            rows.insert((path, index), encode(&cells.to_vec())?.as_slice())
                .map_err(store_err)?;
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }

    /// Read one entry's flattened cells.
    pub fn row(&self, path: &str, index: u64) -> Result<Vec<CellValue>, StrataError> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let rows = txn.open_table(ROWS).map_err(store_err)?;
        match rows.get((path, index)).map_err(store_err)? {
            Some(guard) => decode(guard.value()),
            None => Err(StrataError::Storage(format!(
                "no data stored at {path} row {index}"
            ))),
        }
    }

    /// Number of rows written to a variable.
    pub fn row_count(&self, path: &str) -> Result<u64, StrataError> {
        match self.variable(path)? {
            Some(record) => Ok(record.rows),
            None => Err(StrataError::Storage(format!("no variable at {path}"))),
        }
    }

    // =========================================================================
    // ATTRIBUTES
    // =========================================================================

    /// Set an attribute on the root (`/`), a group, or a variable.
    pub fn set_attribute(
        &self,
        owner: &str,
        name: &str,
        value: &AttrValue,
    ) -> Result<(), StrataError> {
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut attributes = txn.open_table(ATTRIBUTES).map_err(store_err)?;
            attributes
                .insert((owner, name), encode(value)?.as_slice())
                .map_err(store_err)?;
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }

    /// Remove an attribute if present. Idempotent.
    pub fn remove_attribute(&self, owner: &str, name: &str) -> Result<(), StrataError> {
        let txn = self.db.begin_write().map_err(store_err)?;
        {
            let mut attributes = txn.open_table(ATTRIBUTES).map_err(store_err)?;
            attributes.remove((owner, name)).map_err(store_err)?;
        }
        txn.commit().map_err(store_err)?;
        Ok(())
    }

    /// Read an attribute from the root, a group, or a variable.
    pub fn attribute(&self, owner: &str, name: &str) -> Result<Option<AttrValue>, StrataError> {
        let txn = self.db.begin_read().map_err(store_err)?;
        let attributes = txn.open_table(ATTRIBUTES).map_err(store_err)?;
        match attributes.get((owner, name)).map_err(store_err)? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }
}

/// Direct children of a group within a path-keyed table: keys that
/// extend `parent` by exactly one segment.
fn children_of<V: redb::Value + 'static>(
    table: &impl ReadableTable<&'static str, V>,
    parent: &str,
) -> Result<Vec<String>, StrataError> {
    let prefix = if parent == "/" {
        "/".to_string()
    } else {
        format!("{parent}/")
    };
    let mut names = Vec::new();
    for entry in table.range(prefix.as_str()..).map_err(store_err)? {
        let (key, _) = entry.map_err(store_err)?;
        let key = key.value();
        if !key.starts_with(prefix.as_str()) {
            break;
        }
        let name = &key[prefix.len()..];
        if !name.is_empty() && !name.contains('/') {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::super::CellKind;
    use super::*;

    fn scratch() -> (tempfile::TempDir, RedbContainer) {
        let dir = tempfile::tempdir().expect("tempdir");
        let container = RedbContainer::create(dir.path().join("store.strata")).expect("create");
        (dir, container)
    }

    #[test]
    fn groups_are_created_with_ancestors() {
        let (_dir, container) = scratch();
        container.ensure_group("/a/b/c").expect("ensure");
        assert!(container.group_exists("/a").expect("exists"));
        assert!(container.group_exists("/a/b").expect("exists"));
        assert!(container.group_exists("/a/b/c").expect("exists"));
        assert!(!container.group_exists("/a/b/c/d").expect("exists"));
    }

    #[test]
    fn dimension_creation_is_idempotent() {
        let (_dir, container) = scratch();
        container.ensure_dimension("iterable4", 4, false).expect("first");
        container.ensure_dimension("iterable4", 4, false).expect("second");
        let record = container.dimension("iterable4").expect("get").expect("some");
        assert_eq!(record.length, 4);
        assert!(!record.unlimited);
    }

    #[test]
    fn rows_roundtrip_and_count() {
        let (_dir, container) = scratch();
        container
            .create_variable("/v", &["iteration".to_string()], CellKind::Int)
            .expect("create");
        container
            .write_row("/v", 0, &[CellValue::Int(7)])
            .expect("write");
        container
            .write_row("/v", 1, &[CellValue::Int(8)])
            .expect("write");
        assert_eq!(container.row_count("/v").expect("count"), 2);
        assert_eq!(container.row("/v", 1).expect("row"), vec![CellValue::Int(8)]);
    }

    #[test]
    fn duplicate_variable_rejected() {
        let (_dir, container) = scratch();
        container
            .create_variable("/v", &["scalar".to_string()], CellKind::Float)
            .expect("create");
        assert!(
            container
                .create_variable("/v", &["scalar".to_string()], CellKind::Float)
                .is_err()
        );
    }

    #[test]
    fn child_listing_is_direct_only() {
        let (_dir, container) = scratch();
        container.ensure_group("/rec/nested").expect("ensure");
        container
            .create_variable("/rec/x", &["scalar".to_string()], CellKind::Int)
            .expect("create");
        container
            .create_variable("/rec/nested/y", &["scalar".to_string()], CellKind::Int)
            .expect("create");
        assert_eq!(container.child_variables("/rec").expect("vars"), vec!["x"]);
        assert_eq!(
            container.child_groups("/rec").expect("groups"),
            vec!["nested"]
        );
    }

    #[test]
    fn attributes_roundtrip() {
        let (_dir, container) = scratch();
        container
            .set_attribute("/", "title", &AttrValue::from("demo"))
            .expect("set");
        assert_eq!(
            container.attribute("/", "title").expect("get"),
            Some(AttrValue::Str("demo".to_string()))
        );
        assert_eq!(container.attribute("/", "missing").expect("get"), None);
    }

    #[test]
    fn attribute_removal_is_idempotent() {
        let (_dir, container) = scratch();
        container
            .set_attribute("/v", "units", &AttrValue::from("kelvin"))
            .expect("set");
        container.remove_attribute("/v", "units").expect("remove");
        assert_eq!(container.attribute("/v", "units").expect("get"), None);
        container.remove_attribute("/v", "units").expect("again");
    }
}

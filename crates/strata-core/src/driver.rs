//! # Storage Driver
//!
//! The single entry point of the engine: opens the container file,
//! manufactures type handlers, and owns the per-session caches.
//!
//! The driver keeps at most one live handler per canonical path, so two
//! lookups of the same path share one binding and one mode. Caches are
//! populated lazily and never invalidated within a session; the driver
//! is the sole writer of its container for its whole lifetime.

use crate::container::{CellKind, RedbContainer};
use crate::handlers::{TypeKey, VariableHandle};
use crate::layout;
use crate::path;
use crate::types::{AttrValue, StrataError};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::rc::Rc;

// =============================================================================
// STORAGE DRIVER
// =============================================================================

/// Typed persistence façade over one container file.
#[derive(Debug)]
pub struct StorageDriver {
    container: Rc<RedbContainer>,
    /// Groups known to exist, by canonical path.
    groups: BTreeSet<String>,
    /// Live handlers, by canonical path.
    handlers: BTreeMap<String, VariableHandle>,
}

impl StorageDriver {
    /// Create (or reopen) a container file and wrap it in a driver.
    pub fn create(file: impl AsRef<Path>) -> Result<Self, StrataError> {
        Ok(Self::with_container(RedbContainer::create(file)?))
    }

    /// Open an existing container file.
    pub fn open(file: impl AsRef<Path>) -> Result<Self, StrataError> {
        Ok(Self::with_container(RedbContainer::open(file)?))
    }

    fn with_container(container: RedbContainer) -> Self {
        let mut groups = BTreeSet::new();
        groups.insert("/".to_string());
        Self {
            container: Rc::new(container),
            groups,
            handlers: BTreeMap::new(),
        }
    }

    // =========================================================================
    // HANDLER MANUFACTURE
    // =========================================================================

    /// Obtain a handler of the given kind at `target`, creating the
    /// enclosing group chain. The stored object itself materializes at
    /// first write or append.
    ///
    /// A cached handler of the same kind is reused; asking for a
    /// different kind at a cached path is a `TypeMismatch`.
    pub fn create_storage_variable(
        &mut self,
        target: &str,
        kind: TypeKey,
    ) -> Result<VariableHandle, StrataError> {
        let canonical = path::canonical(target);
        let Some((parent, _leaf)) = path::split_leaf(&canonical) else {
            return Err(StrataError::InvalidArgument(
                "cannot create a storage variable at the root".to_string(),
            ));
        };
        if let Some(cached) = self.handlers.get(&canonical) {
            if cached.kind() != kind {
                return Err(StrataError::TypeMismatch {
                    path: canonical,
                    expected: cached.kind().tag().to_string(),
                    actual: kind.tag().to_string(),
                });
            }
            return Ok(cached.clone());
        }
        self.bind_group_chain(&parent)?;
        let handle = VariableHandle::new(Rc::clone(&self.container), canonical.clone(), kind);
        self.handlers.insert(canonical, handle.clone());
        Ok(handle)
    }

    /// Resolve the handler for an already-stored object from its
    /// persisted self-description.
    ///
    /// A stored variable resolves through its type tag (`UnknownType`
    /// on an unrecognized tag); a tagless legacy variable is inferred
    /// from its cell kind with a warning. A group resolves to the
    /// record handler. Nothing at the path is `NotFound`.
    pub fn get_variable_handler(&mut self, target: &str) -> Result<VariableHandle, StrataError> {
        let canonical = path::canonical(target);
        if let Some(cached) = self.handlers.get(&canonical) {
            return Ok(cached.clone());
        }
        let kind = self.resolve_stored_kind(&canonical)?;
        let handle = VariableHandle::new(Rc::clone(&self.container), canonical.clone(), kind);
        self.handlers.insert(canonical, handle.clone());
        Ok(handle)
    }

    fn resolve_stored_kind(&self, canonical: &str) -> Result<TypeKey, StrataError> {
        if let Some(variable) = self.container.variable(canonical)? {
            return match self.container.attribute(canonical, layout::ATTR_TYPE)? {
                Some(AttrValue::Str(tag)) => {
                    TypeKey::from_tag(&tag).ok_or(StrataError::UnknownType(tag))
                }
                _ => {
                    let inferred = match variable.kind {
                        CellKind::Int => TypeKey::Int,
                        CellKind::Float => TypeKey::Float,
                        CellKind::Text => TypeKey::Str,
                    };
                    tracing::warn!(
                        path = %canonical,
                        inferred = inferred.tag(),
                        "stored variable carries no type tag; inferring its handler kind"
                    );
                    Ok(inferred)
                }
            };
        }
        if canonical != "/" && self.container.group_exists(canonical)? {
            return match self.container.attribute(canonical, layout::ATTR_TYPE)? {
                Some(AttrValue::Str(tag)) => match TypeKey::from_tag(&tag) {
                    Some(TypeKey::Record) => Ok(TypeKey::Record),
                    Some(_) | None => Err(StrataError::UnknownType(tag)),
                },
                _ => {
                    tracing::warn!(
                        path = %canonical,
                        "stored group carries no type tag; treating it as a record"
                    );
                    Ok(TypeKey::Record)
                }
            };
        }
        Err(StrataError::NotFound(canonical.to_string()))
    }

    fn bind_group_chain(&mut self, group: &str) -> Result<(), StrataError> {
        if self.groups.contains(group) {
            return Ok(());
        }
        self.container.ensure_group(group)?;
        let mut current = String::new();
        for segment in path::decompose(group) {
            current.push('/');
            current.push_str(segment);
            self.groups.insert(current.clone());
        }
        Ok(())
    }

    // =========================================================================
    // METADATA
    // =========================================================================

    /// Attach a free-form attribute to the root, a known group, or a
    /// live handler's object; anything else is a `PathNotFound`.
    pub fn add_metadata(
        &mut self,
        name: &str,
        value: impl Into<AttrValue>,
        target: &str,
    ) -> Result<(), StrataError> {
        let canonical = path::canonical(target);
        if canonical == "/" || self.groups.contains(&canonical) {
            return self
                .container
                .set_attribute(&canonical, name, &value.into());
        }
        if let Some(handle) = self.handlers.get(&canonical) {
            return handle.add_metadata(name, value);
        }
        Err(StrataError::PathNotFound(canonical))
    }

    // =========================================================================
    // DIMENSIONS
    // =========================================================================

    /// Ensure the shared length-1 `scalar` dimension exists.
    pub fn check_scalar_dimension(&self) -> Result<(), StrataError> {
        self.container
            .ensure_dimension(layout::DIM_SCALAR, 1, false)
    }

    /// Ensure the unlimited `iteration` growth axis exists.
    pub fn check_infinite_dimension(&self) -> Result<(), StrataError> {
        self.container
            .ensure_dimension(layout::DIM_ITERATION, 0, true)
    }

    /// Ensure the fixed-length `iterable<N>` dimension exists. A
    /// negative length is an `InvalidArgument`.
    pub fn check_iterable_dimension(&self, length: i64) -> Result<(), StrataError> {
        if length < 0 {
            return Err(StrataError::InvalidArgument(format!(
                "iterable dimension length must be non-negative, got {length}"
            )));
        }
        let length = length as u64;
        self.container
            .ensure_dimension(&layout::iterable_dimension(length), length, false)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StorageValue;

    fn scratch() -> (tempfile::TempDir, StorageDriver) {
        let dir = tempfile::tempdir().expect("tempdir");
        let driver = StorageDriver::create(dir.path().join("store.strata")).expect("create");
        (dir, driver)
    }

    #[test]
    fn root_variable_rejected() {
        let (_dir, mut driver) = scratch();
        let result = driver.create_storage_variable("/", TypeKey::Int);
        assert!(matches!(result, Err(StrataError::InvalidArgument(_))));
    }

    #[test]
    fn cached_handler_is_shared() {
        let (_dir, mut driver) = scratch();
        let first = driver
            .create_storage_variable("/data/x", TypeKey::Int)
            .expect("first");
        first.write(&StorageValue::Int(3)).expect("write");
        let second = driver.get_variable_handler("/data/x").expect("second");
        assert!(second.is_bound());
    }

    #[test]
    fn kind_conflict_on_cached_path() {
        let (_dir, mut driver) = scratch();
        driver
            .create_storage_variable("/x", TypeKey::Int)
            .expect("first");
        let result = driver.create_storage_variable("/x", TypeKey::Float);
        assert!(matches!(result, Err(StrataError::TypeMismatch { .. })));
    }

    #[test]
    fn lookup_of_missing_object_fails() {
        let (_dir, mut driver) = scratch();
        let result = driver.get_variable_handler("/nothing/here");
        assert!(matches!(result, Err(StrataError::NotFound(_))));
    }

    #[test]
    fn metadata_targets_root_groups_and_handlers() {
        let (_dir, mut driver) = scratch();
        driver.add_metadata("title", "demo", "/").expect("root");

        let handle = driver
            .create_storage_variable("/grp/x", TypeKey::Int)
            .expect("handle");
        driver.add_metadata("note", "child", "/grp").expect("group");
        driver.add_metadata("source", "test", "/grp/x").expect("handler");
        handle.write(&StorageValue::Int(1)).expect("write");

        let result = driver.add_metadata("k", "v", "/unknown");
        assert!(matches!(result, Err(StrataError::PathNotFound(_))));
    }

    #[test]
    fn negative_iterable_length_rejected() {
        let (_dir, driver) = scratch();
        assert!(matches!(
            driver.check_iterable_dimension(-1),
            Err(StrataError::InvalidArgument(_))
        ));
        driver.check_iterable_dimension(4).expect("positive");
        driver.check_scalar_dimension().expect("scalar");
        driver.check_infinite_dimension().expect("iteration");
    }
}

//! # Type Handlers
//!
//! The bind/read/write/append protocol for every supported kind.
//!
//! A handler instance is a transient binding between one path and one
//! stored object. Its state machine is `UNBOUND -> BOUND(write)` or
//! `UNBOUND -> BOUND(append)`, terminal once entered: the output mode is
//! fixed by whichever bind first materializes the object and enforced
//! for the object's whole lifetime.
//!
//! Type dispatch is a closed, exhaustive enum over the supported kinds
//! ([`TypeKey`]) with a total mapping from persisted tag strings to
//! kinds; unknown tags are an explicit `UnknownType`, never a
//! fall-through.

mod codec;
mod record;

use crate::container::{CellKind, RedbContainer};
use crate::layout;
use crate::types::{AttrValue, ElementKind, StorageValue, StrataError};
use std::cell::RefCell;
use std::rc::Rc;

// =============================================================================
// TYPE KEYS
// =============================================================================

/// The closed set of handler kinds, one per storable value kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeKey {
    /// Scalar integer.
    Int,
    /// Scalar float.
    Float,
    /// Text.
    Str,
    /// N-dimensional numeric array.
    Array,
    /// Homogeneous 1-D sequence.
    Seq,
    /// Unit-bearing quantity.
    Quantity,
    /// Key-value record stored as a group.
    Record,
}

impl TypeKey {
    /// The persisted type tag of this kind.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Array => "numpy.ndarray",
            Self::Seq => "iterable",
            Self::Quantity => "quantity",
            Self::Record => "dict",
        }
    }

    /// Resolve a persisted type tag. Unknown tags yield `None`, which
    /// callers report as `UnknownType`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "str" => Some(Self::Str),
            "numpy.ndarray" => Some(Self::Array),
            "iterable" => Some(Self::Seq),
            "quantity" => Some(Self::Quantity),
            "dict" => Some(Self::Record),
            _ => None,
        }
    }

    /// The handler kind for a runtime value. `None` for kinds that have
    /// no top-level handler (`None`, `Series`).
    pub fn of(value: &StorageValue) -> Option<Self> {
        match value {
            StorageValue::Int(_) => Some(Self::Int),
            StorageValue::Float(_) => Some(Self::Float),
            StorageValue::Str(_) => Some(Self::Str),
            StorageValue::Array(_) => Some(Self::Array),
            StorageValue::Seq(_) => Some(Self::Seq),
            StorageValue::Quantity(_) => Some(Self::Quantity),
            StorageValue::Record(_) => Some(Self::Record),
            StorageValue::None | StorageValue::Series(_) => None,
        }
    }
}

impl std::fmt::Display for TypeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

// =============================================================================
// OUTPUT MODE
// =============================================================================

/// The write discipline fixed at creation: single-shot overwrite or
/// monotonically growing append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Write-once overwrite.
    Write,
    /// Growth-axis-leading append.
    Append,
}

impl OutputMode {
    fn name(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Append => "append",
        }
    }
}

// =============================================================================
// HANDLER STATE
// =============================================================================

/// Resolved binding between a handler and its stored object.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) mode: OutputMode,
    /// Per-entry shape, excluding the growth axis for appendable
    /// objects.
    pub(crate) entry_shape: Vec<usize>,
    pub(crate) elem: ElementKind,
    pub(crate) cell: CellKind,
    /// Unit string recorded at first bind, for quantities.
    pub(crate) unit: Option<String>,
    /// Set when the stored object carries no type tag: reads are
    /// best-effort and writes are refused.
    pub(crate) degraded: bool,
}

pub(crate) struct HandlerState {
    pub(crate) container: Rc<RedbContainer>,
    pub(crate) path: String,
    pub(crate) kind: TypeKey,
    pub(crate) binding: Option<Binding>,
    /// Metadata buffered before binding, drained exactly once at bind
    /// time.
    pub(crate) pending: Vec<(String, AttrValue)>,
}

impl HandlerState {
    fn binding(&self) -> Result<&Binding, StrataError> {
        self.binding.as_ref().ok_or_else(|| {
            StrataError::Storage(format!("handler for {} used before binding", self.path))
        })
    }

    fn check_kind(&self, data: &StorageValue) -> Result<(), StrataError> {
        match TypeKey::of(data) {
            Some(key) if key == self.kind => Ok(()),
            _ => Err(StrataError::TypeMismatch {
                path: self.path.clone(),
                expected: self.kind.tag().to_string(),
                actual: data.kind_name().to_string(),
            }),
        }
    }

    /// Attach to an existing stored object, verifying its
    /// self-description against this handler's kind.
    fn bind_read(&mut self) -> Result<(), StrataError> {
        if self.kind == TypeKey::Record {
            return record::bind_read(self);
        }
        let Some(variable) = self.container.variable(&self.path)? else {
            // A group at the target is an existing object of another
            // kind, not an empty slot; reporting NotFound here would
            // let bind_for shadow it with a fresh variable.
            if self.path != "/" && self.container.group_exists(&self.path)? {
                let actual = match self.container.attribute(&self.path, layout::ATTR_TYPE)? {
                    Some(AttrValue::Str(tag)) => tag,
                    _ => layout::STORAGE_KIND_GROUP.to_string(),
                };
                return Err(StrataError::TypeMismatch {
                    path: self.path.clone(),
                    expected: self.kind.tag().to_string(),
                    actual,
                });
            }
            return Err(StrataError::NotFound(self.path.clone()));
        };
        let mut degraded = false;
        match self.container.attribute(&self.path, layout::ATTR_TYPE)? {
            Some(AttrValue::Str(tag)) => match TypeKey::from_tag(&tag) {
                Some(key) if key == self.kind => {}
                Some(key) => {
                    return Err(StrataError::TypeMismatch {
                        path: self.path.clone(),
                        expected: self.kind.tag().to_string(),
                        actual: key.tag().to_string(),
                    });
                }
                None => return Err(StrataError::UnknownType(tag)),
            },
            _ => {
                tracing::warn!(
                    path = %self.path,
                    "stored object carries no type tag; binding best-effort, read-only"
                );
                degraded = true;
            }
        }
        let appendable = match self.container.attribute(&self.path, layout::ATTR_APPENDABLE)? {
            Some(AttrValue::Int(flag)) => flag != 0,
            _ => variable
                .dimensions
                .first()
                .is_some_and(|d| d == layout::DIM_ITERATION),
        };
        let mode = if appendable {
            OutputMode::Append
        } else {
            OutputMode::Write
        };
        let mut dimensions = variable.dimensions.as_slice();
        if appendable && dimensions.first().is_some_and(|d| d == layout::DIM_ITERATION) {
            dimensions = &dimensions[1..];
        }
        let mut entry_shape = Vec::with_capacity(dimensions.len());
        for name in dimensions {
            let dimension = self.container.dimension(name)?.ok_or_else(|| {
                StrataError::Storage(format!("unknown dimension '{name}' on {}", self.path))
            })?;
            entry_shape.push(dimension.length as usize);
        }
        let elem = match self
            .container
            .attribute(&self.path, layout::ATTR_ELEMENT_TYPE)?
        {
            Some(AttrValue::Str(name)) => {
                ElementKind::from_name(&name).ok_or(StrataError::UnknownType(name))?
            }
            _ => match variable.kind {
                CellKind::Int => ElementKind::Int,
                CellKind::Float => ElementKind::Float,
                CellKind::Text => ElementKind::Str,
            },
        };
        let unit = match self.container.attribute(&self.path, layout::ATTR_UNIT)? {
            Some(AttrValue::Str(s)) if s != layout::UNIT_NONE => Some(s),
            _ => None,
        };
        self.binding = Some(Binding {
            mode,
            entry_shape,
            elem,
            cell: variable.kind,
            unit,
            degraded,
        });
        Ok(())
    }

    /// Bind for output: reuse the existing object if present, otherwise
    /// create one sized from `data`, then drain the metadata buffer.
    fn bind_for(&mut self, data: &StorageValue, mode: OutputMode) -> Result<(), StrataError> {
        match self.bind_read() {
            Ok(()) => {}
            Err(StrataError::NotFound(_)) => self.create_object(data, mode)?,
            Err(e) => return Err(e),
        }
        self.flush_pending()
    }

    /// Create the stored object and stamp its self-description.
    /// Dimensions are ensured lazily: the shared scalar dimension for
    /// atomic kinds, one fixed-length dimension per array axis, and the
    /// unlimited growth axis prepended for append mode.
    fn create_object(&mut self, data: &StorageValue, mode: OutputMode) -> Result<(), StrataError> {
        if self.kind == TypeKey::Record {
            return record::create(self);
        }
        let Some(inspection) = codec::inspect(data) else {
            return Err(StrataError::TypeMismatch {
                path: self.path.clone(),
                expected: self.kind.tag().to_string(),
                actual: data.kind_name().to_string(),
            });
        };
        let mut dimensions: Vec<String> = Vec::new();
        if mode == OutputMode::Append {
            self.container
                .ensure_dimension(layout::DIM_ITERATION, 0, true)?;
            dimensions.push(layout::DIM_ITERATION.to_string());
        }
        if inspection.uses_scalar_dim {
            self.container.ensure_dimension(layout::DIM_SCALAR, 1, false)?;
            dimensions.push(layout::DIM_SCALAR.to_string());
        } else {
            for &length in &inspection.entry_shape {
                let name = layout::iterable_dimension(length as u64);
                self.container.ensure_dimension(&name, length as u64, false)?;
                dimensions.push(name);
            }
        }
        self.container
            .create_variable(&self.path, &dimensions, inspection.cell)?;
        tracing::debug!(
            path = %self.path,
            kind = self.kind.tag(),
            mode = mode.name(),
            "created storage variable"
        );
        let unit = inspection
            .unit
            .clone()
            .unwrap_or_else(|| layout::UNIT_NONE.to_string());
        self.container
            .set_attribute(&self.path, layout::ATTR_TYPE, &self.kind.tag().into())?;
        self.container.set_attribute(
            &self.path,
            layout::ATTR_ELEMENT_TYPE,
            &inspection.elem.name().into(),
        )?;
        self.container
            .set_attribute(&self.path, layout::ATTR_UNIT, &unit.into())?;
        self.container.set_attribute(
            &self.path,
            layout::ATTR_STORAGE_KIND,
            &layout::STORAGE_KIND_VARIABLE.into(),
        )?;
        self.container.set_attribute(
            &self.path,
            layout::ATTR_APPENDABLE,
            &i64::from(mode == OutputMode::Append).into(),
        )?;
        self.binding = Some(Binding {
            mode,
            entry_shape: inspection.entry_shape,
            elem: inspection.elem,
            cell: inspection.cell,
            unit: inspection.unit,
            degraded: false,
        });
        Ok(())
    }

    /// Drain the pending metadata buffer onto the bound object.
    fn flush_pending(&mut self) -> Result<(), StrataError> {
        for (name, value) in std::mem::take(&mut self.pending) {
            self.container.set_attribute(&self.path, &name, &value)?;
        }
        Ok(())
    }

    /// Validate an outgoing value against the binding and flatten it.
    fn prepare_cells(
        &self,
        data: &StorageValue,
    ) -> Result<Vec<crate::container::CellValue>, StrataError> {
        let binding = self.binding()?;
        let Some(inspection) = codec::inspect(data) else {
            return Err(StrataError::TypeMismatch {
                path: self.path.clone(),
                expected: self.kind.tag().to_string(),
                actual: data.kind_name().to_string(),
            });
        };
        if inspection.entry_shape != binding.entry_shape {
            return Err(StrataError::ShapeMismatch {
                path: self.path.clone(),
                expected: binding.entry_shape.clone(),
                actual: inspection.entry_shape,
            });
        }
        if inspection.elem != binding.elem || inspection.cell != binding.cell {
            return Err(StrataError::TypeMismatch {
                path: self.path.clone(),
                expected: binding.elem.name().to_string(),
                actual: inspection.elem.name().to_string(),
            });
        }
        if self.kind == TypeKey::Quantity && inspection.unit != binding.unit {
            return Err(StrataError::UnitMismatch {
                path: self.path.clone(),
                expected: binding
                    .unit
                    .clone()
                    .unwrap_or_else(|| layout::UNIT_NONE.to_string()),
                actual: inspection
                    .unit
                    .unwrap_or_else(|| layout::UNIT_NONE.to_string()),
            });
        }
        codec::encode_entry(data).ok_or_else(|| {
            StrataError::Storage(format!("value at {} has no cell encoding", self.path))
        })
    }

    fn check_mode(&self, attempted: OutputMode) -> Result<(), StrataError> {
        let binding = self.binding()?;
        if binding.degraded {
            return Err(StrataError::NotSupported(format!(
                "{} carries no type tag; only best-effort reads are supported",
                self.path
            )));
        }
        if binding.mode != attempted {
            return Err(StrataError::ModeViolation {
                path: self.path.clone(),
                bound: binding.mode.name(),
                attempted: attempted.name(),
            });
        }
        Ok(())
    }

    fn write(&mut self, data: &StorageValue) -> Result<(), StrataError> {
        self.check_kind(data)?;
        if self.binding.is_none() {
            self.bind_for(data, OutputMode::Write)?;
        }
        self.check_mode(OutputMode::Write)?;
        if self.kind == TypeKey::Record {
            let StorageValue::Record(entries) = data else {
                return Err(StrataError::TypeMismatch {
                    path: self.path.clone(),
                    expected: self.kind.tag().to_string(),
                    actual: data.kind_name().to_string(),
                });
            };
            return record::encode(self, entries);
        }
        let cells = self.prepare_cells(data)?;
        self.container.write_row(&self.path, 0, &cells)
    }

    fn append(&mut self, data: &StorageValue) -> Result<(), StrataError> {
        self.check_kind(data)?;
        if self.kind == TypeKey::Record {
            return Err(StrataError::NotSupported(
                "records cannot be appended to".to_string(),
            ));
        }
        if self.binding.is_none() {
            self.bind_for(data, OutputMode::Append)?;
        }
        self.check_mode(OutputMode::Append)?;
        let cells = self.prepare_cells(data)?;
        // The growth-axis length is the number of successful appends so
        // far, which is exactly the next free index.
        let index = self.container.row_count(&self.path)?;
        self.container.write_row(&self.path, index, &cells)
    }

    fn decode_row(&self, index: u64) -> Result<StorageValue, StrataError> {
        let binding = self.binding()?;
        let cells = self.container.row(&self.path, index)?;
        match self.kind {
            TypeKey::Int | TypeKey::Float | TypeKey::Str => {
                codec::decode_scalar(&cells, &self.path)
            }
            TypeKey::Array => Ok(StorageValue::Array(codec::decode_array(
                &cells,
                binding.cell,
                &binding.entry_shape,
                &self.path,
            )?)),
            TypeKey::Seq => Ok(StorageValue::Seq(codec::decode_seq(
                &cells,
                binding.cell,
                &self.path,
            )?)),
            TypeKey::Quantity => {
                let unit = binding.unit.as_deref().ok_or_else(|| {
                    StrataError::Storage(format!("quantity at {} has no stored unit", self.path))
                })?;
                Ok(StorageValue::Quantity(codec::decode_quantity(
                    &cells,
                    binding.elem,
                    binding.cell,
                    &binding.entry_shape,
                    unit,
                    &self.path,
                )?))
            }
            TypeKey::Record => Err(StrataError::Storage(format!(
                "record at {} has no row encoding",
                self.path
            ))),
        }
    }

    fn read_entries(&mut self) -> Result<Vec<StorageValue>, StrataError> {
        if self.binding.is_none() {
            self.bind_read()?;
        }
        if self.kind == TypeKey::Record {
            return Ok(vec![StorageValue::Record(record::decode(self)?)]);
        }
        match self.binding()?.mode {
            OutputMode::Write => Ok(vec![self.decode_row(0)?]),
            OutputMode::Append => {
                let count = self.container.row_count(&self.path)?;
                (0..count).map(|index| self.decode_row(index)).collect()
            }
        }
    }

    fn read(&mut self) -> Result<StorageValue, StrataError> {
        if self.binding.is_none() {
            self.bind_read()?;
        }
        if self.kind == TypeKey::Record {
            return Ok(StorageValue::Record(record::decode(self)?));
        }
        let mode = self.binding()?.mode;
        match mode {
            OutputMode::Write => self.decode_row(0),
            OutputMode::Append => Ok(StorageValue::Series(self.read_entries()?)),
        }
    }

    fn add_metadata(&mut self, name: &str, value: AttrValue) -> Result<(), StrataError> {
        if self.binding.is_some() {
            self.container.set_attribute(&self.path, name, &value)
        } else {
            self.pending.push((name.to_string(), value));
            Ok(())
        }
    }
}

// =============================================================================
// VARIABLE HANDLE
// =============================================================================

/// A cached, shareable handler instance bound (lazily) to one stored
/// object. Cloning is cheap and yields the same underlying binding; the
/// owning driver keeps at most one live handle per path.
///
/// The concurrency model is single-threaded by contract, so shared
/// state is `Rc<RefCell<..>>`.
#[derive(Clone)]
pub struct VariableHandle {
    state: Rc<RefCell<HandlerState>>,
}

impl std::fmt::Debug for VariableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("VariableHandle")
            .field("path", &state.path)
            .field("kind", &state.kind)
            .field("bound", &state.binding.is_some())
            .finish()
    }
}

impl VariableHandle {
    pub(crate) fn new(container: Rc<RedbContainer>, path: String, kind: TypeKey) -> Self {
        Self {
            state: Rc::new(RefCell::new(HandlerState {
                container,
                path,
                kind,
                binding: None,
                pending: Vec::new(),
            })),
        }
    }

    /// The handler's kind.
    pub fn kind(&self) -> TypeKey {
        self.state.borrow().kind
    }

    /// Canonical path of the stored object.
    pub fn path(&self) -> String {
        self.state.borrow().path.clone()
    }

    /// Whether the handler has bound to a stored object yet.
    pub fn is_bound(&self) -> bool {
        self.state.borrow().binding.is_some()
    }

    /// The resolved output mode, once bound.
    pub fn mode(&self) -> Option<OutputMode> {
        self.state.borrow().binding.as_ref().map(|b| b.mode)
    }

    /// Decode the stored value.
    ///
    /// Binds read-only on first call. Write-mode objects yield the
    /// single stored value; append-mode objects yield the full stored
    /// extent as a [`StorageValue::Series`], decoded entry by entry.
    pub fn read(&self) -> Result<StorageValue, StrataError> {
        self.state.borrow_mut().read()
    }

    /// Decode the stored extent as individual entries.
    pub fn read_all(&self) -> Result<Vec<StorageValue>, StrataError> {
        self.state.borrow_mut().read_entries()
    }

    /// Overwrite the single stored instance.
    ///
    /// Binds on first call, fixing the object into write mode if it did
    /// not exist yet.
    pub fn write(&self, data: &StorageValue) -> Result<(), StrataError> {
        self.state.borrow_mut().write(data)
    }

    /// Append one entry along the growth axis.
    ///
    /// Binds on first call, fixing the object into append mode if it
    /// did not exist yet.
    pub fn append(&self, data: &StorageValue) -> Result<(), StrataError> {
        self.state.borrow_mut().append(data)
    }

    /// Attach a free-form attribute: buffered while unbound, stamped
    /// directly once bound.
    pub fn add_metadata(
        &self,
        name: &str,
        value: impl Into<AttrValue>,
    ) -> Result<(), StrataError> {
        self.state.borrow_mut().add_metadata(name, value.into())
    }
}

// =============================================================================
// TESTS
// =============================================================================

//! # Core Type Definitions
//!
//! The value model of the storage engine:
//! - `StorageValue`: the closed set of storable kinds
//! - `TypedArray`, `Sequence`, `Quantity`: composite payloads
//! - `ElementKind`: persisted element-type names
//! - `AttrValue`: free-form attribute values
//! - `StrataError`: the full error taxonomy
//!
//! ## Determinism Guarantees
//!
//! Records use `BTreeMap` for deterministic ordering; every error is an
//! explicit variant, never a panic.

use crate::units::Unit;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// =============================================================================
// ELEMENT KINDS
// =============================================================================

/// Persisted element-type names.
///
/// These are the values of the `type` attribute stamped on stored
/// objects. The mapping from name to kind is total over the supported
/// set; anything else is an `UnknownType` error at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ElementKind {
    /// Scalar integer.
    Int,
    /// Scalar float.
    Float,
    /// Opaque text.
    Str,
    /// Homogeneous 1-D sequence.
    List,
    /// N-dimensional numeric array.
    Ndarray,
    /// Nested record (group-backed).
    Dict,
    /// The `None` sentinel used for empty record entries.
    NoneType,
}

impl ElementKind {
    /// The persisted name of this element kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::List => "list",
            Self::Ndarray => "numpy.ndarray",
            Self::Dict => "dict",
            Self::NoneType => "NoneType",
        }
    }

    /// Resolve a persisted element-type name.
    ///
    /// `tuple` maps to `List`, and any name containing `ndarray` maps to
    /// `Ndarray`, so files written with fuller type paths still resolve.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "str" => Some(Self::Str),
            "list" | "tuple" => Some(Self::List),
            "dict" => Some(Self::Dict),
            "NoneType" => Some(Self::NoneType),
            other if other.contains("ndarray") => Some(Self::Ndarray),
            _ => None,
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// TYPED ARRAY
// =============================================================================

/// Homogeneous numeric payload of a `TypedArray`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayData {
    /// Integer elements.
    Int(Vec<i64>),
    /// Float elements.
    Float(Vec<f64>),
}

impl ArrayData {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar element kind of the payload.
    pub fn element_kind(&self) -> ElementKind {
        match self {
            Self::Int(_) => ElementKind::Int,
            Self::Float(_) => ElementKind::Float,
        }
    }
}

/// An n-dimensional numeric array: a shape plus a row-major flat
/// payload. The shape recorded at first write is immutable for the life
/// of the stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl TypedArray {
    /// Build an array from a shape and a row-major payload.
    ///
    /// Fails with `InvalidArgument` if the shape is empty or does not
    /// cover the payload length.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self, StrataError> {
        if shape.is_empty() {
            return Err(StrataError::InvalidArgument(
                "array shape must have at least one axis".to_string(),
            ));
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(StrataError::InvalidArgument(format!(
                "shape {:?} covers {} elements but payload has {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Convenience constructor for integer arrays.
    pub fn from_i64(shape: Vec<usize>, elements: Vec<i64>) -> Result<Self, StrataError> {
        Self::new(shape, ArrayData::Int(elements))
    }

    /// Convenience constructor for float arrays.
    pub fn from_f64(shape: Vec<usize>, elements: Vec<f64>) -> Result<Self, StrataError> {
        Self::new(shape, ArrayData::Float(elements))
    }

    /// The array shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The flat row-major payload.
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Scalar element kind of the array.
    pub fn element_kind(&self) -> ElementKind {
        self.data.element_kind()
    }
}

// =============================================================================
// SEQUENCE
// =============================================================================

/// Payload of a homogeneous 1-D sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SeqData {
    /// Integer elements.
    Int(Vec<i64>),
    /// Float elements.
    Float(Vec<f64>),
    /// Text elements.
    Str(Vec<String>),
}

/// An ordered sequence with a uniform element kind.
///
/// The element kind is recorded explicitly in the element-type attribute
/// at write time because the substrate cannot infer it from raw cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    data: SeqData,
}

impl Sequence {
    /// Wrap a payload.
    pub fn new(data: SeqData) -> Self {
        Self { data }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match &self.data {
            SeqData::Int(v) => v.len(),
            SeqData::Float(v) => v.len(),
            SeqData::Str(v) => v.len(),
        }
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar element kind of the sequence.
    pub fn element_kind(&self) -> ElementKind {
        match &self.data {
            SeqData::Int(_) => ElementKind::Int,
            SeqData::Float(_) => ElementKind::Float,
            SeqData::Str(_) => ElementKind::Str,
        }
    }

    /// The payload.
    pub fn data(&self) -> &SeqData {
        &self.data
    }
}

impl From<Vec<i64>> for Sequence {
    fn from(v: Vec<i64>) -> Self {
        Self::new(SeqData::Int(v))
    }
}

impl From<Vec<f64>> for Sequence {
    fn from(v: Vec<f64>) -> Self {
        Self::new(SeqData::Float(v))
    }
}

impl From<Vec<String>> for Sequence {
    fn from(v: Vec<String>) -> Self {
        Self::new(SeqData::Str(v))
    }
}

// =============================================================================
// QUANTITY
// =============================================================================

/// Residual numeric payload of a quantity once the unit is stripped.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantityPayload {
    /// Scalar integer payload.
    Int(i64),
    /// Scalar float payload.
    Float(f64),
    /// Sequence payload.
    Seq(Sequence),
    /// Array payload.
    Array(TypedArray),
}

impl QuantityPayload {
    /// Element kind used for the per-instance codec dispatch.
    pub fn element_kind(&self) -> ElementKind {
        match self {
            Self::Int(_) => ElementKind::Int,
            Self::Float(_) => ElementKind::Float,
            Self::Seq(_) => ElementKind::List,
            Self::Array(_) => ElementKind::Ndarray,
        }
    }
}

/// A numeric value paired with a physical unit.
///
/// Persisted as payload cells plus a unit-string attribute; the unit is
/// re-parsed back into a `Unit` on read.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    /// The unit-stripped numeric payload.
    pub payload: QuantityPayload,
    /// The physical unit.
    pub unit: Unit,
}

impl Quantity {
    /// Pair a payload with a unit.
    pub fn new(payload: QuantityPayload, unit: Unit) -> Self {
        Self { payload, unit }
    }
}

// =============================================================================
// RECORD
// =============================================================================

/// A composite, heterogeneous key-value entity stored as a group of
/// child variables (and child groups for nested records).
pub type Record = BTreeMap<String, StorageValue>;

// =============================================================================
// STORAGE VALUE
// =============================================================================

/// The closed set of values this engine persists.
///
/// `None` exists only as a record-entry sentinel, and `Series` is
/// produced only by reads of append-mode objects (the full stored
/// extent, one element per append, in insertion order). Neither has a
/// top-level handler: writing them directly is a `TypeMismatch`.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageValue {
    /// Scalar integer.
    Int(i64),
    /// Scalar float.
    Float(f64),
    /// Text.
    Str(String),
    /// N-dimensional numeric array.
    Array(TypedArray),
    /// Homogeneous 1-D sequence.
    Seq(Sequence),
    /// Unit-bearing quantity.
    Quantity(Quantity),
    /// Nested key-value record.
    Record(Record),
    /// Empty record entry.
    None,
    /// Full extent of an append-mode object, read-only.
    Series(Vec<StorageValue>),
}

impl StorageValue {
    /// Short human name of the value's kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Array(_) => "array",
            Self::Seq(_) => "sequence",
            Self::Quantity(_) => "quantity",
            Self::Record(_) => "record",
            Self::None => "none",
            Self::Series(_) => "series",
        }
    }
}

// =============================================================================
// ATTRIBUTE VALUES
// =============================================================================

/// Free-form attribute value attachable to the root, a group, or a
/// stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Text attribute.
    Str(String),
    /// Integer attribute.
    Int(i64),
    /// Float attribute.
    Float(f64),
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// The full error taxonomy of the storage engine.
///
/// All failures are deterministic usage or format errors; this layer
/// performs no retries. `NotFound` is recovered locally inside the
/// bind-for-write paths (it signals "create instead of reuse") and never
/// surfaces from `write`/`append`.
#[derive(Debug, Error)]
pub enum StrataError {
    /// No stored object exists at the path during a read-bind.
    #[error("no stored object at {0}")]
    NotFound(String),

    /// No handler kind is registered for a value kind or persisted tag.
    #[error("no handler known for type '{0}'")]
    UnknownType(String),

    /// The value's runtime kind disagrees with the handler's kind.
    #[error("type mismatch at {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Path of the stored object.
        path: String,
        /// Kind the handler was bound with.
        expected: String,
        /// Kind that was supplied or found.
        actual: String,
    },

    /// The write-once vs append-only discipline was violated.
    #[error("{path} is bound as {bound}-mode data; {attempted} is not allowed")]
    ModeViolation {
        /// Path of the stored object.
        path: String,
        /// Mode fixed at creation.
        bound: &'static str,
        /// Operation that was attempted.
        attempted: &'static str,
    },

    /// The value's shape disagrees with the shape fixed at creation.
    #[error("shape mismatch at {path}: stored shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Path of the stored object.
        path: String,
        /// Per-entry shape fixed at first write.
        expected: Vec<usize>,
        /// Shape of the offered value.
        actual: Vec<usize>,
    },

    /// The quantity's unit disagrees with the unit fixed at creation.
    #[error("unit mismatch at {path}: stored unit '{expected}', got '{actual}'")]
    UnitMismatch {
        /// Path of the stored object.
        path: String,
        /// Unit string fixed at first bind.
        expected: String,
        /// Unit string of the offered value.
        actual: String,
    },

    /// The operation is not supported for this kind of object.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The metadata target names neither a cached group nor a cached
    /// handler.
    #[error("no known object at metadata path {0}")]
    PathNotFound(String),

    /// A malformed argument (negative dimension length, bad unit
    /// expression, inconsistent array shape).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A substrate or serialization failure.
    #[error("storage error: {0}")]
    Storage(String),
}

// =============================================================================
// TESTS
// =============================================================================

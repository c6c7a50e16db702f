//! # Container Substrate
//!
//! The raw hierarchical array store the engine is built on: groups,
//! named dimensions, and typed, dimensioned variables carrying
//! attribute tags, all addressed by canonical hierarchical paths.
//!
//! The rest of the crate consumes this substrate only through the
//! narrow interface of [`RedbContainer`]; dimension policy, type tags,
//! and mode discipline live above it in the handler layer.

mod redb_container;

pub use redb_container::RedbContainer;

use serde::{Deserialize, Serialize};

// =============================================================================
// CELLS
// =============================================================================

/// Storage kind of a variable's cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    /// 64-bit signed integers.
    Int,
    /// 64-bit floats.
    Float,
    /// Opaque text cells.
    Text,
}

/// One stored cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// Integer cell.
    Int(i64),
    /// Float cell.
    Float(f64),
    /// Text cell.
    Text(String),
}

impl CellValue {
    /// The kind of this cell.
    pub fn kind(&self) -> CellKind {
        match self {
            Self::Int(_) => CellKind::Int,
            Self::Float(_) => CellKind::Float,
            Self::Text(_) => CellKind::Text,
        }
    }
}

// =============================================================================
// RECORDS
// =============================================================================

/// A named axis: fixed length, or unlimited for the growth axis.
/// Dimensions are created lazily, shared globally, and never resized or
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRecord {
    /// Declared length; `0` for the unlimited axis.
    pub length: u64,
    /// Whether this is the unlimited growth axis.
    pub unlimited: bool,
}

/// Metadata of a stored variable: its dimension names in order, its
/// cell kind, and the number of rows written so far. A row is the
/// flattened cell payload of one entry along all non-growth axes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRecord {
    /// Dimension names, leading axis first.
    pub dimensions: Vec<String>,
    /// Cell kind of the payload.
    pub kind: CellKind,
    /// Rows written: `0` or `1` for write-once variables, the append
    /// count for growable ones.
    pub rows: u64,
}

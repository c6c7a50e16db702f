//! # strata-core
//!
//! A typed persistence engine over an embedded hierarchical array
//! store.
//!
//! The engine maps structured values - scalars, arrays, sequences,
//! unit-bearing quantities, and nested records - onto a flat container
//! of groups, dimensions, and attributed variables, and maps them back
//! without loss. Every stored object is self-describing: its type tag,
//! storage kind, output mode, and unit are stamped as attributes at
//! creation, so a reader needs nothing but the container file.
//!
//! ## Core Discipline
//!
//! - Objects live at hierarchical `/`-delimited paths; intermediate
//!   groups materialize on demand.
//! - Each object is fixed at first write into exactly one output mode:
//!   write-once overwrite, or append-only growth along the unlimited
//!   `iteration` axis.
//! - Shape and unit are immutable once recorded; violations are typed
//!   errors, never coercions.
//! - Single writer, single thread: no locks, no async, deterministic
//!   iteration everywhere (`BTreeMap`/`BTreeSet` only).

// =============================================================================
// MODULES
// =============================================================================

pub mod container;
pub mod driver;
pub mod handlers;
pub mod layout;
pub mod path;
pub mod types;
pub mod units;

// =============================================================================
// RE-EXPORTS: Value Model
// =============================================================================

pub use types::{
    ArrayData, AttrValue, ElementKind, Quantity, QuantityPayload, Record, SeqData, Sequence,
    StorageValue, StrataError, TypedArray,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use driver::StorageDriver;
pub use handlers::{OutputMode, TypeKey, VariableHandle};
pub use units::Unit;

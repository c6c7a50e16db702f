//! # Persisted Layout
//!
//! Reserved attribute names, storage-kind markers, and dimension names.
//!
//! These strings are the on-file contract: every persisted leaf object
//! carries a type tag, a storage-kind tag, an appendability flag, a unit
//! string (`"NoneType"` when not applicable), and an element-type name.
//! Files written by other tools are readable as long as they honor the
//! same reserved names.

/// Type tag: which handler kind decodes the object.
pub const ATTR_TYPE: &str = "IODriver_Type";

/// Storage-kind tag: `variable` for array-like objects, `group` for
/// records.
pub const ATTR_STORAGE_KIND: &str = "IODriver_Storage_Type";

/// Appendability flag: int `0` (write-once) or `1` (growth-axis
/// leading).
pub const ATTR_APPENDABLE: &str = "IODriver_Appendable";

/// Unit string: a parseable unit expression, or `"NoneType"`.
pub const ATTR_UNIT: &str = "IODriver_Unit";

/// Element-type name: concrete element kind for array-like and quantity
/// objects (`int`, `float`, `list`, `numpy.ndarray`, ...).
pub const ATTR_ELEMENT_TYPE: &str = "type";

/// Unit attribute on record children that carry quantities.
pub const ATTR_CHILD_UNIT: &str = "units";

/// Storage-kind value for array-like leaf objects.
pub const STORAGE_KIND_VARIABLE: &str = "variable";

/// Storage-kind value for records stored as groups.
pub const STORAGE_KIND_GROUP: &str = "group";

/// Unit string stamped on objects that carry no unit.
pub const UNIT_NONE: &str = "NoneType";

/// The shared length-1 dimension used by atomic kinds.
pub const DIM_SCALAR: &str = "scalar";

/// The single unlimited growth axis, leading dimension of every
/// appendable variable.
pub const DIM_ITERATION: &str = "iteration";

/// Name of the shared fixed-length dimension for a given length.
/// One dimension exists per distinct length in use.
pub fn iterable_dimension(length: u64) -> String {
    format!("iterable{length}")
}

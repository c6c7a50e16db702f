//! # Cell Codecs
//!
//! Pure translation between in-memory values and flat substrate cells:
//! inspection (shape, element kind, cell kind, dimension policy) at
//! bind time, encode on write/append, decode on read.

use crate::container::{CellKind, CellValue};
use crate::types::{
    ArrayData, ElementKind, Quantity, QuantityPayload, SeqData, Sequence, StorageValue,
    StrataError, TypedArray,
};
use crate::units::Unit;

// =============================================================================
// INSPECTION
// =============================================================================

/// What a first write establishes about a stored object: everything
/// needed to size its dimensions and stamp its self-description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Inspection {
    /// Per-entry shape (excluding any growth axis).
    pub entry_shape: Vec<usize>,
    /// Whether the object uses the shared `scalar` dimension instead of
    /// per-axis fixed-length dimensions.
    pub uses_scalar_dim: bool,
    /// Element-type name stamped on the object.
    pub elem: ElementKind,
    /// Substrate cell kind.
    pub cell: CellKind,
    /// Unit string, for quantities.
    pub unit: Option<String>,
}

/// Inspect a value about to create a stored object.
///
/// Returns `None` for kinds that have no flat-cell representation
/// (records, the `None` sentinel, read-only series).
pub(crate) fn inspect(value: &StorageValue) -> Option<Inspection> {
    match value {
        StorageValue::Int(_) => Some(Inspection {
            entry_shape: vec![1],
            uses_scalar_dim: true,
            elem: ElementKind::Int,
            cell: CellKind::Int,
            unit: None,
        }),
        StorageValue::Float(_) => Some(Inspection {
            entry_shape: vec![1],
            uses_scalar_dim: true,
            elem: ElementKind::Float,
            cell: CellKind::Float,
            unit: None,
        }),
        StorageValue::Str(_) => Some(Inspection {
            entry_shape: vec![1],
            uses_scalar_dim: true,
            elem: ElementKind::Str,
            cell: CellKind::Text,
            unit: None,
        }),
        StorageValue::Array(array) => Some(Inspection {
            entry_shape: array.shape().to_vec(),
            uses_scalar_dim: false,
            elem: array.element_kind(),
            cell: cell_of_scalar(array.element_kind()),
            unit: None,
        }),
        StorageValue::Seq(seq) => Some(Inspection {
            entry_shape: vec![seq.len()],
            uses_scalar_dim: false,
            elem: seq.element_kind(),
            cell: cell_of_scalar(seq.element_kind()),
            unit: None,
        }),
        StorageValue::Quantity(quantity) => {
            let unit = Some(quantity.unit.to_string());
            match &quantity.payload {
                QuantityPayload::Int(_) => Some(Inspection {
                    entry_shape: vec![1],
                    uses_scalar_dim: true,
                    elem: ElementKind::Int,
                    cell: CellKind::Int,
                    unit,
                }),
                QuantityPayload::Float(_) => Some(Inspection {
                    entry_shape: vec![1],
                    uses_scalar_dim: true,
                    elem: ElementKind::Float,
                    cell: CellKind::Float,
                    unit,
                }),
                QuantityPayload::Seq(seq) => Some(Inspection {
                    entry_shape: vec![seq.len()],
                    uses_scalar_dim: false,
                    elem: ElementKind::List,
                    cell: cell_of_scalar(seq.element_kind()),
                    unit,
                }),
                QuantityPayload::Array(array) => Some(Inspection {
                    entry_shape: array.shape().to_vec(),
                    uses_scalar_dim: false,
                    elem: ElementKind::Ndarray,
                    cell: cell_of_scalar(array.element_kind()),
                    unit,
                }),
            }
        }
        StorageValue::Record(_) | StorageValue::None | StorageValue::Series(_) => None,
    }
}

fn cell_of_scalar(elem: ElementKind) -> CellKind {
    match elem {
        ElementKind::Float => CellKind::Float,
        ElementKind::Str => CellKind::Text,
        _ => CellKind::Int,
    }
}

// =============================================================================
// ENCODE
// =============================================================================

/// Flatten a value into one entry's worth of cells.
///
/// Returns `None` for kinds without a flat-cell representation.
pub(crate) fn encode_entry(value: &StorageValue) -> Option<Vec<CellValue>> {
    match value {
        StorageValue::Int(v) => Some(vec![CellValue::Int(*v)]),
        StorageValue::Float(v) => Some(vec![CellValue::Float(*v)]),
        StorageValue::Str(s) => Some(vec![CellValue::Text(s.clone())]),
        StorageValue::Array(array) => Some(encode_array(array)),
        StorageValue::Seq(seq) => Some(encode_seq(seq)),
        StorageValue::Quantity(quantity) => match &quantity.payload {
            QuantityPayload::Int(v) => Some(vec![CellValue::Int(*v)]),
            QuantityPayload::Float(v) => Some(vec![CellValue::Float(*v)]),
            QuantityPayload::Seq(seq) => Some(encode_seq(seq)),
            QuantityPayload::Array(array) => Some(encode_array(array)),
        },
        StorageValue::Record(_) | StorageValue::None | StorageValue::Series(_) => None,
    }
}

pub(crate) fn encode_array(array: &TypedArray) -> Vec<CellValue> {
    match array.data() {
        ArrayData::Int(v) => v.iter().map(|&x| CellValue::Int(x)).collect(),
        ArrayData::Float(v) => v.iter().map(|&x| CellValue::Float(x)).collect(),
    }
}

pub(crate) fn encode_seq(seq: &Sequence) -> Vec<CellValue> {
    match seq.data() {
        SeqData::Int(v) => v.iter().map(|&x| CellValue::Int(x)).collect(),
        SeqData::Float(v) => v.iter().map(|&x| CellValue::Float(x)).collect(),
        SeqData::Str(v) => v.iter().map(|s| CellValue::Text(s.clone())).collect(),
    }
}

// =============================================================================
// DECODE
// =============================================================================

fn cells_to_i64(cells: &[CellValue], path: &str) -> Result<Vec<i64>, StrataError> {
    cells
        .iter()
        .map(|cell| match cell {
            CellValue::Int(v) => Ok(*v),
            other => Err(StrataError::Storage(format!(
                "expected integer cells at {path}, found {:?}",
                other.kind()
            ))),
        })
        .collect()
}

fn cells_to_f64(cells: &[CellValue], path: &str) -> Result<Vec<f64>, StrataError> {
    cells
        .iter()
        .map(|cell| match cell {
            CellValue::Float(v) => Ok(*v),
            other => Err(StrataError::Storage(format!(
                "expected float cells at {path}, found {:?}",
                other.kind()
            ))),
        })
        .collect()
}

fn cells_to_text(cells: &[CellValue], path: &str) -> Result<Vec<String>, StrataError> {
    cells
        .iter()
        .map(|cell| match cell {
            CellValue::Text(s) => Ok(s.clone()),
            other => Err(StrataError::Storage(format!(
                "expected text cells at {path}, found {:?}",
                other.kind()
            ))),
        })
        .collect()
}

/// Rebuild a sequence from one entry's cells, typed by the cell kind.
pub(crate) fn decode_seq(
    cells: &[CellValue],
    cell: CellKind,
    path: &str,
) -> Result<Sequence, StrataError> {
    let data = match cell {
        CellKind::Int => SeqData::Int(cells_to_i64(cells, path)?),
        CellKind::Float => SeqData::Float(cells_to_f64(cells, path)?),
        CellKind::Text => SeqData::Str(cells_to_text(cells, path)?),
    };
    Ok(Sequence::new(data))
}

/// Rebuild an array from one entry's cells.
pub(crate) fn decode_array(
    cells: &[CellValue],
    cell: CellKind,
    shape: &[usize],
    path: &str,
) -> Result<TypedArray, StrataError> {
    let data = match cell {
        CellKind::Int => ArrayData::Int(cells_to_i64(cells, path)?),
        CellKind::Float => ArrayData::Float(cells_to_f64(cells, path)?),
        CellKind::Text => {
            return Err(StrataError::Storage(format!(
                "arrays cannot be rebuilt from text cells at {path}"
            )));
        }
    };
    TypedArray::new(shape.to_vec(), data)
}

/// Rebuild a scalar from a single-cell entry.
pub(crate) fn decode_scalar(cells: &[CellValue], path: &str) -> Result<StorageValue, StrataError> {
    match cells {
        [CellValue::Int(v)] => Ok(StorageValue::Int(*v)),
        [CellValue::Float(v)] => Ok(StorageValue::Float(*v)),
        [CellValue::Text(s)] => Ok(StorageValue::Str(s.clone())),
        _ => Err(StrataError::Storage(format!(
            "expected a single scalar cell at {path}"
        ))),
    }
}

/// Rebuild a quantity payload from one entry's cells, dispatched on the
/// element kind resolved at bind time.
pub(crate) fn decode_quantity(
    cells: &[CellValue],
    elem: ElementKind,
    cell: CellKind,
    shape: &[usize],
    unit: &str,
    path: &str,
) -> Result<Quantity, StrataError> {
    let payload = match elem {
        ElementKind::Int => match cells {
            [CellValue::Int(v)] => QuantityPayload::Int(*v),
            _ => {
                return Err(StrataError::Storage(format!(
                    "expected one integer cell at {path}"
                )));
            }
        },
        ElementKind::Float => match cells {
            [CellValue::Float(v)] => QuantityPayload::Float(*v),
            _ => {
                return Err(StrataError::Storage(format!(
                    "expected one float cell at {path}"
                )));
            }
        },
        ElementKind::List => QuantityPayload::Seq(decode_seq(cells, cell, path)?),
        ElementKind::Ndarray => QuantityPayload::Array(decode_array(cells, cell, shape, path)?),
        other => {
            return Err(StrataError::UnknownType(format!(
                "quantity cannot carry a payload of type '{other}'"
            )));
        }
    };
    Ok(Quantity::new(payload, Unit::from_stored(unit)?))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_inspection_uses_scalar_dimension() {
        let inspection = inspect(&StorageValue::Int(4)).expect("inspect");
        assert!(inspection.uses_scalar_dim);
        assert_eq!(inspection.entry_shape, vec![1]);
        assert_eq!(inspection.cell, CellKind::Int);
    }

    #[test]
    fn array_inspection_reports_axes() {
        let array = TypedArray::from_f64(vec![2, 3], vec![0.0; 6]).expect("array");
        let inspection = inspect(&StorageValue::Array(array)).expect("inspect");
        assert!(!inspection.uses_scalar_dim);
        assert_eq!(inspection.entry_shape, vec![2, 3]);
        assert_eq!(inspection.elem, ElementKind::Float);
    }

    #[test]
    fn quantity_inspection_strips_unit() {
        let quantity = Quantity::new(QuantityPayload::Int(300), Unit::base("kelvin"));
        let inspection = inspect(&StorageValue::Quantity(quantity)).expect("inspect");
        assert_eq!(inspection.elem, ElementKind::Int);
        assert_eq!(inspection.unit.as_deref(), Some("kelvin"));
    }

    #[test]
    fn records_have_no_flat_encoding() {
        assert!(inspect(&StorageValue::Record(crate::types::Record::new())).is_none());
        assert!(encode_entry(&StorageValue::None).is_none());
    }

    #[test]
    fn seq_encode_decode() {
        let seq = Sequence::from(vec![1i64, 2, 3]);
        let cells = encode_seq(&seq);
        let back = decode_seq(&cells, CellKind::Int, "/s").expect("decode");
        assert_eq!(back, seq);
    }

    #[test]
    fn array_encode_decode() {
        let array = TypedArray::from_i64(vec![2, 2], vec![1, 2, 3, 4]).expect("array");
        let cells = encode_array(&array);
        let back = decode_array(&cells, CellKind::Int, &[2, 2], "/a").expect("decode");
        assert_eq!(back, array);
    }

    #[test]
    fn quantity_decode_reattaches_unit() {
        let cells = vec![CellValue::Float(1.5)];
        let quantity = decode_quantity(
            &cells,
            ElementKind::Float,
            CellKind::Float,
            &[1],
            "/second",
            "/q",
        )
        .expect("decode");
        assert_eq!(quantity.unit, Unit::base("second").pow(-1));
        assert_eq!(quantity.payload, QuantityPayload::Float(1.5));
    }
}

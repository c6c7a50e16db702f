//! # Record Storage
//!
//! Records are stored structurally as a group: one child variable per
//! entry (scalars, sequences, arrays, quantities, the `None` sentinel)
//! and one child group per nested record. Each child carries an
//! element-type attribute so decoding never guesses, and quantity
//! children additionally carry a unit attribute.
//!
//! Records are whole-value overwrite only; the append discipline never
//! applies to them.

use super::{Binding, HandlerState, OutputMode};
use crate::container::{CellKind, CellValue, RedbContainer};
use crate::layout;
use crate::path;
use crate::types::{
    AttrValue, ElementKind, QuantityPayload, Record, Sequence, StorageValue, StrataError,
    TypedArray,
};
use crate::units::Unit;

use super::codec;

/// Attach to an existing group-backed record.
pub(super) fn bind_read(state: &mut HandlerState) -> Result<(), StrataError> {
    if !state.container.group_exists(&state.path)? {
        // A variable at the target must not be shadowed by a record
        // group.
        if state.container.variable(&state.path)?.is_some() {
            let actual = match state.container.attribute(&state.path, layout::ATTR_TYPE)? {
                Some(AttrValue::Str(tag)) => tag,
                _ => layout::STORAGE_KIND_VARIABLE.to_string(),
            };
            return Err(StrataError::TypeMismatch {
                path: state.path.clone(),
                expected: super::TypeKey::Record.tag().to_string(),
                actual,
            });
        }
        return Err(StrataError::NotFound(state.path.clone()));
    }
    let mut degraded = false;
    match state.container.attribute(&state.path, layout::ATTR_TYPE)? {
        Some(AttrValue::Str(tag)) => match super::TypeKey::from_tag(&tag) {
            Some(super::TypeKey::Record) => {}
            Some(key) => {
                return Err(StrataError::TypeMismatch {
                    path: state.path.clone(),
                    expected: super::TypeKey::Record.tag().to_string(),
                    actual: key.tag().to_string(),
                });
            }
            None => return Err(StrataError::UnknownType(tag)),
        },
        _ => {
            tracing::warn!(
                path = %state.path,
                "group carries no type tag; binding best-effort, read-only"
            );
            degraded = true;
        }
    }
    state.binding = Some(Binding {
        mode: OutputMode::Write,
        entry_shape: Vec::new(),
        elem: ElementKind::Dict,
        cell: CellKind::Int,
        unit: None,
        degraded,
    });
    Ok(())
}

/// Create the backing group and stamp its self-description.
pub(super) fn create(state: &mut HandlerState) -> Result<(), StrataError> {
    state.container.ensure_group(&state.path)?;
    state
        .container
        .set_attribute(&state.path, layout::ATTR_TYPE, &"dict".into())?;
    state.container.set_attribute(
        &state.path,
        layout::ATTR_STORAGE_KIND,
        &layout::STORAGE_KIND_GROUP.into(),
    )?;
    state
        .container
        .set_attribute(&state.path, layout::ATTR_APPENDABLE, &0i64.into())?;
    tracing::debug!(path = %state.path, "created record group");
    state.binding = Some(Binding {
        mode: OutputMode::Write,
        entry_shape: Vec::new(),
        elem: ElementKind::Dict,
        cell: CellKind::Int,
        unit: None,
        degraded: false,
    });
    Ok(())
}

/// Overwrite the record's entries, one child per key.
pub(super) fn encode(state: &HandlerState, record: &Record) -> Result<(), StrataError> {
    state
        .container
        .ensure_dimension(layout::DIM_SCALAR, 1, false)?;
    encode_into(&state.container, &state.path, record)
}

fn encode_into(
    container: &RedbContainer,
    group: &str,
    record: &Record,
) -> Result<(), StrataError> {
    for (name, value) in record {
        let child = path::join(group, name);
        match value {
            StorageValue::Record(nested) => {
                if container.variable(&child)?.is_some() {
                    return Err(StrataError::TypeMismatch {
                        path: child,
                        expected: "variable entry".to_string(),
                        actual: "record".to_string(),
                    });
                }
                container.ensure_group(&child)?;
                container.set_attribute(&child, layout::ATTR_ELEMENT_TYPE, &"dict".into())?;
                container.set_attribute(
                    &child,
                    layout::ATTR_STORAGE_KIND,
                    &layout::STORAGE_KIND_GROUP.into(),
                )?;
                encode_into(container, &child, nested)?;
            }
            StorageValue::None => {
                // The sentinel occupies one integer cell; the type tag
                // alone distinguishes it at decode time.
                write_child(
                    container,
                    &child,
                    true,
                    &[],
                    CellKind::Int,
                    vec![CellValue::Int(0)],
                    ElementKind::NoneType.name(),
                    None,
                )?;
            }
            StorageValue::Int(v) => write_child(
                container,
                &child,
                true,
                &[],
                CellKind::Int,
                vec![CellValue::Int(*v)],
                ElementKind::Int.name(),
                None,
            )?,
            StorageValue::Float(v) => write_child(
                container,
                &child,
                true,
                &[],
                CellKind::Float,
                vec![CellValue::Float(*v)],
                ElementKind::Float.name(),
                None,
            )?,
            StorageValue::Str(s) => write_child(
                container,
                &child,
                true,
                &[],
                CellKind::Text,
                vec![CellValue::Text(s.clone())],
                ElementKind::Str.name(),
                None,
            )?,
            StorageValue::Seq(seq) => encode_seq_child(container, &child, seq, None)?,
            StorageValue::Array(array) => encode_array_child(container, &child, array, None)?,
            StorageValue::Quantity(quantity) => {
                let unit = Some(quantity.unit.to_string());
                match &quantity.payload {
                    QuantityPayload::Int(v) => write_child(
                        container,
                        &child,
                        true,
                        &[],
                        CellKind::Int,
                        vec![CellValue::Int(*v)],
                        ElementKind::Int.name(),
                        unit,
                    )?,
                    QuantityPayload::Float(v) => write_child(
                        container,
                        &child,
                        true,
                        &[],
                        CellKind::Float,
                        vec![CellValue::Float(*v)],
                        ElementKind::Float.name(),
                        unit,
                    )?,
                    QuantityPayload::Seq(seq) => encode_seq_child(container, &child, seq, unit)?,
                    QuantityPayload::Array(array) => {
                        encode_array_child(container, &child, array, unit)?;
                    }
                }
            }
            StorageValue::Series(_) => {
                return Err(StrataError::TypeMismatch {
                    path: child,
                    expected: "storable record entry".to_string(),
                    actual: value.kind_name().to_string(),
                });
            }
        }
    }
    Ok(())
}

fn encode_seq_child(
    container: &RedbContainer,
    child: &str,
    seq: &Sequence,
    unit: Option<String>,
) -> Result<(), StrataError> {
    let cell = match seq.element_kind() {
        ElementKind::Float => CellKind::Float,
        ElementKind::Str => CellKind::Text,
        _ => CellKind::Int,
    };
    write_child(
        container,
        child,
        false,
        &[seq.len()],
        cell,
        codec::encode_seq(seq),
        seq.element_kind().name(),
        unit,
    )
}

fn encode_array_child(
    container: &RedbContainer,
    child: &str,
    array: &TypedArray,
    unit: Option<String>,
) -> Result<(), StrataError> {
    let cell = match array.element_kind() {
        ElementKind::Float => CellKind::Float,
        _ => CellKind::Int,
    };
    write_child(
        container,
        child,
        false,
        array.shape(),
        cell,
        codec::encode_array(array),
        ElementKind::Ndarray.name(),
        unit,
    )
}

/// Write one record entry into its child variable, creating it on first
/// use and verifying shape and cell kind against it on overwrite.
fn write_child(
    container: &RedbContainer,
    child: &str,
    uses_scalar_dim: bool,
    shape: &[usize],
    cell: CellKind,
    cells: Vec<CellValue>,
    type_name: &str,
    unit: Option<String>,
) -> Result<(), StrataError> {
    let mut dimensions: Vec<String> = Vec::new();
    if uses_scalar_dim {
        dimensions.push(layout::DIM_SCALAR.to_string());
    } else {
        for &length in shape {
            dimensions.push(layout::iterable_dimension(length as u64));
        }
    }
    match container.variable(child)? {
        Some(existing) => {
            if existing.dimensions != dimensions {
                return Err(StrataError::ShapeMismatch {
                    path: child.to_string(),
                    expected: resolve_shape(container, &existing.dimensions)?,
                    actual: resolve_shape(container, &dimensions)?,
                });
            }
            if existing.kind != cell {
                let stored = match container.attribute(child, layout::ATTR_ELEMENT_TYPE)? {
                    Some(AttrValue::Str(name)) => name,
                    _ => "unknown".to_string(),
                };
                return Err(StrataError::TypeMismatch {
                    path: child.to_string(),
                    expected: stored,
                    actual: type_name.to_string(),
                });
            }
        }
        None => {
            if !uses_scalar_dim {
                for (&length, name) in shape.iter().zip(&dimensions) {
                    container.ensure_dimension(name, length as u64, false)?;
                }
            }
            container.create_variable(child, &dimensions, cell)?;
        }
    }
    container.set_attribute(child, layout::ATTR_ELEMENT_TYPE, &type_name.into())?;
    match unit {
        Some(unit) => container.set_attribute(child, layout::ATTR_CHILD_UNIT, &unit.into())?,
        // A unit left over from a previous quantity entry would make
        // the overwritten value decode as a quantity again.
        None => container.remove_attribute(child, layout::ATTR_CHILD_UNIT)?,
    }
    container.write_row(child, 0, &cells)
}

fn resolve_shape(
    container: &RedbContainer,
    dimensions: &[String],
) -> Result<Vec<usize>, StrataError> {
    dimensions
        .iter()
        .map(|name| match container.dimension(name)? {
            Some(record) => Ok(record.length as usize),
            None => Ok(0),
        })
        .collect()
}

/// Rebuild the record from its children, failing fast on any child with
/// a missing or unknown element-type tag.
pub(super) fn decode(state: &HandlerState) -> Result<Record, StrataError> {
    decode_group(&state.container, &state.path)
}

fn decode_group(container: &RedbContainer, group: &str) -> Result<Record, StrataError> {
    let mut record = Record::new();
    for name in container.child_variables(group)? {
        let child = path::join(group, &name);
        record.insert(name, decode_child(container, &child)?);
    }
    for name in container.child_groups(group)? {
        let child = path::join(group, &name);
        record.insert(
            name,
            StorageValue::Record(decode_group(container, &child)?),
        );
    }
    Ok(record)
}

fn decode_child(container: &RedbContainer, child: &str) -> Result<StorageValue, StrataError> {
    let variable = container.variable(child)?.ok_or_else(|| {
        StrataError::Storage(format!("record entry at {child} vanished during decode"))
    })?;
    let type_name = match container.attribute(child, layout::ATTR_ELEMENT_TYPE)? {
        Some(AttrValue::Str(name)) => name,
        _ => {
            return Err(StrataError::UnknownType(format!(
                "record entry at {child} has no element-type tag"
            )));
        }
    };
    let elem =
        ElementKind::from_name(&type_name).ok_or(StrataError::UnknownType(type_name.clone()))?;
    let value = match elem {
        ElementKind::NoneType => StorageValue::None,
        ElementKind::Dict => {
            return Err(StrataError::Storage(format!(
                "record entry at {child} is tagged as a nested record but stored as a variable"
            )));
        }
        ElementKind::Int | ElementKind::Float | ElementKind::Str
            if variable.dimensions == [layout::DIM_SCALAR.to_string()] =>
        {
            let cells = container.row(child, 0)?;
            codec::decode_scalar(&cells, child)?
        }
        ElementKind::Int | ElementKind::Float | ElementKind::Str => {
            let cells = container.row(child, 0)?;
            StorageValue::Seq(codec::decode_seq(&cells, variable.kind, child)?)
        }
        ElementKind::List => {
            let cells = container.row(child, 0)?;
            StorageValue::Seq(codec::decode_seq(&cells, variable.kind, child)?)
        }
        ElementKind::Ndarray => {
            let shape = resolve_shape(container, &variable.dimensions)?;
            let cells = container.row(child, 0)?;
            StorageValue::Array(codec::decode_array(&cells, variable.kind, &shape, child)?)
        }
    };
    match container.attribute(child, layout::ATTR_CHILD_UNIT)? {
        Some(AttrValue::Str(stored)) => {
            let unit = Unit::from_stored(&stored)?;
            let payload = match value {
                StorageValue::Int(v) => QuantityPayload::Int(v),
                StorageValue::Float(v) => QuantityPayload::Float(v),
                StorageValue::Seq(seq) => QuantityPayload::Seq(seq),
                StorageValue::Array(array) => QuantityPayload::Array(array),
                other => {
                    return Err(StrataError::Storage(format!(
                        "record entry at {child} carries a unit but holds {}",
                        other.kind_name()
                    )));
                }
            };
            Ok(StorageValue::Quantity(crate::types::Quantity::new(
                payload, unit,
            )))
        }
        _ => Ok(value),
    }
}

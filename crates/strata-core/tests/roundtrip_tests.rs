//! # End-to-End Round-Trip Tests
//!
//! Full driver-level exercises over a real container file: every
//! storable kind written and read back, the write/append mode
//! discipline, shape and unit immutability, record fidelity, metadata
//! stamping, and reopening a container from disk.

use strata_core::{
    OutputMode, Quantity, QuantityPayload, Record, Sequence, StorageDriver, StorageValue,
    StrataError, TypeKey, TypedArray, Unit,
};

fn scratch() -> (tempfile::TempDir, StorageDriver) {
    let dir = tempfile::tempdir().expect("tempdir");
    let driver = StorageDriver::create(dir.path().join("store.strata")).expect("create");
    (dir, driver)
}

// =============================================================================
// SIX-KIND ROUND TRIPS
// =============================================================================

mod roundtrips {
    use super::*;

    /// An integer written once reads back unchanged.
    #[test]
    fn int_roundtrip() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/data/count", TypeKey::Int)
            .expect("handle");
        handle.write(&StorageValue::Int(42)).expect("write");
        assert_eq!(handle.read().expect("read"), StorageValue::Int(42));
        assert_eq!(handle.mode(), Some(OutputMode::Write));
    }

    /// A float written once reads back unchanged, and may be
    /// overwritten in place.
    #[test]
    fn float_roundtrip_and_overwrite() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/data/energy", TypeKey::Float)
            .expect("handle");
        handle.write(&StorageValue::Float(3.5)).expect("write");
        assert_eq!(handle.read().expect("read"), StorageValue::Float(3.5));

        handle.write(&StorageValue::Float(-1.25)).expect("rewrite");
        assert_eq!(handle.read().expect("read"), StorageValue::Float(-1.25));
    }

    /// A string round-trips, including an overwrite with a string of a
    /// different length.
    #[test]
    fn str_roundtrip() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/data/name", TypeKey::Str)
            .expect("handle");
        handle
            .write(&StorageValue::Str("abc".to_string()))
            .expect("write");
        handle
            .write(&StorageValue::Str("a longer replacement".to_string()))
            .expect("rewrite");
        assert_eq!(
            handle.read().expect("read"),
            StorageValue::Str("a longer replacement".to_string())
        );
    }

    /// A 2x2 array keeps its shape and payload through storage.
    #[test]
    fn array_roundtrip() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/data/matrix", TypeKey::Array)
            .expect("handle");
        let array = TypedArray::from_i64(vec![2, 2], vec![1, 2, 3, 4]).expect("array");
        handle
            .write(&StorageValue::Array(array.clone()))
            .expect("write");
        assert_eq!(handle.read().expect("read"), StorageValue::Array(array));
    }

    /// A homogeneous sequence round-trips with its element kind.
    #[test]
    fn sequence_roundtrip() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/data/tuple", TypeKey::Seq)
            .expect("handle");
        let seq = Sequence::from(vec![1i64, 2, 3]);
        handle.write(&StorageValue::Seq(seq.clone())).expect("write");
        assert_eq!(handle.read().expect("read"), StorageValue::Seq(seq));
    }

    /// A unit-bearing quantity keeps both payload and unit.
    #[test]
    fn quantity_roundtrip() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/data/temperature", TypeKey::Quantity)
            .expect("handle");
        let quantity = Quantity::new(QuantityPayload::Int(300), Unit::base("kelvin"));
        handle
            .write(&StorageValue::Quantity(quantity.clone()))
            .expect("write");
        assert_eq!(
            handle.read().expect("read"),
            StorageValue::Quantity(quantity)
        );
    }

    /// A quantity carrying an array payload round-trips with shape,
    /// unit, and element kind intact.
    #[test]
    fn quantity_array_roundtrip() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/data/positions", TypeKey::Quantity)
            .expect("handle");
        let array = TypedArray::from_f64(vec![2, 3], vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5])
            .expect("array");
        let quantity = Quantity::new(QuantityPayload::Array(array), Unit::base("nanometer"));
        handle
            .write(&StorageValue::Quantity(quantity.clone()))
            .expect("write");
        assert_eq!(
            handle.read().expect("read"),
            StorageValue::Quantity(quantity)
        );
    }

    /// A denominator-only unit survives the leading-slash string form.
    #[test]
    fn inverse_unit_roundtrip() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/data/rate", TypeKey::Quantity)
            .expect("handle");
        let quantity = Quantity::new(QuantityPayload::Float(2.5), Unit::base("second").pow(-1));
        handle
            .write(&StorageValue::Quantity(quantity.clone()))
            .expect("write");
        assert_eq!(
            handle.read().expect("read"),
            StorageValue::Quantity(quantity)
        );
    }
}

// =============================================================================
// APPEND DISCIPLINE
// =============================================================================

mod append {
    use super::*;

    /// Appends accumulate in order and read back as the full series.
    #[test]
    fn appends_accumulate_in_order() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/traj/energy", TypeKey::Float)
            .expect("handle");
        for value in [1.0, 2.0, 3.0] {
            handle.append(&StorageValue::Float(value)).expect("append");
        }
        assert_eq!(handle.mode(), Some(OutputMode::Append));
        assert_eq!(
            handle.read().expect("read"),
            StorageValue::Series(vec![
                StorageValue::Float(1.0),
                StorageValue::Float(2.0),
                StorageValue::Float(3.0),
            ])
        );
        assert_eq!(handle.read_all().expect("read_all").len(), 3);
    }

    /// Appended arrays share one per-entry shape; each entry decodes
    /// individually.
    #[test]
    fn appended_arrays_keep_entry_shape() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/traj/frames", TypeKey::Array)
            .expect("handle");
        let first = TypedArray::from_i64(vec![2], vec![1, 2]).expect("array");
        let second = TypedArray::from_i64(vec![2], vec![3, 4]).expect("array");
        handle
            .append(&StorageValue::Array(first.clone()))
            .expect("append");
        handle
            .append(&StorageValue::Array(second.clone()))
            .expect("append");
        assert_eq!(
            handle.read_all().expect("read_all"),
            vec![StorageValue::Array(first), StorageValue::Array(second)]
        );
    }

    /// An object bound by a write refuses appends, and vice versa.
    #[test]
    fn modes_are_mutually_exclusive() {
        let (_dir, mut driver) = scratch();
        let written = driver
            .create_storage_variable("/a", TypeKey::Int)
            .expect("handle");
        written.write(&StorageValue::Int(1)).expect("write");
        assert!(matches!(
            written.append(&StorageValue::Int(2)),
            Err(StrataError::ModeViolation { .. })
        ));

        let appended = driver
            .create_storage_variable("/b", TypeKey::Int)
            .expect("handle");
        appended.append(&StorageValue::Int(1)).expect("append");
        assert!(matches!(
            appended.write(&StorageValue::Int(2)),
            Err(StrataError::ModeViolation { .. })
        ));
    }
}

// =============================================================================
// IMMUTABILITY CHECKS
// =============================================================================

mod immutability {
    use super::*;

    /// The per-entry shape recorded at first write never changes.
    #[test]
    fn shape_is_fixed_at_first_write() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/m", TypeKey::Array)
            .expect("handle");
        let square = TypedArray::from_i64(vec![2, 2], vec![1, 2, 3, 4]).expect("array");
        handle.write(&StorageValue::Array(square)).expect("write");

        let flat = TypedArray::from_i64(vec![4], vec![1, 2, 3, 4]).expect("array");
        assert!(matches!(
            handle.write(&StorageValue::Array(flat)),
            Err(StrataError::ShapeMismatch { .. })
        ));
    }

    /// Sequence length is part of the fixed shape.
    #[test]
    fn sequence_length_is_fixed() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/s", TypeKey::Seq)
            .expect("handle");
        handle
            .append(&StorageValue::Seq(Sequence::from(vec![1i64, 2, 3])))
            .expect("append");
        assert!(matches!(
            handle.append(&StorageValue::Seq(Sequence::from(vec![1i64, 2]))),
            Err(StrataError::ShapeMismatch { .. })
        ));
    }

    /// The unit recorded at first bind never changes.
    #[test]
    fn unit_is_fixed_at_first_write() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/q", TypeKey::Quantity)
            .expect("handle");
        let kelvin = Quantity::new(QuantityPayload::Float(300.0), Unit::base("kelvin"));
        handle
            .write(&StorageValue::Quantity(kelvin))
            .expect("write");

        let celsius = Quantity::new(QuantityPayload::Float(26.85), Unit::base("celsius"));
        assert!(matches!(
            handle.write(&StorageValue::Quantity(celsius)),
            Err(StrataError::UnitMismatch { .. })
        ));
    }

    /// A value of the wrong kind never reaches the substrate.
    #[test]
    fn kind_mismatch_rejected() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/i", TypeKey::Int)
            .expect("handle");
        assert!(matches!(
            handle.write(&StorageValue::Float(1.0)),
            Err(StrataError::TypeMismatch { .. })
        ));
        assert!(matches!(
            handle.write(&StorageValue::Series(Vec::new())),
            Err(StrataError::TypeMismatch { .. })
        ));
    }
}

// =============================================================================
// RECORDS
// =============================================================================

mod records {
    use super::*;

    fn sample_record() -> Record {
        let mut inner = Record::new();
        inner.insert("depth".to_string(), StorageValue::Int(2));

        let mut record = Record::new();
        record.insert("count".to_string(), StorageValue::Int(7));
        record.insert("scale".to_string(), StorageValue::Float(0.5));
        record.insert("label".to_string(), StorageValue::Str("run-1".to_string()));
        record.insert("missing".to_string(), StorageValue::None);
        record.insert(
            "steps".to_string(),
            StorageValue::Seq(Sequence::from(vec![10i64, 20, 30])),
        );
        record.insert(
            "grid".to_string(),
            StorageValue::Array(
                TypedArray::from_f64(vec![2, 2], vec![0.0, 0.1, 0.2, 0.3]).expect("array"),
            ),
        );
        record.insert(
            "temperature".to_string(),
            StorageValue::Quantity(Quantity::new(
                QuantityPayload::Float(298.15),
                Unit::base("kelvin"),
            )),
        );
        record.insert("nested".to_string(), StorageValue::Record(inner));
        record
    }

    /// A heterogeneous record, nested one level, reads back
    /// key-for-key identical.
    #[test]
    fn record_roundtrip() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/meta/options", TypeKey::Record)
            .expect("handle");
        let record = sample_record();
        handle
            .write(&StorageValue::Record(record.clone()))
            .expect("write");
        assert_eq!(handle.read().expect("read"), StorageValue::Record(record));
    }

    /// Overwriting a quantity entry with a plain value drops the unit:
    /// the re-read record holds the plain value, not a re-wrapped
    /// quantity.
    #[test]
    fn record_entry_unit_cleared_on_overwrite() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/meta/options", TypeKey::Record)
            .expect("handle");

        let mut first = Record::new();
        first.insert(
            "x".to_string(),
            StorageValue::Quantity(Quantity::new(
                QuantityPayload::Float(1.0),
                Unit::base("kelvin"),
            )),
        );
        handle.write(&StorageValue::Record(first)).expect("write");

        let mut second = Record::new();
        second.insert("x".to_string(), StorageValue::Float(2.0));
        handle
            .write(&StorageValue::Record(second.clone()))
            .expect("rewrite");
        assert_eq!(handle.read().expect("read"), StorageValue::Record(second));
    }

    /// Records are whole-value overwrite only.
    #[test]
    fn record_append_not_supported() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/meta/options", TypeKey::Record)
            .expect("handle");
        assert!(matches!(
            handle.append(&StorageValue::Record(Record::new())),
            Err(StrataError::NotSupported(_))
        ));
    }

    /// Overwriting a record entry with an incompatibly shaped value is
    /// rejected, leaving the entry's schema intact.
    #[test]
    fn record_entry_shape_is_fixed() {
        let (_dir, mut driver) = scratch();
        let handle = driver
            .create_storage_variable("/meta/options", TypeKey::Record)
            .expect("handle");

        let mut first = Record::new();
        first.insert(
            "steps".to_string(),
            StorageValue::Seq(Sequence::from(vec![1i64, 2, 3])),
        );
        handle.write(&StorageValue::Record(first)).expect("write");

        let mut second = Record::new();
        second.insert(
            "steps".to_string(),
            StorageValue::Seq(Sequence::from(vec![1i64, 2])),
        );
        assert!(matches!(
            handle.write(&StorageValue::Record(second)),
            Err(StrataError::ShapeMismatch { .. })
        ));
    }
}

// =============================================================================
// METADATA AND PERSISTENCE
// =============================================================================

mod persistence {
    use super::*;

    /// Metadata buffered before the first write lands on the stored
    /// object, alongside metadata added after binding.
    #[test]
    fn metadata_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("store.strata");
        {
            let mut driver = StorageDriver::create(&file).expect("create");
            let handle = driver
                .create_storage_variable("/data/x", TypeKey::Int)
                .expect("handle");
            handle.add_metadata("source", "instrument-a").expect("pre");
            handle.write(&StorageValue::Int(5)).expect("write");
            handle.add_metadata("revision", 2i64).expect("post");
            driver.add_metadata("title", "demo", "/").expect("root");
        }
        let container =
            strata_core::container::RedbContainer::open(&file).expect("reopen container");
        assert_eq!(
            container.attribute("/data/x", "source").expect("get"),
            Some("instrument-a".into())
        );
        assert_eq!(
            container.attribute("/data/x", "revision").expect("get"),
            Some(2i64.into())
        );
        assert_eq!(
            container.attribute("/", "title").expect("get"),
            Some("demo".into())
        );
    }

    /// Everything written in one session resolves and decodes in the
    /// next, including the output mode.
    #[test]
    fn reopen_resolves_kinds_and_modes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("store.strata");
        {
            let mut driver = StorageDriver::create(&file).expect("create");
            driver
                .create_storage_variable("/once", TypeKey::Str)
                .expect("handle")
                .write(&StorageValue::Str("fixed".to_string()))
                .expect("write");
            let series = driver
                .create_storage_variable("/traj/e", TypeKey::Float)
                .expect("handle");
            series.append(&StorageValue::Float(0.5)).expect("append");
            series.append(&StorageValue::Float(1.5)).expect("append");
            let mut record = Record::new();
            record.insert("n".to_string(), StorageValue::Int(3));
            driver
                .create_storage_variable("/meta", TypeKey::Record)
                .expect("handle")
                .write(&StorageValue::Record(record))
                .expect("write");
        }

        let mut driver = StorageDriver::open(&file).expect("open");
        let once = driver.get_variable_handler("/once").expect("resolve");
        assert_eq!(once.kind(), TypeKey::Str);
        assert_eq!(
            once.read().expect("read"),
            StorageValue::Str("fixed".to_string())
        );

        let series = driver.get_variable_handler("/traj/e").expect("resolve");
        assert_eq!(series.kind(), TypeKey::Float);
        assert_eq!(
            series.read().expect("read"),
            StorageValue::Series(vec![StorageValue::Float(0.5), StorageValue::Float(1.5)])
        );
        assert_eq!(series.mode(), Some(OutputMode::Append));
        series.append(&StorageValue::Float(2.5)).expect("append");
        assert_eq!(series.read_all().expect("read_all").len(), 3);

        let meta = driver.get_variable_handler("/meta").expect("resolve");
        assert_eq!(meta.kind(), TypeKey::Record);
    }

    /// An existing record group is never shadowed by a scalar variable
    /// bound at the same path, and a variable is never shadowed by a
    /// record group.
    #[test]
    fn existing_objects_cannot_be_shadowed_across_kinds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("store.strata");
        {
            let mut driver = StorageDriver::create(&file).expect("create");
            let mut record = Record::new();
            record.insert("n".to_string(), StorageValue::Int(3));
            driver
                .create_storage_variable("/obj", TypeKey::Record)
                .expect("handle")
                .write(&StorageValue::Record(record))
                .expect("write");
            driver
                .create_storage_variable("/val", TypeKey::Int)
                .expect("handle")
                .write(&StorageValue::Int(5))
                .expect("write");
        }

        // A fresh session has empty caches, so the conflict must be
        // caught at bind time, against the stored self-description.
        let mut driver = StorageDriver::open(&file).expect("open");
        let scalar = driver
            .create_storage_variable("/obj", TypeKey::Int)
            .expect("handle");
        assert!(matches!(
            scalar.write(&StorageValue::Int(7)),
            Err(StrataError::TypeMismatch { .. })
        ));

        let record = driver
            .create_storage_variable("/val", TypeKey::Record)
            .expect("handle");
        assert!(matches!(
            record.write(&StorageValue::Record(Record::new())),
            Err(StrataError::TypeMismatch { .. })
        ));

        // The stored objects are untouched.
        drop((scalar, record, driver));
        let mut driver = StorageDriver::open(&file).expect("reopen");
        let obj = driver.get_variable_handler("/obj").expect("resolve");
        assert_eq!(obj.kind(), TypeKey::Record);
        let val = driver.get_variable_handler("/val").expect("resolve");
        assert_eq!(val.read().expect("read"), StorageValue::Int(5));
    }

    /// Resolving a handler for a path that holds nothing fails, but
    /// non-canonical spellings of a stored path resolve.
    #[test]
    fn lookup_normalizes_paths() {
        let (_dir, mut driver) = scratch();
        driver
            .create_storage_variable("/data/x", TypeKey::Int)
            .expect("handle")
            .write(&StorageValue::Int(1))
            .expect("write");
        let handle = driver.get_variable_handler("data//x/").expect("resolve");
        assert_eq!(handle.read().expect("read"), StorageValue::Int(1));
        assert!(matches!(
            driver.get_variable_handler("/data/y"),
            Err(StrataError::NotFound(_))
        ));
    }
}

// =============================================================================
// LEGACY OBJECTS
// =============================================================================

mod legacy {
    use super::*;
    use strata_core::container::{CellKind, CellValue, RedbContainer};

    /// A variable written without the self-description attributes still
    /// resolves and reads best-effort, with the kind inferred from its
    /// cell kind; writes and appends on it are refused.
    #[test]
    fn tagless_variable_reads_best_effort_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("store.strata");
        {
            let container = RedbContainer::create(&file).expect("container");
            container.ensure_dimension("scalar", 1, false).expect("dim");
            container
                .create_variable("/legacy", &["scalar".to_string()], CellKind::Int)
                .expect("create");
            container
                .write_row("/legacy", 0, &[CellValue::Int(9)])
                .expect("row");
        }

        let mut driver = StorageDriver::open(&file).expect("open");
        let handle = driver.get_variable_handler("/legacy").expect("resolve");
        assert_eq!(handle.kind(), TypeKey::Int);
        assert_eq!(handle.read().expect("read"), StorageValue::Int(9));
        assert_eq!(handle.mode(), Some(OutputMode::Write));
        assert!(matches!(
            handle.write(&StorageValue::Int(1)),
            Err(StrataError::NotSupported(_))
        ));
        assert!(matches!(
            handle.append(&StorageValue::Int(1)),
            Err(StrataError::NotSupported(_))
        ));
    }

    /// A tagless variable whose leading axis is the unlimited growth
    /// dimension is inferred appendable and reads its full extent.
    #[test]
    fn tagless_growable_variable_reads_full_extent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("store.strata");
        {
            let container = RedbContainer::create(&file).expect("container");
            container.ensure_dimension("iteration", 0, true).expect("dim");
            container.ensure_dimension("scalar", 1, false).expect("dim");
            container
                .create_variable(
                    "/series",
                    &["iteration".to_string(), "scalar".to_string()],
                    CellKind::Float,
                )
                .expect("create");
            container
                .write_row("/series", 0, &[CellValue::Float(0.5)])
                .expect("row");
            container
                .write_row("/series", 1, &[CellValue::Float(1.5)])
                .expect("row");
        }

        let mut driver = StorageDriver::open(&file).expect("open");
        let handle = driver.get_variable_handler("/series").expect("resolve");
        assert_eq!(handle.kind(), TypeKey::Float);
        assert_eq!(
            handle.read().expect("read"),
            StorageValue::Series(vec![StorageValue::Float(0.5), StorageValue::Float(1.5)])
        );
        assert!(matches!(
            handle.append(&StorageValue::Float(2.5)),
            Err(StrataError::NotSupported(_))
        ));
    }
}

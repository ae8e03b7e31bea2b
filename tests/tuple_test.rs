//! Integration tests for schemas and tuples

use std::cmp::Ordering;
use std::sync::Arc;

use rand::Rng;
use strata::common::StrataError;
use strata::tuple::{DataType, Schema, Tuple, Value};

fn person_schema() -> Arc<Schema> {
    Schema::builder()
        .column("id", DataType::Integer)
        .column("name", DataType::Char(8))
        .column("active", DataType::Boolean)
        .build_arc()
}

#[test]
fn test_tuple_values_round_trip_through_bytes() {
    let schema = person_schema();
    let tuple = Tuple::new(
        Arc::clone(&schema),
        &[Value::Integer(-42), Value::from("grace"), Value::Boolean(true)],
    )
    .unwrap();

    let copy = Tuple::from_bytes(Arc::clone(&schema), tuple.data()).unwrap();
    assert_eq!(
        copy.values(),
        vec![Value::Integer(-42), Value::from("grace"), Value::Boolean(true)]
    );
    assert_eq!(copy, tuple);
}

#[test]
fn test_tuple_char_too_long() {
    let result = Tuple::new(
        person_schema(),
        &[Value::Integer(1), Value::from("much too long"), Value::Boolean(false)],
    );
    assert!(result.is_err());
}

#[test]
fn test_tuple_ordering_is_column_major() {
    let schema = person_schema();
    let make = |id: i32, name: &str, active: bool| {
        Tuple::new(Arc::clone(&schema), &[id.into(), name.into(), active.into()]).unwrap()
    };

    assert!(make(1, "zed", true) < make(2, "amy", false));
    assert!(make(1, "amy", true) < make(1, "bob", false));
    assert!(make(1, "amy", false) < make(1, "amy", true));
    // Shorter names sort before their extensions
    assert!(make(1, "am", true) < make(1, "amy", true));
    assert_eq!(
        make(3, "x", true).compare(&make(3, "x", true)).unwrap(),
        Ordering::Equal
    );
}

#[test]
fn test_tuple_compare_different_schemas() {
    let ints = Schema::builder().column("a", DataType::Integer).build_arc();
    let bools = Schema::builder().column("a", DataType::Boolean).build_arc();
    let a = Tuple::new(ints, &[Value::Integer(1)]).unwrap();
    let b = Tuple::new(bools, &[Value::Boolean(true)]).unwrap();

    assert!(matches!(a.compare(&b), Err(StrataError::SchemaMismatch(_))));
    assert_eq!(a.partial_cmp(&b), None);
    assert_ne!(a, b);
}

#[test]
fn test_tuple_random_integer_comparison() {
    let schema = Schema::builder()
        .column("hi", DataType::Integer)
        .column("lo", DataType::Integer)
        .build_arc();
    let mut rng = rand::thread_rng();

    for _ in 0..1000 {
        let a: (i32, i32) = (rng.gen_range(-5..5), rng.gen());
        let b: (i32, i32) = (rng.gen_range(-5..5), rng.gen());
        let ta = Tuple::new(Arc::clone(&schema), &[a.0.into(), a.1.into()]).unwrap();
        let tb = Tuple::new(Arc::clone(&schema), &[b.0.into(), b.1.into()]).unwrap();
        assert_eq!(ta.compare(&tb).unwrap(), a.cmp(&b), "{:?} vs {:?}", a, b);
    }
}

#[test]
fn test_schema_serialization() {
    let schema = person_schema();
    let bytes = schema.serialize();
    let decoded = Schema::deserialize(&bytes).unwrap();

    assert_eq!(&decoded, schema.as_ref());
    assert_eq!(decoded.width(), 13);
    assert_eq!(decoded.column_index("active"), Some(2));
    assert_eq!(decoded.column(1).unwrap().offset(), 4);

    assert!(Schema::deserialize(&bytes[..bytes.len() - 1]).is_err());
    assert!(matches!(
        Schema::deserialize(&[1, 0]),
        Err(StrataError::TruncatedSchema)
    ));
}

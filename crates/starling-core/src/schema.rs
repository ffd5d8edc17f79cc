//! Unification of schemas inferred from many JSON files.
//!
//! Every source file is inferred on its own, so the same field can come back
//! as `Null` in one file (all values null) and `Utf8` in another, or as
//! `Int64` where all numbers happened to be whole and `Float64` elsewhere.
//! [`unify_schemas`] folds them into one schema that every file can be
//! decoded against.

use arrow::datatypes::{DataType, Field, FieldRef, Fields, Schema, SchemaRef};
use snafu::prelude::*;
use std::sync::Arc;

/// Two files disagree on a field type in a way that cannot be widened.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
#[snafu(display("Field '{field}' has incompatible types {first} and {second}"))]
pub struct UnifyError {
    pub field: String,
    pub first: DataType,
    pub second: DataType,
}

/// Union of field types, or `None` when they cannot be reconciled.
fn unify_types(first: &DataType, second: &DataType) -> Option<DataType> {
    match (first, second) {
        (a, b) if a == b => Some(a.clone()),
        (DataType::Null, other) | (other, DataType::Null) => Some(other.clone()),
        (DataType::Int64, DataType::Float64) | (DataType::Float64, DataType::Int64) => {
            Some(DataType::Float64)
        }
        (DataType::List(a), DataType::List(b)) => {
            let item = unify_types(a.data_type(), b.data_type())?;
            Some(DataType::List(Arc::new(Field::new(a.name(), item, true))))
        }
        (DataType::Struct(a), DataType::Struct(b)) => {
            let merged = unify_fields(a.iter().chain(b.iter()).cloned()).ok()?;
            Some(DataType::Struct(merged))
        }
        _ => None,
    }
}

/// Merge fields by name, keeping the order of first appearance.
fn unify_fields(fields: impl IntoIterator<Item = FieldRef>) -> Result<Fields, UnifyError> {
    let mut merged: Vec<(String, DataType)> = Vec::new();

    for field in fields {
        match merged.iter_mut().find(|(name, _)| name == field.name()) {
            Some((name, existing)) => {
                *existing = unify_types(existing, field.data_type()).context(UnifySnafu {
                    field: name.clone(),
                    first: existing.clone(),
                    second: field.data_type().clone(),
                })?;
            }
            None => merged.push((field.name().clone(), field.data_type().clone())),
        }
    }

    Ok(merged
        .into_iter()
        .map(|(name, data_type)| Field::new(name, data_type, true))
        .collect())
}

/// Replace types that never saw a value with `Utf8`.
fn finalize(data_type: &DataType) -> DataType {
    match data_type {
        DataType::Null => DataType::Utf8,
        DataType::List(item) => DataType::List(Arc::new(Field::new(
            item.name(),
            finalize(item.data_type()),
            true,
        ))),
        DataType::Struct(fields) => DataType::Struct(
            fields
                .iter()
                .map(|f| Field::new(f.name(), finalize(f.data_type()), true))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Fold per-file schemas into a single nullable union schema.
///
/// Fields are ordered by first appearance across `schemas`. `Null` unifies
/// with anything, `Int64` and `Float64` widen to `Float64`, and any other
/// disagreement is an error. Fields that are null everywhere become `Utf8`.
pub fn unify_schemas<'a>(
    schemas: impl IntoIterator<Item = &'a Schema>,
) -> Result<SchemaRef, UnifyError> {
    let fields = unify_fields(
        schemas
            .into_iter()
            .flat_map(|schema| schema.fields().iter().cloned()),
    )?;

    let fields: Vec<Field> = fields
        .iter()
        .map(|f| Field::new(f.name(), finalize(f.data_type()), true))
        .collect();

    Ok(Arc::new(Schema::new(fields)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(fields: &[(&str, DataType)]) -> Schema {
        Schema::new(
            fields
                .iter()
                .map(|(name, dt)| Field::new(*name, dt.clone(), true))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_union_keeps_first_appearance_order() {
        let a = schema(&[("song_id", DataType::Utf8), ("year", DataType::Int64)]);
        let b = schema(&[("title", DataType::Utf8), ("song_id", DataType::Utf8)]);

        let unified = unify_schemas([&a, &b]).unwrap();
        let names: Vec<_> = unified.fields().iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["song_id", "year", "title"]);
        assert!(unified.fields().iter().all(|f| f.is_nullable()));
    }

    #[test]
    fn test_null_unifies_with_any_type() {
        let a = schema(&[("artist_latitude", DataType::Null)]);
        let b = schema(&[("artist_latitude", DataType::Float64)]);

        let unified = unify_schemas([&a, &b]).unwrap();
        assert_eq!(unified.field(0).data_type(), &DataType::Float64);
    }

    #[test]
    fn test_int_widens_to_float() {
        let a = schema(&[("duration", DataType::Int64)]);
        let b = schema(&[("duration", DataType::Float64)]);

        let unified = unify_schemas([&a, &b]).unwrap();
        assert_eq!(unified.field(0).data_type(), &DataType::Float64);
    }

    #[test]
    fn test_all_null_becomes_utf8() {
        let a = schema(&[("artist_location", DataType::Null)]);
        let b = schema(&[("artist_location", DataType::Null)]);

        let unified = unify_schemas([&a, &b]).unwrap();
        assert_eq!(unified.field(0).data_type(), &DataType::Utf8);
    }

    #[test]
    fn test_incompatible_types_conflict() {
        let a = schema(&[("year", DataType::Int64)]);
        let b = schema(&[("year", DataType::Utf8)]);

        let err = unify_schemas([&a, &b]).unwrap_err();
        assert_eq!(err.field, "year");
        assert_eq!(err.first, DataType::Int64);
        assert_eq!(err.second, DataType::Utf8);
    }

    #[test]
    fn test_nested_struct_fields_merge() {
        let inner_a = Fields::from(vec![Field::new("x", DataType::Int64, true)]);
        let inner_b = Fields::from(vec![
            Field::new("x", DataType::Float64, true),
            Field::new("y", DataType::Null, true),
        ]);
        let a = schema(&[("meta", DataType::Struct(inner_a))]);
        let b = schema(&[("meta", DataType::Struct(inner_b))]);

        let unified = unify_schemas([&a, &b]).unwrap();
        let DataType::Struct(fields) = unified.field(0).data_type() else {
            panic!("Expected struct");
        };
        assert_eq!(fields[0].data_type(), &DataType::Float64);
        assert_eq!(fields[1].data_type(), &DataType::Utf8);
    }
}

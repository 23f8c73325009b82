//! Record materialization.
//!
//! Converts positional rows into typed records (through a cached
//! column-to-property map per record type) or into [`DynamicRecord`]s.

use crate::db::cursor::DataRow;
use crate::error::{DbError, DbResult};
use crate::models::{HostType, PropertyType, Value};
use crate::record::{PropertyInfo, PropertySource, PropertyValue, Record};
use serde_json::{Map, Value as JsonValue};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};
use tracing::debug;

/// Column name → writable property, for one record type.
#[derive(Debug, Clone, Default)]
pub struct PropertyMap {
    /// Keys are lowercased column names
    entries: HashMap<String, &'static PropertyInfo>,
}

impl PropertyMap {
    /// Build the map for `T`. Explicit column annotations win over property
    /// names; read-only accessors, ignored and nested properties are skipped.
    pub fn build<T: Record>() -> Self {
        let mut entries = HashMap::new();
        for property in T::properties() {
            if !property.writable || property.ignored || property.is_nested() {
                continue;
            }
            let key = property.column_name().to_lowercase();
            if property.column.is_some() {
                entries.insert(key, property);
            } else {
                entries.entry(key).or_insert(property);
            }
        }
        Self { entries }
    }

    /// Property for a column name, ignoring case.
    pub fn get(&self, column: &str) -> Option<&'static PropertyInfo> {
        self.entries.get(&column.to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static GLOBAL_PROPERTY_MAPS: LazyLock<PropertyMapCache> = LazyLock::new(PropertyMapCache::new);

/// Process-wide cache of property maps, keyed by record type.
#[derive(Debug, Default)]
pub struct PropertyMapCache {
    maps: Mutex<HashMap<TypeId, Arc<PropertyMap>>>,
}

impl PropertyMapCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static PropertyMapCache {
        &GLOBAL_PROPERTY_MAPS
    }

    /// Get the map for `T`, building it on first use.
    pub fn get<T: Record>(&self) -> Arc<PropertyMap> {
        let mut maps = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        maps.entry(TypeId::of::<T>())
            .or_insert_with(|| {
                debug!(record = T::type_name(), "Building property map");
                Arc::new(PropertyMap::build::<T>())
            })
            .clone()
    }

    /// Drop the cached map for `T`. Returns whether one was cached.
    pub fn invalidate<T: Record>(&self) -> bool {
        let mut maps = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        maps.remove(&TypeId::of::<T>()).is_some()
    }

    pub fn clear(&self) {
        self.maps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.maps.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Materialize the current row into a new `T`.
///
/// Columns without a matching property are ignored; properties without a
/// column keep their default. Database nulls become the property's zero
/// value. A value that cannot be coerced fails with a type mismatch.
pub fn parse_object<T: Record, R: DataRow + ?Sized>(row: &R) -> DbResult<T> {
    let map = PropertyMapCache::global().get::<T>();
    let mut item = T::default();

    for index in 0..row.field_count() {
        let column = row.name(index)?;
        let Some(property) = map.get(column) else {
            continue;
        };
        let value = row.value(index)?;
        item.set(property.name, value)
            .map_err(|e| DbError::type_mismatch(column, e.source_type, e.target_type))?;
    }
    Ok(item)
}

/// Materialize the current row into a dynamic record.
pub fn parse_dynamic<R: DataRow + ?Sized>(row: &R) -> DbResult<DynamicRecord> {
    let count = row.field_count();
    let mut fields: Vec<DynamicField> = Vec::with_capacity(count);

    for index in 0..count {
        let base = sanitize_identifier(row.name(index).unwrap_or_default(), index);
        let taken = |name: &str| fields.iter().any(|f| f.name.eq_ignore_ascii_case(name));
        let mut name = base.clone();
        let mut suffix = index;
        while taken(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        fields.push(DynamicField {
            name,
            host_type: row.field_type(index)?,
            value: row.value(index)?,
        });
    }
    Ok(DynamicRecord { fields })
}

/// Turn a column name into a valid identifier.
///
/// Characters other than alphanumerics and `_` are dropped; a leading digit
/// gets a `_` prefix; an empty result becomes `Field_<index>`.
pub fn sanitize_identifier(name: &str, index: usize) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    match cleaned.chars().next() {
        None => format!("Field_{}", index),
        Some(c) if c.is_ascii_digit() => format!("_{}", cleaned),
        Some(_) => cleaned,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct DynamicField {
    name: String,
    host_type: Option<HostType>,
    value: Value,
}

/// A name/value record built from a row, independent of any record type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicRecord {
    fields: Vec<DynamicField>,
}

impl DynamicRecord {
    /// Value of a field by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| &f.value)
    }

    /// Field names in column order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|f| &f.value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert to a JSON object. Binary values are UTF-8 decoded when
    /// `decode_binary` is set and valid, base64 otherwise.
    pub fn to_json(&self, decode_binary: bool) -> Map<String, JsonValue> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.value.to_json(decode_binary)))
            .collect()
    }
}

impl DataRow for DynamicRecord {
    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn name(&self, index: usize) -> DbResult<&str> {
        self.fields
            .get(index)
            .map(|f| f.name.as_str())
            .ok_or_else(|| DbError::invalid_argument(format!("No field at index {}", index)))
    }

    fn field_type(&self, index: usize) -> DbResult<Option<HostType>> {
        self.fields
            .get(index)
            .map(|f| f.host_type.or_else(|| f.value.host_type()))
            .ok_or_else(|| DbError::invalid_argument(format!("No field at index {}", index)))
    }

    fn value(&self, index: usize) -> DbResult<Value> {
        self.fields
            .get(index)
            .map(|f| f.value.clone())
            .ok_or_else(|| DbError::invalid_argument(format!("No field at index {}", index)))
    }
}

impl PropertySource for DynamicRecord {
    fn property_values(&self) -> Vec<PropertyValue> {
        self.fields
            .iter()
            .map(|f| {
                let host = f
                    .host_type
                    .or_else(|| f.value.host_type())
                    .unwrap_or(HostType::String);
                PropertyValue {
                    name: f.name.clone(),
                    ty: PropertyType::nullable(host),
                    value: f.value.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::cursor::ResultRow;
    use crate::db::types::ResultColumn;
    use crate::impl_record;

    #[derive(Debug, Default, PartialEq)]
    struct Customer {
        customer_id: i64,
        name: String,
        email: Option<String>,
        score: i32,
        display: String,
    }

    impl_record! {
        Customer {
            customer_id: i64 => key(),
            name: String => column("FullName"),
            email: Option<String>,
            score: i32,
            display: String => get_only(),
        }
    }

    fn row(columns: &[(&str, Option<HostType>)], values: Vec<Value>) -> ResultRow {
        let columns: Vec<ResultColumn> = columns
            .iter()
            .map(|(name, host)| ResultColumn {
                name: name.to_string(),
                type_name: String::new(),
                host_type: *host,
            })
            .collect();
        ResultRow::new(Arc::from(columns), values)
    }

    #[test]
    fn test_property_map_uses_annotations_and_skips_get_only() {
        let map = PropertyMap::build::<Customer>();
        assert_eq!(map.get("FULLNAME").map(|p| p.name), Some("name"));
        assert!(map.get("name").is_none());
        assert!(map.get("display").is_none());
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_parse_object_missing_and_extra_columns() {
        let row = row(
            &[
                ("CUSTOMER_ID", Some(HostType::Int64)),
                ("fullname", Some(HostType::String)),
                ("unrelated", Some(HostType::Int32)),
                ("email", Some(HostType::String)),
            ],
            vec![
                Value::Int64(9),
                Value::from("Grace"),
                Value::Int32(1),
                Value::Null,
            ],
        );
        let customer: Customer = parse_object(&row).unwrap();
        assert_eq!(customer.customer_id, 9);
        assert_eq!(customer.name, "Grace");
        assert_eq!(customer.email, None);
        assert_eq!(customer.score, 0);
    }

    #[test]
    fn test_parse_object_null_becomes_zero_value() {
        let row = row(&[("score", Some(HostType::Int32))], vec![Value::Null]);
        let customer: Customer = parse_object(&row).unwrap();
        assert_eq!(customer.score, 0);
    }

    #[test]
    fn test_parse_object_type_mismatch_names_column() {
        let row = row(&[("score", Some(HostType::String))], vec![Value::from("high")]);
        let err = parse_object::<Customer, _>(&row).unwrap_err();
        match err {
            DbError::TypeMismatch {
                column,
                source_type,
                target_type,
            } => {
                assert_eq!(column, "score");
                assert_eq!(source_type, "String");
                assert_eq!(target_type, "i32");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_object_rejects_out_of_range_float() {
        let row = row(
            &[("customer_id", Some(HostType::Int64))],
            vec![Value::Float64(1e30)],
        );
        let err = parse_object::<Customer, _>(&row).unwrap_err();
        assert!(matches!(
            err,
            DbError::TypeMismatch { ref column, ref target_type, .. }
                if column == "customer_id" && target_type == "i64"
        ));
    }

    #[test]
    fn test_parse_dynamic_sanitizes_names() {
        let row = row(
            &[
                ("order id", None),
                ("1st", None),
                ("", None),
                ("order-id", None),
            ],
            vec![
                Value::Int32(1),
                Value::Int32(2),
                Value::Int32(3),
                Value::Int32(4),
            ],
        );
        let record = parse_dynamic(&row).unwrap();
        let names: Vec<_> = record.names().collect();
        assert_eq!(names, vec!["orderid", "_1st", "Field_2", "orderid_3"]);
        assert_eq!(record.get("ORDERID"), Some(&Value::Int32(1)));
        assert_eq!(record.field_type(0).unwrap(), Some(HostType::Int32));
    }

    #[test]
    fn test_parse_dynamic_suffixes_stay_unique() {
        let row = row(
            &[("a_2", None), ("a", None), ("a", None), ("a", None)],
            vec![
                Value::Int32(1),
                Value::Int32(2),
                Value::Int32(3),
                Value::Int32(4),
            ],
        );
        let record = parse_dynamic(&row).unwrap();
        let names: Vec<_> = record.names().collect();
        assert_eq!(names, vec!["a_2", "a", "a_3", "a_4"]);
        assert_eq!(record.get("a_2"), Some(&Value::Int32(1)));
    }

    #[test]
    fn test_dynamic_record_to_json() {
        let row = row(
            &[("id", None), ("blob", None)],
            vec![Value::Int64(1), Value::Bytes(b"hi".to_vec())],
        );
        let record = parse_dynamic(&row).unwrap();
        let json = record.to_json(true);
        assert_eq!(json["id"], JsonValue::from(1));
        assert_eq!(json["blob"], JsonValue::from("hi"));
    }

    #[test]
    fn test_property_map_cache_lifecycle() {
        let cache = PropertyMapCache::new();
        let first = cache.get::<Customer>();
        let second = cache.get::<Customer>();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert!(cache.invalidate::<Customer>());
        assert!(!cache.invalidate::<Customer>());
        assert!(cache.is_empty());
    }
}

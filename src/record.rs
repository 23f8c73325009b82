//! Record reflection.
//!
//! A `Record` is a plain struct whose fields can be enumerated, read and
//! written by name. The `impl_record!` macro generates the implementation,
//! including per-field annotations (column name, key, identity, sizes):
//!
//! ```ignore
//! #[derive(Debug, Default)]
//! struct User {
//!     user_id: i64,
//!     name: String,
//!     email: Option<String>,
//! }
//!
//! impl_record! {
//!     User (table = "Users") {
//!         user_id: i64 => key().identity(),
//!         name: String => column("UserName").max_length(100),
//!         email: Option<String>,
//!     }
//! }
//! ```

use crate::models::value::{ConversionError, DbValue, HostType, PropertyType, Value};

/// Metadata for one record property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyInfo {
    pub name: &'static str,
    /// Explicit column name; overrides `name` when mapping to columns.
    pub column: Option<&'static str>,
    pub ty: PropertyType,
    pub readable: bool,
    pub writable: bool,
    pub key: bool,
    pub identity: bool,
    pub read_only: bool,
    pub max_length: Option<u32>,
    pub precision: Option<(u8, u8)>,
    pub ignored: bool,
}

impl PropertyInfo {
    pub const fn new(name: &'static str, ty: PropertyType) -> Self {
        Self {
            name,
            column: None,
            ty,
            readable: true,
            writable: true,
            key: false,
            identity: false,
            read_only: false,
            max_length: None,
            precision: None,
            ignored: false,
        }
    }

    /// Property info for a field of type `T`.
    pub const fn of<T: DbValue>(name: &'static str) -> Self {
        Self::new(name, T::PROPERTY_TYPE)
    }

    pub const fn column(self, column: &'static str) -> Self {
        Self {
            column: Some(column),
            ..self
        }
    }

    pub const fn key(self) -> Self {
        Self { key: true, ..self }
    }

    /// Engine-assigned value; implies read-only.
    pub const fn identity(self) -> Self {
        Self {
            identity: true,
            read_only: true,
            ..self
        }
    }

    pub const fn read_only(self) -> Self {
        Self {
            read_only: true,
            ..self
        }
    }

    /// Property can be read but never written by materialization.
    pub const fn get_only(self) -> Self {
        Self {
            writable: false,
            ..self
        }
    }

    pub const fn max_length(self, max_length: u32) -> Self {
        Self {
            max_length: Some(max_length),
            ..self
        }
    }

    pub const fn precision(self, precision: u8, scale: u8) -> Self {
        Self {
            precision: Some((precision, scale)),
            ..self
        }
    }

    /// Exclude the property from schemas, parameters and materialization.
    pub const fn ignore(self) -> Self {
        Self {
            ignored: true,
            ..self
        }
    }

    /// Column this property maps to.
    pub fn column_name(&self) -> &'static str {
        self.column.unwrap_or(self.name)
    }

    /// Dotted names address nested members and never map to a column.
    pub fn is_nested(&self) -> bool {
        self.name.contains('.') || self.column_name().contains('.')
    }
}

/// Type-level annotations: table and schema names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableAttributes {
    pub table: Option<&'static str>,
    pub schema: Option<&'static str>,
}

impl TableAttributes {
    pub const NONE: Self = Self {
        table: None,
        schema: None,
    };

    pub const fn table(self, table: &'static str) -> Self {
        Self {
            table: Some(table),
            ..self
        }
    }

    pub const fn schema(self, schema: &'static str) -> Self {
        Self {
            schema: Some(schema),
            ..self
        }
    }
}

/// A struct whose properties can be enumerated and accessed by name.
///
/// `Default` stands in for instance creation.
pub trait Record: Default + PropertySource + Send + Sync + 'static {
    fn type_name() -> &'static str;

    fn table() -> TableAttributes {
        TableAttributes::NONE
    }

    /// Properties in declaration order.
    fn properties() -> &'static [PropertyInfo];

    /// Read a property by its Rust name. `None` if there is no such property.
    fn get(&self, property: &str) -> Option<Value>;

    /// Write a property by its Rust name.
    ///
    /// Returns `Ok(false)` if there is no such property and an error if the
    /// value cannot be coerced into the field type.
    fn set(&mut self, property: &str, value: Value) -> Result<bool, ConversionError>;

    /// Look up property metadata by Rust name.
    fn property(name: &str) -> Option<&'static PropertyInfo> {
        Self::properties().iter().find(|p| p.name == name)
    }
}

/// A named, typed value read from a property source.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyValue {
    pub name: String,
    pub ty: PropertyType,
    pub value: Value,
}

/// Read-only view over named values, used to bind parameters.
pub trait PropertySource {
    fn property_values(&self) -> Vec<PropertyValue>;
}

/// Property values of a record, named by their effective column names.
///
/// Unreadable, ignored and nested properties are skipped.
pub fn record_values<T: Record>(record: &T) -> Vec<PropertyValue> {
    T::properties()
        .iter()
        .filter(|p| p.readable && !p.ignored && !p.is_nested())
        .filter_map(|p| {
            record.get(p.name).map(|value| PropertyValue {
                name: p.column_name().to_string(),
                ty: p.ty,
                value,
            })
        })
        .collect()
}

/// An ordered list of ad-hoc named values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Value)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, replacing any previous value with the same name.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PropertySource for Params {
    fn property_values(&self) -> Vec<PropertyValue> {
        self.entries
            .iter()
            .map(|(name, value)| PropertyValue {
                name: name.clone(),
                ty: value
                    .host_type()
                    .map(PropertyType::required)
                    .unwrap_or(PropertyType::nullable(HostType::String)),
                value: value.clone(),
            })
            .collect()
    }
}

/// Implement [`Record`] and [`PropertySource`] for a struct.
///
/// Each field is listed with its type and optional [`PropertyInfo`] builder
/// calls after `=>`. Type-level `table`/`schema` annotations go in parentheses
/// after the type name.
#[macro_export]
macro_rules! impl_record {
    (
        $ty:ident $( ( $( $attr:ident = $attr_val:expr ),* $(,)? ) )? {
            $( $field:ident : $fty:ty $( => $( $method:ident ( $( $arg:expr ),* ) ).+ )? ),* $(,)?
        }
    ) => {
        impl $crate::record::Record for $ty {
            fn type_name() -> &'static str {
                stringify!($ty)
            }

            fn table() -> $crate::record::TableAttributes {
                $crate::record::TableAttributes::NONE $( $( .$attr($attr_val) )* )?
            }

            fn properties() -> &'static [$crate::record::PropertyInfo] {
                const PROPERTIES: &[$crate::record::PropertyInfo] = &[
                    $(
                        $crate::record::PropertyInfo::of::<$fty>(stringify!($field))
                            $( $( .$method( $( $arg ),* ) )+ )?
                    ),*
                ];
                PROPERTIES
            }

            fn get(&self, property: &str) -> Option<$crate::models::Value> {
                match property {
                    $(
                        stringify!($field) => {
                            Some(<$fty as $crate::models::DbValue>::to_value(&self.$field))
                        }
                    )*
                    _ => None,
                }
            }

            fn set(
                &mut self,
                property: &str,
                value: $crate::models::Value,
            ) -> Result<bool, $crate::models::ConversionError> {
                match property {
                    $(
                        stringify!($field) => {
                            self.$field = <$fty as $crate::models::DbValue>::from_value(value)?;
                            Ok(true)
                        }
                    )*
                    _ => {
                        let _ = value;
                        Ok(false)
                    }
                }
            }
        }

        impl $crate::record::PropertySource for $ty {
            fn property_values(&self) -> Vec<$crate::record::PropertyValue> {
                $crate::record::record_values(self)
            }
        }
    };
}

//! Column type definitions for generated views.
//!
//! Maps FHIR primitive type names onto the T-SQL types used for casting
//! and for describing the result set to callers.

use serde::{Deserialize, Serialize};

/// Information about a column in a generated view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnInfo {
    /// The column name.
    pub name: String,

    /// The column's data type.
    pub col_type: ColumnType,

    /// Human-readable description of the column.
    pub description: Option<String>,
}

impl ColumnInfo {
    /// Create a new column info.
    pub fn new(name: impl Into<String>, col_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            col_type,
            description: None,
        }
    }

    /// Set the column description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Data types supported by SQL on FHIR columns, T-SQL flavoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// String-like values (string, code, uri, id, ...).
    #[default]
    String,

    /// 32-bit integers (integer, positiveInt, unsignedInt).
    Integer,

    /// 64-bit integers (integer64).
    BigInt,

    /// Decimal values.
    Decimal,

    /// Boolean values.
    Boolean,

    /// Date values.
    Date,

    /// DateTime values.
    DateTime,

    /// Instant values (precise timestamp).
    Instant,

    /// Time values.
    Time,

    /// Base64 encoded binary data.
    Base64Binary,

    /// JSON array expressions (collection columns).
    Json,
}

impl ColumnType {
    /// Map a FHIR primitive type name onto a column type.
    ///
    /// Unknown names map to `String`; the validator rejects unrecognised
    /// names before generation, so this is only reached with known input.
    pub fn from_fhir_type(type_str: &str) -> Self {
        match type_str {
            "integer" | "positiveInt" | "unsignedInt" => Self::Integer,
            "integer64" => Self::BigInt,
            "decimal" => Self::Decimal,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "dateTime" => Self::DateTime,
            "instant" => Self::Instant,
            "time" => Self::Time,
            "base64Binary" => Self::Base64Binary,
            _ => Self::String,
        }
    }

    /// The T-SQL type name used in `CAST` expressions.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::String => "NVARCHAR(MAX)",
            Self::Integer => "INT",
            Self::BigInt => "BIGINT",
            Self::Decimal => "DECIMAL(18,6)",
            Self::Boolean => "BIT",
            Self::Date | Self::DateTime | Self::Instant => "DATETIME2",
            Self::Time => "TIME",
            Self::Base64Binary => "VARBINARY(MAX)",
            Self::Json => "NVARCHAR(MAX)",
        }
    }

    /// Whether scalar expressions of this type need an explicit cast.
    ///
    /// `NVARCHAR(MAX)` is what `JSON_VALUE` already returns; `BIT` uses a
    /// `CASE` form instead of a cast.
    pub fn needs_cast(&self) -> bool {
        !matches!(self, Self::String | Self::Json | Self::Boolean)
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::BigInt => write!(f, "integer64"),
            Self::Decimal => write!(f, "decimal"),
            Self::Boolean => write!(f, "boolean"),
            Self::Date => write!(f, "date"),
            Self::DateTime => write!(f, "dateTime"),
            Self::Instant => write!(f, "instant"),
            Self::Time => write!(f, "time"),
            Self::Base64Binary => write!(f, "base64Binary"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// FHIR primitive type names accepted in `Column.type`.
pub(crate) const FHIR_PRIMITIVE_TYPES: &[&str] = &[
    "base64Binary",
    "boolean",
    "canonical",
    "code",
    "date",
    "dateTime",
    "decimal",
    "id",
    "instant",
    "integer",
    "integer64",
    "markdown",
    "oid",
    "positiveInt",
    "string",
    "time",
    "unsignedInt",
    "uri",
    "url",
    "uuid",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_type_from_fhir_type() {
        assert_eq!(ColumnType::from_fhir_type("string"), ColumnType::String);
        assert_eq!(ColumnType::from_fhir_type("code"), ColumnType::String);
        assert_eq!(ColumnType::from_fhir_type("id"), ColumnType::String);
        assert_eq!(ColumnType::from_fhir_type("integer"), ColumnType::Integer);
        assert_eq!(
            ColumnType::from_fhir_type("positiveInt"),
            ColumnType::Integer
        );
        assert_eq!(ColumnType::from_fhir_type("integer64"), ColumnType::BigInt);
        assert_eq!(ColumnType::from_fhir_type("boolean"), ColumnType::Boolean);
        assert_eq!(ColumnType::from_fhir_type("dateTime"), ColumnType::DateTime);
        assert_eq!(
            ColumnType::from_fhir_type("base64Binary"),
            ColumnType::Base64Binary
        );
    }

    #[test]
    fn test_sql_type_mapping() {
        assert_eq!(ColumnType::String.sql_type(), "NVARCHAR(MAX)");
        assert_eq!(ColumnType::Boolean.sql_type(), "BIT");
        assert_eq!(ColumnType::Integer.sql_type(), "INT");
        assert_eq!(ColumnType::BigInt.sql_type(), "BIGINT");
        assert_eq!(ColumnType::Decimal.sql_type(), "DECIMAL(18,6)");
        assert_eq!(ColumnType::Date.sql_type(), "DATETIME2");
        assert_eq!(ColumnType::Instant.sql_type(), "DATETIME2");
        assert_eq!(ColumnType::Time.sql_type(), "TIME");
        assert_eq!(ColumnType::Base64Binary.sql_type(), "VARBINARY(MAX)");
    }

    #[test]
    fn test_needs_cast() {
        assert!(!ColumnType::String.needs_cast());
        assert!(!ColumnType::Boolean.needs_cast());
        assert!(!ColumnType::Json.needs_cast());
        assert!(ColumnType::Date.needs_cast());
        assert!(ColumnType::Integer.needs_cast());
    }

    #[test]
    fn test_primitive_type_list_contains_core_types() {
        for t in ["boolean", "id", "integer64", "dateTime"] {
            assert!(FHIR_PRIMITIVE_TYPES.contains(&t), "missing {t}");
        }
    }
}

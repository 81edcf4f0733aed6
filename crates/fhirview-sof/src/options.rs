//! Transpiler configuration.

use crate::ident;
use crate::{Error, Result};

/// Source table and naming configuration for the transpiler.
///
/// The core accepts configuration only through this struct; nothing is
/// read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileOptions {
    /// Name of the source table holding FHIR resources.
    pub table_name: String,

    /// Schema of the source table.
    pub schema_name: String,

    /// Column holding the resource id.
    pub resource_id_column: String,

    /// Column holding the resource JSON document.
    pub resource_json_column: String,

    /// Upper bound on the number of branches a `unionAll` expansion may
    /// produce before the transpiler refuses the input.
    pub max_branches: usize,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self {
            table_name: "fhir_resources".to_string(),
            schema_name: "dbo".to_string(),
            resource_id_column: "id".to_string(),
            resource_json_column: "json".to_string(),
            max_branches: 1024,
        }
    }
}

impl TranspileOptions {
    /// Validate every configured name as a SQL Server identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Emit`] naming the offending option.
    pub fn validate(&self) -> Result<()> {
        for (option, value) in [
            ("tableName", &self.table_name),
            ("schemaName", &self.schema_name),
            ("resourceIdColumn", &self.resource_id_column),
            ("resourceJsonColumn", &self.resource_json_column),
        ] {
            if let Some(message) = ident::identifier_error(value) {
                return Err(Error::emit(format!("invalid {option}: {message}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = TranspileOptions::default();
        assert_eq!(options.table_name, "fhir_resources");
        assert_eq!(options.schema_name, "dbo");
        assert_eq!(options.resource_id_column, "id");
        assert_eq!(options.resource_json_column, "json");
        assert_eq!(options.max_branches, 1024);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_reserved_table_name_rejected() {
        let options = TranspileOptions {
            table_name: "Select".to_string(),
            ..Default::default()
        };
        let err = options.validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("reserved word"), "got: {message}");
        assert!(message.contains("tableName"), "got: {message}");
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let options = TranspileOptions {
            schema_name: "my schema".to_string(),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }
}

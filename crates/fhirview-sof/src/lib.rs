//! SQL on FHIR ViewDefinition to T-SQL transpiler.
//!
//! This crate compiles FHIR ViewDefinition resources into T-SQL queries
//! for Microsoft SQL Server (2017+). A ViewDefinition declares a tabular
//! projection over FHIR JSON resources stored in a table of
//! `(id, resource_type, json)` rows; the transpiler emits a single
//! `SELECT` (or a `UNION ALL` of selects) whose rows and columns match
//! the ViewDefinition's semantics.
//!
//! # Components
//!
//! - [`ViewDefinition`] - Parsed and validated ViewDefinition model
//! - [`SqlGenerator`] - Compiles a ViewDefinition into T-SQL
//! - [`TranspileOptions`] - Source table, schema and column configuration
//!
//! # Example
//!
//! ```
//! use fhirview_sof::{transpile, ViewDefinition, TranspileOptions};
//! use serde_json::json;
//!
//! let view = ViewDefinition::from_json(&json!({
//!     "resourceType": "ViewDefinition",
//!     "resource": "Patient",
//!     "status": "active",
//!     "select": [{
//!         "column": [{"name": "pid", "path": "id", "type": "id"}]
//!     }]
//! })).unwrap();
//!
//! let generated = transpile(&view, &TranspileOptions::default()).unwrap();
//! assert!(generated.sql.contains("WHERE r.resource_type = 'Patient'"));
//! ```
//!
//! The compiler is purely functional: identical input produces identical
//! output text, no I/O is performed, and errors are returned rather than
//! logged.
//!
//! # SQL on FHIR Specification
//!
//! See: <https://build.fhir.org/ig/FHIR/sql-on-fhir-v2/>

mod analysis;
mod column;
mod emitter;
mod expand;
mod fhir;
mod ident;
mod lowering;
mod options;
mod scaffold;
mod sql_generator;
mod view_definition;

pub use column::{ColumnInfo, ColumnType};
pub use options::TranspileOptions;
pub use sql_generator::{GeneratedSql, SqlGenerator};
pub use view_definition::{Column, Constant, SelectNode, ViewDefinition, WhereClause};

use thiserror::Error;

/// Errors produced by the transpilation pipeline.
///
/// Each variant names the pipeline stage that detected it and carries the
/// FHIRPath expression or JSON pointer in error. The pipeline is
/// transactional: on error no SQL is produced.
#[derive(Debug, Error)]
pub enum Error {
    /// The ViewDefinition JSON is structurally invalid or violates a
    /// constraint (identifier rules, uniqueness, union column equality).
    #[error("Invalid ViewDefinition at {pointer}: {message}")]
    InvalidViewDefinition { pointer: String, message: String },

    /// A FHIRPath expression could not be tokenised or parsed.
    #[error(transparent)]
    FhirPathSyntax(#[from] fhirview_fhirpath::ParseError),

    /// A FHIRPath construct that parses but has no SQL lowering.
    #[error("Unsupported FHIRPath construct '{construct}' in '{expression}'")]
    FhirPathUnsupported {
        construct: String,
        expression: String,
    },

    /// A path is shaped in a way the analyser cannot use (malformed
    /// index, filter without a base, non-path iteration target).
    #[error("Malformed path '{expression}': {message}")]
    PathMalformed { expression: String, message: String },

    /// The unionAll expansion exceeds the configured branch limit.
    #[error("ViewDefinition too complex: expansion produces {branches} branches (limit {limit})")]
    TooComplex { branches: usize, limit: usize },

    /// Invalid emitter input: a bad option, view or table identifier.
    #[error("Emit error: {message}")]
    Emit { message: String },
}

impl Error {
    pub(crate) fn invalid(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidViewDefinition {
            pointer: pointer.into(),
            message: message.into(),
        }
    }

    pub(crate) fn unsupported(construct: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::FhirPathUnsupported {
            construct: construct.into(),
            expression: expression.into(),
        }
    }

    pub(crate) fn malformed(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PathMalformed {
            expression: expression.into(),
            message: message.into(),
        }
    }

    pub(crate) fn emit(message: impl Into<String>) -> Self {
        Self::Emit {
            message: message.into(),
        }
    }
}

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Compile a ViewDefinition into a T-SQL `SELECT` statement.
///
/// # Errors
///
/// Returns an error if the ViewDefinition is invalid or contains paths
/// that cannot be lowered to SQL.
pub fn transpile(view: &ViewDefinition, options: &TranspileOptions) -> Result<GeneratedSql> {
    SqlGenerator::with_options(options.clone()).generate(view)
}

/// Compile a ViewDefinition into a `CREATE VIEW` statement.
///
/// # Errors
///
/// As [`transpile`], plus an [`Error::Emit`] when `view_name` is not a
/// valid SQL Server identifier.
pub fn create_view(
    view: &ViewDefinition,
    view_name: &str,
    options: &TranspileOptions,
) -> Result<String> {
    SqlGenerator::with_options(options.clone()).create_view(view, view_name)
}

/// Compile a ViewDefinition into a materialising `SELECT ... INTO`.
///
/// # Errors
///
/// As [`transpile`], plus an [`Error::Emit`] when `table_name` is not a
/// valid SQL Server identifier.
pub fn create_table(
    view: &ViewDefinition,
    table_name: &str,
    options: &TranspileOptions,
) -> Result<String> {
    SqlGenerator::with_options(options.clone()).create_table(view, table_name)
}

/// Parse and validate a ViewDefinition without generating SQL.
///
/// Validation is side-effect free; two successive calls on the same input
/// return structurally equal models.
///
/// # Errors
///
/// Returns [`Error::InvalidViewDefinition`] with a JSON pointer to the
/// offending node.
pub fn parse_view_definition(value: &serde_json::Value) -> Result<ViewDefinition> {
    let view = ViewDefinition::from_json(value)?;
    view.validate(TranspileOptions::default().max_branches)?;
    Ok(view)
}

//! ViewDefinition parsing and validation.
//!
//! Defines the data structures for parsing FHIR ViewDefinition resources
//! as specified in the SQL on FHIR Implementation Guide, plus the
//! structural validation run before any SQL is generated.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expand;
use crate::fhir;
use crate::ident;
use crate::{Error, Result};

/// Allowed values of `ViewDefinition.status`.
const STATUSES: &[&str] = &["draft", "active", "retired", "unknown"];

/// A ViewDefinition resource that defines a tabular view over FHIR data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewDefinition {
    /// The FHIR resource type (always "ViewDefinition").
    pub resource_type: String,

    /// Canonical URL identifying this ViewDefinition.
    pub url: Option<String>,

    /// Computer-friendly name for the view.
    pub name: Option<String>,

    /// Human-friendly title.
    pub title: Option<String>,

    /// Publication status: draft | active | retired | unknown.
    pub status: String,

    /// The FHIR resource type this view is based on (e.g. "Patient").
    pub resource: String,

    /// Description of the view's purpose.
    pub description: Option<String>,

    /// Constants that can be referenced as `%name` in FHIRPath.
    #[serde(default)]
    pub constant: Vec<Constant>,

    /// The columns and nested selects to include in the view.
    #[serde(default)]
    pub select: Vec<SelectNode>,

    /// Filter conditions applied at the resource level.
    /// Named `where_` because `where` is a Rust reserved keyword.
    #[serde(default, rename = "where")]
    pub where_: Vec<WhereClause>,
}

/// A select block: columns, iteration, nesting and unions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SelectNode {
    /// FHIRPath expression iterated one row per element.
    pub for_each: Option<String>,

    /// Like forEach, but keeps a null-filled row when the collection is
    /// empty.
    pub for_each_or_null: Option<String>,

    /// Column definitions at this level.
    pub column: Option<Vec<Column>>,

    /// Nested select blocks.
    #[serde(default)]
    pub select: Vec<SelectNode>,

    /// Alternative projections unioned row-wise.
    pub union_all: Option<Vec<SelectNode>>,
}

/// A column definition in a ViewDefinition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// The column name in the output.
    pub name: String,

    /// FHIRPath expression extracting the column value.
    pub path: String,

    /// Declared FHIR primitive type of the column.
    #[serde(rename = "type")]
    pub col_type: Option<String>,

    /// Whether this column holds a collection (emitted as a JSON array).
    pub collection: Option<bool>,

    /// Human-readable description of the column.
    pub description: Option<String>,
}

/// A where clause filtering resources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WhereClause {
    /// FHIRPath expression that must hold for the row to be included.
    pub path: String,
}

/// A constant value referenced as `%name` in FHIRPath expressions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Constant {
    /// Name of the constant.
    pub name: String,

    /// String value of the constant.
    pub value_string: Option<String>,

    /// Integer value of the constant.
    pub value_integer: Option<i64>,

    /// Boolean value of the constant.
    pub value_boolean: Option<bool>,

    /// Decimal value of the constant.
    pub value_decimal: Option<f64>,
}

impl ViewDefinition {
    /// Parse a ViewDefinition from a JSON value.
    ///
    /// Structural constraints beyond JSON shape are checked by
    /// [`ViewDefinition::validate`].
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not deserialise into the model.
    pub fn from_json(value: &Value) -> Result<Self> {
        serde_json::from_value(value.clone())
            .map_err(|e| Error::invalid("", e.to_string()))
    }

    /// Parse a ViewDefinition from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid JSON or does not
    /// deserialise into the model.
    pub fn parse(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::invalid("", e.to_string()))
    }

    /// Validate the model: resource type, status, identifiers, select
    /// structure, and column consistency across the unionAll expansion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidViewDefinition`] with a JSON pointer to
    /// the offending node, or [`Error::TooComplex`] when the expansion
    /// exceeds `max_branches`.
    pub fn validate(&self, max_branches: usize) -> Result<()> {
        if self.resource_type != "ViewDefinition" {
            return Err(Error::invalid(
                "/resourceType",
                format!("expected 'ViewDefinition', found '{}'", self.resource_type),
            ));
        }
        if !fhir::is_resource_type(&self.resource) {
            return Err(Error::invalid(
                "/resource",
                format!("'{}' is not a FHIR R4 resource type", self.resource),
            ));
        }
        if !STATUSES.contains(&self.status.as_str()) {
            return Err(Error::invalid(
                "/status",
                format!(
                    "status '{}' is not one of draft, active, retired, unknown",
                    self.status
                ),
            ));
        }
        if self.select.is_empty() {
            return Err(Error::invalid("/select", "at least one select is required"));
        }

        self.validate_constants()?;

        for (i, node) in self.select.iter().enumerate() {
            validate_select(node, &format!("/select/{i}"))?;
        }
        for (i, clause) in self.where_.iter().enumerate() {
            if clause.path.trim().is_empty() {
                return Err(Error::invalid(
                    format!("/where/{i}/path"),
                    "where path is empty",
                ));
            }
        }

        self.validate_expansion(max_branches)
    }

    /// Get the ordered column names of the first expanded branch.
    ///
    /// Useful for callers that want the output shape without generating
    /// SQL. Branch equality is enforced by [`ViewDefinition::validate`],
    /// so any branch would yield the same list.
    pub fn column_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_column_names(&self.select, &mut names);
        names
    }

    fn validate_constants(&self) -> Result<()> {
        let mut seen = Vec::new();
        for (i, constant) in self.constant.iter().enumerate() {
            let pointer = format!("/constant/{i}/name");
            if !is_constant_name(&constant.name) {
                return Err(Error::invalid(
                    pointer,
                    format!("'{}' is not a valid constant name", constant.name),
                ));
            }
            if seen.contains(&constant.name.as_str()) {
                return Err(Error::invalid(
                    pointer,
                    format!("duplicate constant '{}'", constant.name),
                ));
            }
            seen.push(constant.name.as_str());
        }
        Ok(())
    }

    /// Expand unions and check per-branch uniqueness and cross-branch
    /// column-list equality.
    fn validate_expansion(&self, max_branches: usize) -> Result<()> {
        let branches = expand::expand(&self.select, max_branches)?;

        let mut first_names: Option<Vec<String>> = None;
        for (i, branch) in branches.iter().enumerate() {
            let names = expand::branch_column_names(branch);
            if names.is_empty() {
                return Err(Error::invalid(
                    "/select",
                    format!("branch {i} produces no columns"),
                ));
            }

            let mut seen: Vec<&str> = Vec::new();
            for name in &names {
                if seen.contains(&name.as_str()) {
                    return Err(Error::invalid(
                        "/select",
                        format!("duplicate column name '{name}' in branch {i}"),
                    ));
                }
                seen.push(name);
            }

            match &first_names {
                None => first_names = Some(names),
                Some(expected) if *expected != names => {
                    return Err(Error::invalid(
                        "/select",
                        format!(
                            "unionAll branch {i} columns [{}] do not match branch 0 columns [{}]",
                            names.join(", "),
                            expected.join(", ")
                        ),
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Recursively validate one select node.
fn validate_select(node: &SelectNode, pointer: &str) -> Result<()> {
    if node.for_each.is_some() && node.for_each_or_null.is_some() {
        return Err(Error::invalid(
            pointer,
            "forEach and forEachOrNull are mutually exclusive",
        ));
    }
    if let Some(path) = node.for_each.as_deref().or(node.for_each_or_null.as_deref())
        && path.trim().is_empty()
    {
        return Err(Error::invalid(pointer, "iteration path is empty"));
    }

    if let Some(columns) = &node.column {
        for (i, column) in columns.iter().enumerate() {
            validate_column(column, &format!("{pointer}/column/{i}"))?;
        }
    }
    for (i, nested) in node.select.iter().enumerate() {
        validate_select(nested, &format!("{pointer}/select/{i}"))?;
    }
    if let Some(branches) = &node.union_all {
        if branches.is_empty() {
            return Err(Error::invalid(
                format!("{pointer}/unionAll"),
                "unionAll must contain at least one select",
            ));
        }
        for (i, branch) in branches.iter().enumerate() {
            validate_select(branch, &format!("{pointer}/unionAll/{i}"))?;
        }
    }
    Ok(())
}

fn validate_column(column: &Column, pointer: &str) -> Result<()> {
    if let Some(message) = ident::identifier_error(&column.name) {
        return Err(Error::invalid(format!("{pointer}/name"), message));
    }
    if column.path.trim().is_empty() {
        return Err(Error::invalid(
            format!("{pointer}/path"),
            "column path is empty",
        ));
    }
    if let Some(col_type) = &column.col_type
        && !crate::column::FHIR_PRIMITIVE_TYPES.contains(&col_type.as_str())
    {
        return Err(Error::invalid(
            format!("{pointer}/type"),
            format!("'{col_type}' is not a recognised FHIR primitive type"),
        ));
    }
    Ok(())
}

fn is_constant_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Collect column names from the first unionAll choice of each node, in
/// encounter order.
fn collect_column_names(selects: &[SelectNode], names: &mut Vec<String>) {
    for select in selects {
        if let Some(columns) = &select.column {
            for col in columns {
                names.push(col.name.clone());
            }
        }
        collect_column_names(&select.select, names);
        if let Some(branches) = &select.union_all
            && let Some(first) = branches.first()
        {
            collect_column_names(std::slice::from_ref(first), names);
        }
    }
}

impl Constant {
    /// The constant's value as a JSON value.
    pub fn value(&self) -> Value {
        if let Some(s) = &self.value_string {
            Value::String(s.clone())
        } else if let Some(i) = self.value_integer {
            Value::Number(i.into())
        } else if let Some(b) = self.value_boolean {
            Value::Bool(b)
        } else if let Some(d) = self.value_decimal {
            serde_json::Number::from_f64(d)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        } else {
            Value::Null
        }
    }
}

//! Column and predicate emission.
//!
//! Turns each `Column` into a `<expr> AS [name]` select item with the
//! declared type applied, and lowers top-level `where` paths against the
//! root binding. Collection columns emit JSON-array expressions and are
//! never cast.

use crate::analysis;
use crate::column::{ColumnInfo, ColumnType};
use crate::ident::bracket;
use crate::lowering::{self, LoweringEnv};
use crate::scaffold::Scope;
use crate::view_definition::Column;
use crate::{Error, Result};

use fhirview_fhirpath::Expression;

/// Emit one column as a select item plus its result-set metadata.
pub(crate) fn emit_column(
    env: &LoweringEnv,
    scope: &Scope,
    column: &Column,
) -> Result<(String, ColumnInfo)> {
    let ctx = env.context(&scope.json_ref, scope.at_root);

    let (expression, col_type) = if column.collection.unwrap_or(false) {
        (collection_expression(env, scope, &column.path)?, ColumnType::Json)
    } else {
        let declared = column
            .col_type
            .as_deref()
            .map(ColumnType::from_fhir_type)
            .unwrap_or_default();
        let expression = match declared {
            ColumnType::Boolean => {
                let predicate = lowering::lower_predicate(&ctx, &column.path)?;
                lowering::bit_case(&predicate)
            }
            _ if declared.needs_cast() => {
                let scalar = lowering::lower_scalar(&ctx, &column.path)?;
                format!("CAST({scalar} AS {})", declared.sql_type())
            }
            _ => lowering::lower_scalar(&ctx, &column.path)?,
        };
        (expression, declared)
    };

    let item = format!("{expression} AS {}", bracket(&column.name));
    let mut info = ColumnInfo::new(column.name.clone(), col_type);
    if let Some(description) = &column.description {
        info = info.with_description(description.clone());
    }
    Ok((item, info))
}

/// Lower a top-level `where` path against the root binding.
pub(crate) fn where_predicate(env: &LoweringEnv, path: &str) -> Result<String> {
    let ctx = env.context(&env.root_json, true);
    lowering::lower_predicate(&ctx, path)
}

/// The JSON-array expression of a `collection: true` column.
///
/// `name.family` and `name.given` get the canonical `STRING_AGG`-built
/// array; every other path falls back to `JSON_QUERY`, which returns the
/// stored array verbatim.
fn collection_expression(env: &LoweringEnv, scope: &Scope, path: &str) -> Result<String> {
    let segments = member_segments(path)?;
    let json_ref = &scope.json_ref;

    match segments.as_slice() {
        [head, leaf] if head == "name" && leaf == "given" => Ok(format!(
            "(SELECT '[' + STRING_AGG('\"' + STRING_ESCAPE(g.value, 'json') + '\"', ',') + ']' \
             FROM OPENJSON({json_ref}, '$.name') AS n \
             CROSS APPLY OPENJSON(n.value, '$.given') AS g)"
        )),
        [head, leaf] if head == "name" && leaf == "family" => Ok(format!(
            "(SELECT '[' + STRING_AGG('\"' + STRING_ESCAPE(JSON_VALUE(value, '$.family'), 'json') + '\"', ',') + ']' \
             FROM OPENJSON({json_ref}, '$.name'))"
        )),
        _ => {
            let mut rendered = String::from("$");
            let last = segments.len() - 1;
            for (i, segment) in segments.iter().enumerate() {
                rendered.push('.');
                rendered.push_str(segment);
                if i != last && analysis::is_known_array(segment) {
                    rendered.push_str("[0]");
                }
            }
            Ok(format!("JSON_QUERY({json_ref}, '{rendered}')"))
        }
    }
}

/// Flatten a collection path into plain member segments.
fn member_segments(path: &str) -> Result<Vec<String>> {
    let expr = fhirview_fhirpath::parse(path)?;
    let mut segments = Vec::new();
    collect_members(&expr, path, &mut segments)?;
    if segments.is_empty() {
        return Err(Error::malformed(path, "empty collection path"));
    }
    Ok(segments)
}

fn collect_members(expr: &Expression, path: &str, segments: &mut Vec<String>) -> Result<()> {
    match expr {
        Expression::Identifier(name) => {
            if !(name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && crate::fhir::is_resource_type(name))
            {
                segments.push(name.clone());
            }
            Ok(())
        }
        Expression::Constant(name) if name == "resource" => Ok(()),
        Expression::MemberInvocation { base, name } => {
            collect_members(base, path, segments)?;
            segments.push(name.clone());
            Ok(())
        }
        Expression::Parenthesized(inner) => collect_members(inner, path, segments),
        _ => Err(Error::unsupported(
            "collection path with functions or operators",
            path,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;

    fn env() -> LoweringEnv {
        LoweringEnv {
            root_json: "r.json".to_string(),
            resource_id: "r.id".to_string(),
            constants: IndexMap::new(),
        }
    }

    fn root_scope(env: &LoweringEnv) -> Scope {
        Scope::root(env)
    }

    fn column(value: serde_json::Value) -> Column {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_plain_column() {
        let env = env();
        let (item, info) = emit_column(
            &env,
            &root_scope(&env),
            &column(json!({"name": "gender", "path": "gender"})),
        )
        .unwrap();
        assert_eq!(item, "JSON_VALUE(r.json, '$.gender') AS [gender]");
        assert_eq!(info.col_type, ColumnType::String);
    }

    #[test]
    fn test_string_type_not_cast() {
        let env = env();
        let (item, _) = emit_column(
            &env,
            &root_scope(&env),
            &column(json!({"name": "pid", "path": "id", "type": "id"})),
        )
        .unwrap();
        assert_eq!(item, "r.id AS [pid]");
    }

    #[test]
    fn test_typed_column_cast_once() {
        let env = env();
        let (item, info) = emit_column(
            &env,
            &root_scope(&env),
            &column(json!({"name": "birth_date", "path": "birthDate", "type": "date"})),
        )
        .unwrap();
        assert_eq!(
            item,
            "CAST(JSON_VALUE(r.json, '$.birthDate') AS DATETIME2) AS [birth_date]"
        );
        assert_eq!(info.col_type, ColumnType::Date);
        assert_eq!(item.matches("CAST").count(), 1);
    }

    #[test]
    fn test_boolean_column_uses_case() {
        let env = env();
        let (item, _) = emit_column(
            &env,
            &root_scope(&env),
            &column(json!({"name": "active", "path": "active", "type": "boolean"})),
        )
        .unwrap();
        assert_eq!(
            item,
            "CASE WHEN JSON_VALUE(r.json, '$.active') = 'true' THEN 1 \
             WHEN NOT JSON_VALUE(r.json, '$.active') = 'true' THEN 0 ELSE NULL END AS [active]"
        );
        assert!(!item.contains("CAST"));
    }

    #[test]
    fn test_collection_given_canonical_subquery() {
        let env = env();
        let (item, info) = emit_column(
            &env,
            &root_scope(&env),
            &column(json!({"name": "given", "path": "name.given", "collection": true})),
        )
        .unwrap();
        assert!(item.contains("STRING_AGG"), "got: {item}");
        assert!(item.contains("CROSS APPLY OPENJSON(n.value, '$.given')"), "got: {item}");
        assert!(!item.contains("CAST"), "collection columns are never cast: {item}");
        assert_eq!(info.col_type, ColumnType::Json);
    }

    #[test]
    fn test_collection_family_canonical_subquery() {
        let env = env();
        let (item, _) = emit_column(
            &env,
            &root_scope(&env),
            &column(json!({"name": "family", "path": "name.family", "collection": true})),
        )
        .unwrap();
        assert!(item.contains("STRING_AGG"), "got: {item}");
        assert!(item.contains("JSON_VALUE(value, '$.family')"), "got: {item}");
    }

    #[test]
    fn test_collection_fallback_json_query() {
        let env = env();
        let (item, _) = emit_column(
            &env,
            &root_scope(&env),
            &column(json!({"name": "ids", "path": "identifier", "collection": true})),
        )
        .unwrap();
        assert_eq!(
            item,
            "JSON_QUERY(r.json, '$.identifier') AS [ids]"
        );
    }

    #[test]
    fn test_collection_ignores_declared_type() {
        let env = env();
        let (item, _) = emit_column(
            &env,
            &root_scope(&env),
            &column(json!({
                "name": "ids",
                "path": "identifier",
                "collection": true,
                "type": "string"
            })),
        )
        .unwrap();
        assert!(!item.contains("CAST"));
    }

    #[test]
    fn test_where_predicate_binds_root() {
        let env = env();
        assert_eq!(
            where_predicate(&env, "active = true").unwrap(),
            "JSON_VALUE(r.json, '$.active') = 'true'"
        );
    }

    #[test]
    fn test_description_carried_to_info() {
        let env = env();
        let (_, info) = emit_column(
            &env,
            &root_scope(&env),
            &column(json!({
                "name": "gender",
                "path": "gender",
                "description": "Administrative gender"
            })),
        )
        .unwrap();
        assert_eq!(info.description.as_deref(), Some("Administrative gender"));
    }
}

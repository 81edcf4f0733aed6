//! FROM-clause scaffolding for iteration.
//!
//! Builds the `FROM ... AS r` root plus one `CROSS APPLY` / `OUTER APPLY`
//! per array hop of each `forEach` / `forEachOrNull`, binding row aliases
//! `a1, a2, ...` in order. `forEachOrNull` switches the affected select
//! (including its nested selects) to `OUTER APPLY` so empty collections
//! still produce a null-filled row.

use crate::analysis;
use crate::ident::bracket;
use crate::lowering::{self, LoweringEnv};
use crate::options::TranspileOptions;
use crate::{Error, Result};

/// The binding a select node's columns are emitted under.
#[derive(Debug, Clone)]
pub(crate) struct Scope {
    /// SQL expression for the JSON document in scope.
    pub json_ref: String,

    /// Whether the scope is the root resource document.
    pub at_root: bool,

    /// Whether APPLY clauses opened in this scope must be OUTER.
    pub outer: bool,
}

impl Scope {
    pub fn root(env: &LoweringEnv) -> Self {
        Self {
            json_ref: env.root_json.clone(),
            at_root: true,
            outer: false,
        }
    }
}

/// Accumulates the FROM clause of one branch.
#[derive(Debug)]
pub(crate) struct FromScaffold {
    clauses: Vec<String>,
    alias_seq: usize,
}

impl FromScaffold {
    pub fn new(options: &TranspileOptions, alias: &str) -> Self {
        Self {
            clauses: vec![format!(
                "FROM {}.{} AS {alias}",
                bracket(&options.schema_name),
                bracket(&options.table_name)
            )],
            alias_seq: 0,
        }
    }

    fn next_alias(&mut self) -> String {
        self.alias_seq += 1;
        format!("a{}", self.alias_seq)
    }

    /// Lower one iteration path, appending APPLY clauses and returning
    /// the scope its columns bind against.
    pub fn apply_iteration(
        &mut self,
        env: &LoweringEnv,
        scope: &Scope,
        path: &str,
        or_null: bool,
    ) -> Result<Scope> {
        let iteration = analysis::analyze_iteration_path(path)?;
        let outer = scope.outer || or_null;
        let apply = if outer { "OUTER APPLY" } else { "CROSS APPLY" };

        let mut json_ref = scope.json_ref.clone();

        for hop in &iteration.hops {
            if hop.index.is_some() {
                if hop.predicate.is_some() || hop.top1 {
                    return Err(Error::unsupported(
                        "filtering an indexed element",
                        path,
                    ));
                }
                // A single indexed element needs no row expansion.
                json_ref = format!("JSON_QUERY({json_ref}, '{}')", hop.json_path());
                continue;
            }

            let alias = self.next_alias();
            if hop.predicate.is_some() || hop.top1 {
                let ctx = env.context("value", false);
                let where_clause = match &hop.predicate {
                    Some(predicate) => format!(
                        " WHERE {}",
                        lowering::lower_predicate_expression(&ctx, path, predicate)?
                    ),
                    None => String::new(),
                };
                let top = if hop.top1 { "TOP 1 " } else { "" };
                self.clauses.push(format!(
                    "{apply} (SELECT {top}value FROM OPENJSON({json_ref}, '{}'){where_clause}) AS {alias}",
                    hop.json_path()
                ));
            } else {
                self.clauses.push(format!(
                    "{apply} OPENJSON({json_ref}, '{}') AS {alias}",
                    hop.json_path()
                ));
            }
            json_ref = format!("{alias}.value");
        }

        Ok(Scope {
            json_ref,
            at_root: false,
            outer,
        })
    }

    /// The assembled FROM clause.
    pub fn sql(&self) -> String {
        self.clauses.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn env() -> LoweringEnv {
        LoweringEnv {
            root_json: "r.json".to_string(),
            resource_id: "r.id".to_string(),
            constants: IndexMap::new(),
        }
    }

    fn scaffold() -> FromScaffold {
        FromScaffold::new(&TranspileOptions::default(), "r")
    }

    #[test]
    fn test_root_clause() {
        assert_eq!(scaffold().sql(), "FROM [dbo].[fhir_resources] AS r");
    }

    #[test]
    fn test_plain_foreach_is_cross_apply() {
        let env = env();
        let mut scaffold = scaffold();
        let scope = scaffold
            .apply_iteration(&env, &Scope::root(&env), "name", false)
            .unwrap();
        assert_eq!(
            scaffold.sql(),
            "FROM [dbo].[fhir_resources] AS r CROSS APPLY OPENJSON(r.json, '$.name') AS a1"
        );
        assert_eq!(scope.json_ref, "a1.value");
        assert!(!scope.at_root);
    }

    #[test]
    fn test_foreach_or_null_is_outer_apply() {
        let env = env();
        let mut scaffold = scaffold();
        scaffold
            .apply_iteration(&env, &Scope::root(&env), "address", true)
            .unwrap();
        assert!(scaffold.sql().contains("OUTER APPLY OPENJSON(r.json, '$.address') AS a1"));
    }

    #[test]
    fn test_filtered_top1_hop() {
        let env = env();
        let mut scaffold = scaffold();
        let scope = scaffold
            .apply_iteration(
                &env,
                &Scope::root(&env),
                "name.where(use = 'official').first()",
                false,
            )
            .unwrap();
        assert_eq!(
            scaffold.sql(),
            "FROM [dbo].[fhir_resources] AS r CROSS APPLY (SELECT TOP 1 value \
             FROM OPENJSON(r.json, '$.name') WHERE JSON_VALUE(value, '$.use') = 'official') AS a1"
        );
        assert_eq!(scope.json_ref, "a1.value");
    }

    #[test]
    fn test_where_false_shortcut() {
        let env = env();
        let mut scaffold = scaffold();
        scaffold
            .apply_iteration(&env, &Scope::root(&env), "name.where(false)", false)
            .unwrap();
        assert!(scaffold.sql().contains("WHERE 1 = 0"), "got: {}", scaffold.sql());
    }

    #[test]
    fn test_multi_hop_chains_aliases() {
        let env = env();
        let mut scaffold = scaffold();
        let scope = scaffold
            .apply_iteration(&env, &Scope::root(&env), "contact.name", false)
            .unwrap();
        assert_eq!(
            scaffold.sql(),
            "FROM [dbo].[fhir_resources] AS r \
             CROSS APPLY OPENJSON(r.json, '$.contact') AS a1 \
             CROSS APPLY OPENJSON(a1.value, '$.name') AS a2"
        );
        assert_eq!(scope.json_ref, "a2.value");
    }

    #[test]
    fn test_indexed_hop_needs_no_apply() {
        let env = env();
        let mut scaffold = scaffold();
        let scope = scaffold
            .apply_iteration(&env, &Scope::root(&env), "name[0]", false)
            .unwrap();
        assert_eq!(scaffold.sql(), "FROM [dbo].[fhir_resources] AS r");
        assert_eq!(scope.json_ref, "JSON_QUERY(r.json, '$.name[0]')");
    }

    #[test]
    fn test_outer_scope_propagates_to_nested_iteration() {
        let env = env();
        let mut scaffold = scaffold();
        let scope = scaffold
            .apply_iteration(&env, &Scope::root(&env), "contact", true)
            .unwrap();
        // A nested forEach under a forEachOrNull parent stays OUTER.
        scaffold
            .apply_iteration(&env, &scope, "telecom", false)
            .unwrap();
        assert!(
            scaffold
                .sql()
                .contains("OUTER APPLY OPENJSON(a1.value, '$.telecom') AS a2"),
            "got: {}",
            scaffold.sql()
        );
    }
}

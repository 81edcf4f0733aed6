//! SQL generation from ViewDefinitions.
//!
//! Assembles one `SELECT` per unionAll branch over the FROM scaffold,
//! joins branches with `UNION ALL` in source order, and exposes the
//! `CREATE VIEW` / `SELECT INTO` emitters. Output text is deterministic:
//! the same ViewDefinition and options always produce the same bytes.

use crate::column::ColumnInfo;
use crate::emitter;
use crate::expand::{self, ResolvedSelect};
use crate::ident::{bracket, quote_str};
use crate::lowering::{LoweringEnv, RESOURCE_ALIAS};
use crate::options::TranspileOptions;
use crate::scaffold::{FromScaffold, Scope};
use crate::view_definition::ViewDefinition;
use crate::{Error, Result};

/// Generates T-SQL from ViewDefinitions.
#[derive(Debug, Clone, Default)]
pub struct SqlGenerator {
    options: TranspileOptions,
}

/// Generated SQL with column metadata.
#[derive(Debug, Clone)]
pub struct GeneratedSql {
    /// The generated SQL query.
    pub sql: String,

    /// Column information for the result set, in output order.
    pub columns: Vec<ColumnInfo>,
}

impl SqlGenerator {
    /// Create a generator with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a generator with custom options.
    pub fn with_options(options: TranspileOptions) -> Self {
        Self { options }
    }

    /// Generate a `SELECT` statement from a ViewDefinition.
    ///
    /// # Errors
    ///
    /// Returns an error when validation, path analysis or lowering fails;
    /// no SQL is produced on error.
    pub fn generate(&self, view: &ViewDefinition) -> Result<GeneratedSql> {
        self.generate_statement(view, None)
    }

    /// Generate a `CREATE VIEW` statement.
    ///
    /// # Errors
    ///
    /// As [`SqlGenerator::generate`], plus [`Error::Emit`] when
    /// `view_name` is not a valid identifier.
    pub fn create_view(&self, view: &ViewDefinition, view_name: &str) -> Result<String> {
        self.validate_target(view_name, "view name")?;
        let generated = self.generate(view)?;
        Ok(format!(
            "CREATE VIEW {}.{} AS\n{}",
            bracket(&self.options.schema_name),
            bracket(view_name),
            generated.sql
        ))
    }

    /// Generate a materialising `SELECT ... INTO` statement.
    ///
    /// # Errors
    ///
    /// As [`SqlGenerator::generate`], plus [`Error::Emit`] when
    /// `table_name` is not a valid identifier.
    pub fn create_table(&self, view: &ViewDefinition, table_name: &str) -> Result<String> {
        self.validate_target(table_name, "table name")?;
        Ok(self.generate_statement(view, Some(table_name))?.sql)
    }

    fn validate_target(&self, name: &str, what: &str) -> Result<()> {
        if let Some(message) = crate::ident::identifier_error(name) {
            return Err(Error::emit(format!("invalid {what}: {message}")));
        }
        Ok(())
    }

    fn generate_statement(
        &self,
        view: &ViewDefinition,
        into: Option<&str>,
    ) -> Result<GeneratedSql> {
        self.options.validate()?;
        view.validate(self.options.max_branches)?;

        let env = LoweringEnv::new(&self.options, view);
        let branches = expand::expand(&view.select, self.options.max_branches)?;

        let mut parts = Vec::with_capacity(branches.len());
        let mut columns: Option<Vec<ColumnInfo>> = None;

        for (i, branch) in branches.iter().enumerate() {
            let branch_into = if i == 0 { into } else { None };
            let (sql, branch_columns) = self.build_branch(view, &env, branch, branch_into)?;
            if columns.is_none() {
                columns = Some(branch_columns);
            }
            parts.push(sql);
        }

        let sql = parts.join("\nUNION ALL\n");
        tracing::debug!(
            resource = %view.resource,
            branches = parts.len(),
            "generated view SQL"
        );

        Ok(GeneratedSql {
            sql,
            columns: columns.unwrap_or_default(),
        })
    }

    /// Assemble one branch: select list, FROM scaffold and predicates.
    fn build_branch(
        &self,
        view: &ViewDefinition,
        env: &LoweringEnv,
        branch: &[ResolvedSelect],
        into: Option<&str>,
    ) -> Result<(String, Vec<ColumnInfo>)> {
        let mut scaffold = FromScaffold::new(&self.options, RESOURCE_ALIAS);
        let mut items = Vec::new();
        let mut columns = Vec::new();

        let root = Scope::root(env);
        self.walk_selects(env, &mut scaffold, &root, branch, &mut items, &mut columns)?;

        let mut predicates = vec![format!(
            "{RESOURCE_ALIAS}.resource_type = {}",
            quote_str(&view.resource)
        )];
        for clause in &view.where_ {
            predicates.push(format!("({})", emitter::where_predicate(env, &clause.path)?));
        }

        let into_clause = match into {
            Some(name) => format!(
                " INTO {}.{}",
                bracket(&self.options.schema_name),
                bracket(name)
            ),
            None => String::new(),
        };

        let sql = format!(
            "SELECT {}{} {} WHERE {}",
            items.join(", "),
            into_clause,
            scaffold.sql(),
            predicates.join(" AND ")
        );
        Ok((sql, columns))
    }

    /// Depth-first walk of a branch, opening iteration scopes and
    /// emitting columns in encounter order.
    fn walk_selects(
        &self,
        env: &LoweringEnv,
        scaffold: &mut FromScaffold,
        scope: &Scope,
        nodes: &[ResolvedSelect],
        items: &mut Vec<String>,
        columns: &mut Vec<ColumnInfo>,
    ) -> Result<()> {
        for node in nodes {
            let node_scope = if let Some(path) = &node.for_each {
                scaffold.apply_iteration(env, scope, path, false)?
            } else if let Some(path) = &node.for_each_or_null {
                scaffold.apply_iteration(env, scope, path, true)?
            } else {
                scope.clone()
            };

            for column in &node.columns {
                let (item, info) = emitter::emit_column(env, &node_scope, column)?;
                items.push(item);
                columns.push(info);
            }

            self.walk_selects(env, scaffold, &node_scope, &node.children, items, columns)?;
        }
        Ok(())
    }
}

//! FHIRPath to T-SQL lowering.
//!
//! Lowers a parsed FHIRPath expression to a T-SQL fragment under a
//! [`BindingContext`]. Member chains accumulate into a single JSON path
//! and materialise as `JSON_VALUE` (scalar), `JSON_QUERY` (document) or
//! an `OPENJSON` row source depending on how the value is consumed.
//! Known-array segments in scalar position receive an implicit `[0]`.

use fhirview_fhirpath::{BinaryOp, Expression, UnaryOp};
use indexmap::IndexMap;
use serde_json::Value;

use crate::analysis;
use crate::ident::quote_str;
use crate::options::TranspileOptions;
use crate::view_definition::ViewDefinition;
use crate::{Error, Result};

/// Root table alias used in every generated query.
pub(crate) const RESOURCE_ALIAS: &str = "r";

/// Per-view lowering environment: root bindings and user constants.
#[derive(Debug)]
pub(crate) struct LoweringEnv {
    pub root_json: String,
    pub resource_id: String,
    pub constants: IndexMap<String, Value>,
}

impl LoweringEnv {
    pub fn new(options: &TranspileOptions, view: &ViewDefinition) -> Self {
        let constants = view
            .constant
            .iter()
            .map(|c| (c.name.clone(), c.value()))
            .collect();
        Self {
            root_json: format!("{RESOURCE_ALIAS}.{}", options.resource_json_column),
            resource_id: format!("{RESOURCE_ALIAS}.{}", options.resource_id_column),
            constants,
        }
    }

    /// A binding context for the given JSON reference.
    pub fn context<'a>(&'a self, json_ref: &'a str, at_root: bool) -> BindingContext<'a> {
        BindingContext {
            root_json: &self.root_json,
            resource_id: &self.resource_id,
            json_ref,
            at_root,
            constants: &self.constants,
        }
    }
}

/// The local scope a FHIRPath expression is lowered under.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BindingContext<'a> {
    /// SQL expression for the root resource document.
    pub root_json: &'a str,

    /// SQL expression for the root resource key.
    pub resource_id: &'a str,

    /// SQL expression for the JSON document currently in scope.
    pub json_ref: &'a str,

    /// Whether `json_ref` is the root resource document.
    pub at_root: bool,

    /// User constants, referenced as `%name`.
    pub constants: &'a IndexMap<String, Value>,
}

/// Lower a column path to a scalar T-SQL expression.
pub(crate) fn lower_scalar(ctx: &BindingContext<'_>, path: &str) -> Result<String> {
    let expr = fhirview_fhirpath::parse(path)?;
    let lowerer = Lowerer { ctx, source: path };
    let value = lowerer.eval(&expr)?;
    lowerer.to_scalar(value)
}

/// Lower a path to a boolean T-SQL predicate.
pub(crate) fn lower_predicate(ctx: &BindingContext<'_>, path: &str) -> Result<String> {
    let expr = fhirview_fhirpath::parse(path)?;
    lower_predicate_expression(ctx, path, &expr)
}

/// Lower an already-parsed expression to a predicate (used for `where()`
/// filters extracted by the path analyser).
pub(crate) fn lower_predicate_expression(
    ctx: &BindingContext<'_>,
    source: &str,
    expr: &Expression,
) -> Result<String> {
    let lowerer = Lowerer { ctx, source };
    let value = lowerer.eval(expr)?;
    lowerer.to_predicate(value)
}

/// The BIT projection of a predicate: 1, 0 or NULL.
pub(crate) fn bit_case(predicate: &str) -> String {
    format!("CASE WHEN {predicate} THEN 1 WHEN NOT {predicate} THEN 0 ELSE NULL END")
}

/// One JSON path segment with its array treatment.
#[derive(Debug, Clone)]
struct Segment {
    name: String,
    array: bool,
    index: Option<i64>,
}

impl Segment {
    fn new(name: String) -> Self {
        let array = analysis::is_known_array(&name);
        Self {
            name,
            array,
            index: None,
        }
    }
}

/// An un-materialised JSON path rooted at a binding.
#[derive(Debug, Clone)]
struct JsonPath {
    base: String,
    from_root: bool,
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Render segments; in scalar position every known-array segment
    /// without an explicit index is pinned to `[0]`. In source position
    /// the final segment stays bare so `OPENJSON` iterates it.
    fn render(&self, scalar: bool) -> String {
        render_segments(&self.segments, scalar)
    }

    /// The path as a scalar SQL expression.
    fn scalar_sql(&self, ctx: &BindingContext<'_>) -> String {
        if self.from_root
            && self.segments.len() == 1
            && self.segments[0].name == "id"
            && self.segments[0].index.is_none()
        {
            return ctx.resource_id.to_string();
        }
        if self.segments.is_empty() {
            return self.base.clone();
        }
        format!("JSON_VALUE({}, '{}')", self.base, self.render(true))
    }

    /// The path as a `(document, json path)` pair for OPENJSON/JSON_QUERY.
    fn source_sql(&self) -> (String, String) {
        (self.base.clone(), self.render(false))
    }

    /// A presence test: `JSON_QUERY` for array tails, `JSON_VALUE`
    /// otherwise.
    fn presence_sql(&self, ctx: &BindingContext<'_>) -> String {
        let array_tail = self
            .segments
            .last()
            .is_some_and(|s| s.array && s.index.is_none());
        if array_tail {
            let (base, path) = self.source_sql();
            format!("JSON_QUERY({base}, '{path}')")
        } else {
            self.scalar_sql(ctx)
        }
    }
}

fn render_segments(segments: &[Segment], scalar: bool) -> String {
    let last = segments.len().saturating_sub(1);
    let mut path = String::from("$");
    for (i, segment) in segments.iter().enumerate() {
        path.push('.');
        path.push_str(&segment.name);
        if let Some(index) = segment.index {
            path.push_str(&format!("[{index}]"));
        } else if segment.array && (scalar || i != last) {
            path.push_str("[0]");
        }
    }
    path
}

/// A path restricted by a `where()` filter, with trailing segments.
///
/// Scalar materialisation always takes `TOP 1`, so `first()` and `[0]`
/// on the filtered collection itself are no-ops.
#[derive(Debug, Clone)]
struct Filtered {
    base: String,
    path: String,
    predicate: String,
    trailing: Vec<Segment>,
}

/// A literal value, kept symbolic for type-directed comparison lowering.
#[derive(Debug, Clone)]
enum Lit {
    Str(String),
    Num(String),
    Bool(bool),
}

/// Intermediate lowering result.
#[derive(Debug, Clone)]
enum Lowered {
    /// A SQL scalar expression.
    Scalar(String),
    /// A SQL boolean predicate.
    Bool(String),
    /// A JSON path not yet materialised.
    Path(JsonPath),
    /// A filtered collection.
    Filtered(Filtered),
    /// A literal.
    Literal(Lit),
}

struct Lowerer<'a> {
    ctx: &'a BindingContext<'a>,
    source: &'a str,
}

impl Lowerer<'_> {
    fn eval(&self, expr: &Expression) -> Result<Lowered> {
        match expr {
            Expression::Identifier(name) => Ok(Lowered::Path(self.head_path(name))),

            Expression::NumberLiteral(lexeme) => Ok(Lowered::Literal(Lit::Num(lexeme.clone()))),
            Expression::StringLiteral(value) => Ok(Lowered::Literal(Lit::Str(value.clone()))),
            Expression::BooleanLiteral(value) => Ok(Lowered::Literal(Lit::Bool(*value))),

            Expression::Constant(name) => self.eval_constant(name),

            Expression::MemberInvocation { base, name } => {
                match self.eval(base)? {
                    Lowered::Path(mut path) => {
                        path.segments.push(Segment::new(name.clone()));
                        Ok(Lowered::Path(path))
                    }
                    Lowered::Filtered(mut filtered) => {
                        filtered.trailing.push(Segment::new(name.clone()));
                        Ok(Lowered::Filtered(filtered))
                    }
                    _ => Err(self.unsupported("member access on a non-path value")),
                }
            }

            Expression::FunctionInvocation { base, name, args } => {
                self.eval_function(base.as_deref(), name, args)
            }

            Expression::Indexer { base, index } => {
                let index = analysis::parse_index(index, self.source)?;
                match self.eval(base)? {
                    Lowered::Path(mut path) => {
                        let segment = path.segments.last_mut().ok_or_else(|| {
                            Error::malformed(self.source, "an index requires a preceding path")
                        })?;
                        segment.index = Some(index);
                        Ok(Lowered::Path(path))
                    }
                    Lowered::Filtered(mut filtered) => {
                        if let Some(segment) = filtered.trailing.last_mut() {
                            segment.index = Some(index);
                            Ok(Lowered::Filtered(filtered))
                        } else if index == 0 {
                            Ok(Lowered::Filtered(filtered))
                        } else {
                            Err(self.unsupported("indexing a filtered collection"))
                        }
                    }
                    _ => Err(self.unsupported("indexing a non-path value")),
                }
            }

            Expression::Binary { op, left, right } => self.eval_binary(*op, left, right),

            Expression::Unary { op, operand } => self.eval_unary(*op, operand),

            Expression::Parenthesized(inner) => self.eval(inner),
        }
    }

    /// First segment of a chain: a resource-type head rebinds to the root
    /// document, anything else extends the current scope.
    fn head_path(&self, name: &str) -> JsonPath {
        if name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
            && crate::fhir::is_resource_type(name)
        {
            return JsonPath {
                base: self.ctx.root_json.to_string(),
                from_root: true,
                segments: Vec::new(),
            };
        }
        JsonPath {
            base: self.ctx.json_ref.to_string(),
            from_root: self.ctx.at_root,
            segments: vec![Segment::new(name.to_string())],
        }
    }

    fn eval_constant(&self, name: &str) -> Result<Lowered> {
        if name == "resource" {
            return Ok(Lowered::Path(JsonPath {
                base: self.ctx.root_json.to_string(),
                from_root: true,
                segments: Vec::new(),
            }));
        }
        match self.ctx.constants.get(name) {
            Some(Value::String(s)) => Ok(Lowered::Literal(Lit::Str(s.clone()))),
            Some(Value::Number(n)) => Ok(Lowered::Literal(Lit::Num(n.to_string()))),
            Some(Value::Bool(b)) => Ok(Lowered::Literal(Lit::Bool(*b))),
            Some(_) => Err(Error::invalid(
                "/constant",
                format!("constant '%{name}' has no scalar value"),
            )),
            None => Err(Error::invalid(
                "/constant",
                format!(
                    "unknown constant '%{name}' referenced in '{}'",
                    self.source
                ),
            )),
        }
    }

    fn eval_function(
        &self,
        base: Option<&Expression>,
        name: &str,
        args: &[Expression],
    ) -> Result<Lowered> {
        match name {
            "getResourceKey" => {
                self.expect_no_args(name, args)?;
                Ok(Lowered::Scalar(self.ctx.resource_id.to_string()))
            }

            "exists" => {
                self.expect_no_args(name, args)?;
                match self.eval(self.required_base(base, name)?)? {
                    Lowered::Path(path) => Ok(Lowered::Bool(format!(
                        "({} IS NOT NULL)",
                        path.presence_sql(self.ctx)
                    ))),
                    Lowered::Filtered(filtered) if filtered.trailing.is_empty() => {
                        Ok(Lowered::Bool(format!(
                            "EXISTS (SELECT 1 FROM OPENJSON({}, '{}') WHERE {})",
                            filtered.base, filtered.path, filtered.predicate
                        )))
                    }
                    _ => Err(self.unsupported("exists() on a non-path value")),
                }
            }

            "empty" => {
                self.expect_no_args(name, args)?;
                match self.eval(self.required_base(base, name)?)? {
                    Lowered::Path(path) => Ok(Lowered::Bool(format!(
                        "({} IS NULL)",
                        path.presence_sql(self.ctx)
                    ))),
                    Lowered::Filtered(filtered) if filtered.trailing.is_empty() => {
                        Ok(Lowered::Bool(format!(
                            "NOT EXISTS (SELECT 1 FROM OPENJSON({}, '{}') WHERE {})",
                            filtered.base, filtered.path, filtered.predicate
                        )))
                    }
                    _ => Err(self.unsupported("empty() on a non-path value")),
                }
            }

            "first" => {
                self.expect_no_args(name, args)?;
                match self.eval(self.required_base(base, name)?)? {
                    Lowered::Path(mut path) => {
                        let segment = path.segments.last_mut().ok_or_else(|| {
                            Error::malformed(self.source, "first() requires a preceding path")
                        })?;
                        if segment.index.is_none() {
                            segment.index = Some(0);
                        }
                        Ok(Lowered::Path(path))
                    }
                    Lowered::Filtered(mut filtered) => {
                        if let Some(segment) = filtered.trailing.last_mut()
                            && segment.index.is_none()
                        {
                            segment.index = Some(0);
                        }
                        Ok(Lowered::Filtered(filtered))
                    }
                    _ => Err(self.unsupported("first() on a non-path value")),
                }
            }

            "count" => {
                self.expect_no_args(name, args)?;
                match self.eval(self.required_base(base, name)?)? {
                    Lowered::Path(path) => {
                        let (doc, json_path) = path.source_sql();
                        Ok(Lowered::Scalar(format!(
                            "(SELECT COUNT(*) FROM OPENJSON({doc}, '{json_path}'))"
                        )))
                    }
                    Lowered::Filtered(filtered) if filtered.trailing.is_empty() => {
                        Ok(Lowered::Scalar(format!(
                            "(SELECT COUNT(*) FROM OPENJSON({}, '{}') WHERE {})",
                            filtered.base, filtered.path, filtered.predicate
                        )))
                    }
                    _ => Err(self.unsupported("count() on a non-path value")),
                }
            }

            "join" => {
                let separator = match args {
                    [] => String::new(),
                    [sep] => match self.eval(sep)? {
                        Lowered::Literal(Lit::Str(s)) => s,
                        _ => {
                            return Err(self.unsupported("join() with a non-string separator"));
                        }
                    },
                    _ => {
                        return Err(Error::malformed(
                            self.source,
                            "join() takes at most one argument",
                        ));
                    }
                };
                match self.eval(self.required_base(base, name)?)? {
                    Lowered::Path(path) => {
                        let (doc, json_path) = path.source_sql();
                        Ok(Lowered::Scalar(format!(
                            "(SELECT STRING_AGG(value, {}) FROM OPENJSON({doc}, '{json_path}'))",
                            quote_str(&separator)
                        )))
                    }
                    _ => Err(self.unsupported("join() on a non-path value")),
                }
            }

            "where" => {
                if args.len() != 1 {
                    return Err(Error::malformed(
                        self.source,
                        "where() takes exactly one argument",
                    ));
                }
                let inner_ctx = BindingContext {
                    json_ref: "value",
                    at_root: false,
                    ..*self.ctx
                };
                let predicate = lower_predicate_expression(&inner_ctx, self.source, &args[0])?;
                match self.eval(self.required_base(base, name)?)? {
                    Lowered::Path(path) => {
                        if path.segments.is_empty() {
                            return Err(Error::malformed(
                                self.source,
                                "where() requires a preceding path",
                            ));
                        }
                        let (doc, json_path) = path.source_sql();
                        Ok(Lowered::Filtered(Filtered {
                            base: doc,
                            path: json_path,
                            predicate,
                            trailing: Vec::new(),
                        }))
                    }
                    Lowered::Filtered(mut filtered) if filtered.trailing.is_empty() => {
                        filtered.predicate =
                            format!("{} AND {}", filtered.predicate, predicate);
                        Ok(Lowered::Filtered(filtered))
                    }
                    _ => Err(self.unsupported("where() on a non-path value")),
                }
            }

            "not" => {
                self.expect_no_args(name, args)?;
                let value = self.eval(self.required_base(base, name)?)?;
                let predicate = self.to_predicate(value)?;
                Ok(Lowered::Bool(format!("NOT ({predicate})")))
            }

            other => Err(self.unsupported(format!("{other}()"))),
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Lowered> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let l = self.to_predicate(self.eval(left)?)?;
                let r = self.to_predicate(self.eval(right)?)?;
                let keyword = if op == BinaryOp::And { "AND" } else { "OR" };
                Ok(Lowered::Bool(format!("({l} {keyword} {r})")))
            }

            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                let l_sql = self.comparison_operand(&l, &r)?;
                let r_sql = self.comparison_operand(&r, &l)?;
                let op_sql = match op {
                    BinaryOp::Eq => "=",
                    BinaryOp::Ne => "!=",
                    BinaryOp::Lt => "<",
                    BinaryOp::Le => "<=",
                    BinaryOp::Gt => ">",
                    BinaryOp::Ge => ">=",
                    _ => unreachable!(),
                };
                Ok(Lowered::Bool(format!("{l_sql} {op_sql} {r_sql}")))
            }

            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::IntDiv
            | BinaryOp::Mod => {
                let l = self.to_scalar(self.eval(left)?)?;
                let r = self.to_scalar(self.eval(right)?)?;
                let op_sql = match op {
                    BinaryOp::Add => "+",
                    BinaryOp::Sub => "-",
                    BinaryOp::Mul => "*",
                    BinaryOp::Div | BinaryOp::IntDiv => "/",
                    BinaryOp::Mod => "%",
                    _ => unreachable!(),
                };
                Ok(Lowered::Scalar(format!("({l} {op_sql} {r})")))
            }

            BinaryOp::Xor
            | BinaryOp::Implies
            | BinaryOp::In
            | BinaryOp::Contains
            | BinaryOp::Union => Err(self.unsupported(format!("operator '{}'", op.symbol()))),
        }
    }

    fn eval_unary(&self, op: UnaryOp, operand: &Expression) -> Result<Lowered> {
        match op {
            UnaryOp::Not => {
                let predicate = self.to_predicate(self.eval(operand)?)?;
                Ok(Lowered::Bool(format!("NOT ({predicate})")))
            }
            UnaryOp::Minus => match self.eval(operand)? {
                Lowered::Literal(Lit::Num(lexeme)) => {
                    Ok(Lowered::Literal(Lit::Num(format!("-{lexeme}"))))
                }
                Lowered::Scalar(sql) => Ok(Lowered::Scalar(format!("-{sql}"))),
                Lowered::Path(path) => {
                    Ok(Lowered::Scalar(format!("-{}", path.scalar_sql(self.ctx))))
                }
                _ => Err(self.unsupported("unary '-' on a non-numeric value")),
            },
            UnaryOp::Plus => self.eval(operand),
        }
    }

    /// Materialise a comparison operand; boolean literals compare as the
    /// JSON text `'true'`/`'false'` when the other side is a JSON path,
    /// because `JSON_VALUE` yields NVARCHAR.
    fn comparison_operand(&self, value: &Lowered, other: &Lowered) -> Result<String> {
        match value {
            Lowered::Path(path) => Ok(path.scalar_sql(self.ctx)),
            Lowered::Scalar(sql) => Ok(sql.clone()),
            Lowered::Filtered(_) => Ok(self.to_scalar(value.clone())?),
            Lowered::Literal(Lit::Str(s)) => Ok(quote_str(s)),
            Lowered::Literal(Lit::Num(n)) => Ok(n.clone()),
            Lowered::Literal(Lit::Bool(b)) => {
                let json_side = matches!(other, Lowered::Path(_) | Lowered::Filtered(_));
                Ok(if json_side {
                    quote_str(if *b { "true" } else { "false" })
                } else if *b {
                    "1".to_string()
                } else {
                    "0".to_string()
                })
            }
            Lowered::Bool(_) => Err(self.unsupported("comparison of boolean expressions")),
        }
    }

    fn to_scalar(&self, value: Lowered) -> Result<String> {
        match value {
            Lowered::Scalar(sql) => Ok(sql),
            Lowered::Path(path) => Ok(path.scalar_sql(self.ctx)),
            Lowered::Bool(predicate) => Ok(bit_case(&predicate)),
            Lowered::Literal(Lit::Str(s)) => Ok(quote_str(&s)),
            Lowered::Literal(Lit::Num(n)) => Ok(n),
            Lowered::Literal(Lit::Bool(b)) => Ok(if b { "1" } else { "0" }.to_string()),
            Lowered::Filtered(filtered) => {
                let select = if filtered.trailing.is_empty() {
                    "value".to_string()
                } else {
                    format!(
                        "JSON_VALUE(value, '{}')",
                        render_segments(&filtered.trailing, true)
                    )
                };
                Ok(format!(
                    "(SELECT TOP 1 {select} FROM OPENJSON({}, '{}') WHERE {})",
                    filtered.base, filtered.path, filtered.predicate
                ))
            }
        }
    }

    fn to_predicate(&self, value: Lowered) -> Result<String> {
        match value {
            Lowered::Bool(predicate) => Ok(predicate),
            Lowered::Path(path) => Ok(format!("{} = 'true'", path.scalar_sql(self.ctx))),
            Lowered::Literal(Lit::Bool(true)) => Ok("1 = 1".to_string()),
            Lowered::Literal(Lit::Bool(false)) => Ok("1 = 0".to_string()),
            Lowered::Filtered(filtered) if filtered.trailing.is_empty() => Ok(format!(
                "EXISTS (SELECT 1 FROM OPENJSON({}, '{}') WHERE {})",
                filtered.base, filtered.path, filtered.predicate
            )),
            _ => Err(self.unsupported("expression is not a boolean predicate")),
        }
    }

    fn required_base<'e>(
        &self,
        base: Option<&'e Expression>,
        name: &str,
    ) -> Result<&'e Expression> {
        base.ok_or_else(|| {
            Error::malformed(self.source, format!("{name}() requires a preceding path"))
        })
    }

    fn expect_no_args(&self, name: &str, args: &[Expression]) -> Result<()> {
        if args.is_empty() {
            Ok(())
        } else {
            Err(Error::malformed(
                self.source,
                format!("{name}() takes no arguments"),
            ))
        }
    }

    fn unsupported(&self, construct: impl Into<String>) -> Error {
        Error::unsupported(construct, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> LoweringEnv {
        LoweringEnv {
            root_json: "r.json".to_string(),
            resource_id: "r.id".to_string(),
            constants: IndexMap::new(),
        }
    }

    fn root_scalar(path: &str) -> String {
        let env = env();
        let ctx = env.context("r.json", true);
        lower_scalar(&ctx, path).unwrap()
    }

    fn root_predicate(path: &str) -> String {
        let env = env();
        let ctx = env.context("r.json", true);
        lower_predicate(&ctx, path).unwrap()
    }

    #[test]
    fn test_root_id_uses_key_column() {
        assert_eq!(root_scalar("id"), "r.id");
        assert_eq!(root_scalar("getResourceKey()"), "r.id");
    }

    #[test]
    fn test_plain_field() {
        assert_eq!(root_scalar("gender"), "JSON_VALUE(r.json, '$.gender')");
    }

    #[test]
    fn test_known_array_gets_implicit_index() {
        assert_eq!(
            root_scalar("name.family"),
            "JSON_VALUE(r.json, '$.name[0].family')"
        );
    }

    #[test]
    fn test_resource_type_prefix_stripped() {
        assert_eq!(
            root_scalar("Patient.name.family"),
            "JSON_VALUE(r.json, '$.name[0].family')"
        );
    }

    #[test]
    fn test_first_pins_index() {
        assert_eq!(
            root_scalar("name.first().family"),
            "JSON_VALUE(r.json, '$.name[0].family')"
        );
    }

    #[test]
    fn test_explicit_index() {
        assert_eq!(
            root_scalar("name[1].family"),
            "JSON_VALUE(r.json, '$.name[1].family')"
        );
    }

    #[test]
    fn test_id_under_iteration_is_json() {
        let env = env();
        let ctx = env.context("a1.value", false);
        assert_eq!(
            lower_scalar(&ctx, "id").unwrap(),
            "JSON_VALUE(a1.value, '$.id')"
        );
    }

    #[test]
    fn test_exists_scalar_tail() {
        assert_eq!(
            root_predicate("birthDate.exists()"),
            "(JSON_VALUE(r.json, '$.birthDate') IS NOT NULL)"
        );
    }

    #[test]
    fn test_exists_array_tail_uses_json_query() {
        assert_eq!(
            root_predicate("name.exists()"),
            "(JSON_QUERY(r.json, '$.name') IS NOT NULL)"
        );
    }

    #[test]
    fn test_empty_is_null() {
        assert_eq!(
            root_predicate("deceasedDateTime.empty()"),
            "(JSON_VALUE(r.json, '$.deceasedDateTime') IS NULL)"
        );
    }

    #[test]
    fn test_count_subquery() {
        assert_eq!(
            root_scalar("name.count()"),
            "(SELECT COUNT(*) FROM OPENJSON(r.json, '$.name'))"
        );
    }

    #[test]
    fn test_join_string_agg() {
        let env = env();
        let ctx = env.context("a1.value", false);
        assert_eq!(
            lower_scalar(&ctx, "given.join(' ')").unwrap(),
            "(SELECT STRING_AGG(value, ' ') FROM OPENJSON(a1.value, '$.given'))"
        );
    }

    #[test]
    fn test_join_through_array_hop() {
        assert_eq!(
            root_scalar("name.given.join(',')"),
            "(SELECT STRING_AGG(value, ',') FROM OPENJSON(r.json, '$.name[0].given'))"
        );
    }

    #[test]
    fn test_inline_where_becomes_correlated_subquery() {
        assert_eq!(
            root_scalar("name.where(use = 'official').family"),
            "(SELECT TOP 1 JSON_VALUE(value, '$.family') FROM OPENJSON(r.json, '$.name') \
             WHERE JSON_VALUE(value, '$.use') = 'official')"
        );
    }

    #[test]
    fn test_where_exists_predicate() {
        assert_eq!(
            root_predicate("identifier.where(system = 'urn:mrn').exists()"),
            "EXISTS (SELECT 1 FROM OPENJSON(r.json, '$.identifier') \
             WHERE JSON_VALUE(value, '$.system') = 'urn:mrn')"
        );
    }

    #[test]
    fn test_comparison_against_boolean_literal_uses_json_text() {
        assert_eq!(
            root_predicate("active = true"),
            "JSON_VALUE(r.json, '$.active') = 'true'"
        );
    }

    #[test]
    fn test_bare_path_predicate_tests_json_true() {
        assert_eq!(
            root_predicate("active"),
            "JSON_VALUE(r.json, '$.active') = 'true'"
        );
    }

    #[test]
    fn test_and_or_parenthesised() {
        assert_eq!(
            root_predicate("active = true and gender = 'male'"),
            "(JSON_VALUE(r.json, '$.active') = 'true' AND JSON_VALUE(r.json, '$.gender') = 'male')"
        );
    }

    #[test]
    fn test_not_wraps_predicate() {
        assert_eq!(
            root_predicate("active.not()"),
            "NOT (JSON_VALUE(r.json, '$.active') = 'true')"
        );
    }

    #[test]
    fn test_arithmetic_passthrough() {
        assert_eq!(
            root_scalar("multipleBirthInteger + 1"),
            "(JSON_VALUE(r.json, '$.multipleBirthInteger') + 1)"
        );
    }

    #[test]
    fn test_div_and_mod() {
        assert_eq!(root_scalar("4 div 2"), "(4 / 2)");
        assert_eq!(root_scalar("5 mod 2"), "(5 % 2)");
    }

    #[test]
    fn test_constants_substituted() {
        let mut constants = IndexMap::new();
        constants.insert(
            "targetUse".to_string(),
            Value::String("official".to_string()),
        );
        let env = LoweringEnv {
            root_json: "r.json".to_string(),
            resource_id: "r.id".to_string(),
            constants,
        };
        let ctx = env.context("value", false);
        assert_eq!(
            lower_predicate(&ctx, "use = %targetUse").unwrap(),
            "JSON_VALUE(value, '$.use') = 'official'"
        );
    }

    #[test]
    fn test_unknown_constant_rejected() {
        let env = env();
        let ctx = env.context("r.json", true);
        match lower_predicate(&ctx, "use = %missing").unwrap_err() {
            Error::InvalidViewDefinition { message, .. } => {
                assert!(message.contains("%missing"), "got: {message}");
            }
            other => panic!("expected InvalidViewDefinition, got {other:?}"),
        }
    }

    #[test]
    fn test_percent_resource_rebinds_to_root() {
        let env = env();
        let ctx = env.context("a1.value", false);
        assert_eq!(lower_scalar(&ctx, "%resource.id").unwrap(), "r.id");
        assert_eq!(
            lower_scalar(&ctx, "%resource.gender").unwrap(),
            "JSON_VALUE(r.json, '$.gender')"
        );
    }

    #[test]
    fn test_string_literal_quoting() {
        assert_eq!(
            root_predicate("name.family = 'O''Brien'"),
            "JSON_VALUE(r.json, '$.name[0].family') = 'O''Brien'"
        );
    }

    #[test]
    fn test_boolean_scalar_becomes_bit_case() {
        assert_eq!(
            root_scalar("birthDate.exists()"),
            "CASE WHEN (JSON_VALUE(r.json, '$.birthDate') IS NOT NULL) THEN 1 \
             WHEN NOT (JSON_VALUE(r.json, '$.birthDate') IS NOT NULL) THEN 0 ELSE NULL END"
        );
    }

    #[test]
    fn test_unsupported_function_reported() {
        let env = env();
        let ctx = env.context("r.json", true);
        match lower_scalar(&ctx, "value.ofType(Quantity)").unwrap_err() {
            Error::FhirPathUnsupported { construct, .. } => assert_eq!(construct, "ofType()"),
            other => panic!("expected FhirPathUnsupported, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_operator_reported() {
        let env = env();
        let ctx = env.context("r.json", true);
        match lower_predicate(&ctx, "a implies b").unwrap_err() {
            Error::FhirPathUnsupported { construct, .. } => {
                assert_eq!(construct, "operator 'implies'");
            }
            other => panic!("expected FhirPathUnsupported, got {other:?}"),
        }
    }

    #[test]
    fn test_syntax_error_propagates() {
        let env = env();
        let ctx = env.context("r.json", true);
        assert!(matches!(
            lower_scalar(&ctx, "name..family").unwrap_err(),
            Error::FhirPathSyntax(_)
        ));
    }
}

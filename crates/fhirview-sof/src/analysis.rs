//! Iteration-path analysis.
//!
//! Breaks a `forEach` / `forEachOrNull` FHIRPath into a sequence of array
//! hops. Every known-array field terminates a hop; `where()`, `first()`
//! and trailing `[n]` indexes attach to the hop they follow. The scaffold
//! turns each hop into one `OPENJSON` APPLY.

use fhirview_fhirpath::{BinaryOp, Expression};

use crate::fhir;
use crate::{Error, Result};

/// FHIR fields treated as arrays when they appear inside a path.
///
/// A configuration constant, not a complete FHIR schema: the set mirrors
/// the fields the generator is known to handle.
pub(crate) const KNOWN_ARRAY_FIELDS: &[&str] = &[
    "name",
    "telecom",
    "address",
    "contact",
    "identifier",
    "communication",
    "link",
];

/// Whether `field` is treated as an array position.
pub(crate) fn is_known_array(field: &str) -> bool {
    KNOWN_ARRAY_FIELDS.contains(&field)
}

/// One array hop of an iteration path.
#[derive(Debug, Clone)]
pub(crate) struct ArrayHop {
    /// JSON path segments from the previous hop to the iterated array.
    pub segments: Vec<String>,

    /// Filter from `where()`, bound against the iteration row `value`.
    pub predicate: Option<Expression>,

    /// Trailing `first()`: iterate at most one element.
    pub top1: bool,

    /// Trailing explicit `[n]` index.
    pub index: Option<i64>,
}

impl ArrayHop {
    fn new(segments: Vec<String>) -> Self {
        Self {
            segments,
            predicate: None,
            top1: false,
            index: None,
        }
    }

    /// The hop's JSON path, relative to the previous binding.
    pub fn json_path(&self) -> String {
        let mut path = format!("$.{}", self.segments.join("."));
        if let Some(index) = self.index {
            path.push_str(&format!("[{index}]"));
        }
        path
    }
}

/// An iteration path broken into array hops.
#[derive(Debug, Clone)]
pub(crate) struct IterationPath {
    pub hops: Vec<ArrayHop>,
}

/// Flattened postfix steps of a path expression.
enum Step {
    Member(String),
    Where(Expression),
    First,
    Index(i64),
}

/// Analyse a `forEach` / `forEachOrNull` path.
///
/// # Errors
///
/// [`Error::FhirPathSyntax`] when the path does not parse,
/// [`Error::PathMalformed`] when it parses but is not an iterable path,
/// [`Error::FhirPathUnsupported`] for constructs without a lowering.
pub(crate) fn analyze_iteration_path(path: &str) -> Result<IterationPath> {
    let expr = fhirview_fhirpath::parse(path)?;
    let steps = flatten(&expr, path)?;

    let mut hops: Vec<ArrayHop> = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for step in steps {
        match step {
            Step::Member(name) => {
                let close = is_known_array(&name);
                current.push(name);
                if close {
                    hops.push(ArrayHop::new(std::mem::take(&mut current)));
                }
            }
            Step::Where(predicate) => {
                close_pending(&mut hops, &mut current);
                let hop = hops.last_mut().ok_or_else(|| {
                    Error::malformed(path, "where() requires a preceding path")
                })?;
                hop.predicate = Some(match hop.predicate.take() {
                    None => predicate,
                    Some(existing) => Expression::Binary {
                        op: BinaryOp::And,
                        left: Box::new(existing),
                        right: Box::new(predicate),
                    },
                });
            }
            Step::First => {
                close_pending(&mut hops, &mut current);
                let hop = hops.last_mut().ok_or_else(|| {
                    Error::malformed(path, "first() requires a preceding path")
                })?;
                hop.top1 = true;
            }
            Step::Index(index) => {
                close_pending(&mut hops, &mut current);
                let hop = hops.last_mut().ok_or_else(|| {
                    Error::malformed(path, "an index requires a preceding path")
                })?;
                hop.index = Some(index);
            }
        }
    }

    if !current.is_empty() {
        hops.push(ArrayHop::new(current));
    }
    if hops.is_empty() {
        return Err(Error::malformed(path, "empty iteration path"));
    }

    Ok(IterationPath { hops })
}

/// Close the segment chain under construction, if any.
fn close_pending(hops: &mut Vec<ArrayHop>, current: &mut Vec<String>) {
    if !current.is_empty() {
        hops.push(ArrayHop::new(std::mem::take(current)));
    }
}

/// Flatten a postfix chain into steps, stripping a leading resource-type
/// or `%resource` head.
fn flatten(expr: &Expression, path: &str) -> Result<Vec<Step>> {
    match expr {
        Expression::Identifier(name) => {
            if name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
                && fhir::is_resource_type(name)
            {
                Ok(Vec::new())
            } else {
                Ok(vec![Step::Member(name.clone())])
            }
        }
        Expression::Constant(name) if name == "resource" => Ok(Vec::new()),
        Expression::Constant(name) => Err(Error::malformed(
            path,
            format!("cannot iterate the constant '%{name}'"),
        )),
        Expression::MemberInvocation { base, name } => {
            let mut steps = flatten(base, path)?;
            steps.push(Step::Member(name.clone()));
            Ok(steps)
        }
        Expression::FunctionInvocation { base, name, args } => {
            let base = base.as_deref().ok_or_else(|| {
                Error::malformed(path, format!("{name}() requires a preceding path"))
            })?;
            let mut steps = flatten(base, path)?;
            match name.as_str() {
                "where" => {
                    if args.len() != 1 {
                        return Err(Error::malformed(
                            path,
                            "where() takes exactly one argument",
                        ));
                    }
                    steps.push(Step::Where(args[0].clone()));
                }
                "first" => {
                    if !args.is_empty() {
                        return Err(Error::malformed(path, "first() takes no arguments"));
                    }
                    steps.push(Step::First);
                }
                other => {
                    return Err(Error::unsupported(format!("{other}()"), path));
                }
            }
            Ok(steps)
        }
        Expression::Indexer { base, index } => {
            let mut steps = flatten(base, path)?;
            steps.push(Step::Index(parse_index(index, path)?));
            Ok(steps)
        }
        Expression::Parenthesized(inner) => flatten(inner, path),
        _ => Err(Error::malformed(path, "iteration target must be a path")),
    }
}

/// Extract a non-negative integer index.
pub(crate) fn parse_index(index: &Expression, path: &str) -> Result<i64> {
    match index.unparenthesized() {
        Expression::NumberLiteral(lexeme) if !lexeme.contains('.') => {
            lexeme.parse::<i64>().map_err(|_| {
                Error::malformed(path, format!("malformed index '{lexeme}'"))
            })
        }
        _ => Err(Error::malformed(path, "malformed index")),
    }
}

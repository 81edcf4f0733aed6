//! FHIRPath front-end for the FhirView transpiler.
//!
//! This crate tokenises and parses the subset of FHIRPath reachable from
//! SQL on FHIR ViewDefinition resources: member and function invocation
//! chains, indexers, arithmetic, comparison and logical operators, string
//! and number literals, and `%name` environment references.
//!
//! Parsing is deliberately permissive: any expression that is valid under
//! the grammar produces an AST, even when the downstream SQL lowering does
//! not implement the construct. Unsupported-but-parseable constructs are
//! rejected by the lowering stage, not here.
//!
//! # Example
//!
//! ```
//! use fhirview_fhirpath::{parse, Expression};
//!
//! let expr = parse("name.where(use = 'official').first()").unwrap();
//! assert!(matches!(expr, Expression::FunctionInvocation { .. }));
//! ```

mod ast;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Expression, UnaryOp};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;

use thiserror::Error;

/// A lexical or syntactic error in a FHIRPath expression.
///
/// Carries the offending expression and the character position at which
/// scanning or parsing failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("FHIRPath syntax error at position {position} in '{expression}': {message}")]
pub struct ParseError {
    /// The full expression that failed to parse.
    pub expression: String,

    /// Character offset of the failure.
    pub position: usize,

    /// Human-readable cause.
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(
        expression: impl Into<String>,
        position: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            expression: expression.into(),
            position,
            message: message.into(),
        }
    }
}

/// Parse a FHIRPath expression into an AST.
///
/// # Errors
///
/// Returns a [`ParseError`] if the expression cannot be tokenised or does
/// not conform to the grammar.
pub fn parse(expression: &str) -> Result<Expression, ParseError> {
    let tokens = Lexer::new(expression).tokenize()?;
    Parser::new(expression, tokens).parse()
}

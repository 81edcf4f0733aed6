//! Integration tests for the FHIRPath front-end.
//!
//! These exercise the public [`parse`] API on the full expressions that
//! ViewDefinitions use in practice: chained invocations, filters,
//! indexers and operator combinations.

use fhirview_fhirpath::{parse, BinaryOp, Expression, UnaryOp};

/// Helper to unwrap a function invocation node.
fn as_function(expr: &Expression) -> (Option<&Expression>, &str, &[Expression]) {
    match expr {
        Expression::FunctionInvocation { base, name, args } => {
            (base.as_deref(), name.as_str(), args.as_slice())
        }
        other => panic!("expected function invocation, got {other:?}"),
    }
}

/// Helper to unwrap a member invocation node.
fn as_member(expr: &Expression) -> (&Expression, &str) {
    match expr {
        Expression::MemberInvocation { base, name } => (base.as_ref(), name.as_str()),
        other => panic!("expected member invocation, got {other:?}"),
    }
}

// =============================================================================
// Chained invocations
// =============================================================================

#[test]
fn test_full_iteration_chain() {
    let expr = parse("name.where(use = 'official').first().given.join(' ')").unwrap();

    // Outermost: .join(' ')
    let (join_base, join_name, join_args) = as_function(&expr);
    assert_eq!(join_name, "join");
    assert_eq!(join_args, [Expression::StringLiteral(" ".to_string())]);

    // .given
    let (given_base, given_name) = as_member(join_base.unwrap());
    assert_eq!(given_name, "given");

    // .first()
    let (first_base, first_name, first_args) = as_function(given_base);
    assert_eq!(first_name, "first");
    assert!(first_args.is_empty());

    // .where(use = 'official')
    let (where_base, where_name, where_args) = as_function(first_base.unwrap());
    assert_eq!(where_name, "where");
    assert_eq!(where_args.len(), 1);
    match &where_args[0] {
        Expression::Binary { op, left, right } => {
            assert_eq!(*op, BinaryOp::Eq);
            assert_eq!(**left, Expression::Identifier("use".to_string()));
            assert_eq!(**right, Expression::StringLiteral("official".to_string()));
        }
        other => panic!("expected binary predicate, got {other:?}"),
    }

    // name
    assert_eq!(
        *where_base.unwrap(),
        Expression::Identifier("name".to_string())
    );
}

#[test]
fn test_indexer_inside_chain() {
    let expr = parse("name[0].given.first()").unwrap();

    let (first_base, first_name, _) = as_function(&expr);
    assert_eq!(first_name, "first");

    let (given_base, given_name) = as_member(first_base.unwrap());
    assert_eq!(given_name, "given");

    match given_base {
        Expression::Indexer { base, index } => {
            assert_eq!(**base, Expression::Identifier("name".to_string()));
            assert_eq!(**index, Expression::NumberLiteral("0".to_string()));
        }
        other => panic!("expected indexer, got {other:?}"),
    }
}

#[test]
fn test_resource_prefixed_path() {
    let expr = parse("Patient.name.family").unwrap();

    let (family_base, family_name) = as_member(&expr);
    assert_eq!(family_name, "family");
    let (patient, name) = as_member(family_base);
    assert_eq!(name, "name");
    assert_eq!(*patient, Expression::Identifier("Patient".to_string()));
}

#[test]
fn test_env_ref_chain() {
    let expr = parse("%resource.id").unwrap();

    let (base, name) = as_member(&expr);
    assert_eq!(name, "id");
    assert_eq!(*base, Expression::Constant("resource".to_string()));
}

#[test]
fn test_bare_function_invocation() {
    let expr = parse("getResourceKey()").unwrap();
    let (base, name, args) = as_function(&expr);
    assert!(base.is_none());
    assert_eq!(name, "getResourceKey");
    assert!(args.is_empty());
}

// =============================================================================
// Operators
// =============================================================================

#[test]
fn test_logical_precedence_end_to_end() {
    // a = 1 and b = 2 or c = 3  =>  ((a = 1) and (b = 2)) or (c = 3)
    let expr = parse("a = 1 and b = 2 or c = 3").unwrap();

    match expr {
        Expression::Binary { op, left, right } => {
            assert_eq!(op, BinaryOp::Or);
            assert!(matches!(
                *left,
                Expression::Binary { op: BinaryOp::And, .. }
            ));
            assert!(matches!(*right, Expression::Binary { op: BinaryOp::Eq, .. }));
        }
        other => panic!("expected binary, got {other:?}"),
    }
}

#[test]
fn test_parentheses_override_precedence() {
    let expr = parse("(a or b) and c").unwrap();

    match expr {
        Expression::Binary { op, left, .. } => {
            assert_eq!(op, BinaryOp::And);
            match *left {
                Expression::Parenthesized(inner) => {
                    assert!(matches!(
                        *inner,
                        Expression::Binary { op: BinaryOp::Or, .. }
                    ));
                }
                other => panic!("expected parenthesized group, got {other:?}"),
            }
        }
        other => panic!("expected binary, got {other:?}"),
    }
}

#[test]
fn test_arithmetic_with_keywords() {
    // 1 + total div 2  =>  1 + (total div 2)
    let expr = parse("1 + total div 2").unwrap();

    match expr {
        Expression::Binary { op, right, .. } => {
            assert_eq!(op, BinaryOp::Add);
            assert!(matches!(
                *right,
                Expression::Binary { op: BinaryOp::IntDiv, .. }
            ));
        }
        other => panic!("expected binary, got {other:?}"),
    }
}

#[test]
fn test_unary_not_over_comparison_operand() {
    let expr = parse("not active").unwrap();

    match expr {
        Expression::Unary { op, operand } => {
            assert_eq!(op, UnaryOp::Not);
            assert_eq!(*operand, Expression::Identifier("active".to_string()));
        }
        other => panic!("expected unary, got {other:?}"),
    }
}

#[test]
fn test_comparison_inside_where_argument() {
    let expr = parse("telecom.where(rank >= 2)").unwrap();

    let (_, name, args) = as_function(&expr);
    assert_eq!(name, "where");
    match &args[0] {
        Expression::Binary { op, right, .. } => {
            assert_eq!(*op, BinaryOp::Ge);
            assert_eq!(**right, Expression::NumberLiteral("2".to_string()));
        }
        other => panic!("expected binary predicate, got {other:?}"),
    }
}

// =============================================================================
// Literals
// =============================================================================

#[test]
fn test_number_lexeme_preserved() {
    let expr = parse("value.where(code = 4.50)").unwrap();

    let (_, _, args) = as_function(&expr);
    match &args[0] {
        Expression::Binary { right, .. } => {
            assert_eq!(**right, Expression::NumberLiteral("4.50".to_string()));
        }
        other => panic!("expected binary predicate, got {other:?}"),
    }
}

#[test]
fn test_escaped_quote_in_string_literal() {
    let expr = parse("name.where(family = 'O''Brien')").unwrap();

    let (_, _, args) = as_function(&expr);
    match &args[0] {
        Expression::Binary { right, .. } => {
            assert_eq!(**right, Expression::StringLiteral("O'Brien".to_string()));
        }
        other => panic!("expected binary predicate, got {other:?}"),
    }
}

#[test]
fn test_boolean_literals() {
    let expr = parse("name.where(false)").unwrap();
    let (_, name, args) = as_function(&expr);
    assert_eq!(name, "where");
    assert_eq!(args, [Expression::BooleanLiteral(false)]);

    assert_eq!(parse("true").unwrap(), Expression::BooleanLiteral(true));
}

#[test]
fn test_reserved_word_as_member_name() {
    let expr = parse("text.div").unwrap();
    let (_, name) = as_member(&expr);
    assert_eq!(name, "div");
}

// =============================================================================
// Errors and determinism
// =============================================================================

#[test]
fn test_parse_is_deterministic() {
    let source = "name.where(use = 'official' and period.start.exists()).first()";
    assert_eq!(parse(source).unwrap(), parse(source).unwrap());
}

#[test]
fn test_syntax_error_carries_expression_and_position() {
    let err = parse("name.where(use = 'official'").unwrap_err();
    assert_eq!(err.expression, "name.where(use = 'official'");
    assert_eq!(err.position, 27);
    assert!(err.message.contains("expected ')'"), "got: {}", err.message);
}

#[test]
fn test_lexical_error_position() {
    let err = parse("name ~ 'x'").unwrap_err();
    assert_eq!(err.position, 5);
    assert!(err.message.contains("unexpected character"), "got: {}", err.message);
}

#[test]
fn test_error_display_names_the_expression() {
    let err = parse("name..family").unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("FHIRPath syntax error"), "got: {rendered}");
    assert!(rendered.contains("name..family"), "got: {rendered}");
}

#[test]
fn test_unsupported_constructs_still_parse() {
    // Constructs without a SQL lowering are still grammatically valid;
    // rejecting them is the lowering stage's job.
    assert!(parse("value.ofType(Quantity)").is_ok());
    assert!(parse("a implies b").is_ok());
    assert!(parse("deceasedBoolean.iif('yes', 'no')").is_ok());
}

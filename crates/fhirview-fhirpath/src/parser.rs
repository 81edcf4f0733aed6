//! Recursive-descent FHIRPath parser.
//!
//! Implements the normative grammar restricted to the ViewDefinition
//! subset: invocation chains, indexers, arithmetic, comparison and logical
//! binaries, unary `+ - not`. Precedence, loosest first:
//!
//! ```text
//! implies | or xor | and | in contains | = != | < <= > >= | '|'
//!   | + - | * / div mod | unary | postfix | primary
//! ```

use crate::ast::{BinaryOp, Expression, UnaryOp};
use crate::lexer::{Token, TokenKind};
use crate::ParseError;

/// Parses a token stream into an [`Expression`].
pub struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
        }
    }

    /// Parse the whole expression, requiring every token to be consumed.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the tokens do not form a single valid
    /// expression.
    pub fn parse(mut self) -> Result<Expression, ParseError> {
        if self.tokens.is_empty() {
            return Err(ParseError::new(self.source, 0, "empty expression"));
        }
        let expr = self.parse_implies()?;
        if let Some(token) = self.peek() {
            return Err(self.error_at(
                token.pos,
                format!("unexpected {} after expression", token.kind.describe()),
            ));
        }
        Ok(expr)
    }

    fn parse_implies(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_or()?;
        while self.eat(&TokenKind::Implies) {
            let right = self.parse_or()?;
            left = binary(BinaryOp::Implies, left, right);
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_and()?;
        loop {
            let op = if self.eat(&TokenKind::Or) {
                BinaryOp::Or
            } else if self.eat(&TokenKind::Xor) {
                BinaryOp::Xor
            } else {
                break;
            };
            let right = self.parse_and()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_membership()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_membership()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_membership(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_equality()?;
        loop {
            let op = if self.eat(&TokenKind::In) {
                BinaryOp::In
            } else if self.eat(&TokenKind::Contains) {
                BinaryOp::Contains
            } else {
                break;
            };
            let right = self.parse_equality()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = if self.eat(&TokenKind::Eq) {
                BinaryOp::Eq
            } else if self.eat(&TokenKind::Ne) {
                BinaryOp::Ne
            } else {
                break;
            };
            let right = self.parse_comparison()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_union()?;
        loop {
            let op = if self.eat(&TokenKind::Lt) {
                BinaryOp::Lt
            } else if self.eat(&TokenKind::Le) {
                BinaryOp::Le
            } else if self.eat(&TokenKind::Gt) {
                BinaryOp::Gt
            } else if self.eat(&TokenKind::Ge) {
                BinaryOp::Ge
            } else {
                break;
            };
            let right = self.parse_union()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_union(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_additive()?;
        while self.eat(&TokenKind::Pipe) {
            let right = self.parse_additive()?;
            left = binary(BinaryOp::Union, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat(&TokenKind::Plus) {
                BinaryOp::Add
            } else if self.eat(&TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat(&TokenKind::Star) {
                BinaryOp::Mul
            } else if self.eat(&TokenKind::Slash) {
                BinaryOp::Div
            } else if self.eat(&TokenKind::Div) {
                BinaryOp::IntDiv
            } else if self.eat(&TokenKind::Mod) {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        if self.eat(&TokenKind::Plus) {
            let operand = self.parse_unary()?;
            return Ok(unary(UnaryOp::Plus, operand));
        }
        if self.eat(&TokenKind::Minus) {
            let operand = self.parse_unary()?;
            return Ok(unary(UnaryOp::Minus, operand));
        }
        // `not` is an identifier lexically; treat it as a prefix operator
        // when it is followed by the start of another expression.
        if let Some(token) = self.peek()
            && let TokenKind::Identifier(name) = &token.kind
            && name.as_str() == "not"
            && self.tokens.get(self.pos + 1).is_some_and(starts_expression)
        {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(unary(UnaryOp::Not, operand));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.eat(&TokenKind::Dot) {
                let name = self.expect_member_name()?;
                if self.eat(&TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    expr = Expression::FunctionInvocation {
                        base: Some(Box::new(expr)),
                        name,
                        args,
                    };
                } else {
                    expr = Expression::MemberInvocation {
                        base: Box::new(expr),
                        name,
                    };
                }
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_implies()?;
                self.expect(&TokenKind::RBracket)?;
                expr = Expression::Indexer {
                    base: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        let token = match self.peek().cloned() {
            Some(token) => token,
            None => {
                return Err(self.error_at(self.source.chars().count(), "unexpected end of expression"));
            }
        };

        match token.kind {
            TokenKind::True => {
                self.pos += 1;
                Ok(Expression::BooleanLiteral(true))
            }
            TokenKind::False => {
                self.pos += 1;
                Ok(Expression::BooleanLiteral(false))
            }
            TokenKind::Number(lexeme) => {
                self.pos += 1;
                Ok(Expression::NumberLiteral(lexeme))
            }
            TokenKind::Str(value) => {
                self.pos += 1;
                Ok(Expression::StringLiteral(value))
            }
            TokenKind::EnvRef(name) => {
                self.pos += 1;
                Ok(Expression::Constant(name))
            }
            TokenKind::LParen => {
                self.pos += 1;
                let inner = self.parse_implies()?;
                self.expect(&TokenKind::RParen)?;
                Ok(Expression::Parenthesized(Box::new(inner)))
            }
            TokenKind::Identifier(name) => {
                self.pos += 1;
                if self.eat(&TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    Ok(Expression::FunctionInvocation {
                        base: None,
                        name,
                        args,
                    })
                } else {
                    Ok(Expression::Identifier(name))
                }
            }
            other => Err(self.error_at(
                token.pos,
                format!("expected an expression, found {}", other.describe()),
            )),
        }
    }

    /// Parse a parenthesised argument list; the opening paren is consumed.
    fn parse_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut args = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_implies()?);
            if self.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(&TokenKind::RParen)?;
            return Ok(args);
        }
    }

    /// Member names are identifiers, but FHIR element names may collide
    /// with reserved words (`contains`, `div`), so those are accepted too.
    fn expect_member_name(&mut self) -> Result<String, ParseError> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => {
                return Err(self.error_at(
                    self.source.chars().count(),
                    "expected a member name after '.'",
                ));
            }
        };
        let name = match &token.kind {
            TokenKind::Identifier(name) => name.clone(),
            TokenKind::Div => "div".to_string(),
            TokenKind::Mod => "mod".to_string(),
            TokenKind::In => "in".to_string(),
            TokenKind::Contains => "contains".to_string(),
            TokenKind::As => "as".to_string(),
            TokenKind::Is => "is".to_string(),
            other => {
                return Err(self.error_at(
                    token.pos,
                    format!("expected a member name after '.', found {}", other.describe()),
                ));
            }
        };
        self.pos += 1;
        Ok(name)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if self.eat(kind) {
            return Ok(());
        }
        match self.peek() {
            Some(token) => Err(self.error_at(
                token.pos,
                format!("expected {}, found {}", kind.describe(), token.kind.describe()),
            )),
            None => Err(self.error_at(
                self.source.chars().count(),
                format!("expected {}, found end of expression", kind.describe()),
            )),
        }
    }

    fn error_at(&self, position: usize, message: impl Into<String>) -> ParseError {
        ParseError::new(self.source, position, message)
    }
}

fn starts_expression(token: &Token) -> bool {
    matches!(
        token.kind,
        TokenKind::Identifier(_)
            | TokenKind::Number(_)
            | TokenKind::Str(_)
            | TokenKind::EnvRef(_)
            | TokenKind::True
            | TokenKind::False
            | TokenKind::LParen
    )
}

fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    Expression::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn unary(op: UnaryOp, operand: Expression) -> Expression {
    Expression::Unary {
        op,
        operand: Box::new(operand),
    }
}

//! The FHIRPath abstract syntax tree.
//!
//! A tagged sum type covering the ViewDefinition-reachable subset of the
//! FHIRPath grammar. Number literals keep their source lexeme so SQL
//! emission reproduces them verbatim.

/// A parsed FHIRPath expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A bare identifier (e.g. `name`, `family`).
    Identifier(String),

    /// An integer or decimal literal, lexeme preserved.
    NumberLiteral(String),

    /// A single-quoted string literal, unescaped.
    StringLiteral(String),

    /// `true` or `false`.
    BooleanLiteral(bool),

    /// A `%name` environment reference.
    Constant(String),

    /// Member access: `base.name`.
    MemberInvocation {
        base: Box<Expression>,
        name: String,
    },

    /// Function call, with or without a base: `base.f(args)` or `f(args)`.
    FunctionInvocation {
        base: Option<Box<Expression>>,
        name: String,
        args: Vec<Expression>,
    },

    /// Index access: `base[index]`.
    Indexer {
        base: Box<Expression>,
        index: Box<Expression>,
    },

    /// A binary operation.
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// A unary operation.
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },

    /// An explicitly parenthesised expression.
    Parenthesized(Box<Expression>),
}

impl Expression {
    /// Strip any explicit parentheses around this expression.
    pub fn unparenthesized(&self) -> &Expression {
        let mut expr = self;
        while let Expression::Parenthesized(inner) = expr {
            expr = inner;
        }
        expr
    }

    /// True if this is the literal `false` (possibly parenthesised).
    pub fn is_false_literal(&self) -> bool {
        matches!(self.unparenthesized(), Expression::BooleanLiteral(false))
    }

    /// True if this is the literal `true` (possibly parenthesised).
    pub fn is_true_literal(&self) -> bool {
        matches!(self.unparenthesized(), Expression::BooleanLiteral(true))
    }
}

/// Binary operators of the supported grammar subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    And,
    Or,
    Xor,
    Implies,
    In,
    Contains,
    Union,
}

impl BinaryOp {
    /// The operator's FHIRPath spelling, used in diagnostics.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::IntDiv => "div",
            Self::Mod => "mod",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Implies => "implies",
            Self::In => "in",
            Self::Contains => "contains",
            Self::Union => "|",
        }
    }

    /// True for operators whose result is boolean-valued.
    pub fn is_boolean(&self) -> bool {
        matches!(
            self,
            Self::Eq
                | Self::Ne
                | Self::Lt
                | Self::Le
                | Self::Gt
                | Self::Ge
                | Self::And
                | Self::Or
                | Self::Xor
                | Self::Implies
                | Self::In
                | Self::Contains
        )
    }
}

/// Unary operators of the supported grammar subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

impl UnaryOp {
    /// The operator's FHIRPath spelling, used in diagnostics.
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Not => "not",
        }
    }
}

use crate::error::Span;
use std::sync::Arc;

/// A parsed program. Immutable once built; the same program can be evaluated
/// any number of times against different root scopes.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Literal template text, written to the output as-is.
    Text {
        text: String,
        span: Span,
    },
    Let {
        name: String,
        value: Expr,
        span: Span,
    },
    Return {
        value: Expr,
        span: Span,
    },
    Expression {
        expr: Expr,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Text { span, .. } => span,
            Stmt::Let { span, .. } => span,
            Stmt::Return { span, .. } => span,
            Stmt::Expression { span, .. } => span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier {
        name: String,
        span: Span,
    },
    Integer {
        value: i64,
        span: Span,
    },
    Decimal {
        value: f64,
        span: Span,
    },
    String {
        value: String,
        span: Span,
    },
    Boolean {
        value: bool,
        span: Span,
    },
    Prefix {
        operator: PrefixOp,
        operand: Box<Expr>,
        span: Span,
    },
    Infix {
        left: Box<Expr>,
        operator: InfixOp,
        right: Box<Expr>,
        span: Span,
    },
    Assign {
        target: AssignTarget,
        value: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    /// `object.a.b[0].c`: a base expression followed by a flattened path.
    Property {
        object: Box<Expr>,
        path: Vec<PathSegment>,
        span: Span,
    },
    If {
        condition: Box<Expr>,
        consequence: Block,
        alternative: Option<Block>,
        span: Span,
    },
    Foreach {
        iterable: Box<Expr>,
        variable: String,
        body: Block,
        span: Span,
    },
    Function(Arc<FunctionLiteral>),
    Array {
        elements: Vec<Expr>,
        span: Span,
    },
    Hash {
        pairs: Vec<(String, Expr)>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Identifier { span, .. } => span,
            Expr::Integer { span, .. } => span,
            Expr::Decimal { span, .. } => span,
            Expr::String { span, .. } => span,
            Expr::Boolean { span, .. } => span,
            Expr::Prefix { span, .. } => span,
            Expr::Infix { span, .. } => span,
            Expr::Assign { span, .. } => span,
            Expr::Call { span, .. } => span,
            Expr::Index { span, .. } => span,
            Expr::Property { span, .. } => span,
            Expr::If { span, .. } => span,
            Expr::Foreach { span, .. } => span,
            Expr::Function(literal) => &literal.span,
            Expr::Array { span, .. } => span,
            Expr::Hash { span, .. } => span,
        }
    }
}

/// Shared so that closures created from it can outlive the evaluation that
/// made them.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub name: Option<String>,
    pub parameters: Vec<String>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Field { name: String, span: Span },
    Index { index: Expr, span: Span },
}

impl PathSegment {
    pub fn span(&self) -> &Span {
        match self {
            PathSegment::Field { span, .. } => span,
            PathSegment::Index { span, .. } => span,
        }
    }
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Identifier {
        name: String,
        span: Span,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Property {
        object: Box<Expr>,
        path: Vec<PathSegment>,
        span: Span,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl InfixOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            InfixOp::Add => "+",
            InfixOp::Subtract => "-",
            InfixOp::Multiply => "*",
            InfixOp::Divide => "/",
            InfixOp::Equal => "==",
            InfixOp::NotEqual => "!=",
            InfixOp::Less => "<",
            InfixOp::LessEqual => "<=",
            InfixOp::Greater => ">",
            InfixOp::GreaterEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Not,
    Negate,
}

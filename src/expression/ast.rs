use serde_json::Value;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinaryOperator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `@`
    Current,
    /// Field of the current node
    Field(String),
    /// `$name`
    Variable(String),
    Literal(Value),
    /// `lhs.rhs`: `rhs` evaluated with the result of `lhs` as current node
    Subexpression(Box<Expr>, Box<Expr>),
    /// `lhs[n]`, negative indexes count from the end
    Index(Box<Expr>, i64),
    /// `lhs.*`: values of an object as a list
    Values(Box<Expr>),
    /// `base[*].rhs` and `base[?filter].rhs`
    Projection {
        base: Box<Expr>,
        filter: Option<Box<Expr>>,
        rhs: Box<Expr>,
    },
    /// `lhs | rhs`
    Pipe(Box<Expr>, Box<Expr>),
    Binary {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    Negate(Box<Expr>),
    FunctionCall {
        name: String,
        arguments: Vec<Expr>,
    },
    /// `[a, b]`
    MultiList(Vec<Expr>),
    /// `{a: x, b: y}`
    MultiHash(Vec<(String, Expr)>),
}

impl Expr {
    /// Walks the tree depth first, calling `f` on every node.
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Current | Expr::Field(_) | Expr::Variable(_) | Expr::Literal(_) => {}
            Expr::Subexpression(lhs, rhs) | Expr::Pipe(lhs, rhs) => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Expr::Index(inner, _) | Expr::Values(inner) | Expr::Not(inner) | Expr::Negate(inner) => {
                inner.visit(f)
            }
            Expr::Projection { base, filter, rhs } => {
                base.visit(f);
                if let Some(filter) = filter {
                    filter.visit(f);
                }
                rhs.visit(f);
            }
            Expr::Binary { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::FunctionCall { arguments, .. } | Expr::MultiList(arguments) => {
                for argument in arguments {
                    argument.visit(f);
                }
            }
            Expr::MultiHash(entries) => {
                for (_, value) in entries {
                    value.visit(f);
                }
            }
        }
    }
}

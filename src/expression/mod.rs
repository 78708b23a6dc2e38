//! # Expression Engine
//!
//! Embedded expressions appear in resource templates, assertion trees and
//! binding values as strings of the form `(statement)` or
//! `(dialect;statement)`. A string wrapped in backslashes, `\(...)\`, is an
//! escaped literal and is never evaluated.
//!
//! Dialects are pluggable through the [`Compiler`] trait and looked up in a
//! [`Compilers`] registry. The built-in dialect is `jp`, a JMESPath-flavoured
//! query language with arithmetic, variables (`$name`) and the functions in
//! [`functions`].

pub mod ast;
pub mod evaluator;
pub mod functions;
pub mod parser;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use mockall::automock;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::bindings::Bindings;
use crate::tokenizer::TokenizerError;

pub use ast::Expr;
pub use evaluator::{compare_values, is_truthy, type_name, values_equal};

/// Name of the built-in dialect.
pub const JP: &str = "jp";

lazy_static! {
    static ref ESCAPE: Regex = Regex::new(r"^\\(.+)\\$").expect("valid escape regex");
    static ref EXPRESSION: Regex =
        Regex::new(r"(?s)^\((?:(\w+);)?(.+)\)$").expect("valid expression regex");
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("failed to tokenize expression: {0}")]
    Tokenize(#[from] TokenizerError),
    #[error("failed to parse expression: {message}, found {found}")]
    Parse { message: String, found: String },
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("invalid number of arguments for {name}: expected {expected}, got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },
    #[error("invalid type for {context}: expected {expected}, got {found}")]
    InvalidType {
        context: String,
        expected: String,
        found: String,
    },
    #[error("variable not defined: ${0}")]
    UndefinedVariable(String),
    #[error("unknown expression dialect: {0}")]
    UnknownDialect(String),
    #[error("{0}")]
    Evaluation(String),
}

/// Recognised form of a string scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embedded<'a> {
    /// `(stmt)` or `(dialect;stmt)`
    Expression {
        dialect: Option<&'a str>,
        statement: &'a str,
    },
    /// `\body\`, carrying the body without the backslashes
    Escaped(&'a str),
}

/// Classifies a string scalar. Returns `None` for plain literals.
pub fn parse_embedded(input: &str) -> Option<Embedded<'_>> {
    if let Some(captures) = ESCAPE.captures(input) {
        return captures.get(1).map(|body| Embedded::Escaped(body.as_str()));
    }
    let captures = EXPRESSION.captures(input)?;
    let statement = captures.get(2)?.as_str();
    Some(Embedded::Expression {
        dialect: captures.get(1).map(|d| d.as_str()),
        statement,
    })
}

/// A compiled statement ready to run against an input document.
pub trait Program: Send + Sync {
    fn evaluate(&self, input: &Value, bindings: &Bindings) -> Result<Value, ExpressionError>;
}

impl<F> Program for F
where
    F: Fn(&Value, &Bindings) -> Result<Value, ExpressionError> + Send + Sync,
{
    fn evaluate(&self, input: &Value, bindings: &Bindings) -> Result<Value, ExpressionError> {
        self(input, bindings)
    }
}

/// Turns statements of one dialect into [`Program`]s.
#[automock]
pub trait Compiler: Send + Sync {
    fn compile(&self, statement: &str) -> Result<Arc<dyn Program>, ExpressionError>;
}

/// The built-in `jp` dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpCompiler;

#[derive(Debug)]
struct JpProgram {
    expr: Expr,
}

impl Program for JpProgram {
    fn evaluate(&self, input: &Value, bindings: &Bindings) -> Result<Value, ExpressionError> {
        evaluator::evaluate(&self.expr, input, bindings)
    }
}

impl Compiler for JpCompiler {
    fn compile(&self, statement: &str) -> Result<Arc<dyn Program>, ExpressionError> {
        let expr = parser::parse(statement)?;
        let mut unknown = None;
        expr.visit(&mut |node| {
            if let Expr::FunctionCall { name, arguments } = node {
                if unknown.is_none() {
                    if let Err(e) = functions::check_call(name, arguments.len()) {
                        unknown = Some(e);
                    }
                }
            }
        });
        match unknown {
            Some(e) => Err(e),
            None => Ok(Arc::new(JpProgram { expr })),
        }
    }
}

/// Registry of dialects with a default used when a statement names none.
#[derive(Clone)]
pub struct Compilers {
    default: String,
    compilers: HashMap<String, Arc<dyn Compiler>>,
}

impl Default for Compilers {
    fn default() -> Self {
        let mut compilers: HashMap<String, Arc<dyn Compiler>> = HashMap::new();
        compilers.insert(JP.to_string(), Arc::new(JpCompiler));
        Self {
            default: JP.to_string(),
            compilers,
        }
    }
}

impl fmt::Debug for Compilers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.compilers.keys().collect();
        names.sort();
        f.debug_struct("Compilers")
            .field("default", &self.default)
            .field("dialects", &names)
            .finish()
    }
}

impl Compilers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compiler(mut self, dialect: impl Into<String>, compiler: Arc<dyn Compiler>) -> Self {
        self.compilers.insert(dialect.into(), compiler);
        self
    }

    /// Switches the default dialect. The dialect must already be registered.
    pub fn with_default(mut self, dialect: &str) -> Result<Self, ExpressionError> {
        if !self.compilers.contains_key(dialect) {
            return Err(ExpressionError::UnknownDialect(dialect.to_string()));
        }
        self.default = dialect.to_string();
        Ok(self)
    }

    pub fn default_dialect(&self) -> &str {
        &self.default
    }

    pub fn get(&self, dialect: Option<&str>) -> Result<&Arc<dyn Compiler>, ExpressionError> {
        let dialect = dialect.unwrap_or(&self.default);
        self.compilers
            .get(dialect)
            .ok_or_else(|| ExpressionError::UnknownDialect(dialect.to_string()))
    }

    pub fn compile(
        &self,
        dialect: Option<&str>,
        statement: &str,
    ) -> Result<Arc<dyn Program>, ExpressionError> {
        self.get(dialect)?.compile(statement)
    }

    /// Compiles and runs `statement` in one go.
    pub fn execute(
        &self,
        dialect: Option<&str>,
        statement: &str,
        input: &Value,
        bindings: &Bindings,
    ) -> Result<Value, ExpressionError> {
        tracing::trace!(dialect = dialect.unwrap_or(&self.default), statement, "evaluating expression");
        self.compile(dialect, statement)?.evaluate(input, bindings)
    }
}

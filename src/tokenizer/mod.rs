//! # Expression Tokenizer
//!
//! Lexical analysis for the built-in `jp` expression dialect. The tokenizer
//! turns a statement such as `items[?kind == 'Pod'] | length(@)` into a flat
//! list of [`token::TokenSpan`]s that the parser in [`crate::expression`]
//! consumes. Whitespace is skipped; every other character must belong to a
//! token or tokenization fails with the offending offset.
//!
//! Built with `nom` combinators:
//!
//! * [`literal`]: raw strings, JSON literals and numbers
//! * [`symbol`]: operators and delimiters (longest match first)
//! * [`token`]: identifiers, variables and the driving [`token::Tokenizer`]

pub mod literal;
pub mod symbol;
pub mod token;

pub use literal::Literal;
pub use symbol::{Delimiter, Operator};
pub use token::{Token, TokenSpan, Tokenizer, TokenizerError};

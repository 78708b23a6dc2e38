use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag, take_while, take_while1},
    character::complete::{char, multispace1},
    combinator::{map, opt, recognize, value},
    error::{context, VerboseError},
    sequence::{delimited, pair, preceded},
    IResult,
};
use thiserror::Error;

use super::{
    literal::{parse_literal, Literal},
    symbol::{parse_delimiter, parse_operator, Delimiter, Operator},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Identifier(String),
    /// `$name`
    Variable(String),
    Operator(Operator),
    Delimiter(Delimiter),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenSpan {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

pub type ParserResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

pub type TokenizerResult<T> = Result<T, TokenizerError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenizerError {
    #[error("unexpected input at offset {position}: {found}")]
    ParseError {
        message: String,
        found: String,
        position: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    current_position: usize,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub fn tokenize(&mut self, input: &str) -> TokenizerResult<Vec<TokenSpan>> {
        let mut tokens = Vec::new();
        let mut remaining = input;

        while !remaining.is_empty() {
            if let Ok((rest, _)) = multispace1::<&str, VerboseError<&str>>(remaining) {
                self.current_position += remaining.len() - rest.len();
                remaining = rest;
                continue;
            }

            let result = alt((
                parse_literal,
                parse_variable,
                parse_quoted_identifier,
                parse_identifier,
                parse_operator,
                parse_delimiter,
            ))(remaining);

            match result {
                Ok((rest, token)) => {
                    let start = self.current_position;
                    self.current_position += remaining.len() - rest.len();
                    tokens.push(TokenSpan {
                        token,
                        start,
                        end: self.current_position,
                    });
                    remaining = rest;
                }
                Err(e) => {
                    let found = remaining.chars().take(20).collect::<String>();
                    let message = match e {
                        nom::Err::Incomplete(needed) => format!("incomplete input, {:?}", needed),
                        nom::Err::Error(e) | nom::Err::Failure(e) => {
                            nom::error::convert_error(remaining, e)
                        }
                    };
                    return Err(TokenizerError::ParseError {
                        message,
                        found,
                        position: self.current_position,
                    });
                }
            }
        }

        Ok(tokens)
    }
}

fn identifier_body(input: &str) -> ParserResult<&str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_'),
    ))(input)
}

fn parse_identifier(input: &str) -> ParserResult<Token> {
    context(
        "identifier",
        map(identifier_body, |id: &str| Token::Identifier(id.to_string())),
    )(input)
}

/// `"app.kubernetes.io/name"` style identifiers for keys that are not plain words.
fn parse_quoted_identifier(input: &str) -> ParserResult<Token> {
    context(
        "quoted identifier",
        map(
            delimited(
                char('"'),
                map(
                    opt(escaped_transform(
                        is_not("\\\""),
                        '\\',
                        alt((value("\"", tag("\"")), value("\\", tag("\\")))),
                    )),
                    Option::unwrap_or_default,
                ),
                char('"'),
            ),
            Token::Identifier,
        ),
    )(input)
}

fn parse_variable(input: &str) -> ParserResult<Token> {
    context(
        "variable",
        map(preceded(char('$'), identifier_body), |name: &str| {
            Token::Variable(name.to_string())
        }),
    )(input)
}

use nom::{
    branch::alt,
    bytes::complete::{escaped_transform, is_not, tag},
    character::complete::{char, digit1},
    combinator::{map, map_res, opt, recognize, value},
    error::context,
    sequence::{delimited, tuple},
};
use serde_json::Value;

use super::token::{ParserResult, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `'raw string'`
    String(String),
    /// Bare unsigned number, integer or float
    Number(serde_json::Number),
    /// `` `json` ``
    Json(Value),
}

fn parse_raw_string(input: &str) -> ParserResult<Literal> {
    context(
        "raw string literal",
        map(
            delimited(
                char('\''),
                map(
                    opt(escaped_transform(
                        is_not("\\'"),
                        '\\',
                        alt((value("'", tag("'")), value("\\", tag("\\")))),
                    )),
                    Option::unwrap_or_default,
                ),
                char('\''),
            ),
            Literal::String,
        ),
    )(input)
}

fn parse_json_literal(input: &str) -> ParserResult<Literal> {
    context(
        "json literal",
        map_res(
            delimited(char('`'), opt(is_not("`")), char('`')),
            |body: Option<&str>| {
                serde_json::from_str::<Value>(body.unwrap_or_default().trim()).map(Literal::Json)
            },
        ),
    )(input)
}

fn parse_float(input: &str) -> ParserResult<Literal> {
    context(
        "float literal",
        map_res(
            recognize(tuple((digit1, char('.'), digit1))),
            |s: &str| match s.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                Some(n) => Ok(Literal::Number(n)),
                None => Err(format!("invalid float {}", s)),
            },
        ),
    )(input)
}

fn parse_integer(input: &str) -> ParserResult<Literal> {
    context(
        "integer literal",
        map_res(digit1, |s: &str| {
            s.parse::<i64>().map(|i| Literal::Number(i.into()))
        }),
    )(input)
}

pub fn parse_literal(input: &str) -> ParserResult<Token> {
    context(
        "literal",
        map(
            alt((parse_raw_string, parse_json_literal, parse_float, parse_integer)),
            Token::Literal,
        ),
    )(input)
}

//! # Symbol Token Handling
//!
//! Operators and delimiters recognised by the `jp` expression dialect.
//!
//! Symbols are parsed using a longest-match approach so that multi-character
//! operators like `||` and `<=` are not split into two tokens.

use strum_macros::{AsRefStr, Display, EnumString};

use nom::{
    branch::alt,
    bytes::complete::tag,
    combinator::{map, value},
    error::context,
};

use super::token::{ParserResult, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum Operator {
    /// Member access (`.`)
    #[strum(serialize = ".")]
    Dot,
    /// Pipe (`|`)
    #[strum(serialize = "|")]
    Pipe,
    /// Current node (`@`)
    #[strum(serialize = "@")]
    At,

    #[strum(serialize = "==")]
    EqualEqual,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEqual,

    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    /// Multiplication, or wildcard inside brackets (`*`)
    #[strum(serialize = "*")]
    Star,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,

    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "!")]
    Not,
    /// Filter marker (`?`), only valid right after `[`
    #[strum(serialize = "?")]
    Question,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum Delimiter {
    #[strum(serialize = "(")]
    OpenParen,
    #[strum(serialize = ")")]
    CloseParen,
    #[strum(serialize = "[")]
    OpenBracket,
    #[strum(serialize = "]")]
    CloseBracket,
    #[strum(serialize = "{")]
    OpenBrace,
    #[strum(serialize = "}")]
    CloseBrace,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = ":")]
    Colon,
}

pub fn parse_operator(input: &str) -> ParserResult<Token> {
    context(
        "operator",
        map(
            alt((
                // Multi-character operators first
                value(Operator::EqualEqual, tag("==")),
                value(Operator::NotEqual, tag("!=")),
                value(Operator::GreaterEqual, tag(">=")),
                value(Operator::LessEqual, tag("<=")),
                value(Operator::And, tag("&&")),
                value(Operator::Or, tag("||")),
                value(Operator::Dot, tag(".")),
                value(Operator::Pipe, tag("|")),
                value(Operator::At, tag("@")),
                value(Operator::Greater, tag(">")),
                value(Operator::Less, tag("<")),
                value(Operator::Plus, tag("+")),
                value(Operator::Minus, tag("-")),
                value(Operator::Star, tag("*")),
                value(Operator::Divide, tag("/")),
                value(Operator::Modulo, tag("%")),
                value(Operator::Not, tag("!")),
                value(Operator::Question, tag("?")),
            )),
            Token::Operator,
        ),
    )(input)
}

pub fn parse_delimiter(input: &str) -> ParserResult<Token> {
    context(
        "delimiter",
        map(
            alt((
                value(Delimiter::OpenParen, tag("(")),
                value(Delimiter::CloseParen, tag(")")),
                value(Delimiter::OpenBracket, tag("[")),
                value(Delimiter::CloseBracket, tag("]")),
                value(Delimiter::OpenBrace, tag("{")),
                value(Delimiter::CloseBrace, tag("}")),
                value(Delimiter::Comma, tag(",")),
                value(Delimiter::Colon, tag(":")),
            )),
            Token::Delimiter,
        ),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_match() {
        let (rest, token) = parse_operator("<=1").unwrap();
        assert_eq!(rest, "1");
        assert_eq!(token, Token::Operator(Operator::LessEqual));

        let (_, token) = parse_operator("||").unwrap();
        assert_eq!(token, Token::Operator(Operator::Or));
    }

    #[test]
    fn test_delimiters() {
        let (rest, token) = parse_delimiter("[?").unwrap();
        assert_eq!(rest, "?");
        assert_eq!(token, Token::Delimiter(Delimiter::OpenBracket));
        assert!(parse_delimiter("x").is_err());
    }
}

//! Precedence-layered parser for the `jp` dialect.
//!
//! Layers, loosest first: pipe, logical or, logical and, comparison,
//! additive, multiplicative, unary, postfix chain, primary. Projections
//! (`[*]`, `[?filter]`, `.*`) capture the rest of the postfix chain so that
//! `items[*].metadata.name` applies `metadata.name` to each element.

use serde_json::Value;

use super::ast::{BinaryOperator, Expr};
use super::ExpressionError;
use crate::tokenizer::{Delimiter, Literal, Operator, Token, TokenSpan, Tokenizer};

pub type ParseResult<T> = Result<T, ExpressionError>;

pub fn parse(input: &str) -> ParseResult<Expr> {
    let tokens = Tokenizer::new().tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_pipe()?;
    match parser.peek() {
        None => Ok(expr),
        Some(_) => Err(parser.unexpected("end of expression")),
    }
}

struct Parser {
    tokens: Vec<TokenSpan>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|span| &span.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|span| &span.token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|span| span.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_operator(&mut self, op: Operator) -> bool {
        if self.peek() == Some(&Token::Operator(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_delimiter(&mut self, delimiter: Delimiter) -> bool {
        if self.peek() == Some(&Token::Delimiter(delimiter)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_delimiter(&mut self, delimiter: Delimiter) -> ParseResult<()> {
        if self.eat_delimiter(delimiter) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", delimiter)))
        }
    }

    fn unexpected(&self, expected: &str) -> ExpressionError {
        match self.tokens.get(self.pos) {
            Some(span) => ExpressionError::Parse {
                message: format!("expected {} at offset {}", expected, span.start),
                found: format!("{:?}", span.token),
            },
            None => ExpressionError::Parse {
                message: format!("expected {}", expected),
                found: "end of input".to_string(),
            },
        }
    }

    fn parse_pipe(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_logical_or()?;
        while self.eat_operator(Operator::Pipe) {
            let right = self.parse_logical_or()?;
            left = Expr::Pipe(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_logical_and()?;
        while self.eat_operator(Operator::Or) {
            let right = self.parse_logical_and()?;
            left = binary(BinaryOperator::Or, left, right);
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.eat_operator(Operator::And) {
            let right = self.parse_comparison()?;
            left = binary(BinaryOperator::And, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        while let Some(op) = self.peek().and_then(comparison_operator) {
            self.pos += 1;
            let right = self.parse_additive()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Operator(Operator::Plus)) => BinaryOperator::Add,
                Some(Token::Operator(Operator::Minus)) => BinaryOperator::Subtract,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    // 乗除算 (*, /, %)
    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Operator(Operator::Star)) => BinaryOperator::Multiply,
                Some(Token::Operator(Operator::Divide)) => BinaryOperator::Divide,
                Some(Token::Operator(Operator::Modulo)) => BinaryOperator::Modulo,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        if self.eat_operator(Operator::Not) {
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        if self.eat_operator(Operator::Minus) {
            return Ok(Expr::Negate(Box::new(self.parse_unary()?)));
        }
        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    fn parse_postfix(&mut self, mut base: Expr) -> ParseResult<Expr> {
        loop {
            match self.peek() {
                Some(Token::Operator(Operator::Dot)) => {
                    self.pos += 1;
                    if self.eat_operator(Operator::Star) {
                        let rhs = self.parse_postfix(Expr::Current)?;
                        return Ok(Expr::Projection {
                            base: Box::new(Expr::Values(Box::new(base))),
                            filter: None,
                            rhs: Box::new(rhs),
                        });
                    }
                    let rhs = self.parse_dot_target()?;
                    base = Expr::Subexpression(Box::new(base), Box::new(rhs));
                }
                Some(Token::Delimiter(Delimiter::OpenBracket)) => match self.peek_at(1) {
                    Some(Token::Operator(Operator::Star)) => {
                        self.pos += 2;
                        self.expect_delimiter(Delimiter::CloseBracket)?;
                        let rhs = self.parse_postfix(Expr::Current)?;
                        return Ok(projection(base, None, rhs));
                    }
                    Some(Token::Operator(Operator::Question)) => {
                        self.pos += 2;
                        let filter = self.parse_pipe()?;
                        self.expect_delimiter(Delimiter::CloseBracket)?;
                        let rhs = self.parse_postfix(Expr::Current)?;
                        return Ok(projection(base, Some(filter), rhs));
                    }
                    _ => {
                        self.pos += 1;
                        let index = self.parse_index()?;
                        self.expect_delimiter(Delimiter::CloseBracket)?;
                        base = Expr::Index(Box::new(base), index);
                    }
                },
                _ => return Ok(base),
            }
        }
    }

    fn parse_dot_target(&mut self) -> ParseResult<Expr> {
        match self.peek() {
            Some(Token::Identifier(_)) => self.parse_identifier_or_call(),
            Some(Token::Delimiter(Delimiter::OpenBracket)) => {
                self.pos += 1;
                self.parse_multi_list()
            }
            Some(Token::Delimiter(Delimiter::OpenBrace)) => {
                self.pos += 1;
                self.parse_multi_hash()
            }
            _ => Err(self.unexpected("field name after '.'")),
        }
    }

    fn parse_index(&mut self) -> ParseResult<i64> {
        let negative = self.eat_operator(Operator::Minus);
        match self.advance() {
            Some(Token::Literal(Literal::Number(n))) => match n.as_i64() {
                Some(i) if negative => Ok(-i),
                Some(i) => Ok(i),
                None => Err(ExpressionError::Parse {
                    message: "index must be an integer".to_string(),
                    found: n.to_string(),
                }),
            },
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.unexpected("index"))
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.peek().cloned() {
            Some(Token::Identifier(_)) => self.parse_identifier_or_call(),
            Some(Token::Variable(name)) => {
                self.pos += 1;
                Ok(Expr::Variable(name))
            }
            Some(Token::Literal(literal)) => {
                self.pos += 1;
                Ok(Expr::Literal(match literal {
                    Literal::String(s) => Value::String(s),
                    Literal::Number(n) => Value::Number(n),
                    Literal::Json(v) => v,
                }))
            }
            Some(Token::Operator(Operator::At)) => {
                self.pos += 1;
                Ok(Expr::Current)
            }
            Some(Token::Operator(Operator::Star)) => {
                // bare `*` projects the values of the current node
                self.pos += 1;
                let rhs = self.parse_postfix(Expr::Current)?;
                Ok(projection(Expr::Values(Box::new(Expr::Current)), None, rhs))
            }
            Some(Token::Delimiter(Delimiter::OpenParen)) => {
                self.pos += 1;
                let inner = self.parse_pipe()?;
                self.expect_delimiter(Delimiter::CloseParen)?;
                Ok(inner)
            }
            Some(Token::Delimiter(Delimiter::OpenBracket)) => {
                self.pos += 1;
                if self.eat_operator(Operator::Star) {
                    self.expect_delimiter(Delimiter::CloseBracket)?;
                    let rhs = self.parse_postfix(Expr::Current)?;
                    return Ok(projection(Expr::Current, None, rhs));
                }
                if self.eat_operator(Operator::Question) {
                    let filter = self.parse_pipe()?;
                    self.expect_delimiter(Delimiter::CloseBracket)?;
                    let rhs = self.parse_postfix(Expr::Current)?;
                    return Ok(projection(Expr::Current, Some(filter), rhs));
                }
                if matches!(
                    (self.peek(), self.peek_at(1)),
                    (Some(Token::Literal(Literal::Number(_))), Some(Token::Delimiter(Delimiter::CloseBracket)))
                ) {
                    let index = self.parse_index()?;
                    self.expect_delimiter(Delimiter::CloseBracket)?;
                    return Ok(Expr::Index(Box::new(Expr::Current), index));
                }
                self.parse_multi_list()
            }
            Some(Token::Delimiter(Delimiter::OpenBrace)) => {
                self.pos += 1;
                self.parse_multi_hash()
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_identifier_or_call(&mut self) -> ParseResult<Expr> {
        let name = match self.advance() {
            Some(Token::Identifier(name)) => name,
            _ => return Err(self.unexpected("identifier")),
        };
        if !self.eat_delimiter(Delimiter::OpenParen) {
            return Ok(Expr::Field(name));
        }
        let mut arguments = Vec::new();
        if !self.eat_delimiter(Delimiter::CloseParen) {
            loop {
                arguments.push(self.parse_pipe()?);
                if self.eat_delimiter(Delimiter::CloseParen) {
                    break;
                }
                self.expect_delimiter(Delimiter::Comma)?;
            }
        }
        Ok(Expr::FunctionCall { name, arguments })
    }

    /// Called after the opening `[`.
    fn parse_multi_list(&mut self) -> ParseResult<Expr> {
        let mut items = Vec::new();
        if self.eat_delimiter(Delimiter::CloseBracket) {
            return Ok(Expr::MultiList(items));
        }
        loop {
            items.push(self.parse_pipe()?);
            if self.eat_delimiter(Delimiter::CloseBracket) {
                return Ok(Expr::MultiList(items));
            }
            self.expect_delimiter(Delimiter::Comma)?;
        }
    }

    /// Called after the opening `{`.
    fn parse_multi_hash(&mut self) -> ParseResult<Expr> {
        let mut entries = Vec::new();
        if self.eat_delimiter(Delimiter::CloseBrace) {
            return Ok(Expr::MultiHash(entries));
        }
        loop {
            let key = match self.advance() {
                Some(Token::Identifier(key)) => key,
                Some(Token::Literal(Literal::String(key))) => key,
                _ => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.unexpected("key"));
                }
            };
            self.expect_delimiter(Delimiter::Colon)?;
            entries.push((key, self.parse_pipe()?));
            if self.eat_delimiter(Delimiter::CloseBrace) {
                return Ok(Expr::MultiHash(entries));
            }
            self.expect_delimiter(Delimiter::Comma)?;
        }
    }
}

fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn projection(base: Expr, filter: Option<Expr>, rhs: Expr) -> Expr {
    Expr::Projection {
        base: Box::new(base),
        filter: filter.map(Box::new),
        rhs: Box::new(rhs),
    }
}

fn comparison_operator(token: &Token) -> Option<BinaryOperator> {
    match token {
        Token::Operator(Operator::EqualEqual) => Some(BinaryOperator::Equal),
        Token::Operator(Operator::NotEqual) => Some(BinaryOperator::NotEqual),
        Token::Operator(Operator::Less) => Some(BinaryOperator::Less),
        Token::Operator(Operator::LessEqual) => Some(BinaryOperator::LessEqual),
        Token::Operator(Operator::Greater) => Some(BinaryOperator::Greater),
        Token::Operator(Operator::GreaterEqual) => Some(BinaryOperator::GreaterEqual),
        _ => None,
    }
}

// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Recursive-descent parser for the documented `$filter` / `$orderby`
//! expression subset.
//!
//! Precedence, loosest first: `or`, `and`, comparison (`eq ne gt ge lt
//! le`, `in`), additive (`add sub`), multiplicative (`mul div mod`),
//! `not` / primary. `cast(<literal>,Edm.<T>)` payloads for Date,
//! TimeOfDay, DateTimeOffset and Guid are captured as raw text (they do
//! not tokenize as expressions) and produce typed constants; any other
//! cast target parses its first argument as an expression and yields a
//! convert node.

use super::ast::{BinaryOp, Direction, EdmType, Expr, Function, OrderBy, UnaryOp, Value};
use super::lexer::{Lexer, Token, TokenKind};
use super::ParseError;

/// Parse a complete `$filter` expression.
pub fn parse_filter(src: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser::new(src);
    let expr = parser.or_expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Parse a complete `$orderby` clause.
pub fn parse_orderby(src: &str) -> Result<Vec<OrderBy>, ParseError> {
    let mut out = Vec::new();
    for part in src.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(ParseError::new("empty $orderby segment", 0));
        }
        let mut words = part.split_whitespace();
        let field = words.next().unwrap();
        validate_member(field, 0)?;
        let direction = match words.next() {
            None => Direction::Asc,
            Some("asc") => Direction::Asc,
            Some("desc") => Direction::Desc,
            Some(other) => {
                return Err(ParseError::new(
                    format!("expected asc or desc, found {:?}", other),
                    0,
                ))
            }
        };
        if words.next().is_some() {
            return Err(ParseError::new(
                format!("trailing text in $orderby segment {:?}", part),
                0,
            ));
        }
        out.push(OrderBy {
            field: field.to_string(),
            direction,
        });
    }
    Ok(out)
}

fn validate_member(name: &str, pos: usize) -> Result<(), ParseError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid && !is_reserved_word(name) {
        Ok(())
    } else {
        Err(ParseError::new(format!("invalid field name {:?}", name), pos))
    }
}

fn is_reserved_word(name: &str) -> bool {
    matches!(
        name,
        "and" | "or" | "not" | "eq" | "ne" | "gt" | "ge" | "lt" | "le" | "add" | "sub" | "mul"
            | "div" | "mod" | "in" | "true" | "false" | "null" | "cast"
    )
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            lexer: Lexer::new(src),
            lookahead: None,
        }
    }

    fn next(&mut self) -> Result<Option<Token>, ParseError> {
        match self.lookahead.take() {
            Some(token) => Ok(Some(token)),
            None => self.lexer.next_token(),
        }
    }

    fn peek(&mut self) -> Result<Option<&Token>, ParseError> {
        if self.lookahead.is_none() {
            self.lookahead = self.lexer.next_token()?;
        }
        Ok(self.lookahead.as_ref())
    }

    /// The next token when it is the given word; consumed on match.
    fn eat_word(&mut self, word: &str) -> Result<bool, ParseError> {
        let matches = match self.peek()? {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => name == word,
            _ => false,
        };
        if matches {
            self.next()?;
        }
        Ok(matches)
    }

    fn peek_word(&mut self) -> Result<Option<String>, ParseError> {
        Ok(match self.peek()? {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => Some(name.clone()),
            _ => None,
        })
    }

    fn expect_kind(&mut self, expected: TokenKind, what: &str) -> Result<(), ParseError> {
        let pos = self.lexer.position();
        match self.next()? {
            Some(token) if token.kind == expected => Ok(()),
            Some(token) => Err(ParseError::new(
                format!("expected {}, found {:?}", what, token.kind),
                token.pos,
            )),
            None => Err(ParseError::new(format!("expected {}", what), pos)),
        }
    }

    fn expect_eof(&mut self) -> Result<(), ParseError> {
        match self.next()? {
            None => Ok(()),
            Some(token) => Err(ParseError::new(
                format!("unexpected trailing token {:?}", token.kind),
                token.pos,
            )),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.eat_word("or")? {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.comparison_expr()?;
        while self.eat_word("and")? {
            let rhs = self.comparison_expr()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn comparison_expr(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.additive_expr()?;
        let op = match self.peek_word()?.as_deref() {
            Some("eq") => BinaryOp::Eq,
            Some("ne") => BinaryOp::Ne,
            Some("gt") => BinaryOp::Gt,
            Some("ge") => BinaryOp::Ge,
            Some("lt") => BinaryOp::Lt,
            Some("le") => BinaryOp::Le,
            Some("in") => return self.in_expr(lhs),
            _ => return Ok(lhs),
        };
        self.next()?;
        let rhs = self.additive_expr()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn in_expr(&mut self, lhs: Expr) -> Result<Expr, ParseError> {
        self.next()?; // the `in` word
        self.expect_kind(TokenKind::OpenParen, "'('")?;
        let mut values = Vec::new();
        loop {
            values.push(self.literal_value()?);
            let pos = self.lexer.position();
            match self.next()? {
                Some(Token {
                    kind: TokenKind::Comma,
                    ..
                }) => continue,
                Some(Token {
                    kind: TokenKind::CloseParen,
                    ..
                }) => break,
                Some(token) => {
                    return Err(ParseError::new(
                        format!("expected ',' or ')', found {:?}", token.kind),
                        token.pos,
                    ))
                }
                None => return Err(ParseError::new("unterminated in-list", pos)),
            }
        }
        Ok(Expr::In(Box::new(lhs), values))
    }

    fn additive_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative_expr()?;
        loop {
            let op = match self.peek_word()?.as_deref() {
                Some("add") => BinaryOp::Add,
                Some("sub") => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.next()?;
            let rhs = self.multiplicative_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek_word()?.as_deref() {
                Some("mul") => BinaryOp::Mul,
                Some("div") => BinaryOp::Div,
                Some("mod") => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.next()?;
            let rhs = self.unary_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        if self.eat_word("not")? {
            let inner = self.unary_expr()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.primary_expr()
    }

    fn primary_expr(&mut self) -> Result<Expr, ParseError> {
        let pos = self.lexer.position();
        let token = self
            .next()?
            .ok_or_else(|| ParseError::new("unexpected end of expression", pos))?;
        match token.kind {
            TokenKind::OpenParen => {
                let inner = self.or_expr()?;
                self.expect_kind(TokenKind::CloseParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Int(i) => Ok(Expr::Constant(Value::Int(i))),
            TokenKind::Double(d) => Ok(Expr::Constant(Value::Double(d))),
            TokenKind::Decimal(d) => Ok(Expr::Constant(Value::Decimal(d))),
            TokenKind::Str(s) => Ok(Expr::Constant(Value::String(s))),
            TokenKind::Ident(name) => self.ident_expr(name, token.pos),
            other => Err(ParseError::new(
                format!("unexpected token {:?}", other),
                token.pos,
            )),
        }
    }

    fn ident_expr(&mut self, name: String, pos: usize) -> Result<Expr, ParseError> {
        match name.as_str() {
            "true" => return Ok(Expr::Constant(Value::Bool(true))),
            "false" => return Ok(Expr::Constant(Value::Bool(false))),
            "null" => return Ok(Expr::Constant(Value::Null)),
            "cast" => return self.cast_expr(pos),
            _ => {}
        }
        let is_call = matches!(
            self.peek()?,
            Some(Token {
                kind: TokenKind::OpenParen,
                ..
            })
        );
        if is_call {
            let func = Function::from_name(&name)
                .ok_or_else(|| ParseError::new(format!("unknown function {:?}", name), pos))?;
            self.next()?; // '('
            let mut args = Vec::new();
            loop {
                args.push(self.or_expr()?);
                let at = self.lexer.position();
                match self.next()? {
                    Some(Token {
                        kind: TokenKind::Comma,
                        ..
                    }) => continue,
                    Some(Token {
                        kind: TokenKind::CloseParen,
                        ..
                    }) => break,
                    Some(token) => {
                        return Err(ParseError::new(
                            format!("expected ',' or ')', found {:?}", token.kind),
                            token.pos,
                        ))
                    }
                    None => return Err(ParseError::new("unterminated argument list", at)),
                }
            }
            if args.len() != func.arity() {
                return Err(ParseError::new(
                    format!(
                        "{} takes {} argument(s), found {}",
                        func.name(),
                        func.arity(),
                        args.len()
                    ),
                    pos,
                ));
            }
            return Ok(Expr::Function(func, args));
        }
        validate_member(&name, pos)?;
        Ok(Expr::Member(name))
    }

    /// `cast(` has been consumed; the raw first argument cannot be
    /// tokenized normally because date/guid literals are unquoted.
    fn cast_expr(&mut self, pos: usize) -> Result<Expr, ParseError> {
        self.expect_kind(TokenKind::OpenParen, "'('")?;
        debug_assert!(self.lookahead.is_none());
        let raw = self.lexer.raw_until(',')?.to_string();
        self.expect_kind(TokenKind::Comma, "','")?;
        let at = self.lexer.position();
        let target = match self.next()? {
            Some(Token {
                kind: TokenKind::Ident(name),
                ..
            }) => EdmType::from_name(&name)
                .ok_or_else(|| ParseError::new(format!("unknown Edm type {:?}", name), at))?,
            _ => return Err(ParseError::new("expected Edm type name", at)),
        };
        self.expect_kind(TokenKind::CloseParen, "')'")?;

        if let Some(value) = typed_cast_literal(&raw, target) {
            return Ok(Expr::Constant(value));
        }
        // Fall back to an expression argument, e.g. cast(year,Edm.Double)
        let inner = parse_filter(&raw)
            .map_err(|e| ParseError::new(format!("invalid cast argument: {}", e), pos))?;
        Ok(Expr::Convert(Box::new(inner), target))
    }

    fn literal_value(&mut self) -> Result<Value, ParseError> {
        let pos = self.lexer.position();
        let expr = self.primary_expr()?;
        match expr {
            Expr::Constant(value) => Ok(value),
            _ => Err(ParseError::new("expected a literal value", pos)),
        }
    }
}

fn typed_cast_literal(raw: &str, target: EdmType) -> Option<Value> {
    match target {
        EdmType::Date => raw.parse().ok().map(Value::Date),
        EdmType::TimeOfDay => raw.parse().ok().map(Value::TimeOfDay),
        EdmType::DateTimeOffset => raw.parse().ok().map(Value::DateTimeOffset),
        EdmType::Guid => raw.parse().ok().map(Value::Guid),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_with_integers() {
        let expr = parse_filter("year ge 2000").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Ge,
                Box::new(Expr::Member("year".into())),
                Box::new(Expr::Constant(Value::Int(2000)))
            )
        );
    }

    #[test]
    fn precedence_and_grouping() {
        // a or b and c == a or (b and c)
        let expr = parse_filter("year eq 1 or year eq 2 and year eq 3").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Or, _, rhs) => {
                assert!(matches!(*rhs, Expr::Binary(BinaryOp::And, _, _)));
            }
            other => panic!("unexpected tree: {:?}", other),
        }

        let grouped = parse_filter("(year eq 1 or year eq 2) and year eq 3").unwrap();
        assert!(matches!(grouped, Expr::Binary(BinaryOp::And, _, _)));
    }

    #[test]
    fn arithmetic_precedence() {
        // price add tax mul 2 == price add (tax mul 2)
        let expr = parse_filter("price add tax mul 2 le 100").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Le, lhs, _) => match *lhs {
                Expr::Binary(BinaryOp::Add, _, rhs) => {
                    assert!(matches!(*rhs, Expr::Binary(BinaryOp::Mul, _, _)));
                }
                other => panic!("unexpected lhs: {:?}", other),
            },
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn functions_and_arity() {
        let expr = parse_filter("startswith(title,'The')").unwrap();
        assert!(matches!(expr, Expr::Function(Function::StartsWith, _)));

        assert!(parse_filter("startswith(title)").is_err());
        assert!(parse_filter("floor(a,b)").is_err());
        assert!(parse_filter("frobnicate(title)").is_err());
    }

    #[test]
    fn cast_literals_are_typed() {
        let expr =
            parse_filter("updatedAt gt cast(2024-08-23T20:22:54.291Z,Edm.DateTimeOffset)").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Gt, _, rhs) => match *rhs {
                Expr::Constant(Value::DateTimeOffset(dt)) => {
                    assert_eq!(dt.unix_millis(), 1724444574291);
                }
                other => panic!("unexpected literal: {:?}", other),
            },
            other => panic!("unexpected tree: {:?}", other),
        }

        let expr = parse_filter("birthday eq cast(2001-12-31,Edm.Date)").unwrap();
        assert!(expr.to_odata().contains("cast(2001-12-31,Edm.Date)"));

        let expr = parse_filter(
            "ownerId eq cast(11111111-2222-3333-4444-555555555555,Edm.Guid)",
        )
        .unwrap();
        assert!(matches!(
            expr,
            Expr::Binary(BinaryOp::Eq, _, ref rhs) if matches!(**rhs, Expr::Constant(Value::Guid(_)))
        ));
    }

    #[test]
    fn cast_expression_argument_converts() {
        let expr = parse_filter("cast(year,Edm.Double) gt 1999.5").unwrap();
        match expr {
            Expr::Binary(BinaryOp::Gt, lhs, _) => {
                assert!(matches!(*lhs, Expr::Convert(_, EdmType::Double)));
            }
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn in_lists() {
        let expr = parse_filter("year in (2000, 2001, 2002)").unwrap();
        match expr {
            Expr::In(member, values) => {
                assert_eq!(*member, Expr::Member("year".into()));
                assert_eq!(values.len(), 3);
            }
            other => panic!("unexpected tree: {:?}", other),
        }
        assert!(parse_filter("year in (year)").is_err());
    }

    #[test]
    fn not_operator() {
        let expr = parse_filter("not (deleted eq true)").unwrap();
        assert!(matches!(expr, Expr::Unary(UnaryOp::Not, _)));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_filter("").is_err());
        assert!(parse_filter("year ge").is_err());
        assert!(parse_filter("year ge 2000 extra").is_err());
        assert!(parse_filter("year eq 'unterminated").is_err());
        assert!(parse_filter("(year eq 1").is_err());
        assert!(parse_filter("and eq 2").is_err());
    }

    #[test]
    fn orderby_clause() {
        let keys = parse_orderby("releaseDate asc, title desc, year").unwrap();
        assert_eq!(keys.len(), 3);
        assert_eq!(keys[0].field, "releaseDate");
        assert_eq!(keys[0].direction, Direction::Asc);
        assert_eq!(keys[1].direction, Direction::Desc);
        assert_eq!(keys[2].direction, Direction::Asc);

        assert!(parse_orderby("title sideways").is_err());
        assert!(parse_orderby("title desc extra").is_err());
        assert!(parse_orderby("").is_err());
    }

    #[test]
    fn round_trips_through_text_form() {
        let sources = [
            "((year ge 2000) and startswith(title,'The'))",
            "year in (2000,2001)",
            "(updatedAt gt cast(2024-08-23T20:22:54.291Z,Edm.DateTimeOffset))",
            "((price mul 1.2) le 100.0)",
            "(tolower(title) eq 'dune')",
        ];
        for src in &sources {
            let tree = parse_filter(src).unwrap();
            let emitted = tree.to_odata();
            let reparsed = parse_filter(&emitted).unwrap();
            assert_eq!(tree, reparsed, "round trip failed for {}", src);
        }
    }
}

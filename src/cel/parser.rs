//! Recursive-descent parser for the condition expression language

use super::ast::{BinOp, Expr, Literal, UnaryOp};
use super::error::{CelError, Result};
use super::lexer::{lex, Token};

/// Parse an expression source string into an AST
pub fn parse(src: &str) -> Result<Expr> {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(CelError::Compile(format!(
            "unexpected trailing input after expression in '{}'",
            src
        )));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<()> {
        match self.advance() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(CelError::Compile(format!(
                "expected {} but found {:?}",
                what, other
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::OrOr)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_comparison()?;
        while matches!(self.peek(), Some(Token::AndAnd)) {
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let lhs = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::EqEq) => BinOp::Eq,
            Some(Token::NotEq) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            Some(Token::Ident(name)) if name == "in" => BinOp::In,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Bang) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)))
            }
            Some(Token::Minus) => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(field)) => {
                            expr = Expr::Member(Box::new(expr), field);
                        }
                        other => {
                            return Err(CelError::Compile(format!(
                                "expected field name after '.' but found {:?}",
                                other
                            )));
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.parse_or()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Int(i)) => Ok(Expr::Lit(Literal::Int(i))),
            Some(Token::Double(d)) => Ok(Expr::Lit(Literal::Double(d))),
            Some(Token::Str(s)) => Ok(Expr::Lit(Literal::Str(s))),
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Lit(Literal::Bool(true))),
                "false" => Ok(Expr::Lit(Literal::Bool(false))),
                "in" => Err(CelError::Compile(
                    "'in' is an operator, not an operand".to_string(),
                )),
                _ => {
                    if matches!(self.peek(), Some(Token::LParen)) {
                        self.advance();
                        let args = self.parse_args()?;
                        Ok(Expr::Call(name, args))
                    } else {
                        Ok(Expr::Ident(name))
                    }
                }
            },
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(expr)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if matches!(self.peek(), Some(Token::RBracket)) {
                    self.advance();
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.parse_or()?);
                    match self.advance() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBracket) => break,
                        other => {
                            return Err(CelError::Compile(format!(
                                "expected ',' or ']' in list but found {:?}",
                                other
                            )));
                        }
                    }
                }
                Ok(Expr::List(items))
            }
            Some(Token::LBrace) => {
                let mut fields = Vec::new();
                if matches!(self.peek(), Some(Token::RBrace)) {
                    self.advance();
                    return Ok(Expr::Map(fields));
                }
                loop {
                    let key = match self.advance() {
                        Some(Token::Str(key)) => key,
                        other => {
                            return Err(CelError::Compile(format!(
                                "map keys must be string literals, found {:?}",
                                other
                            )));
                        }
                    };
                    self.expect(&Token::Colon, "':'")?;
                    fields.push((key, self.parse_or()?));
                    match self.advance() {
                        Some(Token::Comma) => continue,
                        Some(Token::RBrace) => break,
                        other => {
                            return Err(CelError::Compile(format!(
                                "expected ',' or '}}' in map but found {:?}",
                                other
                            )));
                        }
                    }
                }
                Ok(Expr::Map(fields))
            }
            other => Err(CelError::Compile(format!(
                "expected an expression but found {:?}",
                other
            ))),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                other => {
                    return Err(CelError::Compile(format!(
                        "expected ',' or ')' in call but found {:?}",
                        other
                    )));
                }
            }
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        // a || b && c parses as a || (b && c)
        let expr = parse("a || b && c").unwrap();
        let Expr::Binary(BinOp::Or, _, rhs) = expr else {
            panic!("expected top-level ||");
        };
        assert!(matches!(*rhs, Expr::Binary(BinOp::And, _, _)));
    }

    #[test]
    fn test_member_and_index() {
        let expr = parse("principal.attr.tags[0]").unwrap();
        assert!(matches!(expr, Expr::Index(_, _)));
    }

    #[test]
    fn test_in_operator() {
        let expr = parse("'admin' in principal.roles").unwrap();
        assert!(matches!(expr, Expr::Binary(BinOp::In, _, _)));
    }

    #[test]
    fn test_call() {
        let expr = parse("startsWith(principal.id, 'user:')").unwrap();
        let Expr::Call(name, args) = expr else {
            panic!("expected call");
        };
        assert_eq!(name, "startsWith");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_list_and_map_literals() {
        assert!(matches!(parse("[1, 2, 3]").unwrap(), Expr::List(items) if items.len() == 3));
        assert!(matches!(parse("{'a': 1}").unwrap(), Expr::Map(fields) if fields.len() == 1));
        assert!(matches!(parse("[]").unwrap(), Expr::List(items) if items.is_empty()));
    }

    #[test]
    fn test_arithmetic_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse("1 + 2 * 3").unwrap();
        let Expr::Binary(BinOp::Add, _, rhs) = expr else {
            panic!("expected top-level +");
        };
        assert!(matches!(*rhs, Expr::Binary(BinOp::Mul, _, _)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("a ||").is_err());
        assert!(parse("(a").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("f(a,").is_err());
    }
}

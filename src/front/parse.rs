//! The parser: recursive-descent, precedence-climbing over binary operators.

use crate::common::Id;

use super::ast::*;
use super::lex::{LexError, Lexer, Token, TokenKind};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("lexing failed: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: expected {expected}, found {found}")]
    Unexpected { expected: String, found: String },
    #[error("parse error: unexpected end of input, expected {expected}")]
    Eof { expected: String },
}

pub fn parse(input: &str) -> Result<Program, ParseError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = vec![];
    while let Some(tok) = lexer.next()? {
        tokens.push(tok);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let stmts = parser.stmts_until_eof()?;
    Ok(Program { stmts })
}

struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<Token<'src>> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<Token<'src>> {
        let tok = self.peek();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>, ParseError> {
        match self.bump() {
            Some(tok) if tok.kind == kind => Ok(tok),
            Some(tok) => Err(ParseError::Unexpected {
                expected: kind.to_string(),
                found: tok.kind.to_string(),
            }),
            None => Err(ParseError::Eof {
                expected: kind.to_string(),
            }),
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_id(&mut self) -> Result<Id, ParseError> {
        let tok = self.expect(TokenKind::Id)?;
        Ok(Id::new(tok.text.to_string()))
    }

    fn stmts_until_eof(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = vec![];
        while self.peek().is_some() {
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = vec![];
        while self.peek_kind() != Some(TokenKind::RBrace) {
            stmts.push(self.stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn stmt(&mut self) -> Result<Stmt, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::KwReturn) => {
                self.bump();
                let expr = if self.peek_kind() == Some(TokenKind::Semi) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Return(expr))
            }
            Some(TokenKind::KwBreak) => {
                self.bump();
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Break)
            }
            Some(TokenKind::KwContinue) => {
                self.bump();
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Continue)
            }
            Some(TokenKind::KwIf) => {
                self.bump();
                let cond = self.expr()?;
                let tt = self.block()?;
                let ff = if self.eat(TokenKind::KwElse) {
                    self.block()?
                } else {
                    vec![]
                };
                Ok(Stmt::If { cond, tt, ff })
            }
            Some(TokenKind::KwWhile) => {
                self.bump();
                let cond = self.expr()?;
                let body = self.block()?;
                Ok(Stmt::While { cond, body })
            }
            Some(TokenKind::KwFor) => {
                self.bump();
                let var = self.expect_id()?;
                self.expect(TokenKind::KwIn)?;
                self.expect(TokenKind::KwRange)?;
                self.expect(TokenKind::LParen)?;
                let lo = self.expr()?;
                self.expect(TokenKind::Comma)?;
                let hi = self.expr()?;
                self.expect(TokenKind::RParen)?;
                let body = self.block()?;
                Ok(Stmt::For { var, lo, hi, body })
            }
            Some(TokenKind::KwDef) => {
                self.bump();
                let name = self.expect_id()?;
                self.expect(TokenKind::LParen)?;
                let mut params = vec![];
                if self.peek_kind() != Some(TokenKind::RParen) {
                    params.push(self.expect_id()?);
                    while self.eat(TokenKind::Comma) {
                        params.push(self.expect_id()?);
                    }
                }
                self.expect(TokenKind::RParen)?;
                let body = self.block()?;
                Ok(Stmt::FunctionDef { name, params, body })
            }
            Some(TokenKind::Id) => {
                let name = self.expect_id()?;
                self.expect(TokenKind::Assign)?;
                let expr = self.expr()?;
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Assign(name, expr))
            }
            Some(kind) => Err(ParseError::Unexpected {
                expected: "a statement".to_string(),
                found: kind.to_string(),
            }),
            None => Err(ParseError::Eof {
                expected: "a statement".to_string(),
            }),
        }
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        self.left_assoc(Self::and_expr, &[(TokenKind::KwOr, BOp::LogOr)])
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        self.left_assoc(Self::eq_expr, &[(TokenKind::KwAnd, BOp::LogAnd)])
    }

    fn eq_expr(&mut self) -> Result<Expr, ParseError> {
        self.left_assoc(
            Self::rel_expr,
            &[(TokenKind::EqEq, BOp::Eq), (TokenKind::Ne, BOp::Ne)],
        )
    }

    fn rel_expr(&mut self) -> Result<Expr, ParseError> {
        self.left_assoc(
            Self::bitor_expr,
            &[
                (TokenKind::Lt, BOp::Lt),
                (TokenKind::Gt, BOp::Gt),
                (TokenKind::Le, BOp::Le),
                (TokenKind::Ge, BOp::Ge),
            ],
        )
    }

    fn bitor_expr(&mut self) -> Result<Expr, ParseError> {
        self.left_assoc(Self::bitxor_expr, &[(TokenKind::Pipe, BOp::BitOr)])
    }

    fn bitxor_expr(&mut self) -> Result<Expr, ParseError> {
        self.left_assoc(Self::bitand_expr, &[(TokenKind::Caret, BOp::BitXor)])
    }

    fn bitand_expr(&mut self) -> Result<Expr, ParseError> {
        self.left_assoc(Self::shift_expr, &[(TokenKind::Amp, BOp::BitAnd)])
    }

    fn shift_expr(&mut self) -> Result<Expr, ParseError> {
        self.left_assoc(
            Self::add_expr,
            &[(TokenKind::Shl, BOp::Shl), (TokenKind::Shr, BOp::Shr)],
        )
    }

    fn add_expr(&mut self) -> Result<Expr, ParseError> {
        self.left_assoc(
            Self::mul_expr,
            &[(TokenKind::Plus, BOp::Add), (TokenKind::Minus, BOp::Sub)],
        )
    }

    fn mul_expr(&mut self) -> Result<Expr, ParseError> {
        self.left_assoc(
            Self::unary_expr,
            &[
                (TokenKind::Star, BOp::Mul),
                (TokenKind::Slash, BOp::Div),
                (TokenKind::Percent, BOp::Mod),
            ],
        )
    }

    /// Parse `next` separated by any of `ops`, left-associatively.
    fn left_assoc(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ParseError>,
        ops: &[(TokenKind, BOp)],
    ) -> Result<Expr, ParseError> {
        let mut lhs = next(self)?;
        loop {
            let Some(kind) = self.peek_kind() else { break };
            let Some(&(_, op)) = ops.iter().find(|(k, _)| *k == kind) else {
                break;
            };
            self.bump();
            let rhs = next(self)?;
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.bump();
                Ok(Expr::UnaryOp {
                    op: UOp::Neg,
                    expr: Box::new(self.unary_expr()?),
                })
            }
            Some(TokenKind::Tilde) => {
                self.bump();
                Ok(Expr::UnaryOp {
                    op: UOp::Not,
                    expr: Box::new(self.unary_expr()?),
                })
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.bump() {
            Some(tok) if tok.kind == TokenKind::Num => {
                let value: i64 = tok.text.parse().map_err(|_| ParseError::Unexpected {
                    expected: "a 64-bit integer literal".to_string(),
                    found: tok.text.to_string(),
                })?;
                Ok(Expr::Int(value))
            }
            Some(tok) if tok.kind == TokenKind::LParen => {
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            Some(tok) if tok.kind == TokenKind::Id => {
                let name = Id::new(tok.text.to_string());
                if self.eat(TokenKind::LParen) {
                    let mut args = vec![];
                    if self.peek_kind() != Some(TokenKind::RParen) {
                        args.push(self.expr()?);
                        while self.eat(TokenKind::Comma) {
                            args.push(self.expr()?);
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Name(name))
                }
            }
            Some(tok) => Err(ParseError::Unexpected {
                expected: "an expression".to_string(),
                found: tok.kind.to_string(),
            }),
            None => Err(ParseError::Eof {
                expected: "an expression".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignment_and_return() {
        let prog = parse("x := 2 + 3 * 4; return x;").unwrap();
        assert_eq!(prog.stmts.len(), 2);
        assert!(matches!(prog.stmts[0], Stmt::Assign(_, _)));
        assert!(matches!(prog.stmts[1], Stmt::Return(Some(_))));
    }

    #[test]
    fn respects_precedence() {
        let prog = parse("x := 2 + 3 * 4;").unwrap();
        let Stmt::Assign(_, Expr::BinOp { op: BOp::Add, rhs, .. }) = &prog.stmts[0] else {
            panic!("expected a top-level addition")
        };
        assert!(matches!(**rhs, Expr::BinOp { op: BOp::Mul, .. }));
    }

    #[test]
    fn parses_if_else() {
        let prog = parse("if a < b { x := 1; } else { x := 2; }").unwrap();
        let Stmt::If { cond, tt, ff } = &prog.stmts[0] else {
            panic!("expected an if statement")
        };
        assert!(matches!(cond, Expr::BinOp { op: BOp::Lt, .. }));
        assert_eq!(tt.len(), 1);
        assert_eq!(ff.len(), 1);
    }

    #[test]
    fn parses_for_range_and_call() {
        let prog = parse("for i in range(0, 3) { s := f(i, 1); }").unwrap();
        assert!(matches!(prog.stmts[0], Stmt::For { .. }));
    }

    #[test]
    fn parses_function_def() {
        let prog = parse("def add(a, b) { return a + b; }").unwrap();
        let Stmt::FunctionDef { name, params, body } = &prog.stmts[0] else {
            panic!("expected a function definition")
        };
        assert_eq!(name.as_str(), "add");
        assert_eq!(params.len(), 2);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn reports_unexpected_token() {
        assert!(parse("x := ;").is_err());
    }
}

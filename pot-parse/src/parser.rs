#![forbid(unsafe_code)]

use pot_ast::{
    join, span_between, BinOp, Expr, ExprKind, Ident, QuantBinder, QuantKind, Span, UnaryOp,
};
use pot_lex::{Token, TokenKind};

use crate::error::ParseError;

/// Deepest expression tree the parser builds. Generated documents are
/// untrusted, and everything downstream walks the tree recursively.
///
/// Every nested production and every operator in a chain costs one level.
/// Within one parenthesised group the cost only grows, so a flat chain of
/// `n` operators needs `n` levels just like `n` nested negations.
pub const MAX_DEPTH: usize = 128;

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            idx: 0,
            depth: 0,
        }
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let mark = self.depth;
        self.descend()?;
        let out = self.parse_iff_expr();
        self.depth = mark;
        out
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError {
                message: format!(
                    "expression nests deeper than {MAX_DEPTH} levels; split it into smaller expressions"
                ),
                span: self.peek_span(),
            });
        }
        Ok(())
    }

    pub fn parse_expr_eof(&mut self) -> Result<Expr, ParseError> {
        let expr = self.parse_expr()?;
        if !self.at(&TokenKind::Eof) {
            return Err(ParseError {
                message: format!("expected end of expression, found {}", self.peek_describe()),
                span: self.peek_span(),
            });
        }
        Ok(expr)
    }

    fn parse_iff_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_implies_expr()?;
        while self.at(&TokenKind::KwIff) || self.at(&TokenKind::DoubleArrow) {
            self.next();
            self.descend()?;
            let right = self.parse_implies_expr()?;
            left = binary(left, BinOp::Iff, right);
        }
        Ok(left)
    }

    // Right-associative: `a implies b implies c` is `a implies (b implies c)`.
    fn parse_implies_expr(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_or_expr()?;
        if self.at(&TokenKind::KwImplies) || self.at(&TokenKind::FatArrow) {
            self.next();
            self.descend()?;
            let right = self.parse_implies_expr()?;
            return Ok(binary(left, BinOp::Implies, right));
        }
        Ok(left)
    }

    fn parse_or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and_expr()?;
        while self.at(&TokenKind::KwOr) || self.at(&TokenKind::OrOr) {
            self.next();
            self.descend()?;
            let right = self.parse_and_expr()?;
            left = binary(left, BinOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not_expr()?;
        while self.at(&TokenKind::KwAnd) || self.at(&TokenKind::AndAnd) {
            self.next();
            self.descend()?;
            let right = self.parse_not_expr()?;
            left = binary(left, BinOp::And, right);
        }
        Ok(left)
    }

    // `not` binds looser than comparisons: `not x = 3` is `not (x = 3)`.
    fn parse_not_expr(&mut self) -> Result<Expr, ParseError> {
        if self.at(&TokenKind::KwNot) || self.at(&TokenKind::Bang) {
            let t = self.next_token()?;
            self.descend()?;
            let expr = self.parse_not_expr()?;
            let span = join(t.span, expr.span);
            return Ok(Expr {
                span,
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(expr),
                },
            });
        }
        self.parse_cmp_expr()
    }

    fn parse_cmp_expr(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_add_expr()?;
        let Some(op) = self.peek_kind().and_then(cmp_op) else {
            return Ok(left);
        };
        self.next();
        self.descend()?;
        let right = self.parse_add_expr()?;
        let expr = binary(left, op, right);

        // Chained comparisons like `a < b < c` are ambiguous; require explicit connectives.
        if self.peek_kind().and_then(cmp_op).is_some() {
            return Err(ParseError {
                message: "chained comparisons are not supported; use 'and' between comparisons"
                    .to_string(),
                span: self.peek_span(),
            });
        }

        Ok(expr)
    }

    fn parse_add_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_mul_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => break,
            };
            self.next();
            self.descend()?;
            let right = self.parse_mul_expr()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_mul_expr(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                _ => break,
            };
            self.next();
            self.descend()?;
            let right = self.parse_unary_expr()?;
            left = binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary_expr(&mut self) -> Result<Expr, ParseError> {
        if self.at(&TokenKind::Minus) {
            let t = self.next_token()?;
            self.descend()?;
            let expr = self.parse_unary_expr()?;
            let span = join(t.span, expr.span);
            return Ok(Expr {
                span,
                kind: ExprKind::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(expr),
                },
            });
        }
        // Allows `a = not b` without parentheses.
        if self.at(&TokenKind::KwNot) || self.at(&TokenKind::Bang) {
            return self.parse_not_expr();
        }
        self.parse_primary_expr()
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        let tok = self.next_token()?;

        match tok.kind {
            TokenKind::KwForall | TokenKind::KwExists => {
                let kind = if matches!(tok.kind, TokenKind::KwForall) {
                    QuantKind::Forall
                } else {
                    QuantKind::Exists
                };
                let binders = self.parse_quant_binders()?;
                self.expect(TokenKind::Colon)?;
                let body = self.parse_expr()?;
                let span = join(tok.span, body.span);
                Ok(Expr {
                    span,
                    kind: ExprKind::Quant {
                        kind,
                        binders,
                        body: Box::new(body),
                    },
                })
            }
            TokenKind::Ident(name) => {
                let callee: Ident = Ident {
                    span: tok.span,
                    node: name,
                };
                if !self.at(&TokenKind::LParen) {
                    return Ok(Expr {
                        span: tok.span,
                        kind: ExprKind::Ident(callee),
                    });
                }
                self.next();
                let args = self.parse_args()?;
                let rp = self.expect(TokenKind::RParen)?;
                Ok(Expr {
                    span: join(tok.span, rp.span),
                    kind: ExprKind::Call { callee, args },
                })
            }
            TokenKind::Int(n) => Ok(Expr {
                span: tok.span,
                kind: ExprKind::IntLit(n),
            }),
            TokenKind::Decimal(d) => Ok(Expr {
                span: tok.span,
                kind: ExprKind::DecimalLit(d),
            }),
            TokenKind::KwTrue => Ok(Expr {
                span: tok.span,
                kind: ExprKind::BoolLit(true),
            }),
            TokenKind::KwFalse => Ok(Expr {
                span: tok.span,
                kind: ExprKind::BoolLit(false),
            }),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                let rp = self.expect(TokenKind::RParen)?;
                Ok(Expr {
                    span: join(tok.span, rp.span),
                    kind: inner.kind,
                })
            }
            TokenKind::Eof => Err(ParseError {
                message: "unexpected end of expression".to_string(),
                span: tok.span,
            }),
            other => Err(ParseError {
                message: format!("expected an expression, found {}", other.describe()),
                span: tok.span,
            }),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = Vec::new();
        if self.at(&TokenKind::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.at(&TokenKind::Comma) {
                self.next();
                continue;
            }
            break;
        }
        Ok(args)
    }

    fn parse_quant_binders(&mut self) -> Result<Vec<QuantBinder>, ParseError> {
        let lp = self.expect(TokenKind::LParen)?;
        let mut binders: Vec<QuantBinder> = Vec::new();

        loop {
            let name = self.expect_ident()?;
            self.expect(TokenKind::Colon)?;
            let sort = self.expect_ident()?;
            let span = join(name.span, sort.span);
            binders.push(QuantBinder { span, name, sort });

            if self.at(&TokenKind::Comma) {
                self.next();
                continue;
            }
            break;
        }

        let rp = self.expect(TokenKind::RParen)?;
        if binders.is_empty() {
            return Err(ParseError {
                message: "quantifier needs at least one binder".to_string(),
                span: join(lp.span, rp.span),
            });
        }
        Ok(binders)
    }

    fn expect_ident(&mut self) -> Result<Ident, ParseError> {
        let tok = self.next_token()?;
        match tok.kind {
            TokenKind::Ident(name) => Ok(Ident {
                span: tok.span,
                node: name,
            }),
            other => Err(ParseError {
                message: format!("expected identifier, found {}", other.describe()),
                span: tok.span,
            }),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.at(&kind) {
            return self.next_token();
        }
        Err(ParseError {
            message: format!("expected {}, found {}", kind.describe(), self.peek_describe()),
            span: self.peek_span(),
        })
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.idx)
            .or_else(|| self.tokens.last())
            .map(|t| t.span)
            .unwrap_or_else(|| span_between(0, 0))
    }

    fn peek_describe(&self) -> String {
        self.peek_kind()
            .map(TokenKind::describe)
            .unwrap_or_else(|| "end of expression".to_string())
    }

    fn next(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.idx)?;
        self.idx += 1;
        Some(t)
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        let span = self.peek_span();
        self.next().cloned().ok_or(ParseError {
            message: "unexpected end of expression".to_string(),
            span,
        })
    }
}

fn cmp_op(kind: &TokenKind) -> Option<BinOp> {
    match kind {
        TokenKind::Eq | TokenKind::EqEq => Some(BinOp::Eq),
        TokenKind::Neq => Some(BinOp::Ne),
        TokenKind::Lt => Some(BinOp::Lt),
        TokenKind::Le => Some(BinOp::Le),
        TokenKind::Gt => Some(BinOp::Gt),
        TokenKind::Ge => Some(BinOp::Ge),
        _ => None,
    }
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr {
        span: join(left.span, right.span),
        kind: ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
    }
}

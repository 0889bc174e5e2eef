#![forbid(unsafe_code)]

use pot_ast::{Decimal, Span};

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Keywords
    KwAnd,
    KwOr,
    KwNot,
    KwImplies,
    KwIff,
    KwForall,
    KwExists,
    KwTrue,
    KwFalse,

    // Operators / punctuation
    Eq,
    EqEq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,

    Plus,
    Minus,
    Star,
    Slash,

    AndAnd,
    OrOr,
    Bang,
    FatArrow,
    DoubleArrow,

    Colon,
    Comma,
    LParen,
    RParen,

    Eof,

    // Literals / identifiers
    Ident(String),
    Int(u64),
    Decimal(Decimal),
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("identifier '{s}'"),
            TokenKind::Int(n) => format!("integer {n}"),
            TokenKind::Decimal(d) => format!("decimal {d}"),
            TokenKind::Eof => "end of expression".to_string(),
            other => format!("{other:?}"),
        }
    }
}

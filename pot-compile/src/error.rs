#![allow(unused_assignments)]

use miette::Diagnostic;
use pot_ast::Span;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CompileErrorKind {
    #[error("unknown sort '{name}'")]
    UnknownSort { name: String },
    #[error("unknown symbol '{name}'")]
    UnknownSymbol { name: String },
    #[error("'{name}' expects {expected} argument(s), found {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("{context}: expected {expected}, found {found}")]
    SortMismatch {
        context: String,
        expected: String,
        found: String,
    },
    #[error("'{name}' is not a function and cannot be applied")]
    NotAFunction { name: String },
    #[error("'{name}' is a function and must be applied to arguments")]
    NotAValue { name: String },
    #[error("'{name}' is declared more than once")]
    Duplicate { name: String },
    #[error("bound variable '{name}' shadows a symbol that is already in scope")]
    Shadowing { name: String },
    #[error("'{name}' is reserved and cannot be declared")]
    Reserved { name: String },
    #[error("syntax error: {message}")]
    Syntax { message: String },
}

/// A program that validated but cannot be turned into solver terms.
///
/// `path` names the document field, `expr` holds the expression text when the
/// problem is inside one, and `span` points into that text.
#[derive(Clone, Debug, Error, Diagnostic)]
#[error("compile error at {path}: {kind}")]
#[diagnostic(code(pot::compile))]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub path: String,
    #[source_code]
    pub expr: String,
    #[label("here")]
    pub span: Option<Span>,
}

impl CompileError {
    pub(crate) fn decl(path: impl Into<String>, kind: CompileErrorKind) -> Self {
        Self {
            kind,
            path: path.into(),
            expr: String::new(),
            span: None,
        }
    }

    pub(crate) fn in_expr(path: &str, text: &str, err: ExprError) -> Self {
        Self {
            kind: err.kind,
            path: path.to_string(),
            expr: text.to_string(),
            span: Some(err.span),
        }
    }

    /// The identifier the error is about, if any.
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            CompileErrorKind::UnknownSort { name }
            | CompileErrorKind::UnknownSymbol { name }
            | CompileErrorKind::Arity { name, .. }
            | CompileErrorKind::NotAFunction { name }
            | CompileErrorKind::NotAValue { name }
            | CompileErrorKind::Duplicate { name }
            | CompileErrorKind::Shadowing { name }
            | CompileErrorKind::Reserved { name } => Some(name),
            CompileErrorKind::SortMismatch { .. } | CompileErrorKind::Syntax { .. } => None,
        }
    }

    /// Byte offset into the expression text.
    pub fn offset(&self) -> Option<usize> {
        self.span.map(|s| s.offset())
    }
}

/// Error raised while lowering a single expression, before it is placed.
#[derive(Debug)]
pub(crate) struct ExprError {
    pub kind: CompileErrorKind,
    pub span: Span,
}

impl ExprError {
    pub(crate) fn new(span: Span, kind: CompileErrorKind) -> Self {
        Self { kind, span }
    }
}

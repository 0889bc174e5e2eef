#![forbid(unsafe_code)]

mod expr;
mod program;

use miette::SourceSpan;

pub use expr::{BinOp, Decimal, Expr, ExprKind, QuantBinder, QuantKind, UnaryOp};
pub use program::{
    Action, Binding, ConstantGroup, ConstantMembers, Direction, FunctionDef, KnowledgeEntry,
    Objective, OptimizationConfig, Program, QuantifierPrefix, RuleBody, RuleDef, SortDef,
    SortKind, VariableDef, VerificationDef,
};

pub type Span = SourceSpan;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(span: Span, node: T) -> Self {
        Self { span, node }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned {
            span: self.span,
            node: f(self.node),
        }
    }
}

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

pub fn join(a: Span, b: Span) -> Span {
    let start = a.offset().min(b.offset());
    let end = (a.offset() + a.len()).max(b.offset() + b.len());
    span_between(start, end)
}

pub type Ident = Spanned<String>;

#![forbid(unsafe_code)]

//! Turns a validated [`pot_ast::Program`] into sort-checked solver terms.
//!
//! Declarations are processed in document order (sorts, functions, constant
//! groups, variables), then every expression string is parsed and lowered
//! against the resulting symbol table. Nothing here talks to a solver.

mod error;
mod lower;
mod program;
mod symbols;
mod term;

pub use error::{CompileError, CompileErrorKind};
pub use program::{
    compile, Assertion, CompiledObjective, CompiledProgram, Goal, OptimizationModel,
};
pub use symbols::{
    is_reserved, ConstDecl, ConstId, ConstKind, FuncDecl, FuncId, Sort, SortDecl, SortId, Symbol,
    SymbolTable, BUILTIN_SORTS, RESERVED,
};
pub use term::{ArithOp, BoundVar, CmpOp, QuantKind, Term, TermDisplay};

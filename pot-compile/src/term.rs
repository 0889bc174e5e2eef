//! Backend-independent typed terms.
//!
//! Every term here is already sort-checked: arithmetic and comparison nodes
//! carry the numeric sort their operands were unified to, and Int operands
//! mixed with Real ones are wrapped in [`Term::ToReal`].

use std::fmt;

pub use pot_ast::QuantKind;

use crate::symbols::{ConstId, FuncId, Sort, SymbolTable};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

/// A quantifier-bound variable. `id` is unique within one compiled program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundVar {
    pub id: usize,
    pub name: String,
    pub sort: Sort,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    BoolLit(bool),
    IntLit(u64),
    RealLit { num: u64, den: u64 },
    Const(ConstId),
    Bound(BoundVar),
    App { func: FuncId, args: Vec<Term> },
    Not(Box<Term>),
    And(Vec<Term>),
    Or(Vec<Term>),
    Implies(Box<Term>, Box<Term>),
    Iff(Box<Term>, Box<Term>),
    Eq(Box<Term>, Box<Term>),
    Distinct(Vec<Term>),
    Ite(Box<Term>, Box<Term>, Box<Term>),
    Neg { sort: Sort, arg: Box<Term> },
    Arith {
        op: ArithOp,
        sort: Sort,
        left: Box<Term>,
        right: Box<Term>,
    },
    Cmp {
        op: CmpOp,
        sort: Sort,
        left: Box<Term>,
        right: Box<Term>,
    },
    ToReal(Box<Term>),
    Quant {
        kind: QuantKind,
        vars: Vec<BoundVar>,
        body: Box<Term>,
    },
}

impl Term {
    pub fn not(self) -> Term {
        Term::Not(Box::new(self))
    }

    /// SMT-LIB style rendering, for logs and diagnostics.
    pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> TermDisplay<'a> {
        TermDisplay { term: self, symbols }
    }
}

pub struct TermDisplay<'a> {
    term: &'a Term,
    symbols: &'a SymbolTable,
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_term(f, self.term, self.symbols)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, head: &str, args: &[&Term], s: &SymbolTable) -> fmt::Result {
    write!(f, "({head}")?;
    for a in args {
        f.write_str(" ")?;
        write_term(f, a, s)?;
    }
    f.write_str(")")
}

fn write_term(f: &mut fmt::Formatter<'_>, t: &Term, s: &SymbolTable) -> fmt::Result {
    match t {
        Term::BoolLit(b) => write!(f, "{b}"),
        Term::IntLit(n) => write!(f, "{n}"),
        Term::RealLit { num, den } => write!(f, "(/ {num}.0 {den}.0)"),
        Term::Const(id) => f.write_str(&s.constant(*id).name),
        Term::Bound(v) => f.write_str(&v.name),
        Term::App { func, args } => {
            let name = &s.function(*func).name;
            if args.is_empty() {
                return f.write_str(name);
            }
            write_list(f, name, &args.iter().collect::<Vec<_>>(), s)
        }
        Term::Not(a) => write_list(f, "not", &[&**a], s),
        Term::And(xs) => write_list(f, "and", &xs.iter().collect::<Vec<_>>(), s),
        Term::Or(xs) => write_list(f, "or", &xs.iter().collect::<Vec<_>>(), s),
        Term::Implies(a, b) => write_list(f, "=>", &[&**a, &**b], s),
        Term::Iff(a, b) | Term::Eq(a, b) => write_list(f, "=", &[&**a, &**b], s),
        Term::Distinct(xs) => write_list(f, "distinct", &xs.iter().collect::<Vec<_>>(), s),
        Term::Ite(c, a, b) => write_list(f, "ite", &[&**c, &**a, &**b], s),
        Term::Neg { arg, .. } => write_list(f, "-", &[&**arg], s),
        Term::Arith {
            op, sort, left, right,
        } => {
            let head = match (op, sort) {
                (ArithOp::Add, _) => "+",
                (ArithOp::Sub, _) => "-",
                (ArithOp::Mul, _) => "*",
                (ArithOp::Div, Sort::Int) => "div",
                (ArithOp::Div, _) => "/",
            };
            write_list(f, head, &[&**left, &**right], s)
        }
        Term::Cmp { op, left, right, .. } => {
            let head = match op {
                CmpOp::Lt => "<",
                CmpOp::Le => "<=",
                CmpOp::Gt => ">",
                CmpOp::Ge => ">=",
            };
            write_list(f, head, &[&**left, &**right], s)
        }
        Term::ToReal(a) => write_list(f, "to_real", &[&**a], s),
        Term::Quant { kind, vars, body } => {
            write!(f, "({} (", kind.keyword())?;
            for (i, v) in vars.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "({} {})", v.name, s.sort_name(v.sort))?;
            }
            f.write_str(") ")?;
            write_term(f, body, s)?;
            f.write_str(")")
        }
    }
}

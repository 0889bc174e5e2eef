//! Sort-checked lowering of parsed expressions into [`Term`]s.

use pot_ast::{BinOp, Expr, ExprKind, Ident, Span, UnaryOp};
use pot_parse::MAX_DEPTH;

use crate::error::{CompileErrorKind, ExprError};
use crate::symbols::{is_reserved, Sort, Symbol, SymbolTable};
use crate::term::{ArithOp, BoundVar, CmpOp, Term};

pub(crate) struct Typed {
    pub term: Term,
    pub sort: Sort,
}

pub(crate) struct Lowerer<'a> {
    symbols: &'a SymbolTable,
    scope: Vec<BoundVar>,
    next_bound: &'a mut usize,
    depth: usize,
}

impl<'a> Lowerer<'a> {
    pub(crate) fn new(symbols: &'a SymbolTable, scope: Vec<BoundVar>, next_bound: &'a mut usize) -> Self {
        Self {
            symbols,
            scope,
            next_bound,
            depth: 0,
        }
    }

    pub(crate) fn boolean(&mut self, e: &Expr, context: &str) -> Result<Term, ExprError> {
        let t = self.expr(e)?;
        self.coerce(t, Sort::Bool, e.span, context)
    }

    pub(crate) fn numeric(&mut self, e: &Expr, context: &str) -> Result<Typed, ExprError> {
        let t = self.expr(e)?;
        if !t.sort.is_numeric() {
            return Err(self.mismatch(e.span, context, "Int or Real", t.sort));
        }
        Ok(t)
    }

    // Parsed expressions already respect the limit; trees built any other way
    // are held to it here before anything recurses over the resulting term.
    fn expr(&mut self, e: &Expr) -> Result<Typed, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::new(
                e.span,
                CompileErrorKind::Syntax {
                    message: format!(
                        "expression nests deeper than {MAX_DEPTH} levels; split it into smaller expressions"
                    ),
                },
            ));
        }
        self.depth += 1;
        let out = self.node(e);
        self.depth -= 1;
        out
    }

    fn node(&mut self, e: &Expr) -> Result<Typed, ExprError> {
        match &e.kind {
            ExprKind::Ident(id) => self.ident(id),
            ExprKind::IntLit(n) => Ok(Typed {
                term: Term::IntLit(*n),
                sort: Sort::Int,
            }),
            ExprKind::DecimalLit(d) => {
                let den = d.denominator().ok_or_else(|| {
                    ExprError::new(
                        e.span,
                        CompileErrorKind::Syntax {
                            message: format!("decimal literal {d} has too many digits"),
                        },
                    )
                })?;
                Ok(Typed {
                    term: Term::RealLit {
                        num: d.mantissa,
                        den,
                    },
                    sort: Sort::Real,
                })
            }
            ExprKind::BoolLit(b) => Ok(Typed {
                term: Term::BoolLit(*b),
                sort: Sort::Bool,
            }),
            ExprKind::Unary { op, expr } => match op {
                UnaryOp::Not => Ok(Typed {
                    term: self.boolean(expr, "operand of 'not'")?.not(),
                    sort: Sort::Bool,
                }),
                UnaryOp::Neg => {
                    let t = self.numeric(expr, "operand of unary '-'")?;
                    Ok(Typed {
                        term: Term::Neg {
                            sort: t.sort,
                            arg: Box::new(t.term),
                        },
                        sort: t.sort,
                    })
                }
            },
            ExprKind::Binary { left, op, right } => self.binary(left, *op, right),
            ExprKind::Call { callee, args } => self.call(callee, args, e.span),
            ExprKind::Quant {
                kind,
                binders,
                body,
            } => {
                let mark = self.scope.len();
                let out = self.quantified(binders, body);
                self.scope.truncate(mark);
                let (vars, body) = out?;
                Ok(Typed {
                    term: Term::Quant {
                        kind: *kind,
                        vars,
                        body: Box::new(body),
                    },
                    sort: Sort::Bool,
                })
            }
        }
    }

    fn quantified(
        &mut self,
        binders: &[pot_ast::QuantBinder],
        body: &Expr,
    ) -> Result<(Vec<BoundVar>, Term), ExprError> {
        let mut vars = Vec::with_capacity(binders.len());
        for b in binders {
            let name = &b.name.node;
            if is_reserved(name) {
                return Err(ExprError::new(
                    b.name.span,
                    CompileErrorKind::Reserved { name: name.clone() },
                ));
            }
            if self.is_visible(name) {
                return Err(ExprError::new(
                    b.name.span,
                    CompileErrorKind::Shadowing { name: name.clone() },
                ));
            }
            let sort = self.symbols.resolve_sort(&b.sort.node).ok_or_else(|| {
                ExprError::new(
                    b.sort.span,
                    CompileErrorKind::UnknownSort {
                        name: b.sort.node.clone(),
                    },
                )
            })?;
            let v = fresh_bound(self.next_bound, name, sort);
            self.scope.push(v.clone());
            vars.push(v);
        }
        let body = self.boolean(body, "quantifier body")?;
        Ok((vars, body))
    }

    fn is_visible(&self, name: &str) -> bool {
        self.scope.iter().any(|v| v.name == name) || self.symbols.has_name(name)
    }

    fn ident(&self, id: &Ident) -> Result<Typed, ExprError> {
        let name = id.node.as_str();
        if let Some(v) = self.scope.iter().rev().find(|v| v.name == name) {
            return Ok(Typed {
                term: Term::Bound(v.clone()),
                sort: v.sort,
            });
        }
        match self.symbols.lookup(name) {
            Some(Symbol::Const(c)) => Ok(Typed {
                term: Term::Const(c),
                sort: self.symbols.constant(c).sort,
            }),
            Some(Symbol::Function(f)) => {
                let decl = self.symbols.function(f);
                if !decl.domain.is_empty() {
                    return Err(ExprError::new(
                        id.span,
                        CompileErrorKind::NotAValue {
                            name: name.to_string(),
                        },
                    ));
                }
                Ok(Typed {
                    term: Term::App {
                        func: f,
                        args: Vec::new(),
                    },
                    sort: decl.range,
                })
            }
            None if is_reserved(name) => Err(ExprError::new(
                id.span,
                CompileErrorKind::NotAValue {
                    name: name.to_string(),
                },
            )),
            None => Err(ExprError::new(
                id.span,
                CompileErrorKind::UnknownSymbol {
                    name: name.to_string(),
                },
            )),
        }
    }

    fn binary(&mut self, left: &Expr, op: BinOp, right: &Expr) -> Result<Typed, ExprError> {
        let ctx = format!("operands of '{}'", op.symbol());
        if op.is_connective() {
            let l = self.boolean(left, &ctx)?;
            let r = self.boolean(right, &ctx)?;
            let term = match op {
                BinOp::And => Term::And(vec![l, r]),
                BinOp::Or => Term::Or(vec![l, r]),
                BinOp::Implies => Term::Implies(Box::new(l), Box::new(r)),
                _ => Term::Iff(Box::new(l), Box::new(r)),
            };
            return Ok(Typed {
                term,
                sort: Sort::Bool,
            });
        }

        if matches!(op, BinOp::Eq | BinOp::Ne) {
            let l = self.expr(left)?;
            let r = self.expr(right)?;
            let (lt, rt) = if l.sort.is_numeric() && r.sort.is_numeric() {
                let (lt, rt, _) = unify(l, r);
                (lt, rt)
            } else if l.sort == r.sort {
                (l.term, r.term)
            } else {
                return Err(self.mismatch(right.span, &ctx, self.symbols.sort_name(l.sort), r.sort));
            };
            let eq = Term::Eq(Box::new(lt), Box::new(rt));
            let term = if op == BinOp::Ne { eq.not() } else { eq };
            return Ok(Typed {
                term,
                sort: Sort::Bool,
            });
        }

        let l = self.numeric(left, &ctx)?;
        let r = self.numeric(right, &ctx)?;
        let (lt, rt, sort) = unify(l, r);
        let (left, right) = (Box::new(lt), Box::new(rt));
        let cmp = |op| Typed {
            term: Term::Cmp {
                op,
                sort,
                left: left.clone(),
                right: right.clone(),
            },
            sort: Sort::Bool,
        };
        let arith = |op| Typed {
            term: Term::Arith {
                op,
                sort,
                left: left.clone(),
                right: right.clone(),
            },
            sort,
        };
        Ok(match op {
            BinOp::Lt => cmp(CmpOp::Lt),
            BinOp::Le => cmp(CmpOp::Le),
            BinOp::Gt => cmp(CmpOp::Gt),
            BinOp::Ge => cmp(CmpOp::Ge),
            BinOp::Add => arith(ArithOp::Add),
            BinOp::Sub => arith(ArithOp::Sub),
            BinOp::Mul => arith(ArithOp::Mul),
            _ => arith(ArithOp::Div),
        })
    }

    fn call(&mut self, callee: &Ident, args: &[Expr], span: Span) -> Result<Typed, ExprError> {
        let name = callee.node.as_str();
        let ctx = format!("argument of '{name}'");
        let boolean = |term| Typed {
            term,
            sort: Sort::Bool,
        };
        match name {
            "And" | "Or" => {
                let xs = args
                    .iter()
                    .map(|a| self.boolean(a, &ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(boolean(if name == "And" { Term::And(xs) } else { Term::Or(xs) }))
            }
            "Not" => {
                arity(callee, args, 1)?;
                Ok(boolean(self.boolean(&args[0], &ctx)?.not()))
            }
            "Implies" | "Iff" => {
                arity(callee, args, 2)?;
                let a = Box::new(self.boolean(&args[0], &ctx)?);
                let b = Box::new(self.boolean(&args[1], &ctx)?);
                Ok(boolean(if name == "Implies" {
                    Term::Implies(a, b)
                } else {
                    Term::Iff(a, b)
                }))
            }
            "Distinct" => {
                if args.len() < 2 {
                    return Err(ExprError::new(
                        span,
                        CompileErrorKind::Arity {
                            name: name.to_string(),
                            expected: 2,
                            found: args.len(),
                        },
                    ));
                }
                let typed = args.iter().map(|a| self.expr(a)).collect::<Result<Vec<_>, _>>()?;
                let all_numeric = typed.iter().all(|t| t.sort.is_numeric());
                let target = if all_numeric && typed.iter().any(|t| t.sort == Sort::Real) {
                    Sort::Real
                } else {
                    typed[0].sort
                };
                let mut terms = Vec::with_capacity(typed.len());
                for (t, a) in typed.into_iter().zip(args) {
                    terms.push(self.coerce(t, target, a.span, &ctx)?);
                }
                Ok(boolean(Term::Distinct(terms)))
            }
            "If" => {
                arity(callee, args, 3)?;
                let c = self.boolean(&args[0], "condition of 'If'")?;
                let a = self.expr(&args[1])?;
                let b = self.expr(&args[2])?;
                let (a, b, sort) = if a.sort.is_numeric() && b.sort.is_numeric() {
                    unify(a, b)
                } else if a.sort == b.sort {
                    let sort = a.sort;
                    (a.term, b.term, sort)
                } else {
                    return Err(self.mismatch(args[2].span, "branches of 'If'", self.symbols.sort_name(a.sort), b.sort));
                };
                Ok(Typed {
                    term: Term::Ite(Box::new(c), Box::new(a), Box::new(b)),
                    sort,
                })
            }
            _ => self.apply(callee, args),
        }
    }

    fn apply(&mut self, callee: &Ident, args: &[Expr]) -> Result<Typed, ExprError> {
        let name = callee.node.as_str();
        let not_a_function = || {
            ExprError::new(
                callee.span,
                CompileErrorKind::NotAFunction {
                    name: name.to_string(),
                },
            )
        };
        if self.scope.iter().any(|v| v.name == name) {
            return Err(not_a_function());
        }
        let func = match self.symbols.lookup(name) {
            Some(Symbol::Function(f)) => f,
            Some(Symbol::Const(_)) => return Err(not_a_function()),
            None => {
                return Err(ExprError::new(
                    callee.span,
                    CompileErrorKind::UnknownSymbol {
                        name: name.to_string(),
                    },
                ));
            }
        };
        let symbols = self.symbols;
        let decl = symbols.function(func);
        arity(callee, args, decl.domain.len())?;

        let ctx = format!("argument of '{name}'");
        let mut out = Vec::with_capacity(args.len());
        for (a, want) in args.iter().zip(&decl.domain) {
            let t = self.expr(a)?;
            out.push(self.coerce(t, *want, a.span, &ctx)?);
        }
        Ok(Typed {
            term: Term::App { func, args: out },
            sort: decl.range,
        })
    }

    fn coerce(&self, t: Typed, want: Sort, span: Span, context: &str) -> Result<Term, ExprError> {
        match (t.sort, want) {
            (have, want) if have == want => Ok(t.term),
            (Sort::Int, Sort::Real) => Ok(Term::ToReal(Box::new(t.term))),
            (have, want) => Err(self.mismatch(span, context, self.symbols.sort_name(want), have)),
        }
    }

    fn mismatch(&self, span: Span, context: &str, expected: &str, found: Sort) -> ExprError {
        ExprError::new(
            span,
            CompileErrorKind::SortMismatch {
                context: context.to_string(),
                expected: expected.to_string(),
                found: self.symbols.sort_name(found).to_string(),
            },
        )
    }
}

pub(crate) fn fresh_bound(next: &mut usize, name: &str, sort: Sort) -> BoundVar {
    let id = *next;
    *next += 1;
    BoundVar {
        id,
        name: name.to_string(),
        sort,
    }
}

fn arity(callee: &Ident, args: &[Expr], expected: usize) -> Result<(), ExprError> {
    if args.len() == expected {
        return Ok(());
    }
    Err(ExprError::new(
        callee.span,
        CompileErrorKind::Arity {
            name: callee.node.clone(),
            expected,
            found: args.len(),
        },
    ))
}

/// Both operands are numeric; promote to Real if either side is.
fn unify(l: Typed, r: Typed) -> (Term, Term, Sort) {
    match (l.sort, r.sort) {
        (Sort::Int, Sort::Real) => (Term::ToReal(Box::new(l.term)), r.term, Sort::Real),
        (Sort::Real, Sort::Int) => (l.term, Term::ToReal(Box::new(r.term)), Sort::Real),
        (sort, _) => (l.term, r.term, sort),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pot_ast::span_between;

    fn negations(n: usize) -> Expr {
        let mut e = Expr {
            span: span_between(0, 4),
            kind: ExprKind::BoolLit(true),
        };
        for _ in 0..n {
            e = Expr {
                span: span_between(0, 4),
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(e),
                },
            };
        }
        e
    }

    fn lower(e: &Expr) -> Result<Term, ExprError> {
        let symbols = SymbolTable::new();
        let mut next = 0;
        Lowerer::new(&symbols, Vec::new(), &mut next).boolean(e, "formula")
    }

    #[test]
    fn trees_at_the_limit_lower() {
        assert!(lower(&negations(MAX_DEPTH - 1)).is_ok());
    }

    #[test]
    fn trees_past_the_limit_are_refused() {
        let err = lower(&negations(MAX_DEPTH + 50)).unwrap_err();
        assert!(
            matches!(&err.kind, CompileErrorKind::Syntax { message } if message.contains("nests deeper")),
            "{:?}",
            err.kind
        );
    }
}

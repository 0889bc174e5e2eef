//! Z3 implementation of [`Backend`]. Built only with the `z3` feature.

use std::collections::HashMap;
use std::time::Duration;

use pot_ast::Direction;
use pot_compile::{
    ArithOp, CmpOp, CompiledObjective, ConstKind, QuantKind, Sort, SymbolTable, Term,
};
use z3::ast::{self, Ast, Bool, Dynamic, Int, Real};
use z3::{Config, Context, FuncDecl, Model, Optimize, Params, SatResult, Solver, Symbol};

use crate::backend::{Backend, SatStatus, Session, SolverError, SolverProvider};
use crate::result::{
    ObjectiveValue, OptimizationOutcome, OptimizationStatus, VerificationResult, Witness,
};

/// Opens a fresh Z3 context per session. Contexts are not shared between threads.
pub struct Z3Provider;

impl SolverProvider for Z3Provider {
    fn describe(&self) -> String {
        "z3".to_string()
    }

    fn with_backend(
        &self,
        timeout: Duration,
        session: &mut Session<'_>,
    ) -> Result<VerificationResult, SolverError> {
        let mut cfg = Config::new();
        cfg.set_model_generation(true);
        let ctx = Context::new(&cfg);
        let mut backend = Z3Backend::new(&ctx, timeout);
        session(&mut backend)
    }
}

pub struct Z3Backend<'ctx> {
    ctx: &'ctx Context,
    solver: Solver<'ctx>,
    timeout_ms: u32,
    sorts: Vec<z3::Sort<'ctx>>,
    funcs: Vec<FuncDecl<'ctx>>,
    consts: Vec<Dynamic<'ctx>>,
    /// Constants reported in witnesses; enum values are left out.
    reported: Vec<(String, usize)>,
}

impl<'ctx> Z3Backend<'ctx> {
    pub fn new(ctx: &'ctx Context, timeout: Duration) -> Self {
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        let solver = Solver::new(ctx);
        let backend = Self {
            ctx,
            solver,
            timeout_ms,
            sorts: Vec::new(),
            funcs: Vec::new(),
            consts: Vec::new(),
            reported: Vec::new(),
        };
        backend.solver.set_params(&backend.params());
        backend
    }

    fn params(&self) -> Params<'ctx> {
        let mut params = Params::new(self.ctx);
        params.set_u32("timeout", self.timeout_ms);
        // Same query, same answer: pin the seeds.
        params.set_u32("smt.random_seed", 0);
        params.set_u32("sat.random_seed", 0);
        params
    }

    fn sort(&self, sort: Sort) -> z3::Sort<'ctx> {
        match sort {
            Sort::Bool => z3::Sort::bool(self.ctx),
            Sort::Int => z3::Sort::int(self.ctx),
            Sort::Real => z3::Sort::real(self.ctx),
            Sort::Declared(id) => self.sorts[id.0].clone(),
        }
    }

    fn lower_bool(
        &self,
        t: &Term,
        bound: &mut HashMap<usize, Dynamic<'ctx>>,
    ) -> Result<Bool<'ctx>, SolverError> {
        as_bool(self.lower(t, bound)?)
    }

    fn lower(
        &self,
        t: &Term,
        bound: &mut HashMap<usize, Dynamic<'ctx>>,
    ) -> Result<Dynamic<'ctx>, SolverError> {
        let ctx = self.ctx;
        Ok(match t {
            Term::BoolLit(b) => Dynamic::from_ast(&Bool::from_bool(ctx, *b)),
            Term::IntLit(n) => Dynamic::from_ast(&Int::from_u64(ctx, *n)),
            Term::RealLit { num, den } => {
                let num = Int::from_u64(ctx, *num).to_real();
                let den = Int::from_u64(ctx, *den).to_real();
                Dynamic::from_ast(&num.div(&den))
            }
            Term::Const(id) => self.consts[id.0].clone(),
            Term::Bound(v) => bound.get(&v.id).cloned().ok_or_else(|| {
                SolverError::backend(format!("bound variable '{}' used outside its quantifier", v.name))
            })?,
            Term::App { func, args } => {
                let args = args
                    .iter()
                    .map(|a| self.lower(a, bound))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&dyn Ast<'ctx>> = args.iter().map(|a| a as &dyn Ast<'ctx>).collect();
                self.funcs[func.0].apply(&refs)
            }
            Term::Not(a) => Dynamic::from_ast(&self.lower_bool(a, bound)?.not()),
            Term::And(xs) | Term::Or(xs) => {
                let xs = xs
                    .iter()
                    .map(|x| self.lower_bool(x, bound))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Bool<'ctx>> = xs.iter().collect();
                if matches!(t, Term::And(_)) {
                    Dynamic::from_ast(&Bool::and(ctx, &refs))
                } else {
                    Dynamic::from_ast(&Bool::or(ctx, &refs))
                }
            }
            Term::Implies(a, b) => {
                let a = self.lower_bool(a, bound)?;
                let b = self.lower_bool(b, bound)?;
                Dynamic::from_ast(&a.implies(&b))
            }
            Term::Iff(a, b) => {
                let a = self.lower_bool(a, bound)?;
                let b = self.lower_bool(b, bound)?;
                Dynamic::from_ast(&a.iff(&b))
            }
            Term::Eq(a, b) => {
                let a = self.lower(a, bound)?;
                let b = self.lower(b, bound)?;
                Dynamic::from_ast(&a._eq(&b))
            }
            Term::Distinct(xs) => {
                let xs = xs
                    .iter()
                    .map(|x| self.lower(x, bound))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&Dynamic<'ctx>> = xs.iter().collect();
                Dynamic::from_ast(&Dynamic::distinct(ctx, &refs))
            }
            Term::Ite(c, a, b) => {
                let c = self.lower_bool(c, bound)?;
                let a = self.lower(a, bound)?;
                let b = self.lower(b, bound)?;
                c.ite(&a, &b)
            }
            Term::Neg { sort, arg } => {
                let a = self.lower(arg, bound)?;
                match sort {
                    Sort::Real => Dynamic::from_ast(&as_real(a)?.unary_minus()),
                    _ => Dynamic::from_ast(&as_int(a)?.unary_minus()),
                }
            }
            Term::Arith {
                op,
                sort,
                left,
                right,
            } => {
                let l = self.lower(left, bound)?;
                let r = self.lower(right, bound)?;
                if *sort == Sort::Real {
                    let (l, r) = (as_real(l)?, as_real(r)?);
                    Dynamic::from_ast(&match op {
                        ArithOp::Add => Real::add(ctx, &[&l, &r]),
                        ArithOp::Sub => Real::sub(ctx, &[&l, &r]),
                        ArithOp::Mul => Real::mul(ctx, &[&l, &r]),
                        ArithOp::Div => l.div(&r),
                    })
                } else {
                    let (l, r) = (as_int(l)?, as_int(r)?);
                    Dynamic::from_ast(&match op {
                        ArithOp::Add => Int::add(ctx, &[&l, &r]),
                        ArithOp::Sub => Int::sub(ctx, &[&l, &r]),
                        ArithOp::Mul => Int::mul(ctx, &[&l, &r]),
                        ArithOp::Div => l.div(&r),
                    })
                }
            }
            Term::Cmp {
                op,
                sort,
                left,
                right,
            } => {
                let l = self.lower(left, bound)?;
                let r = self.lower(right, bound)?;
                let b = if *sort == Sort::Real {
                    let (l, r) = (as_real(l)?, as_real(r)?);
                    match op {
                        CmpOp::Lt => l.lt(&r),
                        CmpOp::Le => l.le(&r),
                        CmpOp::Gt => l.gt(&r),
                        CmpOp::Ge => l.ge(&r),
                    }
                } else {
                    let (l, r) = (as_int(l)?, as_int(r)?);
                    match op {
                        CmpOp::Lt => l.lt(&r),
                        CmpOp::Le => l.le(&r),
                        CmpOp::Gt => l.gt(&r),
                        CmpOp::Ge => l.ge(&r),
                    }
                };
                Dynamic::from_ast(&b)
            }
            Term::ToReal(a) => Dynamic::from_ast(&as_int(self.lower(a, bound)?)?.to_real()),
            Term::Quant { kind, vars, body } => {
                let consts: Vec<Dynamic<'ctx>> = vars
                    .iter()
                    .map(|v| Dynamic::fresh_const(ctx, &v.name, &self.sort(v.sort)))
                    .collect();
                for (v, c) in vars.iter().zip(&consts) {
                    bound.insert(v.id, c.clone());
                }
                let body = self.lower_bool(body, bound);
                for v in vars {
                    bound.remove(&v.id);
                }
                let body = body?;
                let refs: Vec<&dyn Ast<'ctx>> = consts.iter().map(|c| c as &dyn Ast<'ctx>).collect();
                Dynamic::from_ast(&match kind {
                    QuantKind::Forall => ast::forall_const(ctx, &refs, &[], &body),
                    QuantKind::Exists => ast::exists_const(ctx, &refs, &[], &body),
                })
            }
        })
    }

    fn witness_from(&self, model: &Model<'ctx>) -> Witness {
        let bindings = self
            .reported
            .iter()
            .filter_map(|(name, idx)| {
                let value = model.eval(&self.consts[*idx], true)?;
                Some((name.clone(), value.to_string()))
            })
            .collect();
        Witness {
            bindings,
            model: Some(model.to_string()),
        }
    }
}

impl<'ctx> Backend for Z3Backend<'ctx> {
    fn declare(&mut self, symbols: &SymbolTable) -> Result<(), SolverError> {
        let mut enum_values: HashMap<usize, Vec<FuncDecl<'ctx>>> = HashMap::new();
        for (i, decl) in symbols.sorts().iter().enumerate() {
            match &decl.values {
                None => self
                    .sorts
                    .push(z3::Sort::uninterpreted(self.ctx, Symbol::String(decl.name.clone()))),
                Some(values) => {
                    let names: Vec<Symbol> = values
                        .iter()
                        .map(|id| Symbol::String(symbols.constant(*id).name.clone()))
                        .collect();
                    let (sort, consts, _testers) =
                        z3::Sort::enumeration(self.ctx, Symbol::String(decl.name.clone()), &names);
                    enum_values.insert(i, consts);
                    self.sorts.push(sort);
                }
            }
        }

        for f in symbols.functions() {
            let domain: Vec<z3::Sort<'ctx>> = f.domain.iter().map(|s| self.sort(*s)).collect();
            let domain_refs: Vec<&z3::Sort<'ctx>> = domain.iter().collect();
            let range = self.sort(f.range);
            self.funcs
                .push(FuncDecl::new(self.ctx, f.name.as_str(), &domain_refs, &range));
        }

        for (idx, c) in symbols.constants().iter().enumerate() {
            let value = match c.kind {
                ConstKind::EnumValue { sort, index } => enum_values
                    .get(&sort.0)
                    .and_then(|values| values.get(index))
                    .map(|f| f.apply(&[]))
                    .ok_or_else(|| {
                        SolverError::backend(format!("enum value '{}' was not declared", c.name))
                    })?,
                _ => {
                    self.reported.push((c.name.clone(), idx));
                    Dynamic::new_const(self.ctx, c.name.as_str(), &self.sort(c.sort))
                }
            };
            self.consts.push(value);
        }
        Ok(())
    }

    fn assert(&mut self, term: &Term) -> Result<(), SolverError> {
        let b = self.lower_bool(term, &mut HashMap::new())?;
        self.solver.assert(&b);
        Ok(())
    }

    fn push(&mut self) {
        self.solver.push();
    }

    fn pop(&mut self) {
        self.solver.pop(1);
    }

    fn check(&mut self) -> Result<SatStatus, SolverError> {
        Ok(match self.solver.check() {
            SatResult::Sat => SatStatus::Sat,
            SatResult::Unsat => SatStatus::Unsat,
            SatResult::Unknown => SatStatus::Unknown(self.solver.get_reason_unknown()),
        })
    }

    fn witness(&mut self) -> Option<Witness> {
        let model = self.solver.get_model()?;
        Some(self.witness_from(&model))
    }

    fn optimize(
        &mut self,
        constraints: &[&Term],
        objectives: &[CompiledObjective],
    ) -> Result<OptimizationOutcome, SolverError> {
        let opt = Optimize::new(self.ctx);
        opt.set_params(&self.params());
        for c in constraints {
            opt.assert(&self.lower_bool(c, &mut HashMap::new())?);
        }

        let mut handles = Vec::with_capacity(objectives.len());
        for o in objectives {
            let t = self.lower(&o.term, &mut HashMap::new())?;
            match o.direction {
                Direction::Maximize => opt.maximize(&t),
                Direction::Minimize => opt.minimize(&t),
            }
            handles.push(t);
        }

        let (status, model) = match opt.check(&[]) {
            SatResult::Sat => (OptimizationStatus::Optimal, opt.get_model()),
            SatResult::Unsat => (OptimizationStatus::Unsat, None),
            SatResult::Unknown => (OptimizationStatus::Unknown, None),
        };

        let objectives = objectives
            .iter()
            .zip(&handles)
            .map(|(o, h)| ObjectiveValue {
                expression: o.text.clone(),
                direction: o.direction,
                value: model
                    .as_ref()
                    .and_then(|m| m.eval(h, true))
                    .map(|v| v.to_string()),
            })
            .collect();

        Ok(OptimizationOutcome {
            status,
            objectives,
            witness: model.as_ref().map(|m| self.witness_from(m)),
            reason: match status {
                OptimizationStatus::Unknown => Some("optimizer returned unknown".to_string()),
                _ => None,
            },
        })
    }
}

fn as_bool(d: Dynamic<'_>) -> Result<Bool<'_>, SolverError> {
    d.as_bool()
        .ok_or_else(|| SolverError::backend(format!("expected a boolean term, got {d}")))
}

fn as_int(d: Dynamic<'_>) -> Result<Int<'_>, SolverError> {
    d.as_int()
        .ok_or_else(|| SolverError::backend(format!("expected an integer term, got {d}")))
}

fn as_real(d: Dynamic<'_>) -> Result<Real<'_>, SolverError> {
    d.as_real()
        .ok_or_else(|| SolverError::backend(format!("expected a real term, got {d}")))
}

use pot_ast::{
    Action, Binding, ConstantGroup, Direction, KnowledgeEntry, Program, QuantKind,
    QuantifierPrefix, RuleBody, SortKind,
};

use crate::error::{CompileError, CompileErrorKind};
use crate::lower::{fresh_bound, Lowerer};
use crate::symbols::{is_reserved, ConstDecl, ConstKind, FuncDecl, Sort, SymbolTable};
use crate::term::{BoundVar, Term};

/// A formula asserted into every solver scope. `origin` is the document path it came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Assertion {
    pub origin: String,
    pub term: Term,
}

/// A compiled verification. Never asserted; the executor checks whether the
/// assertions entail it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Goal {
    pub name: String,
    pub term: Term,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledObjective {
    pub direction: Direction,
    pub sort: Sort,
    pub term: Term,
    /// Expression text as written, used to label results.
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptimizationModel {
    pub constraints: Vec<Assertion>,
    pub objectives: Vec<CompiledObjective>,
}

#[derive(Clone, Debug)]
pub struct CompiledProgram {
    pub symbols: SymbolTable,
    pub assertions: Vec<Assertion>,
    pub goals: Vec<Goal>,
    pub optimization: Option<OptimizationModel>,
    pub actions: Vec<Action>,
}

impl CompiledProgram {
    pub fn wants(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

pub fn compile(program: &Program) -> Result<CompiledProgram, CompileError> {
    let mut c = Compiler {
        symbols: SymbolTable::new(),
        next_bound: 0,
    };

    c.declare_sorts(program)?;
    c.declare_functions(program)?;
    for group in &program.constants {
        c.declare_group(group)?;
    }
    for (i, v) in program.variables.iter().enumerate() {
        c.declare_const(
            &format!("variables[{i}]"),
            &v.name,
            &v.name,
            &v.sort,
            ConstKind::Variable,
        )?;
    }

    let mut assertions = Vec::new();
    for (i, entry) in program.knowledge_base.iter().enumerate() {
        let path = format!("knowledge_base[{i}]");
        let path = match entry {
            KnowledgeEntry::Bare(_) => path,
            KnowledgeEntry::Explicit { .. } => format!("{path}.assertion"),
        };
        let term = c.formula(&path, entry.assertion(), Vec::new())?;
        let term = if entry.polarity() { term } else { term.not() };
        assertions.push(Assertion { origin: path, term });
    }

    for (i, rule) in program.rules.iter().enumerate() {
        let path = format!("rules[{i}]");
        let vars = c.binders(&format!("{path}.forall"), &rule.forall)?;
        let body = c.body(&path, &rule.body, vars.clone())?;
        assertions.push(Assertion {
            origin: path,
            term: quantify(QuantKind::Forall, vars, body),
        });
    }

    let mut goals = Vec::new();
    for (i, v) in program.verifications.iter().enumerate() {
        let path = format!("verifications[{i}]");
        let (kind, vars) = match &v.quantifier {
            Some(QuantifierPrefix::Exists(b)) => {
                (QuantKind::Exists, c.binders(&format!("{path}.exists"), b)?)
            }
            Some(QuantifierPrefix::Forall(b)) => {
                (QuantKind::Forall, c.binders(&format!("{path}.forall"), b)?)
            }
            None => (QuantKind::Forall, Vec::new()),
        };
        let body = c.body(&path, &v.body, vars.clone())?;
        let name = v.name.clone().unwrap_or_else(|| format!("verification_{i}"));
        goals.push(Goal {
            name,
            term: quantify(kind, vars, body),
        });
    }

    let optimization = match &program.optimization {
        Some(opt) => {
            for (i, v) in opt.variables.iter().enumerate() {
                c.declare_const(
                    &format!("optimization.variables[{i}]"),
                    &v.name,
                    &v.name,
                    &v.sort,
                    ConstKind::OptimizationVariable,
                )?;
            }
            let mut model = OptimizationModel::default();
            for (i, text) in opt.constraints.iter().enumerate() {
                let path = format!("optimization.constraints[{i}]");
                let term = c.formula(&path, text, Vec::new())?;
                model.constraints.push(Assertion { origin: path, term });
            }
            for (i, obj) in opt.objectives.iter().enumerate() {
                let path = format!("optimization.objectives[{i}].expression");
                let (term, sort) = c.numeric(&path, &obj.expression)?;
                model.objectives.push(CompiledObjective {
                    direction: obj.direction,
                    sort,
                    term,
                    text: obj.expression.clone(),
                });
            }
            Some(model)
        }
        None => None,
    };

    Ok(CompiledProgram {
        symbols: c.symbols,
        assertions,
        goals,
        optimization,
        actions: program.actions.clone(),
    })
}

fn quantify(kind: QuantKind, vars: Vec<BoundVar>, body: Term) -> Term {
    if vars.is_empty() {
        return body;
    }
    Term::Quant {
        kind,
        vars,
        body: Box::new(body),
    }
}

struct Compiler {
    symbols: SymbolTable,
    next_bound: usize,
}

impl Compiler {
    fn declare_sorts(&mut self, program: &Program) -> Result<(), CompileError> {
        for (i, s) in program.sorts.iter().enumerate() {
            let path = format!("sorts[{i}].name");
            self.check_new_sort(&path, &s.name)?;
            match &s.kind {
                SortKind::Atomic => {
                    self.symbols.add_sort(&s.name);
                }
                SortKind::Enumerated(values) => {
                    let id = self.symbols.add_sort(&s.name);
                    let mut consts = Vec::with_capacity(values.len());
                    for (j, value) in values.iter().enumerate() {
                        let vpath = format!("sorts[{i}].values[{j}]");
                        self.check_new_name(&vpath, value)?;
                        self.check_new_solver_name(&vpath, value)?;
                        consts.push(self.symbols.add_const(ConstDecl {
                            name: value.clone(),
                            reference: value.clone(),
                            sort: Sort::Declared(id),
                            kind: ConstKind::EnumValue { sort: id, index: j },
                        }));
                    }
                    self.symbols.set_enum_values(id, consts);
                }
                SortKind::Int => self.symbols.add_sort_alias(&s.name, Sort::Int),
                SortKind::Real => self.symbols.add_sort_alias(&s.name, Sort::Real),
                SortKind::Bool => self.symbols.add_sort_alias(&s.name, Sort::Bool),
            }
        }
        Ok(())
    }

    fn declare_functions(&mut self, program: &Program) -> Result<(), CompileError> {
        for (i, f) in program.functions.iter().enumerate() {
            let path = format!("functions[{i}].name");
            self.check_new_name(&path, &f.name)?;
            self.check_new_solver_name(&path, &f.name)?;
            let domain = f
                .domain
                .iter()
                .enumerate()
                .map(|(j, s)| self.sort(&format!("functions[{i}].domain[{j}]"), s))
                .collect::<Result<Vec<_>, _>>()?;
            let range = self.sort(&format!("functions[{i}].range"), &f.range)?;
            self.symbols.add_function(FuncDecl {
                name: f.name.clone(),
                domain,
                range,
            });
        }
        Ok(())
    }

    fn declare_group(&mut self, group: &ConstantGroup) -> Result<(), CompileError> {
        let base = format!("constants.{}", group.name);
        let sort_path = format!("{base}.sort");
        // Resolve once up front so a bad sort is reported against the group, not a member.
        self.sort(&sort_path, &group.sort)?;
        for (reference, solver_name) in group.members.entries() {
            self.declare_const(
                &format!("{base}.members.{reference}"),
                reference,
                solver_name,
                &group.sort,
                ConstKind::Member,
            )?;
        }
        Ok(())
    }

    fn declare_const(
        &mut self,
        path: &str,
        reference: &str,
        solver_name: &str,
        sort: &str,
        kind: ConstKind,
    ) -> Result<(), CompileError> {
        self.check_new_name(path, reference)?;
        self.check_new_solver_name(path, solver_name)?;
        let sort = self.sort(&format!("{path}.sort"), sort)?;
        self.symbols.add_const(ConstDecl {
            name: solver_name.to_string(),
            reference: reference.to_string(),
            sort,
            kind,
        });
        Ok(())
    }

    fn sort(&self, path: &str, name: &str) -> Result<Sort, CompileError> {
        self.symbols.resolve_sort(name).ok_or_else(|| {
            CompileError::decl(
                path,
                CompileErrorKind::UnknownSort {
                    name: name.to_string(),
                },
            )
        })
    }

    fn check_new_sort(&self, path: &str, name: &str) -> Result<(), CompileError> {
        if is_reserved(name) {
            return Err(CompileError::decl(
                path,
                CompileErrorKind::Reserved {
                    name: name.to_string(),
                },
            ));
        }
        if self.symbols.has_sort(name) {
            return Err(CompileError::decl(
                path,
                CompileErrorKind::Duplicate {
                    name: name.to_string(),
                },
            ));
        }
        Ok(())
    }

    fn check_new_name(&self, path: &str, name: &str) -> Result<(), CompileError> {
        if is_reserved(name) {
            return Err(CompileError::decl(
                path,
                CompileErrorKind::Reserved {
                    name: name.to_string(),
                },
            ));
        }
        if self.symbols.has_name(name) {
            return Err(CompileError::decl(
                path,
                CompileErrorKind::Duplicate {
                    name: name.to_string(),
                },
            ));
        }
        Ok(())
    }

    /// Two declarations sharing a solver name would be one symbol to the solver.
    fn check_new_solver_name(&self, path: &str, name: &str) -> Result<(), CompileError> {
        if self.symbols.has_solver_name(name) {
            return Err(CompileError::decl(
                path,
                CompileErrorKind::Duplicate {
                    name: name.to_string(),
                },
            ));
        }
        Ok(())
    }

    /// Bound variables for a rule or verification prefix. They may not shadow
    /// declared symbols or each other.
    fn binders(&mut self, path: &str, bindings: &[Binding]) -> Result<Vec<BoundVar>, CompileError> {
        let mut vars: Vec<BoundVar> = Vec::with_capacity(bindings.len());
        for (i, b) in bindings.iter().enumerate() {
            let bpath = format!("{path}[{i}]");
            if is_reserved(&b.name) {
                return Err(CompileError::decl(
                    bpath,
                    CompileErrorKind::Reserved {
                        name: b.name.clone(),
                    },
                ));
            }
            if self.symbols.has_name(&b.name) || vars.iter().any(|v| v.name == b.name) {
                return Err(CompileError::decl(
                    bpath,
                    CompileErrorKind::Shadowing {
                        name: b.name.clone(),
                    },
                ));
            }
            let sort = self.sort(&format!("{bpath}.sort"), &b.sort)?;
            vars.push(fresh_bound(&mut self.next_bound, &b.name, sort));
        }
        Ok(vars)
    }

    fn body(&mut self, path: &str, body: &RuleBody, scope: Vec<BoundVar>) -> Result<Term, CompileError> {
        match body {
            RuleBody::Constraint(text) => self.formula(&format!("{path}.constraint"), text, scope),
            RuleBody::Implies {
                antecedent,
                consequent,
            } => {
                let a = self.formula(&format!("{path}.implies.antecedent"), antecedent, scope.clone())?;
                let b = self.formula(&format!("{path}.implies.consequent"), consequent, scope)?;
                Ok(Term::Implies(Box::new(a), Box::new(b)))
            }
        }
    }

    fn formula(&mut self, path: &str, text: &str, scope: Vec<BoundVar>) -> Result<Term, CompileError> {
        let expr = parse(path, text)?;
        Lowerer::new(&self.symbols, scope, &mut self.next_bound)
            .boolean(&expr, "formula")
            .map_err(|e| CompileError::in_expr(path, text, e))
    }

    fn numeric(&mut self, path: &str, text: &str) -> Result<(Term, Sort), CompileError> {
        let expr = parse(path, text)?;
        let t = Lowerer::new(&self.symbols, Vec::new(), &mut self.next_bound)
            .numeric(&expr, "objective")
            .map_err(|e| CompileError::in_expr(path, text, e))?;
        Ok((t.term, t.sort))
    }
}

fn parse(path: &str, text: &str) -> Result<pot_ast::Expr, CompileError> {
    pot_parse::parse_expr(text).map_err(|e| CompileError {
        kind: CompileErrorKind::Syntax {
            message: e.message().to_string(),
        },
        path: path.to_string(),
        expr: text.to_string(),
        span: Some(e.span()),
    })
}

use std::collections::{HashMap, HashSet};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SortId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FuncId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConstId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Sort {
    Bool,
    Int,
    Real,
    Declared(SortId),
}

impl Sort {
    pub fn is_numeric(self) -> bool {
        matches!(self, Sort::Int | Sort::Real)
    }
}

/// Names that always resolve to a built-in sort.
pub const BUILTIN_SORTS: &[(&str, Sort)] = &[
    ("Bool", Sort::Bool),
    ("BoolSort", Sort::Bool),
    ("Int", Sort::Int),
    ("IntSort", Sort::Int),
    ("Real", Sort::Real),
    ("RealSort", Sort::Real),
];

/// Function-call builtins plus the expression keywords. None of these may be declared.
pub const RESERVED: &[&str] = &[
    "And", "Or", "Not", "Implies", "Iff", "Distinct", "If", "and", "or", "not", "implies", "iff",
    "forall", "exists", "true", "false", "True", "False",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortDecl {
    pub name: String,
    /// For enumerated sorts, the constants standing for each value in order.
    pub values: Option<Vec<ConstId>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FuncDecl {
    pub name: String,
    pub domain: Vec<Sort>,
    pub range: Sort,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstKind {
    EnumValue { sort: SortId, index: usize },
    Member,
    Variable,
    OptimizationVariable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConstDecl {
    /// Name handed to the solver.
    pub name: String,
    /// Name expressions refer to it by.
    pub reference: String,
    pub sort: Sort,
    pub kind: ConstKind,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Symbol {
    Function(FuncId),
    Const(ConstId),
}

/// Everything a compiled program declares, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    sorts: Vec<SortDecl>,
    sort_names: HashMap<String, Sort>,
    functions: Vec<FuncDecl>,
    constants: Vec<ConstDecl>,
    names: HashMap<String, Symbol>,
    /// Names the solver sees. Distinct from `names` once members map to other solver names.
    solver_names: HashSet<String>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = Self::default();
        for (name, sort) in BUILTIN_SORTS {
            table.sort_names.insert((*name).to_string(), *sort);
        }
        table
    }

    pub fn sorts(&self) -> &[SortDecl] {
        &self.sorts
    }

    pub fn functions(&self) -> &[FuncDecl] {
        &self.functions
    }

    pub fn constants(&self) -> &[ConstDecl] {
        &self.constants
    }

    pub fn sort_decl(&self, id: SortId) -> &SortDecl {
        &self.sorts[id.0]
    }

    pub fn function(&self, id: FuncId) -> &FuncDecl {
        &self.functions[id.0]
    }

    pub fn constant(&self, id: ConstId) -> &ConstDecl {
        &self.constants[id.0]
    }

    pub fn resolve_sort(&self, name: &str) -> Option<Sort> {
        self.sort_names.get(name).copied()
    }

    pub fn lookup(&self, name: &str) -> Option<Symbol> {
        self.names.get(name).copied()
    }

    pub fn has_sort(&self, name: &str) -> bool {
        self.sort_names.contains_key(name)
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Whether a function or constant is already declared to the solver as `name`.
    pub fn has_solver_name(&self, name: &str) -> bool {
        self.solver_names.contains(name)
    }

    pub fn sort_name(&self, sort: Sort) -> &str {
        match sort {
            Sort::Bool => "Bool",
            Sort::Int => "Int",
            Sort::Real => "Real",
            Sort::Declared(id) => &self.sorts[id.0].name,
        }
    }

    /// Callers check for duplicates first.
    pub(crate) fn add_sort_alias(&mut self, name: &str, sort: Sort) {
        self.sort_names.insert(name.to_string(), sort);
    }

    pub(crate) fn add_sort(&mut self, name: &str) -> SortId {
        let id = SortId(self.sorts.len());
        self.sorts.push(SortDecl {
            name: name.to_string(),
            values: None,
        });
        self.sort_names.insert(name.to_string(), Sort::Declared(id));
        id
    }

    pub(crate) fn set_enum_values(&mut self, id: SortId, values: Vec<ConstId>) {
        self.sorts[id.0].values = Some(values);
    }

    pub(crate) fn add_function(&mut self, decl: FuncDecl) -> FuncId {
        let id = FuncId(self.functions.len());
        self.names.insert(decl.name.clone(), Symbol::Function(id));
        self.solver_names.insert(decl.name.clone());
        self.functions.push(decl);
        id
    }

    pub(crate) fn add_const(&mut self, decl: ConstDecl) -> ConstId {
        let id = ConstId(self.constants.len());
        self.names.insert(decl.reference.clone(), Symbol::Const(id));
        self.solver_names.insert(decl.name.clone());
        self.constants.push(decl);
        id
    }
}

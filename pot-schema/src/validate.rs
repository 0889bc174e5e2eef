use pot_ast::{
    Action, Binding, ConstantGroup, ConstantMembers, Direction, FunctionDef, KnowledgeEntry,
    Objective, OptimizationConfig, Program, QuantifierPrefix, RuleBody, RuleDef, SortDef,
    SortKind, VariableDef, VerificationDef,
};
use serde_json::Value;

use crate::error::ValidationError;
use crate::object::{child, expect_array, expect_object, expect_str, kind_of, Fields};

pub(crate) fn program(doc: &Value) -> Result<Program, ValidationError> {
    let mut f = Fields::new(doc, "")?;

    let sorts = f.list("sorts", sort)?;
    let functions = f.list("functions", function)?;
    let constants = match f.get("constants") {
        Some(v) => constants(v, "constants")?,
        None => Vec::new(),
    };
    let variables = f.list("variables", variable)?;
    let knowledge_base = f.list("knowledge_base", knowledge)?;
    let rules = f.list("rules", rule)?;
    let verifications = f.list("verifications", verification)?;
    let optimization = match f.get("optimization") {
        Some(v) => Some(optimization(v, "optimization")?),
        None => None,
    };
    let actions = actions(f.list("actions", action)?);

    f.finish()?;

    Ok(Program {
        sorts,
        functions,
        constants,
        variables,
        knowledge_base,
        rules,
        verifications,
        optimization,
        actions,
    })
}

fn name_field(f: &mut Fields<'_>) -> Result<String, ValidationError> {
    let name = f.required_str("name")?;
    if name.trim().is_empty() {
        return Err(ValidationError::new(f.at("name"), "name must not be empty"));
    }
    Ok(name)
}

fn sort(v: &Value, path: &str) -> Result<SortDef, ValidationError> {
    let mut f = Fields::new(v, path)?;
    let name = name_field(&mut f)?;
    let type_name = f.required_str("type")?;
    let values = f.get("values");
    let description = f.optional_str("description")?;

    let kind = match type_name.as_str() {
        "DeclareSort" | "atomic" => SortKind::Atomic,
        "EnumSort" | "enum" => {
            let Some(values) = values else {
                return Err(ValidationError::new(
                    f.at("values"),
                    "enumerated sort needs a list of values",
                ));
            };
            let values_path = f.at("values");
            let items = expect_array(values, &values_path)?;
            if items.is_empty() {
                return Err(ValidationError::new(
                    values_path,
                    "enumerated sort needs at least one value",
                ));
            }
            let mut out: Vec<String> = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let p = format!("{values_path}[{i}]");
                let value = expect_str(item, &p)?;
                if out.contains(&value) {
                    return Err(ValidationError::new(p, format!("duplicate value '{value}'")));
                }
                out.push(value);
            }
            SortKind::Enumerated(out)
        }
        "IntSort" | "int" => SortKind::Int,
        "RealSort" | "real" => SortKind::Real,
        "BoolSort" | "bool" => SortKind::Bool,
        other => {
            return Err(ValidationError::new(
                f.at("type"),
                format!(
                    "unknown sort type '{other}' (expected DeclareSort, EnumSort, IntSort, RealSort or BoolSort)"
                ),
            ));
        }
    };

    if values.is_some() && !matches!(kind, SortKind::Enumerated(_)) {
        return Err(ValidationError::new(
            f.at("values"),
            format!("'values' is only allowed on EnumSort, not {type_name}"),
        ));
    }

    f.finish()?;
    Ok(SortDef {
        name,
        kind,
        description,
    })
}

fn function(v: &Value, path: &str) -> Result<FunctionDef, ValidationError> {
    let mut f = Fields::new(v, path)?;
    let name = name_field(&mut f)?;
    let domain = f.list("domain", expect_str)?;
    let range = f.required_str("range")?;
    let description = f.optional_str("description")?;
    f.finish()?;
    Ok(FunctionDef {
        name,
        domain,
        range,
        description,
    })
}

fn constants(v: &Value, path: &str) -> Result<Vec<ConstantGroup>, ValidationError> {
    let map = expect_object(v, path)?;
    let mut groups = Vec::with_capacity(map.len());
    for (group_name, body) in map {
        let gpath = child(path, group_name);
        let mut f = Fields::new(body, &gpath)?;
        let sort = f.required_str("sort")?;
        let members_path = f.at("members");
        let members = match f.required("members")? {
            Value::Array(items) => ConstantMembers::List(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, x)| expect_str(x, &format!("{members_path}[{i}]")))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(named) => ConstantMembers::Named(
                named
                    .iter()
                    .map(|(k, x)| -> Result<(String, String), ValidationError> {
                        Ok((k.clone(), expect_str(x, &child(&members_path, k))?))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            other => {
                return Err(ValidationError::new(
                    members_path,
                    format!("expected a list or a map of names, found {}", kind_of(other)),
                ));
            }
        };
        let description = f.optional_str("description")?;
        f.finish()?;
        groups.push(ConstantGroup {
            name: group_name.clone(),
            sort,
            members,
            description,
        });
    }
    Ok(groups)
}

fn variable(v: &Value, path: &str) -> Result<VariableDef, ValidationError> {
    let mut f = Fields::new(v, path)?;
    let name = name_field(&mut f)?;
    let sort = f.required_str("sort")?;
    let description = f.optional_str("description")?;
    f.finish()?;
    Ok(VariableDef {
        name,
        sort,
        description,
    })
}

fn knowledge(v: &Value, path: &str) -> Result<KnowledgeEntry, ValidationError> {
    if let Value::String(s) = v {
        return Ok(KnowledgeEntry::Bare(s.clone()));
    }
    if !v.is_object() {
        return Err(ValidationError::new(
            path,
            format!("expected a string or an object, found {}", kind_of(v)),
        ));
    }
    let mut f = Fields::new(v, path)?;
    let assertion = f.required_str("assertion")?;
    let value = f.optional_bool("value")?.unwrap_or(true);
    let description = f.optional_str("description")?;
    f.finish()?;
    Ok(KnowledgeEntry::Explicit {
        assertion,
        value,
        description,
    })
}

fn binding(v: &Value, path: &str) -> Result<Binding, ValidationError> {
    let mut f = Fields::new(v, path)?;
    let name = name_field(&mut f)?;
    let sort = f.required_str("sort")?;
    f.finish()?;
    Ok(Binding { name, sort })
}

fn implication(v: &Value, path: &str) -> Result<RuleBody, ValidationError> {
    let mut f = Fields::new(v, path)?;
    let antecedent = f.required_str("antecedent")?;
    let consequent = f.required_str("consequent")?;
    f.finish()?;
    Ok(RuleBody::Implies {
        antecedent,
        consequent,
    })
}

/// Exactly one of `implies` and `constraint`.
fn body(f: &mut Fields<'_>) -> Result<RuleBody, ValidationError> {
    let implies = f.get("implies");
    let constraint = f.get("constraint");
    match (implies, constraint) {
        (Some(i), None) => implication(i, &f.at("implies")),
        (None, Some(c)) => Ok(RuleBody::Constraint(expect_str(c, &f.at("constraint"))?)),
        (Some(_), Some(_)) => Err(ValidationError::new(
            f.path(),
            "only one of 'implies' and 'constraint' may be given",
        )),
        (None, None) => Err(ValidationError::new(
            f.path(),
            "one of 'implies' or 'constraint' is required",
        )),
    }
}

fn rule(v: &Value, path: &str) -> Result<RuleDef, ValidationError> {
    let mut f = Fields::new(v, path)?;
    let name = f.optional_str("name")?;
    let forall = f.list("forall", binding)?;
    let body = body(&mut f)?;
    let description = f.optional_str("description")?;
    f.finish()?;
    Ok(RuleDef {
        name,
        forall,
        body,
        description,
    })
}

fn verification(v: &Value, path: &str) -> Result<VerificationDef, ValidationError> {
    let mut f = Fields::new(v, path)?;
    let name = f.optional_str("name")?;
    let exists = f.list("exists", binding)?;
    let forall = f.list("forall", binding)?;
    let quantifier = match (exists.is_empty(), forall.is_empty()) {
        (true, true) => None,
        (false, true) => Some(QuantifierPrefix::Exists(exists)),
        (true, false) => Some(QuantifierPrefix::Forall(forall)),
        (false, false) => {
            return Err(ValidationError::new(
                f.path(),
                "only one of 'exists' and 'forall' may be given",
            ));
        }
    };
    let body = body(&mut f)?;
    let description = f.optional_str("description")?;
    f.finish()?;
    Ok(VerificationDef {
        name,
        quantifier,
        body,
        description,
    })
}

fn objective(v: &Value, path: &str) -> Result<Objective, ValidationError> {
    let mut f = Fields::new(v, path)?;
    let direction = match f.required_str("type")?.as_str() {
        "maximize" => Direction::Maximize,
        "minimize" => Direction::Minimize,
        other => {
            return Err(ValidationError::new(
                f.at("type"),
                format!("unknown objective type '{other}' (expected maximize or minimize)"),
            ));
        }
    };
    let expression = f.required_str("expression")?;
    f.finish()?;
    Ok(Objective {
        direction,
        expression,
    })
}

fn optimization(v: &Value, path: &str) -> Result<OptimizationConfig, ValidationError> {
    let mut f = Fields::new(v, path)?;
    let variables = f.list("variables", variable)?;
    let constraints = f.list("constraints", expect_str)?;
    let objectives = f.list("objectives", objective)?;
    let description = f.optional_str("description")?;
    f.finish()?;
    Ok(OptimizationConfig {
        variables,
        constraints,
        objectives,
        description,
    })
}

fn action(v: &Value, path: &str) -> Result<Action, ValidationError> {
    let name = expect_str(v, path)?;
    Action::from_name(&name).ok_or_else(|| {
        ValidationError::new(
            path,
            format!("unknown action '{name}' (expected verify_conditions or optimize)"),
        )
    })
}

fn actions(mut list: Vec<Action>) -> Vec<Action> {
    let mut seen = Vec::with_capacity(list.len());
    list.retain(|a| {
        if seen.contains(a) {
            false
        } else {
            seen.push(*a);
            true
        }
    });
    if list.is_empty() {
        list.push(Action::VerifyConditions);
    }
    list
}

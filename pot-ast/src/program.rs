//! The program data model.
//!
//! Values of these types only ever come out of the schema validator, so they
//! are structurally sound: required fields are present, enumerated sorts have
//! values, every rule has exactly one body. Name resolution is left to the
//! compiler. Serialising a `Program` yields the same document shape the
//! validator accepts.

use serde::ser::{SerializeMap, SerializeSeq, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Program {
    pub sorts: Vec<SortDef>,
    pub functions: Vec<FunctionDef>,
    #[serde(serialize_with = "constants_as_map")]
    pub constants: Vec<ConstantGroup>,
    pub variables: Vec<VariableDef>,
    pub knowledge_base: Vec<KnowledgeEntry>,
    pub rules: Vec<RuleDef>,
    pub verifications: Vec<VerificationDef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizationConfig>,
    pub actions: Vec<Action>,
}

impl Default for Program {
    fn default() -> Self {
        Self {
            sorts: Vec::new(),
            functions: Vec::new(),
            constants: Vec::new(),
            variables: Vec::new(),
            knowledge_base: Vec::new(),
            rules: Vec::new(),
            verifications: Vec::new(),
            optimization: None,
            actions: vec![Action::VerifyConditions],
        }
    }
}

impl Program {
    pub fn wants(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortDef {
    pub name: String,
    pub kind: SortKind,
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SortKind {
    /// Fresh uninterpreted sort.
    Atomic,
    /// Finite sort with exactly the listed values, pairwise distinct.
    Enumerated(Vec<String>),
    Int,
    Real,
    Bool,
}

impl SortKind {
    /// Document spelling of the sort kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            SortKind::Atomic => "DeclareSort",
            SortKind::Enumerated(_) => "EnumSort",
            SortKind::Int => "IntSort",
            SortKind::Real => "RealSort",
            SortKind::Bool => "BoolSort",
        }
    }
}

impl Serialize for SortDef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut st = serializer.serialize_struct("SortDef", 4)?;
        st.serialize_field("name", &self.name)?;
        st.serialize_field("type", self.kind.type_name())?;
        match &self.kind {
            SortKind::Enumerated(values) => st.serialize_field("values", values)?,
            _ => st.skip_field("values")?,
        }
        match &self.description {
            Some(d) => st.serialize_field("description", d)?,
            None => st.skip_field("description")?,
        }
        st.end()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FunctionDef {
    pub name: String,
    pub domain: Vec<String>,
    pub range: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConstantGroup {
    #[serde(skip)]
    pub name: String,
    pub sort: String,
    pub members: ConstantMembers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConstantMembers {
    /// Each entry is both the reference name and the solver name.
    List(Vec<String>),
    /// `(reference name, solver name)` pairs, in document order.
    Named(Vec<(String, String)>),
}

impl ConstantMembers {
    /// `(reference name, solver name)` for every member.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        match self {
            ConstantMembers::List(names) => names.iter().map(|n| (n.as_str(), n.as_str())).collect(),
            ConstantMembers::Named(pairs) => pairs
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
        }
    }
}

impl Serialize for ConstantMembers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConstantMembers::List(names) => {
                let mut seq = serializer.serialize_seq(Some(names.len()))?;
                for n in names {
                    seq.serialize_element(n)?;
                }
                seq.end()
            }
            ConstantMembers::Named(pairs) => {
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (k, v) in pairs {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

fn constants_as_map<S: Serializer>(groups: &[ConstantGroup], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(groups.len()))?;
    for g in groups {
        map.serialize_entry(&g.name, g)?;
    }
    map.end()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VariableDef {
    pub name: String,
    pub sort: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum KnowledgeEntry {
    Bare(String),
    Explicit {
        assertion: String,
        value: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl KnowledgeEntry {
    pub fn assertion(&self) -> &str {
        match self {
            KnowledgeEntry::Bare(s) => s,
            KnowledgeEntry::Explicit { assertion, .. } => assertion,
        }
    }

    /// Polarity the compiled formula is asserted with.
    pub fn polarity(&self) -> bool {
        match self {
            KnowledgeEntry::Bare(_) => true,
            KnowledgeEntry::Explicit { value, .. } => *value,
        }
    }
}

/// A sorted variable introduced by a quantifier prefix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub name: String,
    pub sort: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleBody {
    Implies { antecedent: String, consequent: String },
    Constraint(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuleDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub forall: Vec<Binding>,
    #[serde(flatten)]
    pub body: RuleBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantifierPrefix {
    Exists(Vec<Binding>),
    Forall(Vec<Binding>),
}

impl QuantifierPrefix {
    pub fn bindings(&self) -> &[Binding] {
        match self {
            QuantifierPrefix::Exists(b) | QuantifierPrefix::Forall(b) => b,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationDef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub quantifier: Option<QuantifierPrefix>,
    #[serde(flatten)]
    pub body: RuleBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Maximize,
    Minimize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Objective {
    #[serde(rename = "type")]
    pub direction: Direction,
    pub expression: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationConfig {
    pub variables: Vec<VariableDef>,
    pub constraints: Vec<String>,
    pub objectives: Vec<Objective>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    VerifyConditions,
    Optimize,
}

impl Action {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "verify_conditions" => Some(Action::VerifyConditions),
            "optimize" => Some(Action::Optimize),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::VerifyConditions => "verify_conditions",
            Action::Optimize => "optimize",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn program_serialises_to_document_shape() {
        let program = Program {
            sorts: vec![SortDef {
                name: "Color".to_string(),
                kind: SortKind::Enumerated(vec!["red".to_string(), "blue".to_string()]),
                description: None,
            }],
            constants: vec![ConstantGroup {
                name: "people".to_string(),
                sort: "Person".to_string(),
                members: ConstantMembers::Named(vec![("alice".to_string(), "Alice".to_string())]),
                description: None,
            }],
            knowledge_base: vec![
                KnowledgeEntry::Bare("x = 4".to_string()),
                KnowledgeEntry::Explicit {
                    assertion: "y > 1".to_string(),
                    value: false,
                    description: None,
                },
            ],
            verifications: vec![VerificationDef {
                name: Some("v".to_string()),
                quantifier: Some(QuantifierPrefix::Exists(vec![Binding {
                    name: "p".to_string(),
                    sort: "Person".to_string(),
                }])),
                body: RuleBody::Constraint("p = alice".to_string()),
                description: None,
            }],
            ..Program::default()
        };

        let doc = serde_json::to_value(&program).unwrap();
        assert_eq!(doc["sorts"][0], json!({"name": "Color", "type": "EnumSort", "values": ["red", "blue"]}));
        assert_eq!(doc["constants"]["people"]["members"], json!({"alice": "Alice"}));
        assert_eq!(doc["knowledge_base"][0], json!("x = 4"));
        assert_eq!(doc["knowledge_base"][1], json!({"assertion": "y > 1", "value": false}));
        assert_eq!(
            doc["verifications"][0],
            json!({"name": "v", "exists": [{"name": "p", "sort": "Person"}], "constraint": "p = alice"})
        );
        assert_eq!(doc["actions"], json!(["verify_conditions"]));
        assert!(doc.get("optimization").is_none());
    }

    #[test]
    fn rule_with_implication_flattens_body() {
        let rule = RuleDef {
            name: None,
            forall: vec![Binding {
                name: "x".to_string(),
                sort: "Int".to_string(),
            }],
            body: RuleBody::Implies {
                antecedent: "x > 0".to_string(),
                consequent: "x >= 1".to_string(),
            },
            description: None,
        };
        let doc = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            doc,
            json!({
                "forall": [{"name": "x", "sort": "Int"}],
                "implies": {"antecedent": "x > 0", "consequent": "x >= 1"}
            })
        );
    }
}

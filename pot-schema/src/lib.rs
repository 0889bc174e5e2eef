#![forbid(unsafe_code)]

//! Closed-schema validation of generated program documents.
//!
//! Every object in the document is read through a field cursor that rejects
//! keys it was not asked for, so a misspelt field is an error instead of being
//! silently dropped.

mod error;
mod object;
mod validate;

use pot_ast::Program;
use serde_json::Value;

pub use error::ValidationError;

/// Validate a raw document and normalise it into a [`Program`].
pub fn validate(doc: &Value) -> Result<Program, ValidationError> {
    validate::program(doc)
}

/// Convenience for documents that are still text.
pub fn validate_str(text: &str) -> Result<Program, ValidationError> {
    let doc: Value = serde_json::from_str(text)
        .map_err(|e| ValidationError::new("", format!("document is not valid JSON: {e}")))?;
    validate(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pot_ast::{Action, ConstantMembers, KnowledgeEntry, QuantifierPrefix, RuleBody, SortKind};
    use serde_json::json;

    #[test]
    fn empty_document_gets_default_action() {
        let p = validate(&json!({})).unwrap();
        assert_eq!(p.actions, vec![Action::VerifyConditions]);
        assert!(p.sorts.is_empty());
        assert!(p.optimization.is_none());
    }

    #[test]
    fn empty_and_duplicate_actions_normalise() {
        let p = validate(&json!({"actions": []})).unwrap();
        assert_eq!(p.actions, vec![Action::VerifyConditions]);
        let p = validate(&json!({"actions": ["optimize", "optimize", "verify_conditions"]})).unwrap();
        assert_eq!(p.actions, vec![Action::Optimize, Action::VerifyConditions]);
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let err = validate(&json!({"sorts": [], "facts": []})).unwrap_err();
        assert_eq!(err.path, "facts");
        assert_eq!(err.message, "unknown field");
    }

    #[test]
    fn unknown_nested_key_reports_full_path() {
        let err = validate(&json!({
            "rules": [
                {"constraint": "true"},
                {"implies": {"antecedent": "a", "consequent": "b", "because": "c"}}
            ]
        }))
        .unwrap_err();
        assert_eq!(err.path, "rules[1].implies.because");
    }

    #[test]
    fn sort_kinds_and_aliases() {
        let p = validate(&json!({"sorts": [
            {"name": "Person", "type": "DeclareSort"},
            {"name": "Color", "type": "enum", "values": ["red", "green"]},
            {"name": "Money", "type": "RealSort", "description": "dollars"},
            {"name": "Flag", "type": "bool"}
        ]}))
        .unwrap();
        assert_eq!(p.sorts[0].kind, SortKind::Atomic);
        assert_eq!(
            p.sorts[1].kind,
            SortKind::Enumerated(vec!["red".to_string(), "green".to_string()])
        );
        assert_eq!(p.sorts[2].kind, SortKind::Real);
        assert_eq!(p.sorts[2].description.as_deref(), Some("dollars"));
        assert_eq!(p.sorts[3].kind, SortKind::Bool);
    }

    #[test]
    fn enum_sort_rejects_duplicates_and_missing_values() {
        let err = validate(&json!({"sorts": [{"name": "C", "type": "EnumSort", "values": ["a", "a"]}]}))
            .unwrap_err();
        assert_eq!(err.path, "sorts[0].values[1]");

        let err = validate(&json!({"sorts": [{"name": "C", "type": "EnumSort"}]})).unwrap_err();
        assert_eq!(err.path, "sorts[0].values");

        let err = validate(&json!({"sorts": [{"name": "C", "type": "IntSort", "values": ["a"]}]}))
            .unwrap_err();
        assert!(err.message.contains("only allowed on EnumSort"));
    }

    #[test]
    fn unknown_sort_type_is_rejected() {
        let err = validate(&json!({"sorts": [{"name": "S", "type": "BitVecSort"}]})).unwrap_err();
        assert_eq!(err.path, "sorts[0].type");
    }

    #[test]
    fn constants_accept_lists_and_maps() {
        let p = validate(&json!({"constants": {
            "people": {"sort": "Person", "members": ["alice", "bob"]},
            "cities": {"sort": "City", "members": {"paris": "Paris"}}
        }}))
        .unwrap();
        assert_eq!(p.constants[0].name, "people");
        assert_eq!(
            p.constants[0].members,
            ConstantMembers::List(vec!["alice".to_string(), "bob".to_string()])
        );
        assert_eq!(
            p.constants[1].members.entries(),
            vec![("paris", "Paris")]
        );
    }

    #[test]
    fn knowledge_entries_take_both_shapes() {
        let p = validate(&json!({"knowledge_base": [
            "x = 4",
            {"assertion": "y > 2", "value": false},
            {"assertion": "z"}
        ]}))
        .unwrap();
        assert_eq!(p.knowledge_base[0], KnowledgeEntry::Bare("x = 4".to_string()));
        assert!(!p.knowledge_base[1].polarity());
        assert!(p.knowledge_base[2].polarity());
    }

    #[test]
    fn knowledge_value_must_be_boolean() {
        let err = validate(&json!({"knowledge_base": [{"assertion": "p", "value": "yes"}]}))
            .unwrap_err();
        assert_eq!(err.path, "knowledge_base[0].value");
    }

    #[test]
    fn rule_needs_exactly_one_body() {
        let err = validate(&json!({"rules": [{"name": "r"}]})).unwrap_err();
        assert_eq!(err.path, "rules[0]");
        let err = validate(&json!({"rules": [{
            "constraint": "p",
            "implies": {"antecedent": "a", "consequent": "b"}
        }]}))
        .unwrap_err();
        assert!(err.message.contains("only one"));
    }

    #[test]
    fn verification_allows_at_most_one_quantifier() {
        let err = validate(&json!({"verifications": [{
            "exists": [{"name": "p", "sort": "Person"}],
            "forall": [{"name": "q", "sort": "Person"}],
            "constraint": "true"
        }]}))
        .unwrap_err();
        assert_eq!(err.path, "verifications[0]");

        let p = validate(&json!({"verifications": [{
            "name": "someone",
            "exists": [{"name": "p", "sort": "Person"}],
            "constraint": "tall(p)"
        }]}))
        .unwrap();
        let v = &p.verifications[0];
        assert!(matches!(v.quantifier, Some(QuantifierPrefix::Exists(ref b)) if b[0].name == "p"));
        assert_eq!(v.body, RuleBody::Constraint("tall(p)".to_string()));
    }

    #[test]
    fn optimization_section_validates_objectives() {
        let p = validate(&json!({
            "optimization": {
                "variables": [{"name": "x", "sort": "IntSort"}],
                "constraints": ["x <= 10"],
                "objectives": [{"type": "maximize", "expression": "x"}]
            },
            "actions": ["optimize"]
        }))
        .unwrap();
        let opt = p.optimization.unwrap();
        assert_eq!(opt.objectives.len(), 1);

        let err = validate(&json!({"optimization": {"objectives": [{"type": "best", "expression": "x"}]}}))
            .unwrap_err();
        assert_eq!(err.path, "optimization.objectives[0].type");
    }

    #[test]
    fn unknown_action_is_rejected() {
        let err = validate(&json!({"actions": ["verify_conditions", "simulate"]})).unwrap_err();
        assert_eq!(err.path, "actions[1]");
    }

    #[test]
    fn wrong_container_types_are_reported() {
        let err = validate(&json!({"sorts": {"name": "S"}})).unwrap_err();
        assert_eq!(err.path, "sorts");
        assert!(err.message.contains("expected an array"));
        let err = validate(&json!(["not", "an", "object"])).unwrap_err();
        assert_eq!(err.path, "");
        assert!(err.to_string().contains("<root>"));
    }

    #[test]
    fn nulls_read_as_absent() {
        let p = validate(&json!({"optimization": null, "rules": null, "actions": null})).unwrap();
        assert!(p.optimization.is_none());
        assert!(p.rules.is_empty());
    }

    #[test]
    fn validate_str_reports_bad_json() {
        let err = validate_str("{ not json").unwrap_err();
        assert!(err.message.contains("not valid JSON"));
    }
}

use pot_schema::validate;
use serde_json::json;

#[test]
fn accepted_program_serialises_to_an_equivalent_document() {
    let doc = json!({
        "sorts": [
            {"name": "Person", "type": "DeclareSort"},
            {"name": "Color", "type": "EnumSort", "values": ["red", "blue"]}
        ],
        "functions": [
            {"name": "likes", "domain": ["Person", "Color"], "range": "BoolSort"}
        ],
        "constants": {
            "people": {"sort": "Person", "members": ["alice", "bob"]}
        },
        "variables": [{"name": "p", "sort": "Person"}],
        "knowledge_base": [
            "likes(alice, red)",
            {"assertion": "likes(bob, red)", "value": false}
        ],
        "rules": [{
            "name": "everyone likes blue",
            "forall": [{"name": "q", "sort": "Person"}],
            "constraint": "likes(q, blue)"
        }],
        "verifications": [{
            "name": "alice likes blue",
            "constraint": "likes(alice, blue)"
        }],
        "actions": ["verify_conditions"]
    });

    let program = validate(&doc).unwrap();
    let again = serde_json::to_value(&program).unwrap();
    assert_eq!(validate(&again).unwrap(), program);
    assert_eq!(again["verifications"], doc["verifications"]);
    assert_eq!(again["rules"], doc["rules"]);
}

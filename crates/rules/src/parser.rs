//! Converts stored rule JSON into a typed [`RuleNode`] tree.
//!
//! Shape problems are reported here, at load time, with a JSON-pointer-like
//! path so the offending node can be found in the stored form.

use serde_json::{Map, Value};

use crate::error::{Result, RuleError};
use crate::normalize::scalar_to_string;
use crate::schema::{Condition, Logic, RuleNode};

/// Parse a stored rule tree.
///
/// Objects carrying `logic` or `conditions` are groups; objects carrying
/// `fieldId` are leaves. A group without `conditions` is an empty group.
pub fn parse_rule_tree(value: &Value) -> Result<RuleNode> {
    parse_node(value, "$")
}

/// Whether a stored `rules` value has the top-level `{logic, conditions}` shape.
pub fn is_rule_tree(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key("logic") && obj.contains_key("conditions"))
}

fn parse_node(value: &Value, path: &str) -> Result<RuleNode> {
    let obj = value
        .as_object()
        .ok_or_else(|| RuleError::malformed(path, format!("expected object, found {}", kind(value))))?;

    if obj.contains_key("logic") || obj.contains_key("conditions") {
        return parse_group(obj, path);
    }
    if obj.contains_key("fieldId") {
        return parse_leaf(obj, path).map(RuleNode::Leaf);
    }
    Err(RuleError::malformed(
        path,
        "node is neither a group (logic/conditions) nor a condition (fieldId)",
    ))
}

fn parse_group(obj: &Map<String, Value>, path: &str) -> Result<RuleNode> {
    let logic = Logic::from_label(obj.get("logic").and_then(Value::as_str));

    let children = match obj.get("conditions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| parse_node(item, &format!("{path}.conditions[{i}]")))
            .collect::<Result<Vec<_>>>()?,
        Some(other) => {
            return Err(RuleError::malformed(
                path,
                format!("conditions must be an array, found {}", kind(other)),
            ))
        }
    };

    Ok(RuleNode::Group { logic, children })
}

fn parse_leaf(obj: &Map<String, Value>, path: &str) -> Result<Condition> {
    let field_id = obj
        .get("fieldId")
        .and_then(scalar_to_string)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| RuleError::malformed(path, "fieldId must be a non-empty string or number"))?;

    let field_name = obj
        .get("fieldName")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| field_id.trim().to_string());

    let expected = match obj.get("value") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                scalar_to_string(item).ok_or_else(|| {
                    RuleError::malformed(
                        &format!("{path}.value[{i}]"),
                        format!("expected scalar, found {}", kind(item)),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Some(Value::Object(_)) => {
            return Err(RuleError::malformed(path, "value must be a scalar or an array"))
        }
        Some(scalar) => scalar_to_string(scalar).into_iter().collect(),
    };

    Ok(Condition::new(field_id, field_name, expected))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_group() {
        let tree = parse_rule_tree(&json!({
            "logic": "AND",
            "conditions": [
                {"fieldId": "A", "fieldName": "Field A", "value": "yes"},
                {"logic": "or", "conditions": [
                    {"fieldId": "b", "value": ["x", "y"]}
                ]}
            ]
        }))
        .unwrap();

        let RuleNode::Group { logic, children } = tree else {
            panic!("expected group");
        };
        assert_eq!(logic, Logic::And);
        assert_eq!(children.len(), 2);

        let RuleNode::Leaf(first) = &children[0] else {
            panic!("expected leaf");
        };
        assert_eq!(first.field_id, "a");
        assert_eq!(first.field_name, "Field A");
        assert_eq!(first.expected, vec!["yes"]);

        let RuleNode::Group { logic, children } = &children[1] else {
            panic!("expected nested group");
        };
        assert_eq!(*logic, Logic::Or);
        let RuleNode::Leaf(inner) = &children[0] else {
            panic!("expected leaf");
        };
        assert_eq!(inner.field_name, "b");
        assert_eq!(inner.expected, vec!["x", "y"]);
    }

    #[test]
    fn missing_conditions_is_empty_group() {
        let tree = parse_rule_tree(&json!({"logic": "OR"})).unwrap();
        assert_eq!(
            tree,
            RuleNode::Group {
                logic: Logic::Or,
                children: vec![]
            }
        );
    }

    #[test]
    fn numeric_field_id_and_value() {
        let tree = parse_rule_tree(&json!({"fieldId": 42, "value": 7})).unwrap();
        let RuleNode::Leaf(condition) = tree else {
            panic!("expected leaf");
        };
        assert_eq!(condition.field_id, "42");
        assert_eq!(condition.expected, vec!["7"]);
    }

    #[test]
    fn rejects_non_object() {
        let err = parse_rule_tree(&json!(["a"])).unwrap_err();
        assert!(matches!(err, RuleError::Malformed { ref path, .. } if path == "$"));
    }

    #[test]
    fn rejects_conditions_not_array() {
        let err = parse_rule_tree(&json!({"logic": "AND", "conditions": "x"})).unwrap_err();
        assert!(matches!(err, RuleError::Malformed { .. }));
    }

    #[test]
    fn rejects_leaf_without_field_id() {
        let err = parse_rule_tree(&json!({
            "logic": "AND",
            "conditions": [{"fieldName": "orphan", "value": "x"}]
        }))
        .unwrap_err();
        match err {
            RuleError::Malformed { path, .. } => assert_eq!(path, "$.conditions[0]"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_object_value() {
        let err = parse_rule_tree(&json!({"fieldId": "a", "value": {"eq": 1}})).unwrap_err();
        assert!(matches!(err, RuleError::Malformed { .. }));
    }

    #[test]
    fn top_level_shape_check() {
        assert!(is_rule_tree(&json!({"logic": "AND", "conditions": []})));
        assert!(!is_rule_tree(&json!({"conditions": []})));
        assert!(!is_rule_tree(&json!({})));
        assert!(!is_rule_tree(&json!(null)));
    }
}

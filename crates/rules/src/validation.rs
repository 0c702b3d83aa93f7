//! Cross-checks a rule tree against its form's field schema.

use std::collections::BTreeSet;

use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, RuleError};
use crate::normalize::scalar_to_string;
use crate::schema::{normalize_field_id, RuleNode};

/// Every field id referenced by a leaf anywhere in the tree.
pub fn referenced_field_ids(node: &RuleNode) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    node.for_each_condition(&mut |c| {
        ids.insert(c.field_id.clone());
    });
    ids
}

/// Every field id declared in a form schema.
///
/// Schemas nest fields inside pages, sections and groups in varying shapes,
/// so any `fieldId` / `field_id` key at any depth counts as a declaration.
pub fn schema_field_ids(fields: &Value) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    walk_schema(fields, &mut ids);
    ids
}

fn walk_schema(value: &Value, ids: &mut BTreeSet<String>) {
    match value {
        Value::Object(obj) => {
            for (key, child) in obj {
                if key == "fieldId" || key == "field_id" {
                    if let Some(id) = scalar_to_string(child) {
                        ids.insert(normalize_field_id(&id));
                    }
                }
                walk_schema(child, ids);
            }
        }
        Value::Array(items) => items.iter().for_each(|item| walk_schema(item, ids)),
        _ => {}
    }
}

/// Fail when the tree references a field the schema does not declare.
pub fn validate_field_references(form_id: Uuid, node: &RuleNode, fields: &Value) -> Result<()> {
    let declared = schema_field_ids(fields);
    let missing: Vec<String> = referenced_field_ids(node)
        .into_iter()
        .filter(|id| !declared.contains(id))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(RuleError::UndefinedFields {
            form_id,
            field_ids: missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_rule_tree;
    use serde_json::json;

    #[test]
    fn collects_schema_ids_at_any_depth() {
        let fields = json!({
            "pages": [
                {"sections": [{"fields": [{"fieldId": "AAA"}, {"fieldId": "bbb"}]}]},
                {"field_id": "ccc", "children": {"nested": {"fieldId": 12}}}
            ]
        });
        let ids = schema_field_ids(&fields);
        assert_eq!(
            ids.into_iter().collect::<Vec<_>>(),
            vec!["12", "aaa", "bbb", "ccc"]
        );
    }

    #[test]
    fn referenced_ids_include_nested_groups() {
        let tree = parse_rule_tree(&json!({
            "logic": "AND",
            "conditions": [
                {"fieldId": "a", "value": "1"},
                {"logic": "OR", "conditions": [{"fieldId": "b", "value": "2"}]}
            ]
        }))
        .unwrap();
        assert_eq!(
            referenced_field_ids(&tree).into_iter().collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn undefined_field_is_reported() {
        let form_id = Uuid::new_v4();
        let tree = parse_rule_tree(&json!({
            "logic": "AND",
            "conditions": [{"fieldId": "a", "value": "1"}, {"fieldId": "ghost", "value": "2"}]
        }))
        .unwrap();
        let fields = json!([{"fieldId": "A"}]);

        let err = validate_field_references(form_id, &tree, &fields).unwrap_err();
        assert_eq!(
            err,
            RuleError::UndefinedFields {
                form_id,
                field_ids: vec!["ghost".to_string()]
            }
        );
    }

    #[test]
    fn declared_fields_validate() {
        let tree = parse_rule_tree(&json!({"logic": "AND", "conditions": [{"fieldId": "A", "value": "1"}]}))
            .unwrap();
        assert!(validate_field_references(Uuid::new_v4(), &tree, &json!([{"fieldId": "a"}])).is_ok());
    }
}

//! Bulk field value loading with typed-column extraction.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use cohort_core::{FieldType, FieldValueRow, ResolvedFieldValue};
use cohort_rules::normalize::scalar_to_string;
use cohort_rules::{field_values, FieldValues};
use cohort_storage::{CohortStore, StorageError};

/// Loads custom field values for a whole batch of users in one fetch.
#[derive(Clone)]
pub struct FieldValueResolver {
    store: Arc<dyn CohortStore>,
}

impl FieldValueResolver {
    pub fn new(store: Arc<dyn CohortStore>) -> Self {
        Self { store }
    }

    /// Values per user. Every requested user has an entry, empty when they
    /// have stored nothing.
    pub async fn resolve_batch(
        &self,
        user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<ResolvedFieldValue>>, StorageError> {
        let mut by_user: HashMap<Uuid, Vec<ResolvedFieldValue>> =
            user_ids.iter().map(|id| (*id, Vec::new())).collect();

        let rows = self.store.field_values(user_ids).await?;
        let row_count = rows.len();
        for row in rows {
            let Some(value) = typed_value(&row) else {
                continue;
            };
            if let Some(values) = by_user.get_mut(&row.item_id) {
                values.push(ResolvedFieldValue {
                    field_id: row.field_id,
                    label: row.label,
                    value,
                });
            }
        }

        debug!(users = user_ids.len(), rows = row_count, "Resolved field values");
        Ok(by_user)
    }
}

/// Evaluator lookup for one user. Later rows for the same field win.
pub fn lookup(values: &[ResolvedFieldValue]) -> FieldValues {
    field_values(values.iter().map(|v| (v.field_id.to_string(), v.value.clone())))
}

/// Pick the column matching the field's declared type, falling back to the
/// generic `value` column. Blank values count as absent.
pub fn typed_value(row: &FieldValueRow) -> Option<String> {
    let typed = match row.field_type.unwrap_or(FieldType::Unknown) {
        FieldType::Text => row.text_value.clone(),
        FieldType::Textarea => row.textarea_value.clone(),
        FieldType::Numeric => row.number_value.map(format_number),
        FieldType::Calendar => row.calendar_value.map(|d| d.format("%Y-%m-%d").to_string()),
        FieldType::DropDown => row.dropdown_value.as_ref().and_then(json_text),
        FieldType::Radio => row.radio_value.clone(),
        FieldType::Checkbox => row.checkbox_value.as_ref().and_then(json_text),
        FieldType::Unknown => None,
    };

    typed
        .filter(|v| !v.trim().is_empty())
        .or_else(|| row.value.clone().filter(|v| !v.trim().is_empty()))
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Multi-select columns hold JSON arrays; they are joined with commas so the
/// evaluator's comma splitting sees each choice.
fn json_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            (!parts.is_empty()).then(|| parts.join(","))
        }
        other => scalar_to_string(other),
    }
}

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declared type of a custom field. Decides which typed column holds the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Textarea,
    Numeric,
    Calendar,
    DropDown,
    Radio,
    Checkbox,
    Unknown,
}

impl FieldType {
    /// Map a stored type label onto a field type. Unrecognized labels map to
    /// `Unknown`, which reads only the generic value column.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "text" => FieldType::Text,
            "textarea" => FieldType::Textarea,
            "numeric" | "number" => FieldType::Numeric,
            "calendar" | "date" => FieldType::Calendar,
            "drop_down" | "dropdown" => FieldType::DropDown,
            "radio" => FieldType::Radio,
            "checkbox" => FieldType::Checkbox,
            _ => FieldType::Unknown,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FieldType::Text => "text",
            FieldType::Textarea => "textarea",
            FieldType::Numeric => "numeric",
            FieldType::Calendar => "calendar",
            FieldType::DropDown => "drop_down",
            FieldType::Radio => "radio",
            FieldType::Checkbox => "checkbox",
            FieldType::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// One stored field value keyed by (field_id, item_id).
///
/// Only the typed column matching `field_type` is populated; `value` is the
/// generic column that legacy rows use.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldValueRow {
    pub field_id: Uuid,
    pub item_id: Uuid,
    pub field_type: Option<FieldType>,
    pub label: Option<String>,
    pub value: Option<String>,
    pub text_value: Option<String>,
    pub textarea_value: Option<String>,
    pub number_value: Option<f64>,
    pub calendar_value: Option<NaiveDate>,
    pub dropdown_value: Option<serde_json::Value>,
    pub radio_value: Option<String>,
    pub checkbox_value: Option<serde_json::Value>,
}

/// A field value after typed extraction, ready for rule evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedFieldValue {
    pub field_id: Uuid,
    pub label: Option<String>,
    pub value: String,
}

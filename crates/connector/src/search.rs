//! Search index client for member documents.
//!
//! Each user has one document holding an `applications` array with one entry
//! per cohort. Status changes patch a single entry through a painless script
//! so progress and form data stored elsewhere in the document survive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cohort_core::config::SearchConfig;
use cohort_core::MemberStatus;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::ConnectorError;

const SERVICE: &str = "search index";

// Cohort ids are matched case-insensitively here and in `has_application`.
const UPDATE_APPLICATION_SCRIPT: &str = "\
for (def app : ctx._source.applications) { \
  if (app.cohortId != null && app.cohortId.toString().equalsIgnoreCase(params.cohortId)) { \
    app.cohortmemberstatus = params.status; \
    app.statusReason = params.statusReason; \
    app.updatedAt = params.updatedAt; \
  } \
}";

const APPEND_APPLICATION_SCRIPT: &str = "\
if (ctx._source.applications == null) { ctx._source.applications = []; } \
ctx._source.applications.add(params.entry);";

/// Partial update applied to an indexed document.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexUpdate {
    /// Merge these fields into the document.
    Doc(Value),
    /// Run a painless script with the given params.
    Script { source: String, params: Value },
}

impl IndexUpdate {
    /// Patch the status of the existing `applications` entry for `cohort_id`.
    pub fn application_status(
        cohort_id: Uuid,
        status: MemberStatus,
        reason: &str,
        updated_at: DateTime<Utc>,
    ) -> Self {
        IndexUpdate::Script {
            source: UPDATE_APPLICATION_SCRIPT.to_string(),
            params: json!({
                "cohortId": cohort_id,
                "status": status.as_str(),
                "statusReason": reason,
                "updatedAt": updated_at.to_rfc3339(),
            }),
        }
    }

    /// Append a minimal `applications` entry for a cohort the document lacks.
    pub fn append_application(
        cohort_id: Uuid,
        status: MemberStatus,
        reason: &str,
        updated_at: DateTime<Utc>,
    ) -> Self {
        IndexUpdate::Script {
            source: APPEND_APPLICATION_SCRIPT.to_string(),
            params: json!({
                "entry": {
                    "cohortId": cohort_id,
                    "cohortmemberstatus": status.as_str(),
                    "statusReason": reason,
                    "updatedAt": updated_at.to_rfc3339(),
                }
            }),
        }
    }

    fn body(&self) -> Value {
        match self {
            IndexUpdate::Doc(doc) => json!({ "doc": doc }),
            IndexUpdate::Script { source, params } => json!({
                "script": { "source": source, "lang": "painless", "params": params }
            }),
        }
    }
}

/// Whether an indexed member document already has an entry for `cohort_id`.
pub fn has_application(doc: &Value, cohort_id: Uuid) -> bool {
    let wanted = cohort_id.to_string();
    doc.get("applications")
        .and_then(Value::as_array)
        .is_some_and(|apps| {
            apps.iter().any(|app| {
                app.get("cohortId")
                    .and_then(Value::as_str)
                    .is_some_and(|id| same_cohort_id(id, &wanted))
            })
        })
}

fn same_cohort_id(stored: &str, wanted: &str) -> bool {
    stored.eq_ignore_ascii_case(wanted)
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// The document's `_source`, or `None` when the user is not indexed.
    async fn get(&self, user_id: Uuid) -> Result<Option<Value>, ConnectorError>;

    async fn update(&self, user_id: Uuid, update: IndexUpdate) -> Result<(), ConnectorError>;
}

/// OpenSearch REST implementation of [`SearchIndex`].
#[derive(Debug, Clone)]
pub struct OpenSearchIndex {
    base_url: String,
    index: String,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
}

impl OpenSearchIndex {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            base_url: config.base_url(),
            index: config.index.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        let request = self.client.request(method, url);
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }
}

#[async_trait]
impl SearchIndex for OpenSearchIndex {
    async fn get(&self, user_id: Uuid) -> Result<Option<Value>, ConnectorError> {
        let url = format!("{}/{}/_doc/{}", self.base_url, self.index, user_id);
        let response = self.request(reqwest::Method::GET, url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ConnectorError::from_response(SERVICE, response).await);
        }

        let body: Value = response.json().await?;
        Ok(document_source(body))
    }

    async fn update(&self, user_id: Uuid, update: IndexUpdate) -> Result<(), ConnectorError> {
        let url = format!("{}/{}/_update/{}", self.base_url, self.index, user_id);
        let response = self
            .request(reqwest::Method::POST, url)
            .json(&update.body())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ConnectorError::from_response(SERVICE, response).await);
        }
        debug!(%user_id, index = %self.index, "Search document updated");
        Ok(())
    }
}

fn document_source(mut body: Value) -> Option<Value> {
    if body.get("found").and_then(Value::as_bool) == Some(false) {
        return None;
    }
    body.get_mut("_source").map(Value::take)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_body_uses_painless() {
        let update = IndexUpdate::application_status(
            Uuid::nil(),
            MemberStatus::Shortlisted,
            "ok",
            Utc::now(),
        );
        let body = update.body();
        assert_eq!(body["script"]["lang"], "painless");
        assert_eq!(body["script"]["params"]["status"], "shortlisted");
        assert_eq!(body["script"]["params"]["statusReason"], "ok");
    }

    #[test]
    fn append_carries_full_entry() {
        let cohort_id = Uuid::new_v4();
        let update =
            IndexUpdate::append_application(cohort_id, MemberStatus::Rejected, "no", Utc::now());
        let IndexUpdate::Script { params, .. } = update else {
            panic!("expected script update");
        };
        assert_eq!(params["entry"]["cohortId"], cohort_id.to_string());
        assert_eq!(params["entry"]["cohortmemberstatus"], "rejected");
    }

    #[test]
    fn doc_body_wraps_fields() {
        let body = IndexUpdate::Doc(json!({"name": "x"})).body();
        assert_eq!(body, json!({"doc": {"name": "x"}}));
    }

    #[test]
    fn detects_existing_application() {
        let cohort_id = Uuid::new_v4();
        let doc = json!({
            "name": "learner",
            "applications": [{"cohortId": cohort_id.to_string().to_uppercase(), "progress": 40}]
        });
        assert!(has_application(&doc, cohort_id));
        assert!(!has_application(&doc, Uuid::new_v4()));
        assert!(!has_application(&json!({"name": "x"}), cohort_id));
    }

    #[test]
    fn patch_script_matches_what_detection_matched() {
        let cohort_id = Uuid::new_v4();
        let stored = cohort_id.to_string().to_uppercase();
        let doc = json!({"applications": [{"cohortId": stored}]});
        assert!(has_application(&doc, cohort_id));

        let IndexUpdate::Script { source, params } = IndexUpdate::application_status(
            cohort_id,
            MemberStatus::Rejected,
            "no",
            Utc::now(),
        ) else {
            panic!("expected script update");
        };
        assert!(source.contains("app.cohortId.toString().equalsIgnoreCase(params.cohortId)"));
        assert!(!source.contains("app.cohortId == params.cohortId"));
        let param = params["cohortId"].as_str().unwrap();
        assert!(same_cohort_id(&stored, param));
    }

    #[test]
    fn document_source_handles_missing_docs() {
        assert_eq!(document_source(json!({"found": false})), None);
        assert_eq!(
            document_source(json!({"found": true, "_source": {"a": 1}})),
            Some(json!({"a": 1}))
        );
    }
}

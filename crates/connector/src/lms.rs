//! Learning-management service client.
//!
//! Courses are mapped to cohorts on the LMS side; the engine only lists the
//! published ones and enrolls or de-enrolls a learner course by course.

use async_trait::async_trait;
use cohort_core::config::LmsConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::ConnectorError;

const SERVICE: &str = "lms";

/// A published course mapped to a cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    #[serde(rename = "courseId")]
    pub course_id: String,
    #[serde(default)]
    pub name: String,
}

#[async_trait]
pub trait LearningService: Send + Sync {
    async fn published_courses(&self, cohort_id: Uuid) -> Result<Vec<Course>, ConnectorError>;

    async fn enroll(&self, course_id: &str, user_id: Uuid) -> Result<(), ConnectorError>;

    async fn unenroll(&self, course_id: &str, user_id: Uuid) -> Result<(), ConnectorError>;
}

/// reqwest-backed [`LearningService`].
#[derive(Debug, Clone)]
pub struct LmsClient {
    base_url: String,
    tenant_id: Option<String>,
    organisation_id: Option<String>,
    client: reqwest::Client,
}

impl LmsClient {
    pub fn new(config: &LmsConfig) -> Result<Self, ConnectorError> {
        if config.base_url.trim().is_empty() {
            return Err(ConnectorError::Config("LMS_BASE_URL not set".into()));
        }
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tenant_id: config.tenant_id.clone(),
            organisation_id: config.organisation_id.clone(),
            client: reqwest::Client::new(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(tenant) = &self.tenant_id {
            request = request.header("tenantid", tenant.as_str());
        }
        if let Some(org) = &self.organisation_id {
            request = request.header("organisationid", org.as_str());
        }
        request
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ConnectorError> {
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(ConnectorError::from_response(SERVICE, response).await)
        }
    }
}

#[async_trait]
impl LearningService for LmsClient {
    async fn published_courses(&self, cohort_id: Uuid) -> Result<Vec<Course>, ConnectorError> {
        let cohort = cohort_id.to_string();
        let request = self
            .request(reqwest::Method::GET, "/courses/search")
            .query(&[("status", "published"), ("cohortId", cohort.as_str())]);
        let body: Value = self.send(request).await?.json().await?;
        let courses = parse_courses(&body)?;
        debug!(%cohort_id, count = courses.len(), "Fetched published courses");
        Ok(courses)
    }

    async fn enroll(&self, course_id: &str, user_id: Uuid) -> Result<(), ConnectorError> {
        let request = self
            .request(reqwest::Method::POST, "/enrollments")
            .json(&json!({"courseId": course_id, "learnerId": user_id}));
        self.send(request).await?;
        Ok(())
    }

    async fn unenroll(&self, course_id: &str, user_id: Uuid) -> Result<(), ConnectorError> {
        let request = self
            .request(reqwest::Method::DELETE, "/enrollments")
            .json(&json!({"courseId": course_id, "userId": user_id}));
        self.send(request).await?;
        Ok(())
    }
}

/// Accepts both `{"courses": [...]}` and the wrapped `{"result": {"data": [...]}}`.
pub fn parse_courses(body: &Value) -> Result<Vec<Course>, ConnectorError> {
    let list = body
        .get("courses")
        .or_else(|| body.pointer("/result/data"))
        .or_else(|| body.pointer("/result/courses"))
        .ok_or_else(|| ConnectorError::Decode {
            service: SERVICE,
            reason: "no course list in response".into(),
        })?;

    let items = list.as_array().ok_or_else(|| ConnectorError::Decode {
        service: SERVICE,
        reason: "course list is not an array".into(),
    })?;

    items
        .iter()
        .map(|item| {
            let course_id = item
                .get("courseId")
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .ok_or_else(|| ConnectorError::Decode {
                    service: SERVICE,
                    reason: "course without courseId".into(),
                })?;
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(Course { course_id, name })
        })
        .collect()
}

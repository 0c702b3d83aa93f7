//! REST client for the notification service.

use serde_json::{json, Value};

use cohort_core::config::NotificationConfig;

use crate::traits::{
    NotificationReport, NotificationRequest, NotificationService, NotifyError, RecipientError,
};

/// Posts notification requests to `{base}/notification/send`.
#[derive(Debug, Clone)]
pub struct HttpNotificationClient {
    url: String,
    client: reqwest::Client,
}

impl HttpNotificationClient {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotifyError> {
        let base = config.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(NotifyError::Config("NOTIFICATION_BASE_URL not set".into()));
        }
        Ok(Self {
            url: format!("{base}/notification/send"),
            client: reqwest::Client::new(),
        })
    }
}

/// Request body in the service's wire format. `receipients` is the
/// service's own spelling.
fn request_body(request: &NotificationRequest) -> Value {
    json!({
        "isQueue": false,
        "context": request.context,
        "key": request.key,
        "replacements": request.replacements,
        "email": { "receipients": request.recipients },
    })
}

/// Read `result.email.{data, errors}` out of a response body. Missing
/// sections count as empty.
fn parse_report(body: &Value) -> NotificationReport {
    let email = body.pointer("/result/email");
    let delivered = email
        .and_then(|e| e.get("data"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let errors = email
        .and_then(|e| e.get("errors"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    serde_json::from_value::<RecipientError>(item.clone()).unwrap_or_else(|_| {
                        RecipientError {
                            recipient: String::new(),
                            error: item.to_string(),
                        }
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    NotificationReport { delivered, errors }
}

#[async_trait::async_trait]
impl NotificationService for HttpNotificationClient {
    async fn send(&self, request: &NotificationRequest) -> Result<NotificationReport, NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&request_body(request))
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::warn!(url = %self.url, %status, body = %body, "notification service returned non-2xx status");
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        let report = parse_report(&body);
        tracing::debug!(
            key = %request.key,
            delivered = report.delivered,
            errors = report.errors.len(),
            "notification sent"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request() -> NotificationRequest {
        NotificationRequest {
            context: "COHORT".into(),
            key: "COHORT_MEMBER_REJECTED".into(),
            replacements: BTreeMap::from([("{cohortName}".to_string(), "Spring".to_string())]),
            recipients: vec!["a@example.com".into()],
        }
    }

    #[test]
    fn body_matches_wire_format() {
        let body = request_body(&request());
        assert_eq!(body["isQueue"], false);
        assert_eq!(body["key"], "COHORT_MEMBER_REJECTED");
        assert_eq!(body["replacements"]["{cohortName}"], "Spring");
        assert_eq!(body["email"]["receipients"][0], "a@example.com");
    }

    #[test]
    fn report_counts_delivered_and_errors() {
        let report = parse_report(&json!({
            "result": {"email": {
                "data": [{"id": 1}],
                "errors": [{"recipient": "b@example.com", "error": "bounced"}]
            }}
        }));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].recipient, "b@example.com");
        assert!(!report.is_clean());
    }

    #[test]
    fn report_tolerates_missing_sections() {
        let report = parse_report(&json!({"result": {}}));
        assert_eq!(report, NotificationReport::default());
        assert!(report.is_clean());
    }

    #[test]
    fn unstructured_error_is_kept_verbatim() {
        let report = parse_report(&json!({"result": {"email": {"errors": ["smtp down"]}}}));
        assert_eq!(report.errors[0].error, "\"smtp down\"");
    }

    #[test]
    fn client_requires_base_url() {
        let config = NotificationConfig { base_url: " ".into() };
        assert!(matches!(
            HttpNotificationClient::new(&config),
            Err(NotifyError::Config(_))
        ));
    }

    #[test]
    fn client_builds_send_url() {
        let config = NotificationConfig {
            base_url: "http://notify.local/".into(),
        };
        let client = HttpNotificationClient::new(&config).unwrap();
        assert_eq!(client.url, "http://notify.local/notification/send");
    }
}

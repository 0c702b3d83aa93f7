//! Recording fakes for the external services plus a seeded in-memory cohort.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use cohort_connector::{ConnectorError, Course, IndexUpdate, LearningService, SearchIndex};
use cohort_core::config::EngineSettings;
use cohort_core::{
    Cohort, CohortMember, CohortStatus, FieldType, FieldValueRow, FormRecord, MemberStatus,
    UserContact,
};
use cohort_engine::{Engine, Services};
use cohort_notify::{
    NotificationReport, NotificationRequest, NotificationService, NotifyError, RecipientError,
};
use cohort_storage::{CohortStore, MemoryStore, StorageError};

pub const FIELD_A: &str = "6f1d0c2a-9a6b-4c1e-8e0b-0000000000a1";
pub const FIELD_B: &str = "6f1d0c2a-9a6b-4c1e-8e0b-0000000000b2";
pub const SHORTLIST_DATE_FIELD: &str = "0b7c5e1e-1111-4a0a-9d6e-00000000d001";
pub const REJECTION_DATE_FIELD: &str = "0b7c5e1e-1111-4a0a-9d6e-00000000d002";

pub fn uuid(raw: &str) -> Uuid {
    Uuid::parse_str(raw).unwrap()
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// ── LMS ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeLms {
    pub courses: Vec<Course>,
    pub fail_listing: bool,
    /// Latency of every enroll call.
    pub enroll_delay: Option<StdDuration>,
    pub enrolled: Mutex<Vec<(String, Uuid)>>,
    pub unenrolled: Mutex<Vec<(String, Uuid)>>,
}

impl FakeLms {
    pub fn with_courses(ids: &[&str]) -> Self {
        Self {
            courses: ids
                .iter()
                .map(|id| Course {
                    course_id: id.to_string(),
                    name: format!("Course {id}"),
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_listing: true,
            ..Self::default()
        }
    }

    pub fn enrolled_for(&self, user_id: Uuid) -> Vec<String> {
        self.enrolled
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, u)| *u == user_id)
            .map(|(c, _)| c.clone())
            .collect()
    }

    pub fn unenrolled_for(&self, user_id: Uuid) -> Vec<String> {
        self.unenrolled
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, u)| *u == user_id)
            .map(|(c, _)| c.clone())
            .collect()
    }
}

#[async_trait]
impl LearningService for FakeLms {
    async fn published_courses(&self, _cohort_id: Uuid) -> Result<Vec<Course>, ConnectorError> {
        if self.fail_listing {
            return Err(ConnectorError::Status {
                service: "lms",
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(self.courses.clone())
    }

    async fn enroll(&self, course_id: &str, user_id: Uuid) -> Result<(), ConnectorError> {
        if let Some(delay) = self.enroll_delay {
            tokio::time::sleep(delay).await;
        }
        self.enrolled.lock().unwrap().push((course_id.to_string(), user_id));
        Ok(())
    }

    async fn unenroll(&self, course_id: &str, user_id: Uuid) -> Result<(), ConnectorError> {
        self.unenrolled.lock().unwrap().push((course_id.to_string(), user_id));
        Ok(())
    }
}

// ── Search index ────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeIndex {
    pub docs: Mutex<HashMap<Uuid, Value>>,
    pub updates: Mutex<Vec<(Uuid, IndexUpdate)>>,
}

impl FakeIndex {
    pub fn put(&self, user_id: Uuid, doc: Value) {
        self.docs.lock().unwrap().insert(user_id, doc);
    }

    pub fn updates_for(&self, user_id: Uuid) -> Vec<IndexUpdate> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user_id)
            .map(|(_, update)| update.clone())
            .collect()
    }
}

#[async_trait]
impl SearchIndex for FakeIndex {
    async fn get(&self, user_id: Uuid) -> Result<Option<Value>, ConnectorError> {
        Ok(self.docs.lock().unwrap().get(&user_id).cloned())
    }

    async fn update(&self, user_id: Uuid, update: IndexUpdate) -> Result<(), ConnectorError> {
        self.updates.lock().unwrap().push((user_id, update));
        Ok(())
    }
}

// ── Notifications ───────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeNotifier {
    pub sent: Mutex<Vec<NotificationRequest>>,
    /// Recipients the service reports as undeliverable.
    pub bounce: Mutex<HashSet<String>>,
    pub unavailable: bool,
}

impl FakeNotifier {
    pub fn bounce(&self, recipient: &str) {
        self.bounce.lock().unwrap().insert(recipient.to_string());
    }

    pub fn clear_bounces(&self) {
        self.bounce.lock().unwrap().clear();
    }

    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<NotificationRequest> {
        self.sent()
            .into_iter()
            .filter(|r| r.recipients.iter().any(|to| to == recipient))
            .collect()
    }
}

#[async_trait]
impl NotificationService for FakeNotifier {
    async fn send(&self, request: &NotificationRequest) -> Result<NotificationReport, NotifyError> {
        if self.unavailable {
            return Err(NotifyError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(request.clone());

        let bounce = self.bounce.lock().unwrap();
        let mut report = NotificationReport::default();
        for recipient in &request.recipients {
            if bounce.contains(recipient) {
                report.errors.push(RecipientError {
                    recipient: recipient.clone(),
                    error: "mailbox unavailable".to_string(),
                });
            } else {
                report.delivered += 1;
            }
        }
        Ok(report)
    }
}

// ── Store with a concurrent writer ──────────────────────────────────

/// Delegates to a [`MemoryStore`], but the first bulk field-value fetch
/// (which happens after the backlog was loaded) first moves one member on to
/// `shortlisted` and deletes another, as an overlapping run would.
pub struct OverlappingRunStore {
    pub inner: Arc<MemoryStore>,
    pub claim: Uuid,
    pub delete: Uuid,
    interfered: Mutex<bool>,
}

impl OverlappingRunStore {
    pub fn new(inner: Arc<MemoryStore>, claim: Uuid, delete: Uuid) -> Self {
        Self {
            inner,
            claim,
            delete,
            interfered: Mutex::new(false),
        }
    }
}

#[async_trait]
impl CohortStore for OverlappingRunStore {
    async fn eligible_cohorts(
        &self,
        date_field_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<Cohort>, StorageError> {
        self.inner.eligible_cohorts(date_field_id, today).await
    }

    async fn cohort(&self, cohort_id: Uuid) -> Result<Option<Cohort>, StorageError> {
        self.inner.cohort(cohort_id).await
    }

    async fn active_forms(&self, cohort_id: Uuid) -> Result<Vec<FormRecord>, StorageError> {
        self.inner.active_forms(cohort_id).await
    }

    async fn submitted_members(
        &self,
        cohort_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CohortMember>, StorageError> {
        self.inner.submitted_members(cohort_id, limit).await
    }

    async fn unnotified_rejected_members(
        &self,
        cohort_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CohortMember>, StorageError> {
        self.inner.unnotified_rejected_members(cohort_id, limit).await
    }

    async fn field_values(&self, item_ids: &[Uuid]) -> Result<Vec<FieldValueRow>, StorageError> {
        let first = !std::mem::replace(&mut *self.interfered.lock().unwrap(), true);
        if first {
            self.inner
                .update_member_status(self.claim, None, MemberStatus::Shortlisted, "Claimed by another run")
                .await?;
            self.inner.remove_member(self.delete).await;
        }
        self.inner.field_values(item_ids).await
    }

    async fn fetch_member(&self, membership_id: Uuid) -> Result<Option<CohortMember>, StorageError> {
        self.inner.fetch_member(membership_id).await
    }

    async fn update_member_status(
        &self,
        membership_id: Uuid,
        expected: Option<MemberStatus>,
        status: MemberStatus,
        reason: &str,
    ) -> Result<u64, StorageError> {
        self.inner
            .update_member_status(membership_id, expected, status, reason)
            .await
    }

    async fn mark_rejection_email_sent(&self, membership_id: Uuid) -> Result<u64, StorageError> {
        self.inner.mark_rejection_email_sent(membership_id).await
    }

    async fn user_contact(&self, user_id: Uuid) -> Result<Option<UserContact>, StorageError> {
        self.inner.user_contact(user_id).await
    }
}

// ── Fixture ─────────────────────────────────────────────────────────

pub fn settings() -> EngineSettings {
    EngineSettings {
        shortlist_date_field_id: Some(SHORTLIST_DATE_FIELD.to_string()),
        rejection_notification_date_field_id: Some(REJECTION_DATE_FIELD.to_string()),
        ..EngineSettings::default()
    }
}

/// Form requiring `A == "yes"` and `B in {"x", "y"}`.
pub fn application_form() -> FormRecord {
    FormRecord {
        form_id: Uuid::new_v4(),
        title: "Cohort application".to_string(),
        fields: json!({
            "pages": [{
                "fields": [
                    {"fieldId": FIELD_A, "label": "Field A"},
                    {"fieldId": FIELD_B, "label": "Field B"}
                ]
            }]
        }),
        rules: Some(json!({
            "logic": "AND",
            "conditions": [
                {"fieldId": FIELD_A.to_uppercase(), "fieldName": "Field A", "value": "yes"},
                {"logic": "OR", "conditions": [
                    {"fieldId": FIELD_B, "fieldName": "Field B", "value": "x"},
                    {"fieldId": FIELD_B, "fieldName": "Field B", "value": "y"}
                ]}
            ]
        })),
    }
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub lms: Arc<FakeLms>,
    pub index: Arc<FakeIndex>,
    pub notifier: Arc<FakeNotifier>,
    pub settings: EngineSettings,
    pub cohort: Cohort,
    seq: Mutex<i64>,
}

impl Fixture {
    /// Active cohort with both dates set to yesterday and the application form.
    pub async fn new() -> Self {
        Self::with_services(FakeLms::with_courses(&["c-101", "c-102"]), FakeNotifier::default()).await
    }

    pub async fn with_services(lms: FakeLms, notifier: FakeNotifier) -> Self {
        let store = Arc::new(MemoryStore::new());
        let cohort = Cohort {
            cohort_id: Uuid::new_v4(),
            name: "Autumn intake".to_string(),
            status: CohortStatus::Active,
        };
        store.insert_cohort(cohort.clone()).await;
        let yesterday = today() - Duration::days(1);
        store
            .set_cohort_date(cohort.cohort_id, uuid(SHORTLIST_DATE_FIELD), yesterday)
            .await;
        store
            .set_cohort_date(cohort.cohort_id, uuid(REJECTION_DATE_FIELD), yesterday)
            .await;

        Self {
            store,
            lms: Arc::new(lms),
            index: Arc::new(FakeIndex::default()),
            notifier: Arc::new(notifier),
            settings: settings(),
            cohort,
            seq: Mutex::new(0),
        }
    }

    pub async fn with_form(self) -> Self {
        self.store
            .insert_form(self.cohort.cohort_id, application_form())
            .await;
        self
    }

    pub fn engine(&self) -> Engine {
        self.engine_with(self.settings.clone())
    }

    pub fn engine_with(&self, settings: EngineSettings) -> Engine {
        self.engine_on(self.store.clone(), settings)
    }

    /// Engine over `store` instead of the fixture's own store.
    pub fn engine_on(&self, store: Arc<dyn CohortStore>, settings: EngineSettings) -> Engine {
        let services = Services {
            store,
            lms: self.lms.clone(),
            index: Some(self.index.clone()),
            notifier: self.notifier.clone(),
        };
        Engine::new(services, settings).unwrap()
    }

    /// Insert a member with the given answers and contact email. Members are
    /// created one minute apart in call order.
    pub async fn add_member(
        &self,
        status: MemberStatus,
        answers: &[(&str, &str)],
        email: Option<&str>,
    ) -> CohortMember {
        let age = {
            let mut seq = self.seq.lock().unwrap();
            *seq += 1;
            10_000 - *seq
        };
        let created_at = Utc::now() - Duration::minutes(age);
        let member = CohortMember {
            membership_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            cohort_id: self.cohort.cohort_id,
            cohort_academic_year_id: Uuid::new_v4(),
            status,
            status_reason: None,
            rejection_email_sent: false,
            created_at,
            updated_at: created_at,
        };
        self.store.insert_member(member.clone()).await;
        self.store
            .insert_user(UserContact {
                user_id: member.user_id,
                name: "Ada".to_string(),
                email: email.map(str::to_string),
            })
            .await;
        for (field_id, value) in answers {
            self.store
                .insert_field_value(FieldValueRow {
                    field_id: uuid(field_id),
                    item_id: member.user_id,
                    field_type: Some(FieldType::Text),
                    text_value: Some(value.to_string()),
                    ..FieldValueRow::default()
                })
                .await;
        }
        member
    }

    pub async fn reload(&self, member: &CohortMember) -> CohortMember {
        self.store.member(member.membership_id).await.unwrap()
    }
}

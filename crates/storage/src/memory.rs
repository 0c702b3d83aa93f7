//! In-process [`CohortStore`] for local runs and tests.
//!
//! Mirrors the PostgreSQL semantics that matter to the engine: backlog
//! ordering, the status compare-and-set, and the one-way email flag.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use cohort_core::{Cohort, CohortMember, FieldValueRow, FormRecord, MemberStatus, UserContact};

use crate::error::StorageError;
use crate::store::CohortStore;

#[derive(Default)]
struct Tables {
    cohorts: HashMap<Uuid, Cohort>,
    forms: HashMap<Uuid, Vec<FormRecord>>,
    field_values: Vec<FieldValueRow>,
    members: HashMap<Uuid, CohortMember>,
    users: HashMap<Uuid, UserContact>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_cohort(&self, cohort: Cohort) {
        self.tables.write().await.cohorts.insert(cohort.cohort_id, cohort);
    }

    /// Attach an active form to a cohort.
    pub async fn insert_form(&self, cohort_id: Uuid, form: FormRecord) {
        self.tables
            .write()
            .await
            .forms
            .entry(cohort_id)
            .or_default()
            .push(form);
    }

    pub async fn insert_field_value(&self, row: FieldValueRow) {
        self.tables.write().await.field_values.push(row);
    }

    /// Store a date-typed custom field value on a cohort.
    pub async fn set_cohort_date(&self, cohort_id: Uuid, field_id: Uuid, date: NaiveDate) {
        self.insert_field_value(FieldValueRow {
            field_id,
            item_id: cohort_id,
            field_type: Some(cohort_core::FieldType::Calendar),
            calendar_value: Some(date),
            ..FieldValueRow::default()
        })
        .await;
    }

    pub async fn insert_member(&self, member: CohortMember) {
        self.tables
            .write()
            .await
            .members
            .insert(member.membership_id, member);
    }

    pub async fn remove_member(&self, membership_id: Uuid) -> Option<CohortMember> {
        self.tables.write().await.members.remove(&membership_id)
    }

    pub async fn insert_user(&self, user: UserContact) {
        self.tables.write().await.users.insert(user.user_id, user);
    }

    pub async fn member(&self, membership_id: Uuid) -> Option<CohortMember> {
        self.tables.read().await.members.get(&membership_id).cloned()
    }

    async fn members_where(
        &self,
        cohort_id: Uuid,
        limit: usize,
        keep: impl Fn(&CohortMember) -> bool,
    ) -> Vec<CohortMember> {
        let tables = self.tables.read().await;
        let mut members: Vec<CohortMember> = tables
            .members
            .values()
            .filter(|m| m.cohort_id == cohort_id && keep(m))
            .cloned()
            .collect();
        members.sort_by_key(|m| (m.created_at, m.membership_id));
        members.truncate(limit);
        members
    }
}

fn stored_date(row: &FieldValueRow) -> Option<NaiveDate> {
    row.calendar_value.or_else(|| {
        row.value
            .as_deref()
            .and_then(|v| v.get(..10))
            .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
    })
}

#[async_trait]
impl CohortStore for MemoryStore {
    async fn eligible_cohorts(
        &self,
        date_field_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<Cohort>, StorageError> {
        let tables = self.tables.read().await;
        let mut cohorts: Vec<Cohort> = tables
            .cohorts
            .values()
            .filter(|c| c.is_active())
            .filter(|c| {
                tables.field_values.iter().any(|row| {
                    row.item_id == c.cohort_id
                        && row.field_id == date_field_id
                        && stored_date(row).is_some_and(|d| d <= today)
                })
            })
            .cloned()
            .collect();
        cohorts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(cohorts)
    }

    async fn cohort(&self, cohort_id: Uuid) -> Result<Option<Cohort>, StorageError> {
        Ok(self.tables.read().await.cohorts.get(&cohort_id).cloned())
    }

    async fn active_forms(&self, cohort_id: Uuid) -> Result<Vec<FormRecord>, StorageError> {
        Ok(self
            .tables
            .read()
            .await
            .forms
            .get(&cohort_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn submitted_members(
        &self,
        cohort_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CohortMember>, StorageError> {
        Ok(self
            .members_where(cohort_id, limit, |m| m.status == MemberStatus::Submitted)
            .await)
    }

    async fn unnotified_rejected_members(
        &self,
        cohort_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CohortMember>, StorageError> {
        Ok(self
            .members_where(cohort_id, limit, |m| {
                m.status == MemberStatus::Rejected && !m.rejection_email_sent
            })
            .await)
    }

    async fn field_values(&self, item_ids: &[Uuid]) -> Result<Vec<FieldValueRow>, StorageError> {
        let tables = self.tables.read().await;
        Ok(tables
            .field_values
            .iter()
            .filter(|row| item_ids.contains(&row.item_id))
            .cloned()
            .collect())
    }

    async fn fetch_member(&self, membership_id: Uuid) -> Result<Option<CohortMember>, StorageError> {
        Ok(self.member(membership_id).await)
    }

    async fn update_member_status(
        &self,
        membership_id: Uuid,
        expected: Option<MemberStatus>,
        status: MemberStatus,
        reason: &str,
    ) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        match tables.members.get_mut(&membership_id) {
            Some(member) if expected.map_or(true, |e| e == member.status) => {
                member.status = status;
                member.status_reason = Some(reason.to_string());
                member.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn mark_rejection_email_sent(&self, membership_id: Uuid) -> Result<u64, StorageError> {
        let mut tables = self.tables.write().await;
        match tables.members.get_mut(&membership_id) {
            Some(member) if !member.rejection_email_sent => {
                member.rejection_email_sent = true;
                member.updated_at = Utc::now();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn user_contact(&self, user_id: Uuid) -> Result<Option<UserContact>, StorageError> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }
}

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use cohort_core::{Cohort, CohortMember, FieldValueRow, FormRecord, MemberStatus, UserContact};

use crate::error::StorageError;

/// Read/write access to the relational store used by the engine.
#[async_trait]
pub trait CohortStore: Send + Sync {
    /// Active cohorts whose date-typed custom field `date_field_id` holds a
    /// date on or before `today`.
    async fn eligible_cohorts(
        &self,
        date_field_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<Cohort>, StorageError>;

    async fn cohort(&self, cohort_id: Uuid) -> Result<Option<Cohort>, StorageError>;

    /// Active forms attached to the cohort's membership context.
    async fn active_forms(&self, cohort_id: Uuid) -> Result<Vec<FormRecord>, StorageError>;

    /// `submitted` members, oldest first, at most `limit`.
    async fn submitted_members(
        &self,
        cohort_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CohortMember>, StorageError>;

    /// `rejected` members whose rejection email has not been sent, oldest first.
    async fn unnotified_rejected_members(
        &self,
        cohort_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CohortMember>, StorageError>;

    /// Every stored field value owned by any of `item_ids`, in one fetch.
    async fn field_values(&self, item_ids: &[Uuid]) -> Result<Vec<FieldValueRow>, StorageError>;

    async fn fetch_member(&self, membership_id: Uuid) -> Result<Option<CohortMember>, StorageError>;

    /// Write status and reason. With `expected` set, the row is only updated
    /// while its current status equals it. Returns rows affected.
    async fn update_member_status(
        &self,
        membership_id: Uuid,
        expected: Option<MemberStatus>,
        status: MemberStatus,
        reason: &str,
    ) -> Result<u64, StorageError>;

    /// Flip the rejection-email flag from `false` to `true`. Returns rows affected.
    async fn mark_rejection_email_sent(&self, membership_id: Uuid) -> Result<u64, StorageError>;

    async fn user_contact(&self, user_id: Uuid) -> Result<Option<UserContact>, StorageError>;
}

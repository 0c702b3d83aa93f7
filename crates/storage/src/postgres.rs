//! PostgreSQL implementation of [`CohortStore`].
//!
//! Queries are runtime-checked (`query_as` + `FromRow`) and decode statuses
//! from text so enum drift in the database surfaces as a [`StorageError::Decode`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use cohort_core::config::PostgresConfig;
use cohort_core::{
    Cohort, CohortMember, FieldType, FieldValueRow, FormRecord, MemberStatus, UserContact,
    COHORT_MEMBER_CONTEXT,
};

use crate::error::StorageError;
use crate::store::CohortStore;

// ── Row types ────────────────────────────────────────────────────────

#[derive(Debug, sqlx::FromRow)]
struct CohortRow {
    cohort_id: Uuid,
    name: String,
    status: String,
}

impl TryFrom<CohortRow> for Cohort {
    type Error = StorageError;

    fn try_from(row: CohortRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e: cohort_core::DomainError| StorageError::Decode {
            what: "cohort status",
            id: row.cohort_id,
            reason: e.to_string(),
        })?;
        Ok(Cohort {
            cohort_id: row.cohort_id,
            name: row.name,
            status,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    cohort_membership_id: Uuid,
    user_id: Uuid,
    cohort_id: Uuid,
    cohort_academic_year_id: Uuid,
    status: String,
    status_reason: Option<String>,
    rejection_email_sent: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MemberRow> for CohortMember {
    type Error = StorageError;

    fn try_from(row: MemberRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|e: cohort_core::DomainError| StorageError::Decode {
            what: "member status",
            id: row.cohort_membership_id,
            reason: e.to_string(),
        })?;
        Ok(CohortMember {
            membership_id: row.cohort_membership_id,
            user_id: row.user_id,
            cohort_id: row.cohort_id,
            cohort_academic_year_id: row.cohort_academic_year_id,
            status,
            status_reason: row.status_reason,
            rejection_email_sent: row.rejection_email_sent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FieldValueDbRow {
    field_id: Uuid,
    item_id: Uuid,
    field_type: Option<String>,
    label: Option<String>,
    value: Option<String>,
    text_value: Option<String>,
    textarea_value: Option<String>,
    number_value: Option<f64>,
    calendar_value: Option<NaiveDate>,
    dropdown_value: Option<serde_json::Value>,
    radio_value: Option<String>,
    checkbox_value: Option<serde_json::Value>,
}

impl From<FieldValueDbRow> for FieldValueRow {
    fn from(row: FieldValueDbRow) -> Self {
        FieldValueRow {
            field_id: row.field_id,
            item_id: row.item_id,
            field_type: row.field_type.as_deref().map(FieldType::from_label),
            label: row.label,
            value: row.value,
            text_value: row.text_value,
            textarea_value: row.textarea_value,
            number_value: row.number_value,
            calendar_value: row.calendar_value,
            dropdown_value: row.dropdown_value,
            radio_value: row.radio_value,
            checkbox_value: row.checkbox_value,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FormRow {
    form_id: Uuid,
    title: String,
    fields: Option<serde_json::Value>,
    rules: Option<serde_json::Value>,
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    name: String,
    email: Option<String>,
}

/// `cohort_members.status` may be TEXT or a PostgreSQL enum. A bound TEXT
/// parameter has no assignment cast to an enum, so the new status is written
/// as an untyped literal, which coerces to either. Only [`MemberStatus::as_str`]
/// values reach the statement.
fn status_update_sql(status: MemberStatus) -> String {
    format!(
        "UPDATE cohort_members
         SET status = '{}', status_reason = $2, updated_at = NOW()
         WHERE cohort_membership_id = $1
           AND ($3::text IS NULL OR status::text = $3)",
        status.as_str()
    )
}

const MEMBER_COLUMNS: &str = "cohort_membership_id, user_id, cohort_id, cohort_academic_year_id,
     status::text AS status, status_reason, rejection_email_sent, created_at, updated_at";

// ── Store ────────────────────────────────────────────────────────────

/// [`CohortStore`] over a shared PostgreSQL pool.
#[derive(Clone)]
pub struct PgCohortStore {
    pool: PgPool,
}

impl PgCohortStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StorageError> {
        if !config.is_configured() {
            return Err(StorageError::NotConfigured("PG_USERNAME not set".into()));
        }
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;
        info!(host = %config.host, database = %config.database, "PostgreSQL connected");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn members_with_status(
        &self,
        cohort_id: Uuid,
        status: MemberStatus,
        only_unnotified: bool,
        limit: usize,
    ) -> Result<Vec<CohortMember>, StorageError> {
        let sql = format!(
            "SELECT {MEMBER_COLUMNS}
             FROM cohort_members
             WHERE cohort_id = $1
               AND status::text = $2
               AND ($3 = FALSE OR rejection_email_sent = FALSE)
             ORDER BY created_at ASC
             LIMIT $4"
        );
        let rows = sqlx::query_as::<_, MemberRow>(&sql)
            .bind(cohort_id)
            .bind(status.as_str())
            .bind(only_unnotified)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CohortMember::try_from).collect()
    }
}

#[async_trait]
impl CohortStore for PgCohortStore {
    async fn eligible_cohorts(
        &self,
        date_field_id: Uuid,
        today: NaiveDate,
    ) -> Result<Vec<Cohort>, StorageError> {
        // Legacy rows keep the date only in the generic `value` column.
        let rows = sqlx::query_as::<_, CohortRow>(
            "SELECT DISTINCT c.cohort_id, c.name, c.status::text AS status
             FROM cohorts c
             JOIN field_values fv ON fv.item_id = c.cohort_id AND fv.field_id = $1
             WHERE c.status::text = 'active'
               AND COALESCE(
                     fv.calendar_value,
                     CASE WHEN fv.value ~ '^\\d{4}-\\d{2}-\\d{2}'
                          THEN substring(fv.value FROM 1 FOR 10)::date END
                   ) <= $2
             ORDER BY c.name",
        )
        .bind(date_field_id)
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Cohort::try_from).collect()
    }

    async fn cohort(&self, cohort_id: Uuid) -> Result<Option<Cohort>, StorageError> {
        let row = sqlx::query_as::<_, CohortRow>(
            "SELECT cohort_id, name, status::text AS status FROM cohorts WHERE cohort_id = $1",
        )
        .bind(cohort_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Cohort::try_from).transpose()
    }

    async fn active_forms(&self, cohort_id: Uuid) -> Result<Vec<FormRecord>, StorageError> {
        let rows = sqlx::query_as::<_, FormRow>(
            "SELECT form_id, title, fields, rules
             FROM forms
             WHERE context_id = $1 AND context_type = $2 AND status = 'active'
             ORDER BY form_id",
        )
        .bind(cohort_id)
        .bind(COHORT_MEMBER_CONTEXT)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| FormRecord {
                form_id: row.form_id,
                title: row.title,
                fields: row.fields.unwrap_or(serde_json::Value::Null),
                rules: row.rules.filter(|r| !r.is_null()),
            })
            .collect())
    }

    async fn submitted_members(
        &self,
        cohort_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CohortMember>, StorageError> {
        self.members_with_status(cohort_id, MemberStatus::Submitted, false, limit)
            .await
    }

    async fn unnotified_rejected_members(
        &self,
        cohort_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CohortMember>, StorageError> {
        self.members_with_status(cohort_id, MemberStatus::Rejected, true, limit)
            .await
    }

    async fn field_values(&self, item_ids: &[Uuid]) -> Result<Vec<FieldValueRow>, StorageError> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, FieldValueDbRow>(
            "SELECT fv.field_id, fv.item_id, f.type AS field_type, f.label,
                    fv.value, fv.text_value, fv.textarea_value,
                    fv.number_value::float8 AS number_value, fv.calendar_value,
                    fv.dropdown_value, fv.radio_value, fv.checkbox_value
             FROM field_values fv
             LEFT JOIN fields f ON f.field_id = fv.field_id
             WHERE fv.item_id = ANY($1)
             ORDER BY fv.item_id, fv.created_at ASC",
        )
        .bind(item_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(FieldValueRow::from).collect())
    }

    async fn fetch_member(&self, membership_id: Uuid) -> Result<Option<CohortMember>, StorageError> {
        let sql = format!("SELECT {MEMBER_COLUMNS} FROM cohort_members WHERE cohort_membership_id = $1");
        let row = sqlx::query_as::<_, MemberRow>(&sql)
            .bind(membership_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(CohortMember::try_from).transpose()
    }

    async fn update_member_status(
        &self,
        membership_id: Uuid,
        expected: Option<MemberStatus>,
        status: MemberStatus,
        reason: &str,
    ) -> Result<u64, StorageError> {
        let sql = status_update_sql(status);
        let result = sqlx::query(&sql)
            .bind(membership_id)
            .bind(reason)
            .bind(expected.map(|s| s.as_str()))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn mark_rejection_email_sent(&self, membership_id: Uuid) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "UPDATE cohort_members
             SET rejection_email_sent = TRUE, updated_at = NOW()
             WHERE cohort_membership_id = $1 AND rejection_email_sent = FALSE",
        )
        .bind(membership_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn user_contact(&self, user_id: Uuid) -> Result<Option<UserContact>, StorageError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT user_id, name, email FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| UserContact {
            user_id: r.user_id,
            name: r.name,
            email: r.email.filter(|e| !e.trim().is_empty()),
        }))
    }
}

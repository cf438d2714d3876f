use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

use optiquote_core::domain::quote::{Quote, QuoteId, QuoteStatus};
use optiquote_core::flows::AppliedTransition;

use super::{
    transitioned, warning_marked, QuoteRepository, RepositoryError, StatusHistoryEntry,
};
use crate::DbPool;

const QUOTE_COLUMNS: &str = "
    id,
    version,
    status,
    previous_status,
    status_changed_at,
    status_changed_by,
    status_reason,
    patient_json,
    exam_services_json,
    eyeglasses_json,
    contacts_json,
    building_completed,
    presentation_completed,
    exam_signature_completed,
    materials_signature_completed,
    fulfillment_completed,
    building_completed_at,
    draft_created_at,
    presented_at,
    signed_at,
    completed_at,
    cancelled_at,
    expired_at,
    auto_expire_after_days,
    last_activity_at,
    expire_notification_sent,
    expire_notification_sent_at,
    total,
    is_patient_owned_frame,
    pof_inspection_completed,
    pof_waiver_signed,
    created_at,
    updated_at";

pub struct SqlQuoteRepository {
    pool: DbPool,
}

impl SqlQuoteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn delete(&self, id: &QuoteId) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM quote WHERE id = ?").bind(&id.0).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl QuoteRepository for SqlQuoteRepository {
    async fn find_by_id(&self, id: &QuoteId) -> Result<Option<Quote>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {QUOTE_COLUMNS} FROM quote WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(quote_from_row).transpose()
    }

    async fn insert(&self, quote: &Quote) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO quote ({QUOTE_COLUMNS})
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                     ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&quote.id.0)
        .bind(i64::from(quote.version))
        .bind(quote.status.as_str())
        .bind(quote.previous_status.as_ref().map(QuoteStatus::as_str))
        .bind(quote.status_changed_at.map(|value| value.to_rfc3339()))
        .bind(quote.status_changed_by.as_deref())
        .bind(quote.status_reason.as_deref())
        .bind(encode_json("patient_json", &quote.patient)?)
        .bind(encode_json("exam_services_json", &quote.exam_services)?)
        .bind(encode_json("eyeglasses_json", &quote.eyeglasses)?)
        .bind(encode_json("contacts_json", &quote.contacts)?)
        .bind(quote.building_completed)
        .bind(quote.presentation_completed)
        .bind(quote.exam_signature_completed)
        .bind(quote.materials_signature_completed)
        .bind(quote.fulfillment_completed)
        .bind(quote.building_completed_at.map(|value| value.to_rfc3339()))
        .bind(quote.draft_created_at.map(|value| value.to_rfc3339()))
        .bind(quote.presented_at.map(|value| value.to_rfc3339()))
        .bind(quote.signed_at.map(|value| value.to_rfc3339()))
        .bind(quote.completed_at.map(|value| value.to_rfc3339()))
        .bind(quote.cancelled_at.map(|value| value.to_rfc3339()))
        .bind(quote.expired_at.map(|value| value.to_rfc3339()))
        .bind(i64::from(quote.auto_expire_after_days))
        .bind(quote.last_activity_at.to_rfc3339())
        .bind(quote.expire_notification_sent)
        .bind(quote.expire_notification_sent_at.map(|value| value.to_rfc3339()))
        .bind(quote.total.to_string())
        .bind(quote.is_patient_owned_frame)
        .bind(quote.pof_inspection_completed)
        .bind(quote.pof_waiver_signed)
        .bind(quote.created_at.to_rfc3339())
        .bind(quote.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if error.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                RepositoryError::AlreadyExists(quote.id.0.clone())
            } else {
                RepositoryError::Database(error)
            }
        })?;

        Ok(())
    }

    async fn apply_transition(
        &self,
        snapshot: &Quote,
        applied: &AppliedTransition,
    ) -> Result<Quote, RepositoryError> {
        let next = transitioned(snapshot, applied);
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE quote SET
                version = ?,
                status = ?,
                previous_status = ?,
                status_changed_at = ?,
                status_changed_by = ?,
                status_reason = ?,
                building_completed_at = ?,
                draft_created_at = ?,
                presented_at = ?,
                signed_at = ?,
                completed_at = ?,
                cancelled_at = ?,
                expired_at = ?,
                last_activity_at = ?,
                expire_notification_sent = ?,
                expire_notification_sent_at = ?,
                updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(i64::from(next.version))
        .bind(next.status.as_str())
        .bind(next.previous_status.as_ref().map(QuoteStatus::as_str))
        .bind(next.status_changed_at.map(|value| value.to_rfc3339()))
        .bind(next.status_changed_by.as_deref())
        .bind(next.status_reason.as_deref())
        .bind(next.building_completed_at.map(|value| value.to_rfc3339()))
        .bind(next.draft_created_at.map(|value| value.to_rfc3339()))
        .bind(next.presented_at.map(|value| value.to_rfc3339()))
        .bind(next.signed_at.map(|value| value.to_rfc3339()))
        .bind(next.completed_at.map(|value| value.to_rfc3339()))
        .bind(next.cancelled_at.map(|value| value.to_rfc3339()))
        .bind(next.expired_at.map(|value| value.to_rfc3339()))
        .bind(next.last_activity_at.to_rfc3339())
        .bind(next.expire_notification_sent)
        .bind(next.expire_notification_sent_at.map(|value| value.to_rfc3339()))
        .bind(next.updated_at.to_rfc3339())
        .bind(&snapshot.id.0)
        .bind(i64::from(snapshot.version))
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: i64 = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM quote WHERE id = ?)")
                .bind(&snapshot.id.0)
                .fetch_one(&mut *tx)
                .await?;
            tx.rollback().await?;
            return Err(if exists == 1 {
                RepositoryError::VersionConflict {
                    quote_id: snapshot.id.0.clone(),
                    expected_version: snapshot.version,
                }
            } else {
                RepositoryError::NotFound(snapshot.id.0.clone())
            });
        }

        let entry = StatusHistoryEntry::from_applied(&snapshot.id, applied, next.version);
        sqlx::query(
            "INSERT INTO quote_status_history (
                quote_id,
                from_status,
                to_status,
                changed_by,
                reason,
                quote_version,
                changed_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.quote_id.0)
        .bind(entry.from_status.as_str())
        .bind(entry.to_status.as_str())
        .bind(&entry.changed_by)
        .bind(entry.reason.as_deref())
        .bind(i64::from(entry.quote_version))
        .bind(entry.changed_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(next)
    }

    async fn mark_expiration_warning_sent(
        &self,
        snapshot: &Quote,
        sent_at: DateTime<Utc>,
    ) -> Result<Quote, RepositoryError> {
        let next = warning_marked(snapshot, sent_at);

        let result = sqlx::query(
            "UPDATE quote SET
                version = ?,
                expire_notification_sent = 1,
                expire_notification_sent_at = ?,
                updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(i64::from(next.version))
        .bind(sent_at.to_rfc3339())
        .bind(next.updated_at.to_rfc3339())
        .bind(&snapshot.id.0)
        .bind(i64::from(snapshot.version))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::VersionConflict {
                quote_id: snapshot.id.0.clone(),
                expected_version: snapshot.version,
            });
        }

        Ok(next)
    }

    async fn list_by_statuses(
        &self,
        statuses: &[QuoteStatus],
    ) -> Result<Vec<Quote>, RepositoryError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT {QUOTE_COLUMNS} FROM quote
             WHERE status IN ({placeholders})
             ORDER BY last_activity_at ASC, id ASC"
        );
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(quote_from_row).collect()
    }

    async fn status_history(
        &self,
        id: &QuoteId,
    ) -> Result<Vec<StatusHistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                quote_id,
                from_status,
                to_status,
                changed_by,
                reason,
                quote_version,
                changed_at
             FROM quote_status_history
             WHERE quote_id = ?
             ORDER BY changed_at ASC, id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(history_from_row).collect()
    }
}

fn quote_from_row(row: SqliteRow) -> Result<Quote, RepositoryError> {
    let previous_status = row
        .try_get::<Option<String>, _>("previous_status")?
        .map(|value| parse_status("previous_status", &value))
        .transpose()?;

    Ok(Quote {
        id: QuoteId(row.try_get("id")?),
        version: parse_u32("version", row.try_get("version")?)?,
        status: parse_status("status", &row.try_get::<String, _>("status")?)?,
        previous_status,
        status_changed_at: parse_optional_timestamp(
            "status_changed_at",
            row.try_get("status_changed_at")?,
        )?,
        status_changed_by: row.try_get("status_changed_by")?,
        status_reason: row.try_get("status_reason")?,
        patient: decode_json("patient_json", row.try_get("patient_json")?)?,
        exam_services: decode_json("exam_services_json", row.try_get("exam_services_json")?)?,
        eyeglasses: decode_json("eyeglasses_json", row.try_get("eyeglasses_json")?)?,
        contacts: decode_json("contacts_json", row.try_get("contacts_json")?)?,
        building_completed: row.try_get("building_completed")?,
        presentation_completed: row.try_get("presentation_completed")?,
        exam_signature_completed: row.try_get("exam_signature_completed")?,
        materials_signature_completed: row.try_get("materials_signature_completed")?,
        fulfillment_completed: row.try_get("fulfillment_completed")?,
        building_completed_at: parse_optional_timestamp(
            "building_completed_at",
            row.try_get("building_completed_at")?,
        )?,
        draft_created_at: parse_optional_timestamp(
            "draft_created_at",
            row.try_get("draft_created_at")?,
        )?,
        presented_at: parse_optional_timestamp("presented_at", row.try_get("presented_at")?)?,
        signed_at: parse_optional_timestamp("signed_at", row.try_get("signed_at")?)?,
        completed_at: parse_optional_timestamp("completed_at", row.try_get("completed_at")?)?,
        cancelled_at: parse_optional_timestamp("cancelled_at", row.try_get("cancelled_at")?)?,
        expired_at: parse_optional_timestamp("expired_at", row.try_get("expired_at")?)?,
        auto_expire_after_days: parse_u32(
            "auto_expire_after_days",
            row.try_get("auto_expire_after_days")?,
        )?,
        last_activity_at: parse_timestamp("last_activity_at", row.try_get("last_activity_at")?)?,
        expire_notification_sent: row.try_get("expire_notification_sent")?,
        expire_notification_sent_at: parse_optional_timestamp(
            "expire_notification_sent_at",
            row.try_get("expire_notification_sent_at")?,
        )?,
        total: parse_decimal("total", row.try_get("total")?)?,
        is_patient_owned_frame: row.try_get("is_patient_owned_frame")?,
        pof_inspection_completed: row.try_get("pof_inspection_completed")?,
        pof_waiver_signed: row.try_get("pof_waiver_signed")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn history_from_row(row: SqliteRow) -> Result<StatusHistoryEntry, RepositoryError> {
    Ok(StatusHistoryEntry {
        quote_id: QuoteId(row.try_get("quote_id")?),
        from_status: parse_status("from_status", &row.try_get::<String, _>("from_status")?)?,
        to_status: parse_status("to_status", &row.try_get::<String, _>("to_status")?)?,
        changed_by: row.try_get("changed_by")?,
        reason: row.try_get("reason")?,
        quote_version: parse_u32("quote_version", row.try_get("quote_version")?)?,
        changed_at: parse_timestamp("changed_at", row.try_get("changed_at")?)?,
    })
}

fn parse_status(column: &str, value: &str) -> Result<QuoteStatus, RepositoryError> {
    QuoteStatus::parse(value).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown quote status in `{column}`: `{value}`"))
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

fn decode_json<T: DeserializeOwned>(column: &str, value: String) -> Result<T, RepositoryError> {
    serde_json::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid json in `{column}`: {error}"))
    })
}

fn encode_json<T: Serialize>(column: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Encode(format!("could not encode `{column}`: {error}")))
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use optiquote_core::domain::actor::{ActingUser, UserRole};
    use optiquote_core::domain::quote::{LineItem, PatientInfo, Quote, QuoteId, QuoteStatus};
    use optiquote_core::flows::{ApprovalPolicy, QuoteStateMachine};
    use optiquote_core::FixedClock;

    use super::SqlQuoteRepository;
    use crate::migrations;
    use crate::repositories::{QuoteRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool =
            connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    fn sample_quote(id: &str) -> Quote {
        let mut quote = Quote::new(QuoteId(id.to_string()), parse_ts("2026-03-02T15:00:00Z"), 30);
        quote.patient = PatientInfo {
            first_name: Some("Dorothy".to_string()),
            last_name: Some("Vaughan".to_string()),
            email: Some("dorothy@example.com".to_string()),
            phone: Some("555-0142".to_string()),
        };
        quote.eyeglasses.push(LineItem {
            sku: "FRM-TITAN-52".to_string(),
            description: "Titanium frame 52mm".to_string(),
            quantity: 1,
            unit_price: Decimal::new(24_900, 2),
        });
        quote.total = Decimal::new(24_900, 2);
        quote
    }

    fn machine() -> QuoteStateMachine<FixedClock> {
        QuoteStateMachine::new(
            ApprovalPolicy::default(),
            FixedClock::new(parse_ts("2026-03-03T09:30:00Z")),
        )
    }

    fn associate() -> ActingUser {
        ActingUser::new("user-associate-3", UserRole::SalesAssociate)
    }

    #[tokio::test]
    async fn insert_and_find_round_trip() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let quote = sample_quote("Q-SQL-001");

        repo.insert(&quote).await.expect("insert");
        let found = repo.find_by_id(&quote.id).await.expect("find");
        assert_eq!(found, Some(quote));

        let missing = repo.find_by_id(&QuoteId("Q-NOPE".to_string())).await.expect("find");
        assert!(missing.is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn duplicate_insert_is_already_exists_not_a_database_error() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let quote = sample_quote("Q-SQL-DUP");
        repo.insert(&quote).await.expect("insert");

        let error = repo.insert(&sample_quote("Q-SQL-DUP")).await.expect_err("duplicate id");
        assert!(matches!(error, RepositoryError::AlreadyExists(ref id) if id == "Q-SQL-DUP"));
        assert!(!error.is_transient());

        pool.close().await;
    }

    #[tokio::test]
    async fn applied_transition_bumps_version_and_writes_history() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let quote = sample_quote("Q-SQL-002");
        repo.insert(&quote).await.expect("insert");

        let applied = machine()
            .request_transition(
                &quote,
                QuoteStatus::Draft,
                &associate(),
                Some("frames picked".to_string()),
            )
            .applied()
            .cloned()
            .expect("building -> draft applies");

        let saved = repo.apply_transition(&quote, &applied).await.expect("apply");
        assert_eq!(saved.version, 2);
        assert_eq!(saved.status, QuoteStatus::Draft);

        let stored = repo.find_by_id(&quote.id).await.expect("find").expect("stored quote");
        assert_eq!(stored, saved);
        assert_eq!(stored.previous_status, Some(QuoteStatus::Building));
        assert_eq!(stored.draft_created_at, Some(parse_ts("2026-03-03T09:30:00Z")));

        let history = repo.status_history(&quote.id).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, QuoteStatus::Building);
        assert_eq!(history[0].to_status, QuoteStatus::Draft);
        assert_eq!(history[0].reason.as_deref(), Some("frames picked"));
        assert_eq!(history[0].quote_version, 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn stale_snapshot_is_a_version_conflict_and_changes_nothing() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let quote = sample_quote("Q-SQL-003");
        repo.insert(&quote).await.expect("insert");

        let machine = machine();
        let to_draft = machine.request_transition(&quote, QuoteStatus::Draft, &associate(), None);
        let to_cancelled =
            machine.request_transition(&quote, QuoteStatus::Cancelled, &associate(), None);
        let (Some(to_draft), Some(to_cancelled)) = (to_draft.applied(), to_cancelled.applied())
        else {
            panic!("both transitions should be decided against the same snapshot");
        };

        repo.apply_transition(&quote, to_draft).await.expect("first writer wins");
        let error = repo.apply_transition(&quote, to_cancelled).await.expect_err("stale write");
        assert!(matches!(
            error,
            RepositoryError::VersionConflict { expected_version: 1, .. }
        ));

        let stored = repo.find_by_id(&quote.id).await.expect("find").expect("stored");
        assert_eq!(stored.status, QuoteStatus::Draft);
        assert!(stored.cancelled_at.is_none());
        assert_eq!(repo.status_history(&quote.id).await.expect("history").len(), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn missing_quote_is_reported_as_not_found() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let quote = sample_quote("Q-SQL-GHOST");

        let applied = machine()
            .request_transition(&quote, QuoteStatus::Draft, &associate(), None)
            .applied()
            .cloned()
            .expect("applied");
        let error = repo.apply_transition(&quote, &applied).await.expect_err("no row");
        assert!(matches!(error, RepositoryError::NotFound(ref id) if id == "Q-SQL-GHOST"));

        pool.close().await;
    }

    #[tokio::test]
    async fn warning_flag_write_is_versioned() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());
        let quote = sample_quote("Q-SQL-004");
        repo.insert(&quote).await.expect("insert");

        let sent_at = quote.created_at + Duration::days(27);
        let marked = repo.mark_expiration_warning_sent(&quote, sent_at).await.expect("mark");
        assert!(marked.expire_notification_sent);
        assert_eq!(marked.version, 2);
        assert_eq!(marked.status, quote.status);

        let error =
            repo.mark_expiration_warning_sent(&quote, sent_at).await.expect_err("stale snapshot");
        assert!(matches!(error, RepositoryError::VersionConflict { .. }));

        let stored = repo.find_by_id(&quote.id).await.expect("find").expect("stored");
        assert_eq!(stored.expire_notification_sent_at, Some(sent_at));

        pool.close().await;
    }

    #[tokio::test]
    async fn list_by_statuses_filters_and_orders_by_inactivity() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRepository::new(pool.clone());

        let mut older = sample_quote("Q-SQL-OLD");
        older.status = QuoteStatus::Presented;
        older.last_activity_at = parse_ts("2026-01-05T10:00:00Z");
        let mut newer = sample_quote("Q-SQL-NEW");
        newer.status = QuoteStatus::Draft;
        newer.last_activity_at = parse_ts("2026-02-20T10:00:00Z");
        let mut signed = sample_quote("Q-SQL-SIGNED");
        signed.status = QuoteStatus::Signed;

        for quote in [&newer, &signed, &older] {
            repo.insert(quote).await.expect("insert");
        }

        let expirable = repo
            .list_by_statuses(&[QuoteStatus::Draft, QuoteStatus::Presented])
            .await
            .expect("list");
        let ids: Vec<&str> = expirable.iter().map(|quote| quote.id.0.as_str()).collect();
        assert_eq!(ids, vec!["Q-SQL-OLD", "Q-SQL-NEW"]);

        assert!(repo.list_by_statuses(&[]).await.expect("empty list").is_empty());

        pool.close().await;
    }
}

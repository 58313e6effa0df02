//! Offline queue over the storage table
//!
//! Zero-or-one active record per residence id. A record is created when an
//! online submission cannot complete, replaced in place on later offline
//! mutations for the same residence (last writer wins), and deleted once a
//! later submission of that residence succeeds.

use chrono::{DateTime, NaiveDate, Utc};
use grille_common::snapshot::FicheSnapshot;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::debug;

use crate::{Error, Result};

/// Signature payload slots captured at close time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signatures {
    /// Number of captured signatures: 0, 1 or 2
    pub count: u8,
    /// On-site agent name attached to the second signature
    pub agent: String,
}

/// Plan-of-action fields carried with an unsynced control
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFields {
    pub due_date: Option<NaiveDate>,
    pub text: String,
    pub validated: bool,
}

/// Pending "send" fields of an unsynced control
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendFields {
    pub destinations: Vec<String>,
    /// Associated plan id, or the control date when no plan exists
    pub reference: String,
    pub source: String,
}

/// One residence's unsynced inspection state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub residence_id: String,
    pub control_date: DateTime<Utc>,
    pub proximity: bool,
    pub contract: bool,
    pub inspection_type: String,
    pub snapshot: FicheSnapshot,
    pub signatures: Signatures,
    pub plan: PlanFields,
    pub send: SendFields,
    pub updated_at: DateTime<Utc>,
}

/// Queue operations over the storage table
#[derive(Clone)]
pub struct StorageStore {
    db: SqlitePool,
}

type StorageRow = (
    String,         // residence_id
    String,         // control_date
    i64,            // proximity
    i64,            // contract
    String,         // inspection_type
    String,         // snapshot
    i64,            // signature_count
    String,         // signature_agent
    Option<String>, // plan_due_date
    String,         // plan_text
    i64,            // plan_validated
    String,         // send_destinations
    String,         // send_reference
    String,         // send_source
    String,         // updated_at
);

const SELECT_COLUMNS: &str = "residence_id, control_date, proximity, contract, inspection_type, \
     snapshot, signature_count, signature_agent, plan_due_date, plan_text, plan_validated, \
     send_destinations, send_reference, send_source, updated_at";

impl StorageStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Upsert a record keyed by residence id, replacing any prior one
    ///
    /// This is the unconditional fallback for every failed submission, so
    /// the newest local state always wins over an older unsynced one.
    pub async fn secure(&self, record: &StorageRecord) -> Result<()> {
        let snapshot = serde_json::to_string(&record.snapshot)?;
        let destinations = serde_json::to_string(&record.send.destinations)?;

        sqlx::query(
            r#"
            INSERT INTO storage (
                residence_id, control_date, proximity, contract, inspection_type,
                snapshot, signature_count, signature_agent, plan_due_date, plan_text,
                plan_validated, send_destinations, send_reference, send_source, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(residence_id) DO UPDATE SET
                control_date = excluded.control_date,
                proximity = excluded.proximity,
                contract = excluded.contract,
                inspection_type = excluded.inspection_type,
                snapshot = excluded.snapshot,
                signature_count = excluded.signature_count,
                signature_agent = excluded.signature_agent,
                plan_due_date = excluded.plan_due_date,
                plan_text = excluded.plan_text,
                plan_validated = excluded.plan_validated,
                send_destinations = excluded.send_destinations,
                send_reference = excluded.send_reference,
                send_source = excluded.send_source,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.residence_id)
        .bind(record.control_date.to_rfc3339())
        .bind(record.proximity as i64)
        .bind(record.contract as i64)
        .bind(&record.inspection_type)
        .bind(&snapshot)
        .bind(record.signatures.count as i64)
        .bind(&record.signatures.agent)
        .bind(record.plan.due_date.map(|d| d.to_string()))
        .bind(&record.plan.text)
        .bind(record.plan.validated as i64)
        .bind(&destinations)
        .bind(&record.send.reference)
        .bind(&record.send.source)
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        debug!("Secured control for residence {}", record.residence_id);
        Ok(())
    }

    /// Return the queued record for a residence if one exists
    pub async fn load_previous(&self, residence_id: &str) -> Result<Option<StorageRecord>> {
        let sql = format!("SELECT {} FROM storage WHERE residence_id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, StorageRow>(&sql)
            .bind(residence_id)
            .fetch_optional(&self.db)
            .await?;

        row.map(parse_row).transpose()
    }

    /// All queued records, ordered by residence id
    pub async fn drain_all(&self) -> Result<Vec<StorageRecord>> {
        let sql = format!(
            "SELECT {} FROM storage ORDER BY residence_id ASC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, StorageRow>(&sql)
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(parse_row).collect()
    }

    /// Delete the record for one residence, if any
    pub async fn delete(&self, residence_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM storage WHERE residence_id = ?")
            .bind(residence_id)
            .execute(&self.db)
            .await?;

        debug!("Cleared storage for residence {}", residence_id);
        Ok(())
    }

    /// Delete several records in one transaction
    pub async fn delete_many(&self, residence_ids: &[String]) -> Result<()> {
        let mut tx = self.db.begin().await?;
        for residence_id in residence_ids {
            sqlx::query("DELETE FROM storage WHERE residence_id = ?")
                .bind(residence_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!("Cleared {} storage records", residence_ids.len());
        Ok(())
    }

    /// Number of queued records
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM storage")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }
}

fn parse_row(row: StorageRow) -> Result<StorageRecord> {
    let (
        residence_id,
        control_date,
        proximity,
        contract,
        inspection_type,
        snapshot,
        signature_count,
        signature_agent,
        plan_due_date,
        plan_text,
        plan_validated,
        send_destinations,
        send_reference,
        send_source,
        updated_at,
    ) = row;

    Ok(StorageRecord {
        residence_id,
        control_date: parse_timestamp(&control_date)?,
        proximity: proximity != 0,
        contract: contract != 0,
        inspection_type,
        snapshot: serde_json::from_str(&snapshot)?,
        signatures: Signatures {
            count: signature_count as u8,
            agent: signature_agent,
        },
        plan: PlanFields {
            due_date: plan_due_date.as_deref().map(parse_date).transpose()?,
            text: plan_text,
            validated: plan_validated != 0,
        },
        send: SendFields {
            destinations: serde_json::from_str(&send_destinations)?,
            reference: send_reference,
            source: send_source,
        },
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("bad stored timestamp '{}': {}", raw, e)))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    raw.parse()
        .map_err(|e| Error::Internal(format!("bad stored date '{}': {}", raw, e)))
}

//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Timestamps are stored as
//! RFC 3339 text; structured rule config (redial intervals, segmentation,
//! channel plans) lives in JSON columns.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::channels::Channel;
use crate::error::DatabaseError;
use crate::leads::Lead;
use crate::ledger::model::{AppendOutcome, AttemptStatus, DispatchRecord, OutreachAttempt};
use crate::rules::model::{
    ChannelPlan, DialingRule, RedialInterval, ReengagementRule, RuleSnapshot, SegmentCatalog,
    Segmentation,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Uuid {
    Uuid::parse_str(s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_channel(s: &str) -> Result<Channel, DatabaseError> {
    Channel::from_str(s).map_err(DatabaseError::Serialization)
}

fn parse_status(s: &str) -> Result<AttemptStatus, DatabaseError> {
    AttemptStatus::parse(s)
        .ok_or_else(|| DatabaseError::Serialization(format!("unknown attempt status: {s}")))
}

fn parse_date(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DatabaseError::Serialization(format!("bad date {s}: {e}")))
}

fn parse_time(s: &str) -> Result<NaiveTime, DatabaseError> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .map_err(|e| DatabaseError::Serialization(format!("bad time {s}: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(s).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Convert `Option<String>` to libsql Value.
fn opt_text(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn query_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

/// Map a libsql row to a Lead.
///
/// Column order: 0:id, 1:name, 2:addresses, 3:course_id, 4:funnel_id,
/// 5:funnel_stage_id, 6:last_contact_at, 7:created_at, 8:updated_at
fn row_to_lead(row: &libsql::Row) -> Result<Lead, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let name: String = row.get(1).map_err(query_err)?;
    let addresses_json: String = row.get(2).map_err(query_err)?;
    let course: Option<String> = row.get(3).ok();
    let funnel: Option<String> = row.get(4).ok();
    let stage: Option<String> = row.get(5).ok();
    let last_contact: Option<String> = row.get(6).ok();
    let created: String = row.get(7).map_err(query_err)?;
    let updated: String = row.get(8).map_err(query_err)?;

    let addresses: HashMap<Channel, String> = from_json(&addresses_json)?;

    Ok(Lead {
        id: parse_uuid(&id),
        name,
        addresses,
        course_id: course.as_deref().map(parse_uuid),
        funnel_id: funnel.as_deref().map(parse_uuid),
        funnel_stage_id: stage.as_deref().map(parse_uuid),
        last_contact_at: last_contact.as_deref().map(parse_datetime),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

/// Map a libsql row to a DialingRule.
///
/// Column order: 0:id, 1:name, 2:channel, 3:enabled,
/// 4:simultaneous_channels, 5:start_date, 6:start_time, 7:end_date,
/// 8:end_time, 9:max_attempts_per_lead, 10:time_between_calls_secs,
/// 11:redial_intervals, 12:segmentation, 13:channel_plan, 14:created_at
fn row_to_dialing_rule(row: &libsql::Row) -> Result<DialingRule, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let name: String = row.get(1).map_err(query_err)?;
    let channel: String = row.get(2).map_err(query_err)?;
    let enabled: i64 = row.get(3).map_err(query_err)?;
    let simultaneous: i64 = row.get(4).map_err(query_err)?;
    let start_date: String = row.get(5).map_err(query_err)?;
    let start_time: String = row.get(6).map_err(query_err)?;
    let end_date: Option<String> = row.get(7).ok();
    let end_time: String = row.get(8).map_err(query_err)?;
    let max_attempts: i64 = row.get(9).map_err(query_err)?;
    let floor_secs: i64 = row.get(10).map_err(query_err)?;
    let redial_json: String = row.get(11).map_err(query_err)?;
    let segmentation_json: Option<String> = row.get(12).ok();
    let plan_json: Option<String> = row.get(13).ok();
    let created: String = row.get(14).map_err(query_err)?;

    let redial_intervals: HashMap<crate::ledger::FailureType, RedialInterval> =
        from_json(&redial_json)?;
    let segmentation: Option<Segmentation> = match segmentation_json.as_deref() {
        Some(s) if !s.is_empty() => Some(from_json(s)?),
        _ => None,
    };
    let channel_plan: Option<ChannelPlan> = match plan_json.as_deref() {
        Some(s) if !s.is_empty() => Some(from_json(s)?),
        _ => None,
    };

    Ok(DialingRule {
        id: parse_uuid(&id),
        name,
        channel: parse_channel(&channel)?,
        enabled: enabled != 0,
        simultaneous_channels: simultaneous.max(0) as u32,
        start_date: parse_date(&start_date)?,
        start_time: parse_time(&start_time)?,
        end_date: end_date.as_deref().map(parse_date).transpose()?,
        end_time: parse_time(&end_time)?,
        max_attempts_per_lead: max_attempts.max(0) as u32,
        time_between_calls_secs: floor_secs.max(0) as u64,
        redial_intervals,
        segmentation,
        channel_plan,
        created_at: parse_datetime(&created),
    })
}

/// Map a libsql row to a ReengagementRule.
///
/// Column order: 0:id, 1:name, 2:preferred_channel, 3:enabled, 4:active,
/// 5:trigger_after_secs, 6:template_ref, 7:segmentation, 8:created_at
fn row_to_reengagement_rule(row: &libsql::Row) -> Result<ReengagementRule, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let name: String = row.get(1).map_err(query_err)?;
    let channel: String = row.get(2).map_err(query_err)?;
    let enabled: i64 = row.get(3).map_err(query_err)?;
    let active: i64 = row.get(4).map_err(query_err)?;
    let trigger_secs: i64 = row.get(5).map_err(query_err)?;
    let template_ref: String = row.get(6).map_err(query_err)?;
    let segmentation_json: Option<String> = row.get(7).ok();
    let created: String = row.get(8).map_err(query_err)?;

    let segmentation: Option<Segmentation> = match segmentation_json.as_deref() {
        Some(s) if !s.is_empty() => Some(from_json(s)?),
        _ => None,
    };

    Ok(ReengagementRule {
        id: parse_uuid(&id),
        name,
        preferred_channel: parse_channel(&channel)?,
        enabled: enabled != 0,
        active: active != 0,
        trigger_after_secs: trigger_secs.max(0) as u64,
        template_ref,
        segmentation,
        created_at: parse_datetime(&created),
    })
}

/// Map a libsql row to an OutreachAttempt.
///
/// Column order: 0:id, 1:token, 2:lead_id, 3:rule_id, 4:channel,
/// 5:attempted_at, 6:status, 7:sequence, 8:finalized_at
fn row_to_attempt(row: &libsql::Row) -> Result<OutreachAttempt, DatabaseError> {
    let id: String = row.get(0).map_err(query_err)?;
    let token: String = row.get(1).map_err(query_err)?;
    let lead_id: String = row.get(2).map_err(query_err)?;
    let rule_id: String = row.get(3).map_err(query_err)?;
    let channel: String = row.get(4).map_err(query_err)?;
    let attempted: String = row.get(5).map_err(query_err)?;
    let status: String = row.get(6).map_err(query_err)?;
    let sequence: i64 = row.get(7).map_err(query_err)?;
    let finalized: Option<String> = row.get(8).ok();

    Ok(OutreachAttempt {
        id: parse_uuid(&id),
        token: parse_uuid(&token),
        lead_id: parse_uuid(&lead_id),
        rule_id: parse_uuid(&rule_id),
        channel: parse_channel(&channel)?,
        attempted_at: parse_datetime(&attempted),
        status: parse_status(&status)?,
        sequence: sequence.max(0) as u32,
        finalized_at: finalized.as_deref().map(parse_datetime),
    })
}

const ATTEMPT_COLUMNS: &str =
    "id, token, lead_id, rule_id, channel, attempted_at, status, sequence, finalized_at";

const LEAD_COLUMNS: &str = "id, name, addresses, course_id, funnel_id, funnel_stage_id, \
     last_contact_at, created_at, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Lead directory ──────────────────────────────────────────────

    async fn upsert_lead(&self, lead: &Lead) -> Result<(), DatabaseError> {
        let addresses = to_json(&lead.addresses)?;
        self.conn()
            .execute(
                "INSERT INTO leads (id, name, addresses, course_id, funnel_id, \
                 funnel_stage_id, last_contact_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     addresses = excluded.addresses,
                     course_id = excluded.course_id,
                     funnel_id = excluded.funnel_id,
                     funnel_stage_id = excluded.funnel_stage_id,
                     last_contact_at = excluded.last_contact_at,
                     updated_at = excluded.updated_at",
                params![
                    lead.id.to_string(),
                    lead.name.clone(),
                    addresses,
                    opt_text(lead.course_id.map(|u| u.to_string())),
                    opt_text(lead.funnel_id.map(|u| u.to_string())),
                    opt_text(lead.funnel_stage_id.map(|u| u.to_string())),
                    opt_text(lead.last_contact_at.map(|t| t.to_rfc3339())),
                    lead.created_at.to_rfc3339(),
                    lead.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            _ => Ok(None),
        }
    }

    async fn list_leads(&self) -> Result<Vec<Lead>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {LEAD_COLUMNS} FROM leads ORDER BY created_at"),
                (),
            )
            .await
            .map_err(query_err)?;

        let mut leads = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            leads.push(row_to_lead(&row)?);
        }
        Ok(leads)
    }

    async fn touch_last_contact(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE leads SET last_contact_at = ?1, updated_at = ?2 WHERE id = ?3",
                params![at.to_rfc3339(), Utc::now().to_rfc3339(), id.to_string()],
            )
            .await
            .map_err(query_err)?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "lead".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    // ── Rule store ──────────────────────────────────────────────────

    async fn insert_dialing_rule(&self, rule: &DialingRule) -> Result<(), DatabaseError> {
        let redial = to_json(&rule.redial_intervals)?;
        let segmentation = rule.segmentation.as_ref().map(to_json).transpose()?;
        let plan = rule.channel_plan.as_ref().map(to_json).transpose()?;

        self.conn()
            .execute(
                "INSERT INTO dialing_rules (id, name, channel, enabled, \
                 simultaneous_channels, start_date, start_time, end_date, end_time, \
                 max_attempts_per_lead, time_between_calls_secs, redial_intervals, \
                 segmentation, channel_plan, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    rule.id.to_string(),
                    rule.name.clone(),
                    rule.channel.as_str(),
                    rule.enabled as i64,
                    rule.simultaneous_channels as i64,
                    rule.start_date.format("%Y-%m-%d").to_string(),
                    rule.start_time.format("%H:%M:%S").to_string(),
                    opt_text(rule.end_date.map(|d| d.format("%Y-%m-%d").to_string())),
                    rule.end_time.format("%H:%M:%S").to_string(),
                    rule.max_attempts_per_lead as i64,
                    rule.time_between_calls_secs as i64,
                    redial,
                    opt_text(segmentation),
                    opt_text(plan),
                    rule.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn insert_reengagement_rule(
        &self,
        rule: &ReengagementRule,
    ) -> Result<(), DatabaseError> {
        let segmentation = rule.segmentation.as_ref().map(to_json).transpose()?;
        self.conn()
            .execute(
                "INSERT INTO reengagement_rules (id, name, preferred_channel, enabled, \
                 active, trigger_after_secs, template_ref, segmentation, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    rule.id.to_string(),
                    rule.name.clone(),
                    rule.preferred_channel.as_str(),
                    rule.enabled as i64,
                    rule.active as i64,
                    rule.trigger_after_secs as i64,
                    rule.template_ref.clone(),
                    opt_text(segmentation),
                    rule.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn insert_segment(&self, kind: &str, id: Uuid) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR IGNORE INTO segment_catalog (kind, id) VALUES (?1, ?2)",
                params![kind, id.to_string()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn set_dialing_rule_enabled(
        &self,
        id: Uuid,
        enabled: bool,
    ) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE dialing_rules SET enabled = ?1 WHERE id = ?2",
                params![enabled as i64, id.to_string()],
            )
            .await
            .map_err(query_err)?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "dialing_rule".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn rule_enabled(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT enabled FROM dialing_rules WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;
        if let Ok(Some(row)) = rows.next().await {
            return Ok(row.get::<i64>(0).unwrap_or(0) != 0);
        }

        let mut rows = self
            .conn()
            .query(
                "SELECT enabled, active FROM reengagement_rules WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(query_err)?;
        if let Ok(Some(row)) = rows.next().await {
            let enabled = row.get::<i64>(0).unwrap_or(0) != 0;
            let active = row.get::<i64>(1).unwrap_or(0) != 0;
            return Ok(enabled && active);
        }

        Ok(false)
    }

    async fn load_rule_snapshot(&self) -> Result<RuleSnapshot, DatabaseError> {
        let mut snapshot = RuleSnapshot::default();

        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, channel, enabled, simultaneous_channels, start_date, \
                 start_time, end_date, end_time, max_attempts_per_lead, \
                 time_between_calls_secs, redial_intervals, segmentation, channel_plan, \
                 created_at FROM dialing_rules ORDER BY created_at",
                (),
            )
            .await
            .map_err(query_err)?;
        while let Ok(Some(row)) = rows.next().await {
            snapshot.dialing.push(row_to_dialing_rule(&row)?);
        }

        let mut rows = self
            .conn()
            .query(
                "SELECT id, name, preferred_channel, enabled, active, trigger_after_secs, \
                 template_ref, segmentation, created_at FROM reengagement_rules \
                 ORDER BY created_at",
                (),
            )
            .await
            .map_err(query_err)?;
        while let Ok(Some(row)) = rows.next().await {
            snapshot.reengagement.push(row_to_reengagement_rule(&row)?);
        }

        let mut rows = self
            .conn()
            .query("SELECT kind, id FROM segment_catalog", ())
            .await
            .map_err(query_err)?;
        while let Ok(Some(row)) = rows.next().await {
            let kind: String = row.get(0).map_err(query_err)?;
            let id: String = row.get(1).map_err(query_err)?;
            let id = parse_uuid(&id);
            match kind.as_str() {
                "course" => {
                    snapshot.catalog.courses.insert(id);
                }
                "funnel" => {
                    snapshot.catalog.funnels.insert(id);
                }
                "funnel-stage" => {
                    snapshot.catalog.funnel_stages.insert(id);
                }
                other => {
                    return Err(DatabaseError::Serialization(format!(
                        "unknown segment kind: {other}"
                    )));
                }
            }
        }

        Ok(snapshot)
    }

    // ── Attempt ledger ──────────────────────────────────────────────

    async fn record_dispatch(
        &self,
        record: &DispatchRecord,
    ) -> Result<AppendOutcome, DatabaseError> {
        let result = self
            .conn()
            .execute(
                &format!(
                    "INSERT INTO attempts ({ATTEMPT_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'in-flight', ?7, NULL)"
                ),
                params![
                    Uuid::new_v4().to_string(),
                    record.token.to_string(),
                    record.lead_id.to_string(),
                    record.rule_id.to_string(),
                    record.channel.as_str(),
                    record.attempted_at.to_rfc3339(),
                    record.sequence as i64,
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(AppendOutcome::Recorded),
            // The UNIQUE token constraint is the idempotency guard.
            Err(e) if e.to_string().contains("UNIQUE") => Ok(AppendOutcome::Duplicate),
            Err(e) => Err(query_err(e)),
        }
    }

    async fn record_outcome(
        &self,
        token: Uuid,
        status: AttemptStatus,
        finalized_at: DateTime<Utc>,
    ) -> Result<AppendOutcome, DatabaseError> {
        debug_assert!(status.is_terminal(), "outcome must be a terminal status");

        // Guarded single transition: only an in-flight attempt can be
        // finalized, so replays of the same outcome event are no-ops.
        let affected = self
            .conn()
            .execute(
                "UPDATE attempts SET status = ?1, finalized_at = ?2 \
                 WHERE token = ?3 AND status = 'in-flight'",
                params![
                    status.as_str(),
                    finalized_at.to_rfc3339(),
                    token.to_string(),
                ],
            )
            .await
            .map_err(query_err)?;

        if affected == 0 {
            Ok(AppendOutcome::Duplicate)
        } else {
            Ok(AppendOutcome::Recorded)
        }
    }

    async fn pair_history(
        &self,
        lead_id: Uuid,
        channel: Channel,
    ) -> Result<Vec<OutreachAttempt>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ATTEMPT_COLUMNS} FROM attempts \
                     WHERE lead_id = ?1 AND channel = ?2 \
                     ORDER BY attempted_at DESC, sequence DESC"
                ),
                params![lead_id.to_string(), channel.as_str()],
            )
            .await
            .map_err(query_err)?;

        let mut attempts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            attempts.push(row_to_attempt(&row)?);
        }
        Ok(attempts)
    }

    async fn lead_history(&self, lead_id: Uuid) -> Result<Vec<OutreachAttempt>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ATTEMPT_COLUMNS} FROM attempts \
                     WHERE lead_id = ?1 ORDER BY attempted_at DESC, sequence DESC"
                ),
                params![lead_id.to_string()],
            )
            .await
            .map_err(query_err)?;

        let mut attempts = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            attempts.push(row_to_attempt(&row)?);
        }
        Ok(attempts)
    }

    async fn has_in_flight(
        &self,
        lead_id: Uuid,
        channel: Channel,
    ) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM attempts \
                 WHERE lead_id = ?1 AND channel = ?2 AND status = 'in-flight' LIMIT 1",
                params![lead_id.to_string(), channel.as_str()],
            )
            .await
            .map_err(query_err)?;

        Ok(matches!(rows.next().await, Ok(Some(_))))
    }
}

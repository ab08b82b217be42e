//! The Alert aggregate: row, on-disk storage directory, and JSON snapshot.
//!
//! `AlertBmc::sync` is the central write path — every ingestor and every
//! analysis worker calls it to commit a [`RootAnalysis`] back to both the
//! database row and the `storage_dir/data.json` snapshot in one operation.

use crate::business_time::{business_seconds_between, business_time_str};
use crate::ctx::Ctx;
use crate::engine::root_analysis::RootAnalysis;
use crate::model::company::CompanyBmc;
use crate::model::mapping::MappingSynchronizer;
use crate::model::workload::WorkloadBmc;
use crate::model::ModelManager;
use crate::store::distributed_lock::DistributedAlertLock;
use crate::utils::validation::{validate_disposition, validate_storage_dir};
use crate::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub uuid: String,
    pub storage_dir: String,
    pub location: String,
    pub company_id: Option<i64>,
    pub tool: String,
    pub tool_instance: String,
    pub alert_type: String,
    pub description: String,
    pub priority: i64,
    pub event_time: NaiveDateTime,
    pub insert_date: NaiveDateTime,
    pub disposition: Option<String>,
    pub disposition_user_id: Option<i64>,
    pub disposition_time: Option<NaiveDateTime>,
    pub owner_id: Option<i64>,
    pub owner_time: Option<NaiveDateTime>,
    pub removal_user_id: Option<i64>,
    pub removal_time: Option<NaiveDateTime>,
    pub archived: bool,
    pub lock_owner: Option<String>,
    pub lock_id: Option<String>,
    pub lock_time: Option<NaiveDateTime>,
    pub detection_count: i64,
}

#[derive(Debug, Clone)]
pub struct AlertForCreate {
    pub uuid: Option<String>,
    pub storage_dir: String,
    pub location: String,
    pub company_name: Option<String>,
    pub tool: String,
    pub tool_instance: String,
    pub alert_type: String,
    pub description: String,
    pub event_time: NaiveDateTime,
}

/// `New | Assigned | Analyzing | Analyzing (expired) | Delayed | Completed`,
/// optionally suffixed `(Removed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertStatus {
    New,
    Assigned,
    Analyzing,
    AnalyzingExpired,
    Delayed,
    Completed,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "New",
            AlertStatus::Assigned => "Assigned",
            AlertStatus::Analyzing => "Analyzing",
            AlertStatus::AnalyzingExpired => "Analyzing (expired)",
            AlertStatus::Delayed => "Delayed",
            AlertStatus::Completed => "Completed",
        }
    }
}

fn parse_naive(s: &str) -> Result<NaiveDateTime> {
    Ok(NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")?)
}

fn row_to_alert(row: &libsql::Row) -> Result<Alert> {
    let event_time: String = row.get(9)?;
    let insert_date: String = row.get(10)?;
    let disposition_time: Option<String> = row.get(13)?;
    let owner_time: Option<String> = row.get(15)?;
    let removal_time: Option<String> = row.get(17)?;
    let lock_time: Option<String> = row.get(21)?;

    Ok(Alert {
        id: row.get(0)?,
        uuid: row.get(1)?,
        storage_dir: row.get(2)?,
        location: row.get(3)?,
        company_id: row.get(4)?,
        tool: row.get(5)?,
        tool_instance: row.get(6)?,
        alert_type: row.get(7)?,
        description: row.get(8)?,
        priority: row.get(11)?,
        event_time: parse_naive(&event_time)?,
        insert_date: parse_naive(&insert_date)?,
        disposition: row.get(12)?,
        disposition_user_id: row.get(14)?,
        disposition_time: disposition_time.map(|s| parse_naive(&s)).transpose()?,
        owner_id: row.get(16)?,
        owner_time: owner_time.map(|s| parse_naive(&s)).transpose()?,
        removal_user_id: row.get(18)?,
        removal_time: removal_time.map(|s| parse_naive(&s)).transpose()?,
        archived: row.get::<i64>(19)? != 0,
        lock_owner: row.get(20)?,
        lock_id: row.get(22)?,
        lock_time: lock_time.map(|s| parse_naive(&s)).transpose()?,
        detection_count: row.get(23)?,
    })
}

const ALERT_COLUMNS: &str = "id, uuid, storage_dir, location, company_id, tool, tool_instance, \
     alert_type, description, event_time, insert_date, priority, disposition, \
     disposition_time, disposition_user_id, owner_time, owner_id, removal_time, \
     archived, lock_owner, lock_time, lock_id, detection_count";

pub struct AlertBmc;

impl AlertBmc {
    pub async fn get(mm: &ModelManager, alert_id: i64) -> Result<Alert> {
        let mut rows = mm
            .db()
            .query(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"),
                libsql::params![alert_id],
            )
            .await?;
        let row = rows.next().await?.ok_or(Error::AlertNotFound(alert_id))?;
        row_to_alert(&row)
    }

    pub async fn get_by_uuid(mm: &ModelManager, uuid: &str) -> Result<Alert> {
        let mut rows = mm
            .db()
            .query(
                &format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE uuid = ?1"),
                libsql::params![uuid],
            )
            .await?;
        let row = rows
            .next()
            .await?
            .ok_or_else(|| Error::InvalidInput(format!("no alert with uuid {uuid}")))?;
        row_to_alert(&row)
    }

    /// `insert(alert)`: validates `storage_dir`, resolves `company_name` to
    /// a `company_id`, computes an initial `priority` of 0 (no tags exist
    /// yet at insert time; the real weight is recomputed by the first
    /// `sync`), assigns an id via the database and commits.
    pub async fn insert(mm: &ModelManager, data: AlertForCreate) -> Result<i64> {
        validate_storage_dir(&data.storage_dir)?;

        let company_id = match &data.company_name {
            Some(name) => Some(CompanyBmc::get_or_create(mm, name).await?),
            None => None,
        };
        let uuid = data.uuid.unwrap_or_else(|| Uuid::new_v4().to_string());

        let result = mm
            .db()
            .execute(
                "INSERT INTO alerts (uuid, storage_dir, location, company_id, tool, \
                 tool_instance, alert_type, description, priority, event_time) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, strftime('%Y-%m-%d %H:%M:%S', ?9))",
                libsql::params![
                    uuid,
                    data.storage_dir.clone(),
                    data.location,
                    company_id,
                    data.tool,
                    data.tool_instance,
                    data.alert_type,
                    data.description,
                    data.event_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(mm.db().last_insert_rowid()),
            Err(e) if e.is_duplicate() => Err(Error::StorageDirCollision(data.storage_dir)),
            Err(e) => Err(e),
        }
    }

    /// `sync(alert)`: resolve `company_name` to `company_id` if the row
    /// doesn't already have one, recompute `detection_count` and
    /// `priority`, refresh mappings and profile points, write the JSON
    /// snapshot, and release `lock` if the caller still holds it
    /// (ingestors that haven't acquired a lock pass `None`).
    ///
    /// The company-resolve and the main column update run against a
    /// [`ModelManager::scoped_conn`] handle: on any failure in that
    /// sequence the handle is rolled back via [`ScopedConn::fail`] before
    /// the error propagates, rather than leaving a half-applied write
    /// sitting in a cached connection for the next caller to inherit.
    pub async fn sync(
        mm: &ModelManager,
        alert_id: i64,
        root: &RootAnalysis,
        lock: Option<&mut DistributedAlertLock>,
    ) -> Result<()> {
        let scoped = mm.scoped_conn("alerts").await?;

        if let Some(name) = &root.company_name {
            let current = Self::get(mm, alert_id).await?;
            if current.company_id.is_none() {
                let company_id = match CompanyBmc::get_or_create(mm, name).await {
                    Ok(id) => id,
                    Err(e) => {
                        scoped.fail().await;
                        return Err(e);
                    }
                };
                if let Err(e) = scoped
                    .conn()
                    .execute(
                        "UPDATE alerts SET company_id = ?1 WHERE id = ?2",
                        libsql::params![company_id, alert_id],
                    )
                    .await
                {
                    scoped.fail().await;
                    return Err(e.into());
                }
            }
        }

        let detection_count = root.detection_points.len() as i64;
        let priority = Self::compute_priority(mm, root);

        if let Err(e) = scoped
            .conn()
            .execute(
                "UPDATE alerts SET alert_type = ?1, description = ?2, detection_count = ?3, \
                 priority = ?4 WHERE id = ?5",
                libsql::params![
                    root.alert_type.clone(),
                    root.description.clone(),
                    detection_count,
                    priority,
                    alert_id
                ],
            )
            .await
        {
            scoped.fail().await;
            return Err(e.into());
        }
        drop(scoped);

        MappingSynchronizer::rebuild_index(mm, alert_id, root).await?;
        MappingSynchronizer::sync_profile_points(mm, alert_id, &root.profile_points).await?;

        let alert = Self::get(mm, alert_id).await?;
        Self::write_json_snapshot(&alert, root).await?;

        if let Some(lock) = lock {
            if lock.has_current_lock() {
                lock.unlock().await?;
            }
        }

        Ok(())
    }

    /// Sum of configured tag weights (`tags.<name>` config, parsed as an
    /// integer severity weight) over the root's tag set; unconfigured tags
    /// contribute 0.
    fn compute_priority(mm: &ModelManager, root: &RootAnalysis) -> i64 {
        root.tags
            .iter()
            .filter_map(|tag| mm.app_config().tags.get(tag))
            .filter_map(|weight| weight.parse::<i64>().ok())
            .sum()
    }

    async fn write_json_snapshot(alert: &Alert, root: &RootAnalysis) -> Result<()> {
        let mut snapshot = json!({
            "database_id": alert.id,
            "priority": alert.priority,
            "disposition": alert.disposition,
            "disposition_user_id": alert.disposition_user_id,
            "disposition_time": alert.disposition_time.map(|t| t.to_string()),
            "owner_id": alert.owner_id,
            "owner_time": alert.owner_time.map(|t| t.to_string()),
            "removal_user_id": alert.removal_user_id,
            "removal_time": alert.removal_time.map(|t| t.to_string()),
        });
        if let Value::Object(ref mut map) = snapshot {
            for (key, value) in &root.details {
                map.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        let path = std::path::Path::new(&alert.storage_dir).join("data.json");
        let rendered = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, rendered).await?;
        Ok(())
    }

    /// Reads back the `data.json` snapshot written by
    /// [`Self::write_json_snapshot`]. Returns `None` if `sync` has never
    /// run for this alert (no snapshot on disk yet).
    pub async fn load_json_snapshot(alert: &Alert) -> Result<Option<Value>> {
        let path = std::path::Path::new(&alert.storage_dir).join("data.json");
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Tolerant load: merges a snapshot's analysis detail keys into
    /// `root.details`, skipping the administrative columns that live on
    /// the alert row itself (those are already authoritative in `alert`,
    /// loaded separately via [`Self::get`]) and never overwriting a key
    /// `root.details` already carries, so a value computed this run is
    /// never clobbered by a stale on-disk one.
    pub fn merge_json_snapshot(root: &mut RootAnalysis, snapshot: &Value) {
        const ADMIN_KEYS: &[&str] = &[
            "database_id",
            "priority",
            "disposition",
            "disposition_user_id",
            "disposition_time",
            "owner_id",
            "owner_time",
            "removal_user_id",
            "removal_time",
        ];
        let Value::Object(map) = snapshot else {
            return;
        };
        for (key, value) in map {
            if ADMIN_KEYS.contains(&key.as_str()) {
                continue;
            }
            root.details.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }

    /// Derived `status` field: presence/absence
    /// of a workload row and of a lock determines the base state;
    /// `lock_time` expiry flips `Analyzing` to `Analyzing (expired)`. The
    /// `(Removed)` suffix is left to display callers (`alert.removal_time`
    /// is set iff removed).
    pub async fn status(mm: &ModelManager, alert_id: i64) -> Result<AlertStatus> {
        let alert = Self::get(mm, alert_id).await?;
        let workload = WorkloadBmc::get_by_alert(mm, alert_id).await?;

        let Some(workload) = workload else {
            return Ok(AlertStatus::Completed);
        };

        if alert.lock_id.is_some() {
            let lock = DistributedAlertLock::new(
                mm.db().clone(),
                alert_id,
                mm.node().to_string(),
                mm.lock_timeout_secs(),
            );
            return Ok(if lock.is_locked().await? {
                AlertStatus::Analyzing
            } else {
                AlertStatus::AnalyzingExpired
            });
        }

        if Self::has_pending_delayed_analysis(mm, alert_id).await? {
            return Ok(AlertStatus::Delayed);
        }

        Ok(if workload.node.is_some() {
            AlertStatus::Assigned
        } else {
            AlertStatus::New
        })
    }

    /// Attempts to acquire the distributed lock for `alert_id` on behalf of
    /// `mm.node()`. Returns the held lock on success, `None` if another
    /// node holds it. The only way outside the model layer to get at a
    /// [`DistributedAlertLock`], since [`ModelManager`]'s db handle is
    /// private to this module.
    pub async fn acquire_lock(mm: &ModelManager, alert_id: i64) -> Result<Option<DistributedAlertLock>> {
        let mut lock = DistributedAlertLock::new(
            mm.db().clone(),
            alert_id,
            mm.node().to_string(),
            mm.lock_timeout_secs(),
        );
        if lock.lock().await? {
            Ok(Some(lock))
        } else {
            Ok(None)
        }
    }

    async fn has_pending_delayed_analysis(mm: &ModelManager, alert_id: i64) -> Result<bool> {
        let mut rows = mm
            .db()
            .query(
                "SELECT 1 FROM delayed_analysis WHERE alert_id = ?1 LIMIT 1",
                libsql::params![alert_id],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Tags sorted `(score desc, name asc)`: a tag whose base name (before
    /// any `:`-suffixed qualifier) is marked `tags.<name> = special` in
    /// config sorts ahead of ordinary tags, ties broken alphabetically.
    pub async fn sorted_tags(mm: &ModelManager, alert_id: i64) -> Result<Vec<String>> {
        let mut rows = mm
            .db()
            .query(
                "SELECT t.name FROM tags t JOIN tag_mapping m ON m.tag_id = t.id \
                 WHERE m.alert_id = ?1 ORDER BY t.name ASC",
                libsql::params![alert_id],
            )
            .await?;
        let mut names: Vec<String> = Vec::new();
        while let Some(row) = rows.next().await? {
            names.push(row.get(0)?);
        }

        let is_special = |name: &str| -> bool {
            let base = name.split(':').next().unwrap_or(name);
            mm.app_config().tags.get(base).map(String::as_str) == Some("special")
        };
        names.sort_by(|a, b| {
            is_special(b)
                .cmp(&is_special(a))
                .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        });
        Ok(names)
    }

    /// Sets the disposition, enforcing the monotonic rank-order invariant.
    /// `ctx` attributes the change to its acting user in
    /// `disposition_user_id`.
    pub async fn set_disposition(
        mm: &ModelManager,
        alert_id: i64,
        ctx: &Ctx,
        disposition: &str,
    ) -> Result<()> {
        validate_disposition(disposition)?;
        let alert = Self::get(mm, alert_id).await?;

        if let Some(current) = &alert.disposition {
            let current_rank = crate::model::event::disposition_rank(current).unwrap_or(i32::MIN);
            let next_rank = crate::model::event::disposition_rank(disposition).unwrap_or(i32::MIN);
            if next_rank < current_rank {
                return Err(Error::InvalidDispositionTransition {
                    from: current.clone(),
                    to: disposition.to_string(),
                });
            }
        }

        mm.db()
            .execute(
                "UPDATE alerts SET disposition = ?1, disposition_user_id = ?2, \
                 disposition_time = strftime('%Y-%m-%d %H:%M:%S', 'now') WHERE id = ?3",
                libsql::params![disposition, ctx.user_id(), alert_id],
            )
            .await?;
        Ok(())
    }

    /// Attributes ownership of the alert to `ctx`'s acting user.
    pub async fn set_owner(mm: &ModelManager, alert_id: i64, ctx: &Ctx) -> Result<()> {
        mm.db()
            .execute(
                "UPDATE alerts SET owner_id = ?1, owner_time = strftime('%Y-%m-%d %H:%M:%S', 'now') \
                 WHERE id = ?2",
                libsql::params![ctx.user_id(), alert_id],
            )
            .await?;
        Ok(())
    }

    /// Attributes removal of the alert to `ctx`'s acting user.
    pub async fn mark_removed(mm: &ModelManager, alert_id: i64, ctx: &Ctx) -> Result<()> {
        mm.db()
            .execute(
                "UPDATE alerts SET removal_user_id = ?1, removal_time = strftime('%Y-%m-%d %H:%M:%S', 'now') \
                 WHERE id = ?2",
                libsql::params![ctx.user_id(), alert_id],
            )
            .await?;
        Ok(())
    }

    pub fn business_time_seconds(alert: &Alert, now: NaiveDateTime) -> i64 {
        business_seconds_between(alert.event_time, now)
    }

    pub fn business_time_str(alert: &Alert, now: NaiveDateTime) -> String {
        business_time_str(Self::business_time_seconds(alert, now))
    }

    /// Approaching/over-SLA guard: undispositioned, SLA
    /// enabled, `alert_type` not excluded.
    pub fn is_approaching_sla(mm: &ModelManager, alert: &Alert, now: NaiveDateTime) -> bool {
        Self::sla_guard(mm, alert) && {
            let seconds = Self::business_time_seconds(alert, now);
            let sla = &mm.app_config().sla;
            seconds >= (sla.timeout_hours - sla.warning_hours) * 3600
        }
    }

    pub fn is_over_sla(mm: &ModelManager, alert: &Alert, now: NaiveDateTime) -> bool {
        Self::sla_guard(mm, alert) && {
            let seconds = Self::business_time_seconds(alert, now);
            seconds >= mm.app_config().sla.timeout_hours * 3600
        }
    }

    fn sla_guard(mm: &ModelManager, alert: &Alert) -> bool {
        alert.disposition.is_none()
            && mm.app_config().sla.enabled
            && !mm
                .app_config()
                .sla
                .excluded_alert_types
                .iter()
                .any(|t| t == &alert.alert_type)
    }
}

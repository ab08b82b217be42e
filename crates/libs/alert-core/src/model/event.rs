//! Event roll-up over alerts.
//!
//! An event aggregates a set of alerts (via `event_mapping`) under a
//! campaign and derives its own `disposition` as the argmax, by rank, over
//! its contributing alerts' dispositions.

use crate::model::alert::AlertBmc;
use crate::model::ModelManager;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Disposition rank table for event roll-up. `POLICY_VIOLATION`
/// and `GRAYWARE` are tied at rank 3.
pub fn disposition_rank(disposition: &str) -> Option<i32> {
    match disposition {
        "IGNORE" => Some(-1),
        "FALSE_POSITIVE" => Some(0),
        "UNKNOWN" => Some(1),
        "REVIEWED" => Some(2),
        "POLICY_VIOLATION" | "GRAYWARE" => Some(3),
        "RECONNAISSANCE" => Some(4),
        "WEAPONIZATION" => Some(5),
        "DELIVERY" => Some(6),
        "EXPLOITATION" => Some(7),
        "INSTALLATION" => Some(8),
        "COMMAND_AND_CONTROL" => Some(9),
        "EXFIL" => Some(10),
        "DAMAGE" => Some(11),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub creation_date: String,
    pub name: String,
    pub status: String,
    pub campaign_id: Option<i64>,
    pub disposition: Option<String>,
}

pub struct EventBmc;

impl EventBmc {
    pub async fn create(mm: &ModelManager, name: &str, campaign_id: Option<i64>) -> Result<i64> {
        mm.db()
            .execute(
                "INSERT INTO events (creation_date, name, campaign_id) \
                 VALUES (strftime('%Y-%m-%d %H:%M:%S', 'now'), ?1, ?2)",
                libsql::params![name, campaign_id],
            )
            .await?;
        Ok(mm.db().last_insert_rowid())
    }

    pub async fn get(mm: &ModelManager, event_id: i64) -> Result<Event> {
        let mut rows = mm
            .db()
            .query(
                "SELECT id, creation_date, name, status, campaign_id, disposition \
                 FROM events WHERE id = ?1",
                libsql::params![event_id],
            )
            .await?;
        let row = rows.next().await?.ok_or(Error::EventNotFound(event_id))?;
        Ok(Event {
            id: row.get(0)?,
            creation_date: row.get(1)?,
            name: row.get(2)?,
            status: row.get(3)?,
            campaign_id: row.get(4)?,
            disposition: row.get(5)?,
        })
    }

    pub async fn add_alert(mm: &ModelManager, event_id: i64, alert_id: i64) -> Result<()> {
        mm.db()
            .execute(
                "INSERT OR IGNORE INTO event_mapping (event_id, alert_id) VALUES (?1, ?2)",
                libsql::params![event_id, alert_id],
            )
            .await?;
        Ok(())
    }

    /// Recomputes `events.disposition` as the argmax-by-rank over all
    /// contributing alerts' dispositions. Alerts without a disposition, or
    /// with one outside the rank table, don't contribute.
    pub async fn recompute_disposition(mm: &ModelManager, event_id: i64) -> Result<Option<String>> {
        let mut rows = mm
            .db()
            .query(
                "SELECT alert_id FROM event_mapping WHERE event_id = ?1",
                libsql::params![event_id],
            )
            .await?;
        let mut alert_ids = Vec::new();
        while let Some(row) = rows.next().await? {
            alert_ids.push(row.get::<i64>(0)?);
        }

        let mut best: Option<(i32, String)> = None;
        for alert_id in alert_ids {
            let alert = AlertBmc::get(mm, alert_id).await?;
            let Some(disposition) = alert.disposition else {
                continue;
            };
            let Some(rank) = disposition_rank(&disposition) else {
                continue;
            };
            let is_better = match &best {
                Some((best_rank, _)) => rank > *best_rank,
                None => true,
            };
            if is_better {
                best = Some((rank, disposition));
            }
        }

        let disposition = best.map(|(_, d)| d);
        mm.db()
            .execute(
                "UPDATE events SET disposition = ?1 WHERE id = ?2",
                libsql::params![disposition.clone(), event_id],
            )
            .await?;
        Ok(disposition)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_disposition_rank_ordering() {
        assert!(disposition_rank("IGNORE").unwrap() < disposition_rank("FALSE_POSITIVE").unwrap());
        assert!(disposition_rank("DAMAGE").unwrap() > disposition_rank("EXFIL").unwrap());
    }

    #[test]
    fn test_policy_violation_and_grayware_are_tied() {
        assert_eq!(
            disposition_rank("POLICY_VIOLATION"),
            disposition_rank("GRAYWARE")
        );
    }

    #[test]
    fn test_unknown_disposition_has_no_rank() {
        assert_eq!(disposition_rank("BOGUS"), None);
    }
}

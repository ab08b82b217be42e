//! Idempotent maintenance of alert↔{tag,observable,profile-point} edges.
//!
//! Tags and observables are reconciled via insert-ignore-then-select,
//! capped at a few retries to bound contention between concurrent
//! writers. Profile points are pre-existing rows; their mapping is
//! reconciled as a set diff against the alert's current in-memory
//! collection instead.

use crate::engine::root_analysis::RootAnalysis;
use crate::model::dictionary::{ObservableBmc, TagBmc};
use crate::model::ModelManager;
use crate::store::retry_on_contention;
use crate::utils::validation::validate_tag_name;
use crate::Result;

/// Retry cap for the tag/observable insert-ignore loop.
const MAX_SYNC_RETRIES: u32 = 3;

pub struct MappingSynchronizer;

impl MappingSynchronizer {
    /// Reconciles the mapping tables so they contain exactly the set of
    /// (alert, item) edges implied by `root`'s tags and observables.
    /// Idempotent: running it twice leaves the mapping tables unchanged.
    pub async fn build_index(mm: &ModelManager, alert_id: i64, root: &RootAnalysis) -> Result<()> {
        for tag in &root.tags {
            Self::sync_tag_mapping(mm, alert_id, tag).await?;
        }
        for (observable_type, value) in &root.observables {
            Self::sync_observable_mapping(mm, alert_id, observable_type, value).await?;
        }
        Ok(())
    }

    /// `delete mappings for alert_id; build_index()`.
    pub async fn rebuild_index(mm: &ModelManager, alert_id: i64, root: &RootAnalysis) -> Result<()> {
        mm.db()
            .execute(
                "DELETE FROM tag_mapping WHERE alert_id = ?1",
                libsql::params![alert_id],
            )
            .await?;
        mm.db()
            .execute(
                "DELETE FROM observable_mapping WHERE alert_id = ?1",
                libsql::params![alert_id],
            )
            .await?;
        Self::build_index(mm, alert_id, root).await
    }

    /// `(alert, new_tag_name)`: resolve or insert the tag, then
    /// insert-ignore the mapping row. Concurrent-safe: at most one
    /// INSERT wins, others observe the row and proceed.
    pub async fn sync_tag_mapping(mm: &ModelManager, alert_id: i64, tag_name: &str) -> Result<()> {
        validate_tag_name(tag_name)?;

        let mut attempt = 0;
        let tag_id = loop {
            if let Some(tag) = TagBmc::get_by_name(mm, tag_name).await? {
                break tag.id;
            }
            match mm
                .db()
                .execute(
                    "INSERT OR IGNORE INTO tags (name) VALUES (?1)",
                    libsql::params![tag_name],
                )
                .await
            {
                Ok(_) => {}
                Err(e) if e.is_duplicate() => {}
                Err(e) => return Err(e),
            }
            attempt += 1;
            if attempt >= MAX_SYNC_RETRIES {
                break TagBmc::get_or_create(mm, tag_name).await?;
            }
        };

        retry_on_contention(|| async {
            mm.db()
                .execute(
                    "INSERT OR IGNORE INTO tag_mapping (alert_id, tag_id) VALUES (?1, ?2)",
                    libsql::params![alert_id, tag_id],
                )
                .await
                .map_err(crate::Error::from)
        })
        .await?;
        Ok(())
    }

    /// Identical pattern to [`Self::sync_tag_mapping`], keyed by
    /// `(type, value)`.
    pub async fn sync_observable_mapping(
        mm: &ModelManager,
        alert_id: i64,
        observable_type: &str,
        value: &str,
    ) -> Result<()> {
        let observable_id = ObservableBmc::get_or_create(mm, observable_type, value).await?;
        retry_on_contention(|| async {
            mm.db()
                .execute(
                    "INSERT OR IGNORE INTO observable_mapping (alert_id, observable_id) VALUES (?1, ?2)",
                    libsql::params![alert_id, observable_id],
                )
                .await
                .map_err(crate::Error::from)
        })
        .await?;
        Ok(())
    }

    /// Reconciles `pp_alert_mapping` against `profile_point_descriptions`
    /// as a set diff: inserting additions and deleting removals in two
    /// passes, rather than the insert-ignore pattern used for tags and
    /// observables (profile points are pre-existing, not created here).
    pub async fn sync_profile_points(
        mm: &ModelManager,
        alert_id: i64,
        profile_point_descriptions: &[String],
    ) -> Result<()> {
        let mut wanted_ids = Vec::new();
        for description in profile_point_descriptions {
            let mut rows = mm
                .db()
                .query(
                    "SELECT id FROM profile_points WHERE description = ?1",
                    libsql::params![description],
                )
                .await?;
            if let Some(row) = rows.next().await? {
                wanted_ids.push(row.get::<i64>(0)?);
            }
        }

        let mut current_rows = mm
            .db()
            .query(
                "SELECT profile_point_id FROM pp_alert_mapping WHERE alert_id = ?1",
                libsql::params![alert_id],
            )
            .await?;
        let mut current_ids = Vec::new();
        while let Some(row) = current_rows.next().await? {
            current_ids.push(row.get::<i64>(0)?);
        }

        for id in &wanted_ids {
            if !current_ids.contains(id) {
                mm.db()
                    .execute(
                        "INSERT OR IGNORE INTO pp_alert_mapping (alert_id, profile_point_id) VALUES (?1, ?2)",
                        libsql::params![alert_id, *id],
                    )
                    .await?;
            }
        }
        for id in &current_ids {
            if !wanted_ids.contains(id) {
                mm.db()
                    .execute(
                        "DELETE FROM pp_alert_mapping WHERE alert_id = ?1 AND profile_point_id = ?2",
                        libsql::params![alert_id, *id],
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

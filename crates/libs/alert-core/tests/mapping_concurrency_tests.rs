//! Concurrent writers calling `MappingSynchronizer::sync_tag_mapping`
//! for the same (alert, tag) pair must converge on a single mapping row,
//! not a duplicate per racer.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use alert_core::model::mapping::MappingSynchronizer;
use futures::future::join_all;

#[tokio::test]
async fn test_concurrent_tag_sync_converges_to_one_mapping_row() {
    let (mm, _dir) = common::test_mm().await;
    let alert_id = common::seed_alert(&mm).await;

    let attempts: Vec<_> = (0..6)
        .map(|_| {
            let mm = mm.clone();
            tokio::spawn(async move { MappingSynchronizer::sync_tag_mapping(&mm, alert_id, "phishing").await })
        })
        .collect();

    let results = join_all(attempts).await;
    for r in results {
        r.unwrap().unwrap();
    }

    let mut rows = mm
        .db_for_test()
        .query(
            "SELECT COUNT(*) FROM tag_mapping WHERE alert_id = ?1",
            libsql::params![alert_id],
        )
        .await
        .unwrap();
    let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(count, 1);

    let mut tag_rows = mm
        .db_for_test()
        .query("SELECT COUNT(*) FROM tags WHERE name = 'phishing'", ())
        .await
        .unwrap();
    let tag_count: i64 = tag_rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(tag_count, 1);
}

#[tokio::test]
async fn test_concurrent_observable_sync_converges_to_one_mapping_row() {
    let (mm, _dir) = common::test_mm().await;
    let alert_id = common::seed_alert(&mm).await;

    let attempts: Vec<_> = (0..6)
        .map(|_| {
            let mm = mm.clone();
            tokio::spawn(async move {
                MappingSynchronizer::sync_observable_mapping(&mm, alert_id, "ipv4", "1.2.3.4").await
            })
        })
        .collect();

    let results = join_all(attempts).await;
    for r in results {
        r.unwrap().unwrap();
    }

    let mut rows = mm
        .db_for_test()
        .query(
            "SELECT COUNT(*) FROM observable_mapping WHERE alert_id = ?1",
            libsql::params![alert_id],
        )
        .await
        .unwrap();
    let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
    assert_eq!(count, 1);
}

//! Bulk load followed by streamed changes, against the in-memory source and sink.

use ledger::Ledger;
use pg_replicator::testing::{self, init_logging};
use pg_replicator::{BulkLoader, Poller, TickStats};
use postgresql_sink::{ChangeSink, MemorySink};
use postgresql_wal2json_source::testing::memory::MemorySource;
use std::sync::Arc;
use std::time::Duration;
use sync_core::{ColumnValue, PersonRow, Row, TableSchema};
use tokio_test::assert_ok;
use uuid::Uuid;

fn person(id: i32, name: &str, score: i32) -> Row {
    Row::from(&PersonRow {
        id,
        name: name.to_string(),
        uid: Uuid::new_v4(),
        score,
        created_at: None,
    })
}

async fn person_at(sink: &MemorySink, id: i64) -> PersonRow {
    let row = sink.get(id).await.unwrap_or_else(|| panic!("row {id} missing"));
    PersonRow::try_from(&row).unwrap()
}

#[tokio::test]
async fn test_snapshot_then_insert_and_update() {
    init_logging();

    let source = Arc::new(
        MemorySource::new("migration_slot")
            .with_rows(vec![person(1, "alice", 10), person(2, "bob", 20)]),
    );
    let sink = Arc::new(MemorySink::new(TableSchema::person()));

    let report = assert_ok!(
        BulkLoader::new(source.as_ref(), sink.as_ref(), 100)
            .load_all()
            .await
    );
    assert_eq!(report.rows_read, 2);
    assert_eq!(sink.count_rows().await.unwrap(), 2);

    source
        .push_batch([
            testing::insert(3, "carol", 9),
            testing::update_score(1, "alice", 30),
        ])
        .await;

    let poller = Poller::new(source.clone(), sink.clone(), Ledger::null(), Duration::from_secs(5));
    let stats = assert_ok!(poller.tick().await);
    assert_eq!(
        stats,
        TickStats {
            received: 2,
            applied: 2,
            skipped: 0,
            failed: 0
        }
    );

    assert_eq!(sink.count_rows().await.unwrap(), 3);
    assert_eq!(person_at(&sink, 1).await.score, 30);
    assert_eq!(person_at(&sink, 2).await.score, 20);
    let carol = person_at(&sink, 3).await;
    assert_eq!(carol.score, 9);
    assert_eq!(carol.name, "carol");
}

#[tokio::test]
async fn test_changes_racing_the_snapshot_are_absorbed() {
    init_logging();

    // Row 2 was inserted after the slot was created but before the snapshot
    // read, so it arrives both ways.
    let source = Arc::new(
        MemorySource::new("migration_slot")
            .with_rows(vec![person(1, "alice", 10), person(2, "bob", 20)]),
    );
    let sink = Arc::new(MemorySink::new(TableSchema::person()));
    BulkLoader::new(source.as_ref(), sink.as_ref(), 1)
        .load_all()
        .await
        .unwrap();

    source.push_batch([testing::insert(2, "bob", 20)]).await;
    let poller = Poller::new(source.clone(), sink.clone(), Ledger::null(), Duration::from_secs(5));
    let stats = poller.tick().await.unwrap();

    assert_eq!(stats.applied, 1);
    assert_eq!(sink.count_rows().await.unwrap(), 2);
    assert_eq!(
        sink.get(2i64).await.unwrap().get("score"),
        Some(&ColumnValue::Integer(20))
    );
}

#[tokio::test]
async fn test_steady_state_matches_source_after_drain() {
    init_logging();

    let source = Arc::new(MemorySource::new("migration_slot"));
    let sink = Arc::new(MemorySink::new(TableSchema::person()));
    let poller = Poller::new(source.clone(), sink.clone(), Ledger::null(), Duration::from_secs(5));

    source
        .push_batch((1..=20).map(|id| testing::insert(id, "p", id)))
        .await;
    source
        .push_batch((1..=20).filter(|id| id % 2 == 0).map(testing::delete))
        .await;
    source
        .push_batch(
            (1..=20)
                .filter(|id| id % 2 == 1)
                .map(|id| testing::update_score(id, "p", id * 100)),
        )
        .await;

    while source.pending_batches().await > 0 {
        poller.tick().await.unwrap();
    }

    let rows = sink.rows().await;
    assert_eq!(rows.len(), 10);
    for row in rows {
        let person = PersonRow::try_from(&row).unwrap();
        assert_eq!(person.id % 2, 1);
        assert_eq!(person.score, person.id * 100);
    }
}

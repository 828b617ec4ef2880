//! Full replication between two PostgreSQL servers with wal2json.

use anyhow::Result;
use pg_replicator::testing::init_logging;
use pg_replicator::{replicator, ReplicatorConfig};
use postgresql_wal2json_source::testing::container::PostgresContainer;
use std::time::{Duration, Instant};
use sync_core::TableSchema;
use tokio::sync::broadcast;

const SOURCE_PORT: u16 = 15442;
const TARGET_PORT: u16 = 15443;

async fn wait_for<F, Fut>(what: &str, mut check: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + Duration::from_secs(30);
    while Instant::now() < deadline {
        if check().await? {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    anyhow::bail!("Timed out waiting for {what}")
}

#[tokio::test]
#[ignore = "Requires Docker to build the wal2json PostgreSQL image"]
async fn test_replicates_snapshot_and_changes() -> Result<()> {
    init_logging();

    let source = PostgresContainer::new("pg-replicator-e2e-source", SOURCE_PORT);
    let target = PostgresContainer::new("pg-replicator-e2e-target", TARGET_PORT);
    source.build_image()?;
    source.start()?;
    target.start()?;
    source.wait_until_ready(Duration::from_secs(30)).await?;
    target.wait_until_ready(Duration::from_secs(30)).await?;

    let table = TableSchema::person();
    let source_client = source.connect().await?;
    let target_client = target.connect().await?;
    source_client.batch_execute(&table.create_table_sql()).await?;
    source_client
        .batch_execute(
            "INSERT INTO person (name, uid, score) VALUES \
             ('alice', gen_random_uuid(), 10), \
             ('bob', gen_random_uuid(), 20)",
        )
        .await?;

    let config = ReplicatorConfig {
        source: source.connection_string.parse()?,
        target: target.connection_string.parse()?,
        table,
        slot_name: "e2e_slot".to_string(),
        plugin: "wal2json".to_string(),
        tick_interval: Duration::from_millis(200),
        io_timeout: Duration::from_secs(10),
        batch_size: 100,
        ledger_dir: None,
        ledger_retry: false,
        monitor: true,
        skip_bulk_load: false,
    };

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(async move { replicator::run(&config, shutdown_rx).await });

    let count = |client: std::sync::Arc<tokio_postgres::Client>| async move {
        Ok::<i64, anyhow::Error>(client.query_one("SELECT COUNT(*) FROM person", &[]).await?.get(0))
    };

    wait_for("bulk load", || {
        let client = target_client.clone();
        async move { Ok(count(client).await? == 2) }
    })
    .await?;

    source_client
        .batch_execute(
            "INSERT INTO person (name, uid, score) VALUES ('carol', gen_random_uuid(), 9); \
             UPDATE person SET score = 30 WHERE id = 1;",
        )
        .await?;

    wait_for("streamed changes", || {
        let client = target_client.clone();
        async move {
            let row = client
                .query_one("SELECT score FROM person WHERE id = 1", &[])
                .await?;
            Ok(count(client.clone()).await? == 3 && row.get::<_, i32>(0) == 30)
        }
    })
    .await?;

    let carol: i32 = target_client
        .query_one("SELECT score FROM person WHERE id = 3", &[])
        .await?
        .get(0);
    assert_eq!(carol, 9);

    shutdown_tx.send(())?;
    let summary = handle.await??;
    assert_eq!(summary.totals.failed, 0);
    assert!(summary.totals.applied >= 2);

    source_client
        .execute("SELECT pg_drop_replication_slot('e2e_slot')", &[])
        .await?;
    Ok(())
}

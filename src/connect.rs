//! Database connections.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, error, info};

/// Connects to PostgreSQL and spawns the connection task.
///
/// `role` ("source" or "target") only labels log lines and errors.
pub async fn connect(
    config: &Config,
    role: &'static str,
    timeout: Duration,
) -> Result<Arc<Client>> {
    let (client, connection) = tokio::time::timeout(timeout, config.connect(NoTls))
        .await
        .with_context(|| format!("Timed out after {timeout:?} connecting to {role} PostgreSQL"))?
        .with_context(|| format!("Failed to connect to {role} PostgreSQL"))?;

    // Spawn connection handler
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("{role} connection error: {e}");
        }
    });

    info!("Connected to {role} PostgreSQL at {}", describe(config));
    Ok(Arc::new(client))
}

/// Makes the server abort any statement on this session that runs longer
/// than `timeout`. An aborted statement rolls back, so an aborted slot read
/// leaves its changes on the slot.
pub async fn set_statement_timeout(
    client: &Client,
    role: &str,
    timeout: Duration,
) -> Result<()> {
    client
        .batch_execute(&statement_timeout_sql(timeout))
        .await
        .with_context(|| format!("Failed to set statement_timeout on {role} session"))?;
    debug!("Set statement_timeout to {timeout:?} on {role} session");
    Ok(())
}

fn statement_timeout_sql(timeout: Duration) -> String {
    // 0 disables the timeout, so round sub-millisecond values up
    format!("SET statement_timeout = {}", timeout.as_millis().max(1))
}

/// `host:port/dbname` for log lines, without credentials.
fn describe(config: &Config) -> String {
    let host = config
        .get_hosts()
        .first()
        .map(|h| match h {
            tokio_postgres::config::Host::Tcp(name) => name.clone(),
            #[cfg(unix)]
            tokio_postgres::config::Host::Unix(path) => path.display().to_string(),
        })
        .unwrap_or_else(|| "localhost".to_string());
    let port = config.get_ports().first().copied().unwrap_or(5432);
    let dbname = config.get_dbname().unwrap_or("postgres");
    format!("{host}:{port}/{dbname}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_hides_credentials() {
        let config: Config = "host=db port=5431 user=postgres password=hunter2 dbname=testdb"
            .parse()
            .unwrap();
        let described = describe(&config);
        assert_eq!(described, "db:5431/testdb");
        assert!(!described.contains("hunter2"));
    }

    #[test]
    fn test_statement_timeout_sql() {
        assert_eq!(
            statement_timeout_sql(Duration::from_secs(30)),
            "SET statement_timeout = 30000"
        );
        assert_eq!(
            statement_timeout_sql(Duration::from_micros(10)),
            "SET statement_timeout = 1"
        );
    }

    #[test]
    fn test_describe_defaults() {
        let config: Config = "user=postgres".parse().unwrap();
        assert_eq!(describe(&config), "localhost:5432/postgres");
    }
}

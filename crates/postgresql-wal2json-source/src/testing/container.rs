//! Docker container running PostgreSQL 16 with wal2json and `wal_level=logical`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_postgres::NoTls;
use tracing::{debug, error, info};

const DOCKERFILE: &str = "crates/postgresql-wal2json-source/Dockerfile.postgres16.wal2json";

/// A throwaway PostgreSQL server for integration tests.
///
/// The container is stopped and removed on drop.
pub struct PostgresContainer {
    pub container_name: String,
    pub host_port: u16,
    pub image_name: String,
    pub connection_string: String,
}

impl PostgresContainer {
    pub fn new(container_name: &str, host_port: u16) -> Self {
        Self {
            container_name: container_name.to_string(),
            host_port,
            image_name: "pg-replicator-wal2json-test".to_string(),
            connection_string: format!(
                "host=localhost port={host_port} user=postgres password=postgres dbname=testdb sslmode=disable"
            ),
        }
    }

    /// Walks up from the current directory to the workspace root.
    fn workspace_root() -> Result<PathBuf> {
        let mut dir = std::env::current_dir()?;
        loop {
            if dir.join(DOCKERFILE).exists() {
                return Ok(dir);
            }
            if !dir.pop() {
                anyhow::bail!("Could not find workspace root containing {DOCKERFILE}");
            }
        }
    }

    /// Builds the wal2json image.
    pub fn build_image(&self) -> Result<()> {
        let root = Self::workspace_root()?;
        let dockerfile = root.join(DOCKERFILE);
        let context = dockerfile
            .parent()
            .context("Dockerfile has no parent directory")?
            .to_path_buf();

        info!("Building Docker image {} from {:?}", self.image_name, dockerfile);

        let status = Command::new("docker")
            .arg("build")
            .args(["-t", &self.image_name])
            .arg("-f")
            .arg(&dockerfile)
            .arg(&context)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .context("Failed to execute docker build command")?;

        if !status.success() {
            anyhow::bail!("Docker build failed");
        }
        Ok(())
    }

    /// Starts the server with logical decoding enabled, replacing any
    /// container of the same name.
    pub fn start(&self) -> Result<()> {
        info!("Starting PostgreSQL container: {}", self.container_name);
        self.remove_quietly();

        let output = Command::new("docker")
            .args(["run", "--name", &self.container_name])
            .args(["-e", "POSTGRES_USER=postgres"])
            .args(["-e", "POSTGRES_PASSWORD=postgres"])
            .args(["-e", "POSTGRES_DB=testdb"])
            .args(["-p", &format!("{}:5432", self.host_port)])
            .args(["-d", &self.image_name, "postgres"])
            .args(["-c", "wal_level=logical"])
            .args(["-c", "max_wal_senders=10"])
            .args(["-c", "max_replication_slots=10"])
            .output()
            .context("Failed to start Docker container")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Failed to start container: {stderr}");
        }

        debug!(
            "Started container {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }

    /// Polls until the server accepts queries or `timeout` elapses.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            match self.connect().await {
                Ok(client) if client.execute("SELECT 1", &[]).await.is_ok() => {
                    info!("PostgreSQL is ready");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => debug!("Connection attempt failed: {e}"),
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        anyhow::bail!("PostgreSQL did not become ready within {timeout:?}")
    }

    /// Opens a new connection to the container.
    pub async fn connect(&self) -> Result<Arc<tokio_postgres::Client>> {
        let (client, connection) = tokio_postgres::connect(&self.connection_string, NoTls)
            .await
            .context("Failed to connect to PostgreSQL")?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!("PostgreSQL connection error: {e}");
            }
        });
        Ok(Arc::new(client))
    }

    fn remove_quietly(&self) {
        for action in ["stop", "rm"] {
            let _ = Command::new("docker")
                .args([action, &self.container_name])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
        }
    }

    /// Stops and removes the container.
    pub fn stop(&self) {
        info!("Stopping container: {}", self.container_name);
        self.remove_quietly();
    }
}

impl Drop for PostgresContainer {
    fn drop(&mut self) {
        self.stop();
    }
}

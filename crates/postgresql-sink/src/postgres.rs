//! PostgreSQL implementation of [`ChangeSink`].

use std::sync::Arc;

use async_trait::async_trait;
use sync_core::{ChangeEvent, Row, TableSchema};
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

use crate::error::ApplyError;
use crate::param::{as_refs, params};
use crate::plan::{plan, Mutation};
use crate::sql;

/// Writes to one table of a PostgreSQL database.
pub struct PostgreSQLSink {
    client: Arc<Client>,
    schema: TableSchema,
}

impl PostgreSQLSink {
    pub fn new(client: Arc<Client>, schema: TableSchema) -> Self {
        Self { client, schema }
    }
}

#[async_trait]
impl crate::ChangeSink for PostgreSQLSink {
    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    async fn ensure_table(&self) -> Result<(), ApplyError> {
        self.client
            .batch_execute(&self.schema.create_table_sql())
            .await?;
        info!("Ensured table {} exists", self.schema.qualified_name());
        Ok(())
    }

    async fn write_rows(&self, rows: &[Row]) -> Result<u64, ApplyError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let stmt = sql::insert_rows(&self.schema, rows);
        let params = params(&stmt.params);
        let inserted = self.client.execute(&stmt.sql, &as_refs(&params)).await?;

        debug!(
            "Inserted {inserted} of {} row(s) into {}",
            rows.len(),
            self.schema.qualified_name()
        );
        Ok(inserted)
    }

    async fn apply_change(&self, change: &ChangeEvent) -> Result<u64, ApplyError> {
        let mutation = plan(&self.schema, change)?;
        let stmt = sql::mutation(&self.schema, &mutation);
        let params = params(&stmt.params);
        let affected = self.client.execute(&stmt.sql, &as_refs(&params)).await?;

        match &mutation {
            Mutation::Update { key, .. } if affected == 0 => {
                warn!(
                    "UPDATE on {} matched no row for key {:?}",
                    self.schema.qualified_name(),
                    key
                );
            }
            Mutation::Delete { key } if affected == 0 => {
                debug!("DELETE found no row for key {key:?}, nothing to do");
            }
            _ => {}
        }
        Ok(affected)
    }

    async fn cancel(&self) -> Result<(), ApplyError> {
        self.client.cancel_token().cancel_query(NoTls).await?;
        warn!(
            "Sent cancel request for the running statement on {}",
            self.schema.qualified_name()
        );
        Ok(())
    }

    async fn resync_sequence(&self) -> Result<Option<i64>, ApplyError> {
        let [key] = self.schema.primary_key.as_slice() else {
            return Ok(None);
        };

        let row = self
            .client
            .query_one(
                "SELECT pg_get_serial_sequence($1, $2)",
                &[&self.schema.qualified_name(), key],
            )
            .await?;
        let Some(sequence) = row.get::<_, Option<String>>(0) else {
            debug!(
                "{}.{key} is not backed by a sequence",
                self.schema.qualified_name()
            );
            return Ok(None);
        };

        let row = self
            .client
            .query_one(&sql::resync_sequence(&self.schema, key), &[&sequence])
            .await?;
        let next: i64 = row.get(0);
        info!("Reset sequence {sequence}; next value is {next}");
        Ok(Some(next))
    }

    async fn count_rows(&self) -> Result<i64, ApplyError> {
        let row = self
            .client
            .query_one(&sql::count_rows(&self.schema), &[])
            .await?;
        Ok(row.get(0))
    }
}

//! Reading the current contents of the source table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use sync_core::{quote_ident, ColumnKind, ColumnValue, Row, TableSchema};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::Client as PgClient;
use tracing::info;

use crate::error::SourceError;
use crate::source::SnapshotSource;

/// Streams the rows of one table in primary key order.
///
/// The read is a single statement, so every row comes from the same MVCC
/// snapshot even though rows are fetched lazily.
pub struct SnapshotReader {
    client: Arc<PgClient>,
    schema: TableSchema,
}

impl SnapshotReader {
    pub fn new(client: Arc<PgClient>, schema: TableSchema) -> Self {
        Self { client, schema }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }
}

/// `SELECT` of every descriptor field, ordered by primary key.
fn select_sql(schema: &TableSchema) -> String {
    let columns = schema
        .field_names()
        .into_iter()
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(", ");
    let order_by = schema
        .primary_key
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT {columns} FROM {} ORDER BY {order_by}",
        schema.qualified_name()
    )
}

#[async_trait]
impl SnapshotSource for SnapshotReader {
    async fn read_rows(&self) -> Result<BoxStream<'_, Result<Row, SourceError>>, SourceError> {
        let sql = select_sql(&self.schema);
        info!("Reading snapshot of {} with: {sql}", self.schema.qualified_name());

        let rows = self
            .client
            .query_raw(sql.as_str(), std::iter::empty::<&(dyn ToSql + Sync)>())
            .await?;

        let schema = &self.schema;
        Ok(rows
            .map(move |row| convert_row(schema, &row?))
            .boxed())
    }
}

/// Converts a PostgreSQL row into a [`Row`] keyed by the descriptor's field names.
fn convert_row(schema: &TableSchema, row: &tokio_postgres::Row) -> Result<Row, SourceError> {
    let mut out = Row::new();
    for (index, field) in schema.fields.iter().enumerate() {
        let value = convert_postgres_value(row, index, field.kind).map_err(|reason| {
            SourceError::Column {
                column: field.name.clone(),
                kind: field.kind,
                reason,
            }
        })?;
        out.insert(field.name.clone(), value);
    }
    Ok(out)
}

/// Reads one column, checking the server's type against the declared kind.
fn convert_postgres_value(
    row: &tokio_postgres::Row,
    index: usize,
    kind: ColumnKind,
) -> Result<ColumnValue, String> {
    let pg_type = row.columns()[index].type_().clone();

    let value: Result<ColumnValue, tokio_postgres::Error> = match (kind, &pg_type) {
        (ColumnKind::Boolean, &Type::BOOL) => {
            row.try_get::<_, Option<bool>>(index).map(Into::into)
        }
        (ColumnKind::Integer, &Type::INT2) => row
            .try_get::<_, Option<i16>>(index)
            .map(|v| v.map(i64::from).into()),
        (ColumnKind::Integer, &Type::INT4) => row
            .try_get::<_, Option<i32>>(index)
            .map(|v| v.map(i64::from).into()),
        (ColumnKind::Integer, &Type::INT8) => {
            row.try_get::<_, Option<i64>>(index).map(Into::into)
        }
        (ColumnKind::Text, &Type::TEXT | &Type::VARCHAR | &Type::BPCHAR | &Type::NAME) => {
            row.try_get::<_, Option<String>>(index).map(Into::into)
        }
        (ColumnKind::Uuid, &Type::UUID) => {
            row.try_get::<_, Option<uuid::Uuid>>(index).map(Into::into)
        }
        (ColumnKind::Timestamp, &Type::TIMESTAMP) => row
            .try_get::<_, Option<NaiveDateTime>>(index)
            .map(Into::into),
        (ColumnKind::TimestampTz, &Type::TIMESTAMPTZ) => row
            .try_get::<_, Option<DateTime<Utc>>>(index)
            .map(Into::into),
        _ => return Err(format!("unsupported PostgreSQL type {pg_type}")),
    };

    value.map_err(|e| e.to_string())
}

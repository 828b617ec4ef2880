//! Translation of a change event into a keyed mutation of the target table.
//!
//! Both sinks go through [`plan`], so the PostgreSQL and in-memory targets
//! agree on how a change is located and what it writes.

use sync_core::{ChangeAction, ChangeEvent, Column, Row, TableSchema};

use crate::error::ApplyError;

/// A single-row mutation of the target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Insert the row, overwriting the non-key fields it carries on key conflict.
    Upsert { row: Row },
    /// Overwrite the fields in `values` on the row identified by `key`.
    Update { key: Row, values: Row },
    /// Remove the row identified by `key`, if any.
    Delete { key: Row },
}

/// Builds the mutation for `event`.
///
/// Columns the table does not declare are dropped. Updates and deletes are
/// located by the key in `identity` when it is complete, otherwise by the key
/// in `columns`.
pub fn plan(schema: &TableSchema, event: &ChangeEvent) -> Result<Mutation, ApplyError> {
    if !event.is_for(schema) {
        return Err(ApplyError::TableMismatch {
            expected: format!("{}.{}", schema.schema, schema.name),
            found: format!("{}.{}", event.schema, event.table),
        });
    }

    let values = known_columns(schema, &event.columns);

    match event.action {
        ChangeAction::Insert => {
            require_columns(schema, event, &values)?;
            key_of(schema, &values).ok_or_else(|| missing_key(schema, event, &values))?;
            Ok(Mutation::Upsert { row: values })
        }
        ChangeAction::Update => {
            require_columns(schema, event, &values)?;
            let key = locate(schema, event, &values)?;
            Ok(Mutation::Update { key, values })
        }
        ChangeAction::Delete => {
            let key = locate(schema, event, &values)?;
            Ok(Mutation::Delete { key })
        }
    }
}

fn known_columns(schema: &TableSchema, columns: &[Column]) -> Row {
    columns
        .iter()
        .filter(|c| schema.field(&c.name).is_some())
        .map(|c| (c.name.clone(), c.value.clone()))
        .collect()
}

/// The primary key columns of `row`, or `None` if any is absent or NULL.
fn key_of(schema: &TableSchema, row: &Row) -> Option<Row> {
    let values = row.primary_key(schema)?;
    Some(schema.primary_key.iter().cloned().zip(values).collect())
}

fn locate(schema: &TableSchema, event: &ChangeEvent, values: &Row) -> Result<Row, ApplyError> {
    let identity = known_columns(schema, &event.identity);
    key_of(schema, &identity)
        .or_else(|| key_of(schema, values))
        .ok_or_else(|| missing_key(schema, event, &identity))
}

fn require_columns(
    schema: &TableSchema,
    event: &ChangeEvent,
    values: &Row,
) -> Result<(), ApplyError> {
    if values.is_empty() {
        return Err(ApplyError::NoColumns {
            action: event.action,
            table: schema.qualified_name(),
        });
    }
    Ok(())
}

fn missing_key(schema: &TableSchema, event: &ChangeEvent, row: &Row) -> ApplyError {
    let column = schema
        .primary_key
        .iter()
        .find(|pk| row.get(pk).is_none_or(|v| v.is_null()))
        .or_else(|| schema.primary_key.first())
        .cloned()
        .unwrap_or_default();
    ApplyError::MissingPrimaryKey {
        action: event.action,
        table: schema.qualified_name(),
        column,
    }
}

//! SQL statements generated from the table descriptor.
//!
//! Columns always appear in the descriptor's field order, and parameter
//! placeholders are numbered in the order of [`Statement::params`].

use sync_core::{quote_ident, ColumnValue, Row, TableSchema};

use crate::plan::Mutation;

static NULL: ColumnValue = ColumnValue::Null;

/// SQL text with its positional parameters.
#[derive(Debug, PartialEq)]
pub struct Statement<'a> {
    pub sql: String,
    pub params: Vec<&'a ColumnValue>,
}

/// Multi-row `INSERT ... ON CONFLICT (pk) DO NOTHING` writing every field.
///
/// Fields a row lacks are bound as NULL.
pub fn insert_rows<'a>(schema: &TableSchema, rows: &'a [Row]) -> Statement<'a> {
    let fields = schema.field_names();
    let mut params = Vec::with_capacity(rows.len() * fields.len());
    let mut tuples = Vec::with_capacity(rows.len());

    for row in rows {
        let start = params.len();
        for field in &fields {
            params.push(row.get(field).unwrap_or(&NULL));
        }
        tuples.push(format!("({})", placeholders(start + 1, fields.len())));
    }

    let sql = format!(
        "INSERT INTO {} ({}) VALUES {} ON CONFLICT ({}) DO NOTHING",
        schema.qualified_name(),
        column_list(&fields),
        tuples.join(", "),
        key_list(schema),
    );
    Statement { sql, params }
}

/// Statement applying one mutation.
pub fn mutation<'a>(schema: &TableSchema, mutation: &'a Mutation) -> Statement<'a> {
    match mutation {
        Mutation::Upsert { row } => upsert(schema, row),
        Mutation::Update { key, values } => update(schema, key, values),
        Mutation::Delete { key } => delete(schema, key),
    }
}

fn upsert<'a>(schema: &TableSchema, row: &'a Row) -> Statement<'a> {
    let (columns, params) = present_fields(schema, row);
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !schema.is_primary_key(c))
        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c)))
        .collect();
    let on_conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {on_conflict}",
        schema.qualified_name(),
        column_list(&columns),
        placeholders(1, columns.len()),
        key_list(schema),
    );
    Statement { sql, params }
}

fn update<'a>(schema: &TableSchema, key: &'a Row, values: &'a Row) -> Statement<'a> {
    let (columns, mut params) = present_fields(schema, values);
    let assignments: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", quote_ident(c), i + 1))
        .collect();
    let (condition, key_params) = key_condition(schema, key, params.len() + 1);
    params.extend(key_params);

    let sql = format!(
        "UPDATE {} SET {} WHERE {condition}",
        schema.qualified_name(),
        assignments.join(", "),
    );
    Statement { sql, params }
}

fn delete<'a>(schema: &TableSchema, key: &'a Row) -> Statement<'a> {
    let (condition, params) = key_condition(schema, key, 1);
    let sql = format!("DELETE FROM {} WHERE {condition}", schema.qualified_name());
    Statement { sql, params }
}

/// `SELECT COUNT(*)` of the table.
pub fn count_rows(schema: &TableSchema) -> String {
    format!("SELECT COUNT(*) FROM {}", schema.qualified_name())
}

/// Moves the sequence `$1` so the next value it hands out is `max(key) + 1`.
///
/// Only meaningful for single-column keys.
pub fn resync_sequence(schema: &TableSchema, key: &str) -> String {
    format!(
        "SELECT setval($1::text::regclass, COALESCE((SELECT MAX({}) FROM {}), 0) + 1, false)",
        quote_ident(key),
        schema.qualified_name()
    )
}

fn present_fields<'s, 'a>(
    schema: &'s TableSchema,
    row: &'a Row,
) -> (Vec<&'s str>, Vec<&'a ColumnValue>) {
    schema
        .fields
        .iter()
        .filter_map(|f| row.get(&f.name).map(|v| (f.name.as_str(), v)))
        .unzip()
}

fn key_condition<'a>(
    schema: &TableSchema,
    key: &'a Row,
    first: usize,
) -> (String, Vec<&'a ColumnValue>) {
    let mut params = Vec::with_capacity(schema.primary_key.len());
    let mut terms = Vec::with_capacity(schema.primary_key.len());
    for pk in &schema.primary_key {
        terms.push(format!("{} = ${}", quote_ident(pk), first + params.len()));
        params.push(key.get(pk).unwrap_or(&NULL));
    }
    (terms.join(" AND "), params)
}

fn column_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn key_list(schema: &TableSchema) -> String {
    schema
        .primary_key
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

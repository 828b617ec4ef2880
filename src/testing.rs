//! Helpers shared by unit and integration tests.

use serde_json::{json, Value};

pub const TEST_UID: &str = "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11";

/// Installs a fmt subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

fn column(name: &str, type_name: &str, value: Value) -> Value {
    json!({"name": name, "type": type_name, "value": value})
}

fn person_columns(id: i64, name: &str, score: i64) -> Vec<Value> {
    vec![
        column("id", "integer", json!(id)),
        column("name", "character varying(100)", json!(name)),
        column("uid", "uuid", json!(TEST_UID)),
        column("score", "integer", json!(score)),
        column("created_at", "timestamp without time zone", json!("2024-01-15 10:30:00.123456")),
    ]
}

fn document(action: &str, table: &str, columns: Vec<Value>, identity: Vec<Value>) -> String {
    let mut doc = json!({
        "action": action,
        "timestamp": "2024-01-15 10:30:00.654321+00",
        "schema": "public",
        "table": table,
    });
    if !columns.is_empty() {
        doc["columns"] = Value::Array(columns);
    }
    if !identity.is_empty() {
        doc["identity"] = Value::Array(identity);
    }
    doc.to_string()
}

/// wal2json v2 insert of a full `person` row.
pub fn insert(id: i64, name: &str, score: i64) -> String {
    document("I", "person", person_columns(id, name, score), Vec::new())
}

/// wal2json v2 update of a `person` row's score, keyed by `id`.
pub fn update_score(id: i64, name: &str, score: i64) -> String {
    update_key(id, id, name, score)
}

/// wal2json v2 update that may also change the key from `old_id` to `new_id`.
pub fn update_key(old_id: i64, new_id: i64, name: &str, score: i64) -> String {
    document(
        "U",
        "person",
        person_columns(new_id, name, score),
        vec![column("id", "integer", json!(old_id))],
    )
}

/// wal2json v2 delete of a `person` row.
pub fn delete(id: i64) -> String {
    document(
        "D",
        "person",
        Vec::new(),
        vec![column("id", "integer", json!(id))],
    )
}

/// wal2json v2 insert into some other table.
pub fn insert_into(table: &str, id: i64) -> String {
    document(
        "I",
        table,
        vec![column("id", "integer", json!(id))],
        Vec::new(),
    )
}

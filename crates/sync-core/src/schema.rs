//! Table descriptors for the replicated table.
//!
//! A [`TableSchema`] is the ordered field list plus the primary-key field names
//! of one table. The decoder uses it to filter events, the bulk loader to read
//! source rows, and the apply engine to build its statements, so none of them
//! hardcode the replicated table.

use crate::values::ColumnKind;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for schema construction.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// No primary key fields were declared
    #[error("Table '{0}' has no primary key defined - primary key is required for replication")]
    MissingPrimaryKey(String),

    /// A primary key names a field that does not exist
    #[error("Primary key field '{field}' not found in table '{table}'")]
    PrimaryKeyNotFound { table: String, field: String },

    /// The same field was declared twice
    #[error("Field '{field}' declared more than once in table '{table}'")]
    DuplicateField { table: String, field: String },
}

// ============================================================================
// Definitions
// ============================================================================

/// A single field of a replicated table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    /// Column name
    pub name: String,

    /// Kind of value stored in the column
    pub kind: ColumnKind,

    /// SQL type used when creating the table (e.g. `VARCHAR(100)`, `SERIAL`)
    pub sql_type: String,

    /// Whether this column accepts NULL
    pub nullable: bool,

    /// SQL default expression, if any
    pub default: Option<String>,
}

impl FieldDefinition {
    /// Create a new NOT NULL field definition.
    pub fn new(name: impl Into<String>, kind: ColumnKind, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            sql_type: sql_type.into(),
            nullable: false,
            default: None,
        }
    }

    /// Mark this field as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Attach a default expression.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn to_ddl(&self) -> String {
        let mut ddl = format!("{} {}", quote_ident(&self.name), self.sql_type);
        if !self.nullable {
            ddl.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            ddl.push_str(" DEFAULT ");
            ddl.push_str(default);
        }
        ddl
    }
}

/// Descriptor of the replicated table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// PostgreSQL schema (namespace) the table lives in
    pub schema: String,

    /// Table name
    pub name: String,

    /// Fields in declaration order
    pub fields: Vec<FieldDefinition>,

    /// Names of the primary key fields, in key order
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Create a table descriptor, validating the primary key against the fields.
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        fields: Vec<FieldDefinition>,
        primary_key: Vec<String>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();

        if primary_key.is_empty() {
            return Err(SchemaError::MissingPrimaryKey(name));
        }

        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(SchemaError::DuplicateField {
                    table: name,
                    field: field.name.clone(),
                });
            }
        }

        if let Some(missing) = primary_key
            .iter()
            .find(|pk| !fields.iter().any(|f| &f.name == *pk))
        {
            return Err(SchemaError::PrimaryKeyNotFound {
                table: name,
                field: missing.clone(),
            });
        }

        Ok(Self {
            schema: schema.into(),
            name,
            fields,
            primary_key,
        })
    }

    /// The built-in `public.person` table.
    pub fn person() -> Self {
        Self {
            schema: "public".to_string(),
            name: "person".to_string(),
            fields: vec![
                FieldDefinition::new("id", ColumnKind::Integer, "SERIAL"),
                FieldDefinition::new("name", ColumnKind::Text, "VARCHAR(100)"),
                FieldDefinition::new("uid", ColumnKind::Uuid, "UUID"),
                FieldDefinition::new("score", ColumnKind::Integer, "INTEGER"),
                FieldDefinition::new("created_at", ColumnKind::Timestamp, "TIMESTAMP")
                    .nullable()
                    .with_default("CURRENT_TIMESTAMP"),
            ],
            primary_key: vec!["id".to_string()],
        }
    }

    /// Return the same table shape at a different schema/table location.
    pub fn with_location(mut self, schema: impl Into<String>, name: impl Into<String>) -> Self {
        self.schema = schema.into();
        self.name = name.into();
        self
    }

    /// Get a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get all field names in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Whether `name` is part of the primary key.
    pub fn is_primary_key(&self, name: &str) -> bool {
        self.primary_key.iter().any(|pk| pk == name)
    }

    /// Fields that are not part of the primary key.
    pub fn non_key_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| !self.is_primary_key(&f.name))
    }

    /// Whether a change for `schema.table` targets this table.
    pub fn matches(&self, schema: &str, table: &str) -> bool {
        self.schema == schema && self.name == table
    }

    /// Quoted, schema-qualified table name for use in SQL.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table.
    pub fn create_table_sql(&self) -> String {
        let mut parts: Vec<String> = self.fields.iter().map(FieldDefinition::to_ddl).collect();
        parts.push(format!(
            "PRIMARY KEY ({})",
            self.primary_key
                .iter()
                .map(|pk| quote_ident(pk))
                .collect::<Vec<_>>()
                .join(", ")
        ));

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.qualified_name(),
            parts.join(", ")
        )
    }
}

/// Quote an identifier for PostgreSQL, doubling embedded quotes.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_schema_shape() {
        let schema = TableSchema::person();
        assert_eq!(
            schema.field_names(),
            vec!["id", "name", "uid", "score", "created_at"]
        );
        assert!(schema.is_primary_key("id"));
        assert!(!schema.is_primary_key("score"));
        assert_eq!(schema.non_key_fields().count(), 4);
        assert!(schema.matches("public", "person"));
        assert!(!schema.matches("audit", "person"));
    }

    #[test]
    fn test_create_table_sql() {
        let sql = TableSchema::person().create_table_sql();
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"public\".\"person\" (\"id\" SERIAL NOT NULL, \
             \"name\" VARCHAR(100) NOT NULL, \"uid\" UUID NOT NULL, \"score\" INTEGER NOT NULL, \
             \"created_at\" TIMESTAMP DEFAULT CURRENT_TIMESTAMP, PRIMARY KEY (\"id\"))"
        );
    }

    #[test]
    fn test_with_location() {
        let schema = TableSchema::person().with_location("staging", "people");
        assert_eq!(schema.qualified_name(), "\"staging\".\"people\"");
        assert!(schema.matches("staging", "people"));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_new_rejects_unknown_primary_key() {
        let result = TableSchema::new(
            "public",
            "t",
            vec![FieldDefinition::new("a", ColumnKind::Integer, "INTEGER")],
            vec!["b".to_string()],
        );
        assert!(matches!(
            result,
            Err(SchemaError::PrimaryKeyNotFound { .. })
        ));
    }

    #[test]
    fn test_new_rejects_missing_primary_key() {
        let result = TableSchema::new(
            "public",
            "t",
            vec![FieldDefinition::new("a", ColumnKind::Integer, "INTEGER")],
            vec![],
        );
        assert!(matches!(result, Err(SchemaError::MissingPrimaryKey(_))));
    }

    #[test]
    fn test_new_rejects_duplicate_field() {
        let result = TableSchema::new(
            "public",
            "t",
            vec![
                FieldDefinition::new("a", ColumnKind::Integer, "INTEGER"),
                FieldDefinition::new("a", ColumnKind::Text, "TEXT"),
            ],
            vec!["a".to_string()],
        );
        assert!(matches!(result, Err(SchemaError::DuplicateField { .. })));
    }
}

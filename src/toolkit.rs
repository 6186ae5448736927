//! SQL tools exposed to the agent.
//!
//! | Tool | Input | Returns |
//! |------|-------|---------|
//! | `sql_db_list_tables` | (none) | the catalog table name |
//! | `sql_db_schema` | `table_names` | DDL plus sample rows |
//! | `sql_db_query` | `query` | result rows as JSON |
//!
//! Statements run on a `query_only` connection, so an agent cannot modify
//! the catalog. Failures come back as `Error: ...` observations for the
//! model to correct rather than as Rust errors.

use serde_json::{json, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row};

use crate::config::Config;
use crate::db;
use crate::error::PersistenceError;
use crate::store::CatalogStore;
use crate::trace::SQL_QUERY_TOOL;

pub const LIST_TABLES_TOOL: &str = "sql_db_list_tables";
pub const SCHEMA_TOOL: &str = "sql_db_schema";

pub struct SqlToolkit {
    store: CatalogStore,
    max_rows: usize,
}

impl SqlToolkit {
    pub async fn open(config: &Config) -> Result<Self, PersistenceError> {
        let pool = db::connect_read_only(&config.db.path).await?;
        let store = CatalogStore::from_pool(pool, &config.db.table, config.agent.sample_rows);
        Ok(Self::new(store, config.agent.max_result_rows))
    }

    pub fn new(store: CatalogStore, max_rows: usize) -> Self {
        Self { store, max_rows }
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    /// Function-calling definitions in the OpenAI `tools` format.
    pub fn definitions(&self) -> Value {
        json!([
            {
                "type": "function",
                "function": {
                    "name": LIST_TABLES_TOOL,
                    "description": "List the tables in the database. Input is an empty object.",
                    "parameters": {"type": "object", "properties": {}, "required": []}
                }
            },
            {
                "type": "function",
                "function": {
                    "name": SCHEMA_TOOL,
                    "description": "Get the schema and sample rows for the given tables. \
                        Call sql_db_list_tables first to be sure the tables exist.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "table_names": {
                                "type": "string",
                                "description": "Comma-separated list of table names"
                            }
                        },
                        "required": ["table_names"]
                    }
                }
            },
            {
                "type": "function",
                "function": {
                    "name": SQL_QUERY_TOOL,
                    "description": "Execute a SQLite SELECT statement and get the result rows. \
                        If the query is wrong an error message is returned; rewrite the query and try again.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "query": {"type": "string", "description": "A single SQLite query"}
                        },
                        "required": ["query"]
                    }
                }
            }
        ])
    }

    /// Run one tool call and render its observation.
    pub async fn call(&self, tool: &str, input: &Value) -> String {
        match tool {
            LIST_TABLES_TOOL => self.store.table().to_string(),
            SCHEMA_TOOL => self.schema(input).await,
            SQL_QUERY_TOOL => match input.get("query").and_then(Value::as_str) {
                Some(sql) => match self.run_query(sql).await {
                    Ok(rendered) => rendered,
                    Err(e) => format!("Error: {}", e),
                },
                None => "Error: missing string argument 'query'".to_string(),
            },
            other => format!(
                "Error: {} is not a valid tool, try one of [{}, {}, {}].",
                other, LIST_TABLES_TOOL, SCHEMA_TOOL, SQL_QUERY_TOOL
            ),
        }
    }

    async fn schema(&self, input: &Value) -> String {
        let requested = input
            .get("table_names")
            .and_then(Value::as_str)
            .unwrap_or_else(|| self.store.table());

        let unknown: Vec<&str> = requested
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty() && *name != self.store.table())
            .collect();
        if !unknown.is_empty() {
            return format!("Error: table_names {:?} not found in database", unknown);
        }

        match self.store.read_schema_description().await {
            Ok(description) => description,
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Execute `sql` and render up to `max_rows` rows as JSON.
    pub async fn run_query(&self, sql: &str) -> Result<String, sqlx::Error> {
        let rows = sqlx::query(sql).fetch_all(self.store.pool()).await?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let truncated = rows.len() > self.max_rows;
        let values: Vec<Vec<Value>> = rows.iter().take(self.max_rows).map(row_values).collect();

        tracing::debug!(rows = rows.len(), truncated, "agent query executed");

        let mut rendered = json!({ "columns": columns, "rows": values });
        if truncated {
            rendered["truncated_to"] = json!(self.max_rows);
        }
        Ok(rendered.to_string())
    }
}

fn row_values(row: &SqliteRow) -> Vec<Value> {
    (0..row.len()).map(|i| cell(row, i)).collect()
}

// Values are decoded by their runtime storage class, so expressions and
// aggregates render as naturally as plain columns.
fn cell(row: &SqliteRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    Value::String("<binary>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CatalogRecord, Price};
    use tempfile::TempDir;

    async fn seeded(tmp: &TempDir) -> SqlToolkit {
        let config = Config::with_db_path(tmp.path().join("catalog.sqlite"));
        let store = CatalogStore::open(&config).await.unwrap();
        store.ensure_schema().await.unwrap();
        store
            .replace_all(&[
                CatalogRecord {
                    title: "Book A".to_string(),
                    price: Price::from_cents(1250).unwrap(),
                },
                CatalogRecord {
                    title: "Book B".to_string(),
                    price: Price::from_cents(799).unwrap(),
                },
            ])
            .await
            .unwrap();
        SqlToolkit::open(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_query_renders_rows() {
        let tmp = TempDir::new().unwrap();
        let toolkit = seeded(&tmp).await;

        let out = toolkit
            .call(SQL_QUERY_TOOL, &json!({"query": "SELECT title, price FROM books ORDER BY price"}))
            .await;
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["columns"], json!(["title", "price"]));
        assert_eq!(parsed["rows"], json!([["Book B", 7.99], ["Book A", 12.5]]));

        let out = toolkit
            .call(SQL_QUERY_TOOL, &json!({"query": "SELECT COUNT(*) AS n FROM books"}))
            .await;
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["rows"], json!([[2]]));
    }

    #[tokio::test]
    async fn test_writes_are_refused() {
        let tmp = TempDir::new().unwrap();
        let toolkit = seeded(&tmp).await;

        let out = toolkit
            .call(SQL_QUERY_TOOL, &json!({"query": "DELETE FROM books"}))
            .await;
        assert!(out.starts_with("Error:"), "{out}");
        assert_eq!(toolkit.store().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bad_sql_and_bad_input_become_observations() {
        let tmp = TempDir::new().unwrap();
        let toolkit = seeded(&tmp).await;

        assert!(toolkit
            .call(SQL_QUERY_TOOL, &json!({"query": "SELEC nonsense"}))
            .await
            .starts_with("Error:"));
        assert!(toolkit
            .call(SQL_QUERY_TOOL, &json!({"sql": "SELECT 1"}))
            .await
            .contains("missing string argument"));
        assert!(toolkit
            .call("drop_everything", &json!({}))
            .await
            .contains("is not a valid tool"));
    }

    #[tokio::test]
    async fn test_list_tables_and_schema() {
        let tmp = TempDir::new().unwrap();
        let toolkit = seeded(&tmp).await;

        assert_eq!(toolkit.call(LIST_TABLES_TOOL, &json!({})).await, "books");
        let schema = toolkit
            .call(SCHEMA_TOOL, &json!({"table_names": "books"}))
            .await;
        assert!(schema.contains("CREATE TABLE"));
        assert!(schema.contains("Book A\t12.50"));
        assert!(toolkit
            .call(SCHEMA_TOOL, &json!({"table_names": "authors"}))
            .await
            .starts_with("Error:"));
    }

    #[tokio::test]
    async fn test_row_cap() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_db_path(tmp.path().join("catalog.sqlite"));
        let store = CatalogStore::open(&config).await.unwrap();
        store.ensure_schema().await.unwrap();
        let toolkit = SqlToolkit::new(store, 1);

        let out = toolkit
            .run_query("SELECT 1 AS x UNION ALL SELECT 2 UNION ALL SELECT 3")
            .await
            .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["rows"], json!([[1]]));
        assert_eq!(parsed["truncated_to"], json!(1));
    }
}

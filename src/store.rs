//! The catalog table.
//!
//! One table (default `books`) with a fixed two-column schema. Content is
//! only ever replaced wholesale by [`CatalogStore::replace_all`], which runs
//! the delete and the inserts inside one transaction. On a WAL database a
//! concurrent reader therefore sees either the previous catalog or the new
//! one, never a mix.

use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::error::PersistenceError;
use crate::models::{CatalogRecord, Price};

/// Declared column layout, in order.
pub const COLUMNS: [(&str, &str); 2] = [("title", "TEXT"), ("price", "DECIMAL(10, 2)")];

pub struct CatalogStore {
    pool: SqlitePool,
    table: String,
    sample_rows: usize,
}

impl CatalogStore {
    /// Connect to the database named in `config`. Does not touch the schema.
    pub async fn open(config: &Config) -> Result<Self, PersistenceError> {
        let pool = db::connect(&config.db.path).await?;
        Ok(Self::from_pool(
            pool,
            &config.db.table,
            config.agent.sample_rows,
        ))
    }

    /// `table` must already be a validated identifier (see [`crate::config::validate`]).
    pub fn from_pool(pool: SqlitePool, table: &str, sample_rows: usize) -> Self {
        Self {
            pool,
            table: table.to_string(),
            sample_rows,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the table if absent and verify an existing one has the expected columns.
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        let columns = COLUMNS
            .iter()
            .map(|(name, ty)| format!("    {} {} NOT NULL", name, ty))
            .collect::<Vec<_>>()
            .join(",\n");
        let ddl = format!("CREATE TABLE IF NOT EXISTS {} (\n{}\n)", self.table, columns);
        sqlx::query(&ddl).execute(&self.pool).await?;

        self.verify_schema().await
    }

    /// Check the table's columns without issuing any DDL.
    ///
    /// A missing table is [`PersistenceError::MissingTable`]; a table with
    /// other columns is [`PersistenceError::SchemaMismatch`].
    pub async fn verify_schema(&self) -> Result<(), PersistenceError> {
        let found: Vec<(String, String)> =
            sqlx::query_as("SELECT name, type FROM pragma_table_info(?) ORDER BY cid")
                .bind(&self.table)
                .fetch_all(&self.pool)
                .await?;
        if found.is_empty() {
            return Err(PersistenceError::MissingTable(self.table.clone()));
        }

        let matches = found.len() == COLUMNS.len()
            && found.iter().zip(COLUMNS.iter()).all(|((name, ty), (want_name, want_ty))| {
                name.eq_ignore_ascii_case(want_name) && same_type(ty, want_ty)
            });

        if !matches {
            let found = found
                .iter()
                .map(|(name, ty)| format!("{} {}", name, ty))
                .collect::<Vec<_>>()
                .join(", ");
            return Err(PersistenceError::SchemaMismatch {
                table: self.table.clone(),
                found,
            });
        }

        tracing::debug!(table = %self.table, "catalog schema verified");
        Ok(())
    }

    /// Atomically replace the table's content with `records`.
    ///
    /// An empty batch leaves the current content alone and returns 0.
    pub async fn replace_all(&self, records: &[CatalogRecord]) -> Result<u64, PersistenceError> {
        if records.is_empty() {
            tracing::warn!(table = %self.table, "no records to write, keeping existing catalog");
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(&format!("DELETE FROM {}", self.table))
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let insert = format!("INSERT INTO {} (title, price) VALUES (?, ?)", self.table);
        let mut written = 0u64;
        for record in records {
            written += sqlx::query(&insert)
                .bind(&record.title)
                .bind(record.price.as_f64())
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;

        tracing::info!(table = %self.table, deleted, written, "catalog replaced");
        Ok(written)
    }

    /// Table DDL followed by a few sample rows, for grounding the agent.
    pub async fn read_schema_description(&self) -> Result<String, PersistenceError> {
        let ddl: Option<String> =
            sqlx::query_scalar("SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(&self.table)
                .fetch_optional(&self.pool)
                .await?;
        let ddl = ddl.ok_or_else(|| PersistenceError::MissingTable(self.table.clone()))?;

        let sample: Vec<(String, String)> = sqlx::query_as(&format!(
            "SELECT title, printf('%.2f', price) FROM {} ORDER BY rowid LIMIT ?",
            self.table
        ))
        .bind(self.sample_rows as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut description = format!("{}\n\n/*\n", ddl.trim());
        description.push_str(&format!(
            "{} rows from {} table:\n",
            sample.len(),
            self.table
        ));
        let header: Vec<&str> = COLUMNS.iter().map(|(name, _)| *name).collect();
        description.push_str(&header.join("\t"));
        description.push('\n');
        for (title, price) in &sample {
            description.push_str(&format!("{}\t{}\n", title, price));
        }
        description.push_str("*/");

        Ok(description)
    }

    /// All rows, in insertion order.
    pub async fn records(&self) -> Result<Vec<CatalogRecord>, PersistenceError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(&format!(
            "SELECT title, CAST(ROUND(price * 100) AS INTEGER) FROM {} ORDER BY rowid",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(title, cents)| match Price::from_cents(cents) {
                Some(price) => Some(CatalogRecord { title, price }),
                None => {
                    tracing::warn!(
                        table = %self.table,
                        title = %title,
                        cents,
                        "skipping stored row with out-of-range price"
                    );
                    None
                }
            })
            .collect())
    }

    pub async fn count(&self) -> Result<i64, PersistenceError> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn same_type(found: &str, want: &str) -> bool {
    let squash = |s: &str| {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase()
    };
    squash(found) == squash(want)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(title: &str, cents: i64) -> CatalogRecord {
        CatalogRecord {
            title: title.to_string(),
            price: Price::from_cents(cents).unwrap(),
        }
    }

    async fn open_store(tmp: &TempDir) -> CatalogStore {
        let config = Config::with_db_path(tmp.path().join("catalog.sqlite"));
        let store = CatalogStore::open(&config).await.unwrap();
        store.ensure_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ensure_schema_rejects_foreign_table() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_db_path(tmp.path().join("catalog.sqlite"));
        let store = CatalogStore::open(&config).await.unwrap();
        sqlx::query("CREATE TABLE books (name TEXT, cost REAL, stock INTEGER)")
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.ensure_schema().await.unwrap_err();
        assert!(matches!(err, PersistenceError::SchemaMismatch { .. }));
    }

    #[tokio::test]
    async fn test_replace_all_replaces_not_appends() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        store
            .replace_all(&[record("Old A", 100), record("Old B", 200), record("Old C", 300)])
            .await
            .unwrap();
        let written = store
            .replace_all(&[record("Book A", 1250), record("Book B", 799)])
            .await
            .unwrap();

        assert_eq!(written, 2);
        assert_eq!(
            store.records().await.unwrap(),
            vec![record("Book A", 1250), record("Book B", 799)]
        );
    }

    #[tokio::test]
    async fn test_empty_batch_keeps_existing_rows() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.replace_all(&[record("Keep me", 1000)]).await.unwrap();

        assert_eq!(store.replace_all(&[]).await.unwrap(), 0);
        assert_eq!(store.records().await.unwrap(), vec![record("Keep me", 1000)]);
    }

    #[tokio::test]
    async fn test_prices_round_trip_exactly() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let batch = vec![
            record("Whole", 1000),
            record("Cents", 5177),
            record("Tiny", 1),
            record("Max", crate::models::MAX_PRICE_CENTS),
        ];
        store.replace_all(&batch).await.unwrap();
        assert_eq!(store.records().await.unwrap(), batch);
    }

    #[tokio::test]
    async fn test_schema_description_has_ddl_and_samples() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store
            .replace_all(&[
                record("Book A", 1250),
                record("Book B", 799),
                record("Book C", 1000),
                record("Book D", 1),
            ])
            .await
            .unwrap();

        let description = store.read_schema_description().await.unwrap();
        assert!(description.starts_with("CREATE TABLE"));
        assert!(description.contains("price DECIMAL(10, 2)"));
        assert!(description.contains("3 rows from books table:"));
        assert!(description.contains("Book A\t12.50"));
        assert!(description.contains("Book C\t10.00"));
        assert!(!description.contains("Book D"));
    }

    #[tokio::test]
    async fn test_schema_description_without_table() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_db_path(tmp.path().join("catalog.sqlite"));
        let store = CatalogStore::open(&config).await.unwrap();
        let err = store.read_schema_description().await.unwrap_err();
        assert!(matches!(err, PersistenceError::MissingTable(t) if t == "books"));
    }

    #[tokio::test]
    async fn test_verify_schema_does_not_create_table() {
        let tmp = TempDir::new().unwrap();
        let config = Config::with_db_path(tmp.path().join("catalog.sqlite"));
        let store = CatalogStore::open(&config).await.unwrap();

        let err = store.verify_schema().await.unwrap_err();
        assert!(matches!(err, PersistenceError::MissingTable(t) if t == "books"));
        let err = store.verify_schema().await.unwrap_err();
        assert!(matches!(err, PersistenceError::MissingTable(_)));

        store.ensure_schema().await.unwrap();
        store.verify_schema().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_replace_rolls_back_delete() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.replace_all(&[record("Old", 500)]).await.unwrap();

        sqlx::query(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON books \
             WHEN NEW.title = 'Bad' BEGIN SELECT RAISE(ABORT, 'rejected row'); END",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let err = store
            .replace_all(&[record("New", 700), record("Bad", 900)])
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::Database(_)));
        assert_eq!(store.records().await.unwrap(), vec![record("Old", 500)]);
    }

    #[tokio::test]
    async fn test_records_skip_out_of_range_prices() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        store.replace_all(&[record("Good", 1250)]).await.unwrap();
        sqlx::query("INSERT INTO books (title, price) VALUES ('Negative', -3.5)")
            .execute(store.pool())
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
        assert_eq!(store.records().await.unwrap(), vec![record("Good", 1250)]);
    }

    #[test]
    fn test_same_type_ignores_spacing_and_case() {
        assert!(same_type("decimal(10,2)", "DECIMAL(10, 2)"));
        assert!(!same_type("REAL", "DECIMAL(10, 2)"));
    }
}

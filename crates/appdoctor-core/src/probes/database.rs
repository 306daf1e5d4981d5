//! Relational database adapter over the sqlx `Any` driver.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

use super::Database;
use crate::error::{DoctorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Sqlite,
    MySql,
    Postgres,
}

/// Lazily connected pool for the application's default connection.
#[derive(Debug, Clone)]
pub struct SqlxDatabase {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlxDatabase {
    /// Build a pool without connecting; the first query opens the connection.
    pub fn connect_lazy(url: &str, driver: &str, acquire_timeout: Duration) -> Result<Self> {
        let dialect = match driver {
            "sqlite" => Dialect::Sqlite,
            "mysql" | "mariadb" => Dialect::MySql,
            "pgsql" => Dialect::Postgres,
            other => {
                return Err(DoctorError::Probe(format!(
                    "unsupported database driver: {}",
                    other
                )))
            }
        };

        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)
            .map_err(db_error)?;

        Ok(Self { pool, dialect })
    }
}

fn db_error(e: sqlx::Error) -> DoctorError {
    DoctorError::Probe(e.to_string())
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn checked_identifier(table: &str) -> Result<&str> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(table)
    } else {
        Err(DoctorError::Probe(format!("invalid table name: {}", table)))
    }
}

#[async_trait]
impl Database for SqlxDatabase {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        let table = checked_identifier(table)?;
        let sql = match self.dialect {
            Dialect::Sqlite => {
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?"
            }
            Dialect::MySql => {
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?"
            }
            Dialect::Postgres => {
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
            }
        };
        let found: i64 = sqlx::query_scalar(sql)
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(found > 0)
    }

    async fn count(&self, table: &str) -> Result<u64> {
        let table = checked_identifier(table)?;
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let rows: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(checked_identifier("failed_jobs").is_ok());
        assert!(checked_identifier("users; DROP TABLE users").is_err());
        assert!(checked_identifier("").is_err());
    }

    #[test]
    fn test_unsupported_driver_rejected() {
        let err = SqlxDatabase::connect_lazy("sqlsrv://x", "sqlsrv", Duration::from_secs(1))
            .unwrap_err();
        assert!(err.to_string().contains("sqlsrv"));
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("app.sqlite");
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let db = SqlxDatabase::connect_lazy(&url, "sqlite", Duration::from_secs(5)).unwrap();

        db.ping().await.unwrap();
        sqlx::query("CREATE TABLE migrations (id INTEGER PRIMARY KEY, migration TEXT)")
            .execute(&db.pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO migrations (migration) VALUES ('create_users_table')")
            .execute(&db.pool)
            .await
            .unwrap();

        assert!(db.has_table("migrations").await.unwrap());
        assert!(!db.has_table("users").await.unwrap());
        assert_eq!(db.count("migrations").await.unwrap(), 1);
    }
}

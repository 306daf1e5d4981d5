//! Default connection configuration and live database probes.

use crate::error::Result;
use crate::finding::{Findings, Level};
use crate::probes::{bounded, Database};

use super::CheckContext;

/// Tables a stock application ships migrations for.
const COMMON_TABLES: &[&str] = &["users", "password_resets", "failed_jobs"];

pub async fn run(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    let snapshot = ctx.snapshot;

    let Some(name) = snapshot.default_database() else {
        out.add(
            "No Default Database Connection",
            Level::Error,
            "Set DB_CONNECTION in .env file",
        );
        return Ok(());
    };

    let Some(connection) = snapshot.database_connection() else {
        out.add(
            format!("Database Connection '{}' Not Configured", name),
            Level::Error,
            "Check database configuration in config/database.php",
        );
        return Ok(());
    };

    match ctx.collaborators.database.as_deref() {
        Some(db) => {
            match bounded("database ping", ctx.timeout(), db.ping()).await {
                Ok(()) => out.add(
                    format!("Database Connection '{}' Working", name),
                    Level::Ok,
                    "Successfully connected to database",
                ),
                Err(e) => out.add(
                    format!("Database Connection '{}' Failed", name),
                    Level::Critical,
                    format!("Cannot connect to database: {}", e),
                ),
            }
        }
        None => out.add(
            "Database Probe Unavailable",
            Level::Warning,
            format!(
                "No client available for the '{}' driver; connectivity was not tested",
                connection.driver
            ),
        ),
    }

    if snapshot.is_production() && connection.driver == "sqlite" {
        out.add(
            "SQLite Used in Production",
            Level::Warning,
            "Consider using a more robust database system (MySQL, PostgreSQL) for production",
        );
    }

    if let Some(db) = ctx.collaborators.database.as_deref() {
        if let Err(e) = probe_tables(ctx, db, out).await {
            out.add(
                "Database Operations Test Failed",
                Level::Warning,
                format!("Could not test database operations: {}", e),
            );
        }
    }

    out.add(
        "Database Connectivity Check Complete",
        Level::Ok,
        "Database connection validated successfully.",
    );
    Ok(())
}

async fn probe_tables(ctx: &CheckContext<'_>, db: &dyn Database, out: &mut Findings) -> Result<()> {
    let timeout = ctx.timeout();
    let migrations = ctx.snapshot.migrations_table();

    if bounded("migrations table", timeout, db.has_table(migrations)).await? {
        let count = bounded("migrations count", timeout, db.count(migrations)).await?;
        out.add(
            "Database Migrations Table Found",
            Level::Info,
            format!("Found {} migration records", count),
        );
    } else {
        out.add(
            "No Migrations Table Found",
            Level::Warning,
            "Run migrations: php artisan migrate",
        );
    }

    let mut existing = Vec::new();
    for table in COMMON_TABLES {
        if bounded("common tables", timeout, db.has_table(table)).await? {
            existing.push(*table);
        }
    }
    if !existing.is_empty() {
        out.add(
            "Laravel Tables Found",
            Level::Info,
            format!("Found tables: {}", existing.join(", ")),
        );
    }
    Ok(())
}

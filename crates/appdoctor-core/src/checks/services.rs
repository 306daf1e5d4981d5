//! Redis, cache, queue and mail connectivity.

use std::time::Duration;

use chrono::Utc;

use crate::app::MailerConfig;
use crate::error::Result;
use crate::finding::{Findings, Level};
use crate::probes::{bounded, CacheStore};

use super::CheckContext;

/// TTL of the cache round-trip key.
const CACHE_TEST_TTL: Duration = Duration::from_secs(60);
const CACHE_TEST_VALUE: &str = "test_value";

pub async fn run(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    check_redis(ctx, out).await;
    check_cache(ctx, out).await;
    check_queue(ctx, out).await;
    check_mail(ctx, out);

    out.add(
        "Service Connectivity Check Complete",
        Level::Ok,
        "Service connectivity validated successfully.",
    );
    Ok(())
}

async fn check_redis(ctx: &CheckContext<'_>, out: &mut Findings) {
    if !ctx.snapshot.uses_redis() {
        out.add(
            "Redis Not Configured",
            Level::Info,
            "Redis is not being used for cache, sessions, or queues",
        );
        return;
    }

    let Some(redis) = ctx.collaborators.redis.as_deref() else {
        out.add(
            "Redis Connection Failed",
            Level::Error,
            "Cannot connect to Redis: no redis client configured",
        );
        return;
    };

    let timeout = ctx.timeout();
    match bounded("redis ping", timeout, redis.ping()).await {
        Ok(_) => {
            out.add(
                "Redis Connection Working",
                Level::Ok,
                "Successfully connected to Redis server",
            );
            if let Ok(Some(version)) = bounded("redis info", timeout, redis.server_version()).await
            {
                out.add(
                    "Redis Server Info",
                    Level::Info,
                    format!("Redis version: {}", version),
                );
            }
        }
        Err(e) => out.add(
            "Redis Connection Failed",
            Level::Error,
            format!("Cannot connect to Redis: {}", e),
        ),
    }
}

/// Key used for one cache round trip.
pub fn cache_test_key(now_secs: i64) -> String {
    format!("appdoctor_test_{}", now_secs)
}

async fn cache_round_trip(ctx: &CheckContext<'_>, cache: &dyn CacheStore) -> Result<bool> {
    let timeout = ctx.timeout();
    let key = cache_test_key(Utc::now().timestamp());

    bounded(
        "cache put",
        timeout,
        cache.put(&key, CACHE_TEST_VALUE, CACHE_TEST_TTL),
    )
    .await?;
    let retrieved = bounded("cache get", timeout, cache.get(&key)).await?;

    if retrieved.as_deref() == Some(CACHE_TEST_VALUE) {
        bounded("cache forget", timeout, cache.forget(&key)).await?;
        Ok(true)
    } else {
        Ok(false)
    }
}

async fn check_cache(ctx: &CheckContext<'_>, out: &mut Findings) {
    let Some(store) = ctx.snapshot.cache_store() else {
        out.add(
            "Cache Driver Not Set",
            Level::Warning,
            "Set CACHE_DRIVER in .env file",
        );
        return;
    };

    let Some(cache) = ctx.collaborators.cache.as_deref() else {
        out.add(
            "Cache Store Not Probed",
            Level::Info,
            format!(
                "No client available for the '{}' cache store; round trip skipped",
                store
            ),
        );
        return;
    };

    match cache_round_trip(ctx, cache).await {
        Ok(true) => out.add(
            format!("Cache System Working ({})", store),
            Level::Ok,
            "Cache read/write operations successful",
        ),
        Ok(false) => out.add(
            "Cache System Not Working",
            Level::Error,
            "Cache read/write test failed",
        ),
        Err(e) => out.add(
            "Cache System Check Failed",
            Level::Error,
            format!("Cache system error: {}", e),
        ),
    }
}

async fn check_queue(ctx: &CheckContext<'_>, out: &mut Findings) {
    let Some(connection) = ctx.snapshot.queue_connection() else {
        out.add(
            "Queue Connection Not Set",
            Level::Warning,
            "Set QUEUE_CONNECTION in .env file",
        );
        return;
    };

    let driver = match bounded(
        "queue resolve",
        ctx.timeout(),
        ctx.collaborators.queue.resolve(connection),
    )
    .await
    {
        Ok(driver) => driver,
        Err(e) => {
            out.add(
                format!("Queue Connection '{}' Not Configured", connection),
                Level::Error,
                format!("Check queue configuration in config/queue.php ({})", e),
            );
            return;
        }
    };

    out.add(
        format!("Queue Connection Working ({})", connection),
        Level::Ok,
        "Queue connection resolved successfully",
    );

    if driver == "database" {
        check_failed_jobs(ctx, out).await;
    }
}

async fn check_failed_jobs(ctx: &CheckContext<'_>, out: &mut Findings) {
    let Some(db) = ctx.collaborators.database.as_deref() else {
        return;
    };
    let timeout = ctx.timeout();

    let result: Result<Option<u64>> = async {
        if !bounded("failed jobs table", timeout, db.has_table("failed_jobs")).await? {
            return Ok(None);
        }
        Ok(Some(
            bounded("failed jobs count", timeout, db.count("failed_jobs")).await?,
        ))
    }
    .await;

    match result {
        Ok(Some(0)) => out.add(
            "No Failed Jobs",
            Level::Ok,
            "Queue is running without failed jobs",
        ),
        Ok(Some(n)) => out.add(
            "Failed Jobs Found",
            Level::Warning,
            format!(
                "Found {} failed jobs. Review with: php artisan queue:failed",
                n
            ),
        ),
        Ok(None) => {}
        Err(e) => out.add(
            "Failed Jobs Check Error",
            Level::Warning,
            format!("Could not check failed jobs: {}", e),
        ),
    }
}

/// Names of the SMTP fields that are unset.
pub fn missing_smtp_fields(mailer: &MailerConfig) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if mailer.host.is_none() {
        missing.push("host");
    }
    if mailer.port.is_none() {
        missing.push("port");
    }
    if mailer.username.is_none() {
        missing.push("username");
    }
    if mailer.password.is_none() {
        missing.push("password");
    }
    missing
}

fn check_mail(ctx: &CheckContext<'_>, out: &mut Findings) {
    let Some(name) = ctx.snapshot.mailer_name() else {
        out.add(
            "Mail Mailer Not Set",
            Level::Warning,
            "Set MAIL_MAILER in .env file",
        );
        return;
    };

    let Some(mailer) = ctx.snapshot.mailer() else {
        out.add(
            format!("Mail Mailer '{}' Not Configured", name),
            Level::Error,
            "Check mail configuration in config/mail.php",
        );
        return;
    };

    out.add(
        format!("Mail Configuration Found ({})", name),
        Level::Ok,
        "Mail system is configured",
    );

    if mailer.name != "smtp" {
        return;
    }

    let missing = missing_smtp_fields(&mailer);
    if !missing.is_empty() {
        out.add(
            "SMTP Configuration Incomplete",
            Level::Warning,
            format!("Missing SMTP fields: {}", missing.join(", ")),
        );
    }

    if mailer.encryption.is_none() && mailer.port != Some(25) {
        out.add(
            "SMTP Encryption Not Set",
            Level::Warning,
            "Consider using TLS or SSL encryption for SMTP",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::test_support::{advice_of, level_of, messages, Harness};
    use crate::probes::fakes::{FakeKit, FakeRedis, MemoryCacheStore, MemoryDatabase};
    use std::sync::Arc;
    use tempfile::TempDir;

    const SMTP_ENV: &[(&str, &str)] = &[
        ("CACHE_DRIVER", "file"),
        ("QUEUE_CONNECTION", "sync"),
        ("MAIL_MAILER", "smtp"),
        ("MAIL_HOST", "smtp.mailtrap.io"),
        ("MAIL_PORT", "2525"),
        ("MAIL_USERNAME", "user"),
        ("MAIL_PASSWORD", "secret"),
        ("MAIL_ENCRYPTION", "tls"),
    ];

    #[tokio::test]
    async fn test_healthy_services() {
        let dir = TempDir::new().unwrap();
        let kit = FakeKit::healthy();
        let harness = Harness::with_kit(dir.path(), SMTP_ENV, &kit);
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();

        assert_eq!(
            messages(&out),
            vec![
                "Redis Not Configured",
                "Cache System Working (file)",
                "Queue Connection Working (sync)",
                "Mail Configuration Found (smtp)",
                "Service Connectivity Check Complete",
            ]
        );
        let cache = kit.cache.as_ref().unwrap();
        let writes = cache.writes();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].0.starts_with("appdoctor_test_"));
        assert_eq!(writes[0].1, Duration::from_secs(60));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_failures() {
        let dir = TempDir::new().unwrap();
        let mut kit = FakeKit::healthy();
        kit.cache = Some(Arc::new(MemoryCacheStore::lossy()));
        let harness = Harness::with_kit(dir.path(), SMTP_ENV, &kit);
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();
        assert_eq!(level_of(&out, "Cache System Not Working"), Some(Level::Error));

        kit.cache = Some(Arc::new(MemoryCacheStore::broken()));
        let harness = Harness::with_kit(dir.path(), SMTP_ENV, &kit);
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();
        assert_eq!(level_of(&out, "Cache System Check Failed"), Some(Level::Error));
    }

    #[tokio::test]
    async fn test_redis_probe() {
        let dir = TempDir::new().unwrap();
        let mut kit = FakeKit::healthy();
        kit.redis = Some(Arc::new(FakeRedis::new("7.2.4")));
        let env = [("CACHE_DRIVER", "redis")];
        let harness = Harness::with_kit(dir.path(), &env, &kit);
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();
        assert_eq!(level_of(&out, "Redis Connection Working"), Some(Level::Ok));
        assert_eq!(
            advice_of(&out, "Redis Server Info").unwrap(),
            "Redis version: 7.2.4"
        );

        kit.redis = Some(Arc::new(FakeRedis::unreachable()));
        let harness = Harness::with_kit(dir.path(), &env, &kit);
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();
        assert_eq!(level_of(&out, "Redis Connection Failed"), Some(Level::Error));
    }

    #[tokio::test]
    async fn test_database_queue_reports_failed_jobs() {
        let dir = TempDir::new().unwrap();
        let mut kit = FakeKit::healthy();
        kit.database = Some(Arc::new(MemoryDatabase::new().with_table("failed_jobs", 4)));
        let harness = Harness::with_kit(dir.path(), &[("QUEUE_CONNECTION", "database")], &kit);
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();
        assert_eq!(
            advice_of(&out, "Failed Jobs Found").unwrap(),
            "Found 4 failed jobs. Review with: php artisan queue:failed"
        );
    }

    #[tokio::test]
    async fn test_unknown_queue_connection() {
        let dir = TempDir::new().unwrap();
        let harness = Harness::new(dir.path(), &[("QUEUE_CONNECTION", "rabbitmq")]);
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();
        assert_eq!(
            level_of(&out, "Queue Connection 'rabbitmq' Not Configured"),
            Some(Level::Error)
        );
    }

    #[tokio::test]
    async fn test_incomplete_smtp() {
        let dir = TempDir::new().unwrap();
        let harness = Harness::new(
            dir.path(),
            &[("MAIL_MAILER", "smtp"), ("MAIL_HOST", "mail.test")],
        );
        let mut out = Findings::new();
        run(&harness.ctx(), &mut out).await.unwrap();
        assert_eq!(
            advice_of(&out, "SMTP Configuration Incomplete").unwrap(),
            "Missing SMTP fields: port, username, password"
        );
        assert_eq!(
            level_of(&out, "SMTP Encryption Not Set"),
            Some(Level::Warning)
        );
        assert_eq!(level_of(&out, "Cache Driver Not Set"), Some(Level::Warning));
        assert_eq!(level_of(&out, "Queue Connection Not Set"), Some(Level::Warning));
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(cache_test_key(1700000000), "appdoctor_test_1700000000");
    }
}

//! Collaborator interfaces used by the checks and dispatchers.
//!
//! - `Database`: connectivity, schema introspection and row counts
//! - `CacheStore`: put/get/forget with TTL
//! - `RedisProbe`: ping and server version of a redis-like store
//! - `QueueResolver`: resolve a queue connection to its driver
//! - `ProcessRunner`: invoke external tools and capture output
//! - `Mailer`: plain-text mail delivery
//! - `WebhookClient`: JSON POST
//!
//! Production adapters live in the submodules; in-memory fakes live in
//! [`fakes`].

pub mod cache;
pub mod database;
pub mod fakes;
pub mod http;
pub mod mail;
pub mod process;
pub mod queue;
pub mod redis;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::app::AppSnapshot;
use crate::config::DoctorSettings;
use crate::error::{DoctorError, Result};

pub use cache::{ArrayCacheStore, FileCacheStore};
pub use database::SqlxDatabase;
pub use http::ReqwestWebhookClient;
pub use mail::SendmailMailer;
pub use process::SystemProcessRunner;
pub use queue::DriverQueueResolver;
pub use redis::RespClient;

#[async_trait]
pub trait Database: Send + Sync {
    /// Run a trivial query against the default connection.
    async fn ping(&self) -> Result<()>;

    async fn has_table(&self, table: &str) -> Result<bool>;

    /// Row count of `table`.
    async fn count(&self, table: &str) -> Result<u64>;
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn forget(&self, key: &str) -> Result<()>;
}

#[async_trait]
pub trait RedisProbe: Send + Sync {
    /// Returns the server's reply, normally `PONG`.
    async fn ping(&self) -> Result<String>;

    async fn server_version(&self) -> Result<Option<String>>;
}

#[async_trait]
pub trait QueueResolver: Send + Sync {
    /// Resolve `connection` and return its driver name.
    async fn resolve(&self, connection: &str) -> Result<String>;
}

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput>;

    /// Whether `program` can be found (absolute path or on `PATH`).
    fn exists(&self, program: &str) -> bool;
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Status and body returned by a webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub body: String,
}

impl WebhookResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait WebhookClient: Send + Sync {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<WebhookResponse>;
}

/// Await `fut` for at most `limit`; elapse becomes [`DoctorError::ProbeTimeout`].
pub async fn bounded<T, F>(probe: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(probe, secs = limit.as_secs(), "probe timed out");
            Err(DoctorError::ProbeTimeout {
                probe: probe.to_string(),
                secs: limit.as_secs(),
            })
        }
    }
}

/// Collaborator handles injected into the engine.
///
/// Optional handles are `None` when the application does not use the
/// corresponding backend or no adapter exists for it.
#[derive(Clone)]
pub struct Collaborators {
    pub database: Option<Arc<dyn Database>>,
    pub cache: Option<Arc<dyn CacheStore>>,
    pub redis: Option<Arc<dyn RedisProbe>>,
    pub queue: Arc<dyn QueueResolver>,
    pub process: Arc<dyn ProcessRunner>,
    pub mailer: Arc<dyn Mailer>,
    pub webhooks: Arc<dyn WebhookClient>,
}

impl Collaborators {
    /// Real adapters for the application described by `snapshot`.
    pub fn production(snapshot: &AppSnapshot, settings: &DoctorSettings) -> Result<Self> {
        let timeout = settings.probes.timeout();

        let database: Option<Arc<dyn Database>> = match snapshot.database_connection() {
            Some(conn) => match conn.url(snapshot.layout.base()) {
                Some(url) => match SqlxDatabase::connect_lazy(&url, &conn.driver, timeout) {
                    Ok(db) => Some(Arc::new(db) as Arc<dyn Database>),
                    Err(e) => {
                        warn!(driver = %conn.driver, error = %e, "database adapter unavailable");
                        None
                    }
                },
                None => None,
            },
            None => None,
        };

        let (redis_host, redis_port) = snapshot.redis_address();
        let redis_password = snapshot.env.get("REDIS_PASSWORD").map(str::to_string);
        let resp = Arc::new(RespClient::new(redis_host, redis_port, redis_password));

        let cache: Option<Arc<dyn CacheStore>> = match snapshot.cache_store() {
            Some("redis") => Some(resp.clone() as Arc<dyn CacheStore>),
            Some("file") => Some(Arc::new(FileCacheStore::new(
                snapshot.layout.storage_path().join("framework/cache/data"),
            ))),
            Some("array") => Some(Arc::new(ArrayCacheStore::new())),
            other => {
                debug!(store = ?other, "no cache adapter for store");
                None
            }
        };

        let redis: Option<Arc<dyn RedisProbe>> = if snapshot.uses_redis() {
            Some(resp as Arc<dyn RedisProbe>)
        } else {
            None
        };

        let from = snapshot.env.get("MAIL_FROM_ADDRESS").map(str::to_string);

        Ok(Self {
            database,
            cache,
            redis,
            queue: Arc::new(DriverQueueResolver::new()),
            process: Arc::new(SystemProcessRunner::new()),
            mailer: Arc::new(SendmailMailer::new(from)),
            webhooks: Arc::new(ReqwestWebhookClient::new(timeout)?),
        })
    }
}

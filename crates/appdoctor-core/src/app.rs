//! Snapshot of the inspected application: paths, `.env` values and the
//! framework configuration derived from them.
//!
//! Checks read only from an [`AppSnapshot`]; nothing in the engine consults
//! process-wide state directly, so tests can build a snapshot by hand.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use urlencoding::encode;

use crate::config::parse_flag;

/// Keys the checks read even when the `.env` file does not mention them.
const FRAMEWORK_KEYS: &[&str] = &[
    "APP_ENV",
    "APP_KEY",
    "APP_DEBUG",
    "APP_URL",
    "APP_NAME",
    "DB_CONNECTION",
    "DB_HOST",
    "DB_PORT",
    "DB_DATABASE",
    "DB_USERNAME",
    "DB_PASSWORD",
    "DB_MIGRATIONS_TABLE",
    "CACHE_DRIVER",
    "CACHE_STORE",
    "SESSION_DRIVER",
    "SESSION_LIFETIME",
    "SESSION_SECURE_COOKIE",
    "SESSION_HTTP_ONLY",
    "QUEUE_CONNECTION",
    "MAIL_MAILER",
    "MAIL_DRIVER",
    "MAIL_HOST",
    "MAIL_PORT",
    "MAIL_USERNAME",
    "MAIL_PASSWORD",
    "MAIL_ENCRYPTION",
    "MAIL_FROM_ADDRESS",
    "REDIS_HOST",
    "REDIS_PORT",
    "REDIS_PASSWORD",
    "DEBUGBAR_ENABLED",
    "TELESCOPE_ENABLED",
];

/// Well-known directories of a Laravel-style project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLayout {
    base: PathBuf,
}

impl AppLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn base_path(&self, rel: &str) -> PathBuf {
        self.base.join(rel)
    }

    pub fn public_path(&self) -> PathBuf {
        self.base.join("public")
    }

    pub fn storage_path(&self) -> PathBuf {
        self.base.join("storage")
    }

    pub fn app_path(&self) -> PathBuf {
        self.base.join("app")
    }

    pub fn env_file(&self) -> PathBuf {
        self.base.join(".env")
    }

    pub fn log_file(&self) -> PathBuf {
        self.base.join("storage/logs/laravel.log")
    }

    pub fn composer_json(&self) -> PathBuf {
        self.base.join("composer.json")
    }

    pub fn composer_lock(&self) -> PathBuf {
        self.base.join("composer.lock")
    }
}

/// Key/value view of the application environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Read a dotenv file, then let real environment values win for every
    /// key the file defines and every key the checks read.
    pub fn load(env_file: &Path, process: &dyn Fn(&str) -> Option<String>) -> Self {
        let mut vars = BTreeMap::new();

        if env_file.is_file() {
            match dotenvy::from_path_iter(env_file) {
                Ok(iter) => {
                    for item in iter {
                        match item {
                            Ok((key, value)) => {
                                vars.insert(key, value);
                            }
                            Err(e) => warn!(error = %e, "skipping malformed .env line"),
                        }
                    }
                }
                Err(e) => warn!(path = %env_file.display(), error = %e, "cannot parse .env"),
            }
        }

        let keys: BTreeSet<String> = vars
            .keys()
            .cloned()
            .chain(FRAMEWORK_KEYS.iter().map(|k| (*k).to_string()))
            .collect();
        for key in keys {
            if let Some(value) = process(&key) {
                vars.insert(key, value);
            }
        }

        debug!(keys = vars.len(), "environment snapshot loaded");
        Self { vars }
    }

    /// Non-empty value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty() && *v != "null" && *v != "(null)")
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(parse_flag)
    }

    pub fn flag_or(&self, key: &str, default: bool) -> bool {
        self.get(key).map(parse_flag).unwrap_or(default)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }
}

/// Host operating system family, used for ownership and process checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

/// Default database connection as the framework would resolve it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConnection {
    pub name: String,
    pub driver: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl DatabaseConnection {
    /// Connection URL understood by the sqlx `Any` driver.
    ///
    /// Credentials and the database name are percent-encoded; the host is
    /// taken as-is.
    pub fn url(&self, base: &Path) -> Option<String> {
        let host = self.host.as_deref().unwrap_or("127.0.0.1");
        let db = self.database.as_deref().unwrap_or_default();
        let credentials = match (&self.username, &self.password) {
            (Some(u), Some(p)) => format!("{}:{}@", encode(u), encode(p)),
            (Some(u), None) => format!("{}@", encode(u)),
            _ => String::new(),
        };
        match self.driver.as_str() {
            "sqlite" => {
                let path = if db.is_empty() {
                    base.join("database/database.sqlite")
                } else if Path::new(db).is_absolute() {
                    PathBuf::from(db)
                } else {
                    base.join(db)
                };
                Some(format!("sqlite://{}", path.display()))
            }
            "mysql" | "mariadb" => Some(format!(
                "mysql://{}{}:{}/{}",
                credentials,
                host,
                self.port.unwrap_or(3306),
                encode(db)
            )),
            "pgsql" => Some(format!(
                "postgres://{}{}:{}/{}",
                credentials,
                host,
                self.port.unwrap_or(5432),
                encode(db)
            )),
            _ => None,
        }
    }
}

/// SMTP-style fields of the default mailer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailerConfig {
    pub name: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub encryption: Option<String>,
}

/// Everything the checks need to know about the inspected application.
#[derive(Debug, Clone)]
pub struct AppSnapshot {
    pub layout: AppLayout,
    pub env: EnvSnapshot,
    pub platform: Platform,
    pub server_name: String,
    /// Composer packages recorded in `composer.lock`.
    pub packages: BTreeSet<String>,
}

const DATABASE_DRIVERS: &[&str] = &["sqlite", "mysql", "mariadb", "pgsql", "sqlsrv"];
const QUEUE_DRIVERS: &[&str] = &["sync", "database", "beanstalkd", "sqs", "redis", "null"];
const MAILERS: &[&str] = &[
    "smtp", "ses", "postmark", "mailgun", "resend", "sendmail", "log", "array", "failover",
    "roundrobin",
];

impl AppSnapshot {
    /// Build a snapshot for the application rooted at `base`.
    pub fn capture(base: impl Into<PathBuf>, process: &dyn Fn(&str) -> Option<String>) -> Self {
        let layout = AppLayout::new(base);
        let env = EnvSnapshot::load(&layout.env_file(), process);
        let packages = read_installed_packages(&layout.composer_lock());
        let server_name = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "Unknown".to_string());

        Self {
            layout,
            env,
            platform: Platform::current(),
            server_name,
            packages,
        }
    }

    /// Snapshot from explicit parts (tests, embedding).
    pub fn from_parts(layout: AppLayout, env: EnvSnapshot) -> Self {
        let packages = read_installed_packages(&layout.composer_lock());
        Self {
            layout,
            env,
            platform: Platform::current(),
            server_name: "localhost".to_string(),
            packages,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn environment_name(&self) -> &str {
        self.env.get_or("APP_ENV", "Unknown")
    }

    pub fn is_production(&self) -> bool {
        self.env.get("APP_ENV") == Some("production")
    }

    pub fn has_package(&self, name: &str) -> bool {
        self.packages.contains(name)
    }

    /// Name of the default database connection, if any.
    pub fn default_database(&self) -> Option<&str> {
        self.env.get("DB_CONNECTION")
    }

    /// Resolved settings for the default connection; `None` when the name
    /// does not match a known connection.
    pub fn database_connection(&self) -> Option<DatabaseConnection> {
        let name = self.default_database()?;
        if !DATABASE_DRIVERS.contains(&name) {
            return None;
        }
        Some(DatabaseConnection {
            name: name.to_string(),
            driver: name.to_string(),
            host: self.env.get("DB_HOST").map(str::to_string),
            port: self.env.get("DB_PORT").and_then(|p| p.parse().ok()),
            database: self.env.get("DB_DATABASE").map(str::to_string),
            username: self.env.get("DB_USERNAME").map(str::to_string),
            password: self.env.get("DB_PASSWORD").map(str::to_string),
        })
    }

    pub fn migrations_table(&self) -> &str {
        self.env.get_or("DB_MIGRATIONS_TABLE", "migrations")
    }

    /// Default cache store (`CACHE_STORE`, falling back to `CACHE_DRIVER`).
    pub fn cache_store(&self) -> Option<&str> {
        self.env
            .get("CACHE_STORE")
            .or_else(|| self.env.get("CACHE_DRIVER"))
    }

    pub fn session_driver(&self) -> Option<&str> {
        self.env.get("SESSION_DRIVER")
    }

    pub fn session_secure(&self) -> bool {
        self.env.flag_or("SESSION_SECURE_COOKIE", false)
    }

    pub fn session_http_only(&self) -> bool {
        self.env.flag_or("SESSION_HTTP_ONLY", true)
    }

    /// Session lifetime in minutes.
    pub fn session_lifetime(&self) -> u64 {
        self.env
            .get("SESSION_LIFETIME")
            .and_then(|v| v.parse().ok())
            .unwrap_or(120)
    }

    pub fn queue_connection(&self) -> Option<&str> {
        self.env.get("QUEUE_CONNECTION")
    }

    /// Driver behind the default queue connection, if it is a known one.
    pub fn queue_driver(&self) -> Option<&str> {
        self.queue_connection()
            .filter(|name| QUEUE_DRIVERS.contains(name))
    }

    pub fn mailer_name(&self) -> Option<&str> {
        self.env
            .get("MAIL_MAILER")
            .or_else(|| self.env.get("MAIL_DRIVER"))
    }

    /// Resolved mailer settings; `None` when the mailer is unknown.
    pub fn mailer(&self) -> Option<MailerConfig> {
        let name = self.mailer_name()?;
        if !MAILERS.contains(&name) {
            return None;
        }
        Some(MailerConfig {
            name: name.to_string(),
            host: self.env.get("MAIL_HOST").map(str::to_string),
            port: self.env.get("MAIL_PORT").and_then(|p| p.parse().ok()),
            username: self.env.get("MAIL_USERNAME").map(str::to_string),
            password: self.env.get("MAIL_PASSWORD").map(str::to_string),
            encryption: self.env.get("MAIL_ENCRYPTION").map(str::to_string),
        })
    }

    /// Whether redis backs the cache, the session store or the queue.
    pub fn uses_redis(&self) -> bool {
        self.cache_store() == Some("redis")
            || self.session_driver() == Some("redis")
            || self.queue_driver() == Some("redis")
    }

    pub fn redis_address(&self) -> (String, u16) {
        let host = self.env.get_or("REDIS_HOST", "127.0.0.1").to_string();
        let port = self
            .env
            .get("REDIS_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(6379);
        (host, port)
    }

    /// Debugbar follows `APP_DEBUG` unless `DEBUGBAR_ENABLED` is set.
    pub fn debugbar_enabled(&self) -> bool {
        self.env
            .get("DEBUGBAR_ENABLED")
            .map(parse_flag)
            .unwrap_or_else(|| self.env.flag("APP_DEBUG"))
    }

    pub fn telescope_enabled(&self) -> bool {
        self.env.flag_or("TELESCOPE_ENABLED", true)
    }
}

#[derive(Debug, Deserialize)]
struct ComposerLock {
    #[serde(default)]
    packages: Vec<LockedPackage>,
    #[serde(default, rename = "packages-dev")]
    packages_dev: Vec<LockedPackage>,
}

#[derive(Debug, Deserialize)]
struct LockedPackage {
    name: String,
}

/// Package names listed in `composer.lock`; empty when the file is absent
/// or unreadable.
pub fn read_installed_packages(lock_path: &Path) -> BTreeSet<String> {
    let Ok(raw) = std::fs::read_to_string(lock_path) else {
        return BTreeSet::new();
    };
    match serde_json::from_str::<ComposerLock>(&raw) {
        Ok(lock) => lock
            .packages
            .into_iter()
            .chain(lock.packages_dev)
            .map(|p| p.name)
            .collect(),
        Err(e) => {
            warn!(path = %lock_path.display(), error = %e, "cannot parse composer.lock");
            BTreeSet::new()
        }
    }
}

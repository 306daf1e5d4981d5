//! In-memory fakes for the collaborator traits (testing only)
//!
//! Each fake records what it was asked to do so tests can assert on calls
//! without a database, network or external binaries.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::*;
use crate::error::{DoctorError, Result};

// ---------------------------------------------------------------------------
// MemoryDatabase
// ---------------------------------------------------------------------------

/// Table name to row count; `unreachable` makes every call fail.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    tables: Mutex<HashMap<String, u64>>,
    unreachable: Option<String>,
    delay: Option<Duration>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, name: &str, rows: u64) -> Self {
        self.tables.lock().unwrap().insert(name.to_string(), rows);
        self
    }

    pub fn unreachable(mut self, reason: &str) -> Self {
        self.unreachable = Some(reason.to_string());
        self
    }

    /// Sleep before answering, to exercise probe timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn gate(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.unreachable {
            Some(reason) => Err(DoctorError::Probe(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn ping(&self) -> Result<()> {
        self.gate().await
    }

    async fn has_table(&self, table: &str) -> Result<bool> {
        self.gate().await?;
        Ok(self.tables.lock().unwrap().contains_key(table))
    }

    async fn count(&self, table: &str) -> Result<u64> {
        self.gate().await?;
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .copied()
            .ok_or_else(|| DoctorError::Probe(format!("no such table: {}", table)))
    }
}

// ---------------------------------------------------------------------------
// MemoryCacheStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, String>>,
    written: Mutex<Vec<(String, Duration)>>,
    broken: bool,
    lossy: bool,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every operation fails.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    /// Writes succeed but are never readable.
    pub fn lossy() -> Self {
        Self {
            lossy: true,
            ..Self::default()
        }
    }

    /// Keys and TTLs passed to `put`, in call order.
    pub fn writes(&self) -> Vec<(String, Duration)> {
        self.written.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<()> {
        if self.broken {
            Err(DoctorError::Probe("cache store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check()?;
        self.written.lock().unwrap().push((key.to_string(), ttl));
        if !self.lossy {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check()?;
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        self.check()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeRedis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FakeRedis {
    version: Option<String>,
    unreachable: bool,
}

impl FakeRedis {
    pub fn new(version: &str) -> Self {
        Self {
            version: Some(version.to_string()),
            unreachable: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            version: None,
            unreachable: true,
        }
    }
}

#[async_trait]
impl RedisProbe for FakeRedis {
    async fn ping(&self) -> Result<String> {
        if self.unreachable {
            return Err(DoctorError::Probe("Connection refused".to_string()));
        }
        Ok("PONG".to_string())
    }

    async fn server_version(&self) -> Result<Option<String>> {
        if self.unreachable {
            return Err(DoctorError::Probe("Connection refused".to_string()));
        }
        Ok(self.version.clone())
    }
}

// ---------------------------------------------------------------------------
// ScriptedProcessRunner
// ---------------------------------------------------------------------------

/// Answers commands from a script keyed by the full command line
/// (`"program arg1 arg2"`). Unscripted commands fail as if the program
/// were missing.
#[derive(Debug, Default)]
pub struct ScriptedProcessRunner {
    script: Mutex<HashMap<String, ProcessOutput>>,
    available: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

/// Shorthand for a finished process.
pub fn output(status: i32, stdout: &str) -> ProcessOutput {
    ProcessOutput {
        status: Some(status),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

impl ScriptedProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the output for an exact command line; the program also
    /// becomes available.
    pub fn on(self, command: &str, out: ProcessOutput) -> Self {
        if let Some(program) = command.split_whitespace().next() {
            self.available.lock().unwrap().insert(program.to_string());
        }
        self.script.lock().unwrap().insert(command.to_string(), out);
        self
    }

    /// Mark a program as present without scripting any command.
    pub fn with_program(self, program: &str) -> Self {
        self.available.lock().unwrap().insert(program.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        _cwd: &Path,
        _timeout: Duration,
    ) -> Result<ProcessOutput> {
        let line = command_line(program, args);
        self.calls.lock().unwrap().push(line.clone());
        self.script
            .lock()
            .unwrap()
            .get(&line)
            .cloned()
            .ok_or_else(|| DoctorError::Probe(format!("cannot start {}: not found", program)))
    }

    fn exists(&self, program: &str) -> bool {
        self.available.lock().unwrap().contains(program)
    }
}

// ---------------------------------------------------------------------------
// RecordingMailer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    failure: Option<String>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        if let Some(reason) = &self.failure {
            return Err(DoctorError::Probe(reason.clone()));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingWebhookClient
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RecordingWebhookClient {
    requests: Mutex<Vec<(String, Value)>>,
    status: u16,
    transport_error: bool,
}

impl Default for RecordingWebhookClient {
    fn default() -> Self {
        Self::responding(200)
    }
}

impl RecordingWebhookClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responding(status: u16) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            status,
            transport_error: false,
        }
    }

    /// Every POST fails before a response arrives.
    pub fn unreachable() -> Self {
        Self {
            transport_error: true,
            ..Self::default()
        }
    }

    /// URL and payload of every POST, in call order.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookClient for RecordingWebhookClient {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<WebhookResponse> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        if self.transport_error {
            return Err(DoctorError::Probe("connection reset by peer".to_string()));
        }
        Ok(WebhookResponse {
            status: self.status,
            body: String::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// FakeKit
// ---------------------------------------------------------------------------

/// A full set of fakes; replace fields before calling [`FakeKit::collaborators`].
pub struct FakeKit {
    pub database: Option<Arc<MemoryDatabase>>,
    pub cache: Option<Arc<MemoryCacheStore>>,
    pub redis: Option<Arc<FakeRedis>>,
    pub queue: Arc<DriverQueueResolver>,
    pub process: Arc<ScriptedProcessRunner>,
    pub mailer: Arc<RecordingMailer>,
    pub webhooks: Arc<RecordingWebhookClient>,
}

impl FakeKit {
    /// A reachable database with the common framework tables, a working
    /// cache, no redis and no external tools.
    pub fn healthy() -> Self {
        let database = MemoryDatabase::new()
            .with_table("migrations", 12)
            .with_table("users", 3)
            .with_table("password_resets", 0)
            .with_table("failed_jobs", 0);
        Self {
            database: Some(Arc::new(database)),
            cache: Some(Arc::new(MemoryCacheStore::new())),
            redis: None,
            queue: Arc::new(DriverQueueResolver::new()),
            process: Arc::new(ScriptedProcessRunner::new()),
            mailer: Arc::new(RecordingMailer::new()),
            webhooks: Arc::new(RecordingWebhookClient::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            database: self
                .database
                .clone()
                .map(|d| d as Arc<dyn Database>),
            cache: self.cache.clone().map(|c| c as Arc<dyn CacheStore>),
            redis: self.redis.clone().map(|r| r as Arc<dyn RedisProbe>),
            queue: self.queue.clone(),
            process: self.process.clone(),
            mailer: self.mailer.clone(),
            webhooks: self.webhooks.clone(),
        }
    }
}

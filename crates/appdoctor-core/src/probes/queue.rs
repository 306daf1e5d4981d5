use async_trait::async_trait;

use super::QueueResolver;
use crate::error::{DoctorError, Result};

/// Queue connections shipped with the framework's default configuration;
/// each connection is named after its driver.
pub const KNOWN_QUEUE_DRIVERS: &[&str] =
    &["sync", "database", "beanstalkd", "sqs", "redis", "null"];

/// Resolves connections against the known driver list.
#[derive(Debug, Clone)]
pub struct DriverQueueResolver {
    drivers: Vec<String>,
}

impl DriverQueueResolver {
    pub fn new() -> Self {
        Self::with_drivers(KNOWN_QUEUE_DRIVERS.iter().copied())
    }

    pub fn with_drivers<'a>(drivers: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            drivers: drivers.into_iter().map(str::to_string).collect(),
        }
    }
}

impl Default for DriverQueueResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueResolver for DriverQueueResolver {
    async fn resolve(&self, connection: &str) -> Result<String> {
        self.drivers
            .iter()
            .find(|d| d.as_str() == connection)
            .cloned()
            .ok_or_else(|| {
                DoctorError::Probe(format!("Queue connection [{}] is not defined.", connection))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_connection_resolves() {
        let resolver = DriverQueueResolver::new();
        assert_eq!(resolver.resolve("redis").await.unwrap(), "redis");
    }

    #[tokio::test]
    async fn test_unknown_connection_fails() {
        let resolver = DriverQueueResolver::new();
        let err = resolver.resolve("rabbitmq").await.unwrap_err();
        assert!(err.to_string().contains("rabbitmq"));
    }
}

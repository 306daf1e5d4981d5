//! Mail delivery through the local `sendmail` binary.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

use super::Mailer;
use crate::error::{DoctorError, Result};

#[derive(Debug, Clone)]
pub struct SendmailMailer {
    program: String,
    from: Option<String>,
}

impl SendmailMailer {
    pub fn new(from: Option<String>) -> Self {
        Self {
            program: "sendmail".to_string(),
            from,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

/// Build an RFC 5322 plain-text message; header values are stripped of line
/// breaks.
pub fn compose_message(from: Option<&str>, to: &str, subject: &str, body: &str) -> String {
    let clean = |s: &str| s.replace(['\r', '\n'], " ");
    let mut msg = String::new();
    if let Some(from) = from {
        msg.push_str(&format!("From: {}\r\n", clean(from)));
    }
    msg.push_str(&format!("To: {}\r\n", clean(to)));
    msg.push_str(&format!("Subject: {}\r\n", clean(subject)));
    msg.push_str("MIME-Version: 1.0\r\n");
    msg.push_str("Content-Type: text/plain; charset=utf-8\r\n\r\n");
    msg.push_str(&body.replace('\n', "\r\n"));
    msg.push_str("\r\n");
    msg
}

#[async_trait]
impl Mailer for SendmailMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let message = compose_message(self.from.as_deref(), to, subject, body);

        let mut child = Command::new(&self.program)
            .args(["-t", "-i"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DoctorError::Probe(format!("cannot start {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(message.as_bytes()).await {
                warn!(error = %e, "{} closed stdin early", self.program);
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(DoctorError::Probe(format!(
                "{} exited with {:?}: {}",
                self.program,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!(to, "alert mail handed to {}", self.program);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_message_headers() {
        let msg = compose_message(
            Some("doctor@example.com"),
            "ops@example.com",
            "App Doctor Alert: 2 Critical Issues Found",
            "line one\nline two",
        );
        assert!(msg.starts_with("From: doctor@example.com\r\n"));
        assert!(msg.contains("To: ops@example.com\r\n"));
        assert!(msg.contains("Subject: App Doctor Alert: 2 Critical Issues Found\r\n"));
        assert!(msg.ends_with("line one\r\nline two\r\n"));
    }

    #[test]
    fn test_header_injection_is_neutralised() {
        let msg = compose_message(None, "ops@example.com\nBcc: evil@example.com", "s", "b");
        assert!(!msg.contains("\nBcc:"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_sendmail_is_error() {
        let mailer = SendmailMailer::new(None).with_program("false");
        let err = mailer.send("ops@example.com", "s", "b").await.unwrap_err();
        assert!(matches!(err, DoctorError::Probe(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_sendmail_is_error() {
        let mailer = SendmailMailer::new(None).with_program("appdoctor-no-sendmail");
        assert!(mailer.send("ops@example.com", "s", "b").await.is_err());
    }
}

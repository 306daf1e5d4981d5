//! External command execution with a hard timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{ProcessOutput, ProcessRunner};
use crate::error::{DoctorError, Result};

/// Runs real processes through `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput> {
        let start = Instant::now();

        let child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DoctorError::Probe(format!("cannot start {}: {}", program, e)))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| DoctorError::ProbeTimeout {
                probe: program.to_string(),
                secs: timeout.as_secs(),
            })??;

        debug!(
            program,
            exit_code = ?output.status.code(),
            duration_ms = start.elapsed().as_millis() as u64,
            "process finished"
        );

        Ok(ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn exists(&self, program: &str) -> bool {
        let path = Path::new(program);
        if path.components().count() > 1 {
            return path.is_file();
        }
        which::which(program).is_ok()
    }
}

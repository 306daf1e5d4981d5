//! Tail analysis of `storage/logs/laravel.log`.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::Path;

use regex::Regex;
use serde_json::{json, Map};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::finding::{Findings, Level};

use super::CheckContext;

/// Severity markers counted in the tail, most severe first.
const SEVERITY_MARKERS: &[&str] = &["EMERGENCY", "ALERT", "CRITICAL", "ERROR", "WARNING"];

/// Markers whose entries are surfaced individually.
const HIGH_SEVERITY: &[&str] = &["EMERGENCY", "ALERT", "CRITICAL", "ERROR"];

/// Topical buckets and the keywords that put a line into them.
const BUCKETS: &[(&str, &[&str])] = &[
    ("database", &["DATABASE", "SQL"]),
    ("redis", &["REDIS"]),
    ("mail", &["MAIL", "SMTP"]),
    ("filesystem", &["FILE", "PERMISSION"]),
    ("auth", &["AUTH", "LOGIN"]),
    ("csrf", &["CSRF", "TOKEN"]),
    ("queue", &["QUEUE", "JOB"]),
];

const RECENT_ENTRIES: usize = 3;
const MAX_MESSAGE_CHARS: usize = 200;

/// Bytes read per backward step when tailing the log.
const TAIL_CHUNK: u64 = 64 * 1024;

/// One parsed high-severity line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
}

/// Counts gathered from the inspected lines.
#[derive(Debug, Default)]
pub struct LogAnalysis {
    /// Marker to hit count; only markers that were seen.
    pub severities: BTreeMap<&'static str, usize>,
    /// Bucket to hit count, for every bucket.
    pub buckets: Vec<(&'static str, usize)>,
    pub recent: Vec<LogEntry>,
}

impl LogAnalysis {
    fn seen(&self, marker: &str) -> bool {
        self.severities.contains_key(marker)
    }

    /// Level of the error summary finding.
    pub fn summary_level(&self) -> Level {
        if self.seen("EMERGENCY") || self.seen("CRITICAL") {
            Level::Critical
        } else if self.seen("ERROR") {
            Level::Error
        } else {
            Level::Warning
        }
    }

    /// `"ERROR: 3, WARNING: 1"` in marker order.
    pub fn severity_line(&self) -> String {
        SEVERITY_MARKERS
            .iter()
            .filter_map(|m| self.severities.get(m).map(|n| format!("{}: {}", m, n)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// The last `limit` non-blank lines of the file at `path`, oldest first.
///
/// The file is read backwards from the end, so only the tail is held in
/// memory no matter how large the log has grown.
pub async fn read_tail(path: &Path, limit: usize) -> std::io::Result<Vec<String>> {
    read_tail_chunked(path, limit, TAIL_CHUNK).await
}

async fn read_tail_chunked(path: &Path, limit: usize, chunk: u64) -> std::io::Result<Vec<String>> {
    let mut file = File::open(path).await?;
    let mut pos = file.metadata().await?.len();
    // Newest first until the final reverse.
    let mut lines: Vec<String> = Vec::new();
    // Bytes of a line whose start lies in a chunk not read yet.
    let mut partial: Vec<u8> = Vec::new();

    while pos > 0 && lines.len() < limit {
        let size = chunk.min(pos);
        pos -= size;
        file.seek(SeekFrom::Start(pos)).await?;
        let mut buf = vec![0u8; size as usize];
        file.read_exact(&mut buf).await?;
        buf.append(&mut partial);

        let complete = if pos == 0 {
            &buf[..]
        } else {
            match buf.iter().position(|b| *b == b'\n') {
                Some(first) => {
                    partial = buf[..first].to_vec();
                    &buf[first + 1..]
                }
                None => {
                    partial = buf;
                    continue;
                }
            }
        };

        for raw in complete.split(|b| *b == b'\n').rev() {
            let line = String::from_utf8_lossy(raw);
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            lines.push(line.to_string());
            if lines.len() == limit {
                break;
            }
        }
    }

    lines.reverse();
    Ok(lines)
}

fn truncate_chars(raw: &str, max: usize) -> String {
    raw.chars().take(max).collect()
}

/// Classify `lines` into severity counts, topical buckets and recent entries.
pub fn analyze(lines: &[&str]) -> Result<LogAnalysis, regex::Error> {
    let marker = Regex::new(r"\w+\.(EMERGENCY|ALERT|CRITICAL|ERROR|WARNING):")?;
    let entry = Regex::new(r"\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})\] \w+\.(\w+): (.+)")?;

    let mut analysis = LogAnalysis {
        buckets: BUCKETS.iter().map(|(name, _)| (*name, 0)).collect(),
        ..LogAnalysis::default()
    };

    for line in lines {
        if let Some(caps) = marker.captures(line) {
            let level = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if let Some(known) = SEVERITY_MARKERS.iter().find(|m| **m == level) {
                *analysis.severities.entry(*known).or_insert(0) += 1;
            }

            if HIGH_SEVERITY.contains(&level) {
                let parsed = entry.captures(line).map(|c| LogEntry {
                    timestamp: c[1].to_string(),
                    level: c[2].to_string(),
                    message: truncate_chars(&c[3], MAX_MESSAGE_CHARS),
                });
                analysis.recent.push(parsed.unwrap_or_else(|| LogEntry {
                    timestamp: "Unknown".to_string(),
                    level: level.to_string(),
                    message: truncate_chars(line, MAX_MESSAGE_CHARS),
                }));
            }
        }

        let upper = line.to_uppercase();
        for (i, (_, keywords)) in BUCKETS.iter().enumerate() {
            if keywords.iter().any(|k| upper.contains(k)) {
                analysis.buckets[i].1 += 1;
            }
        }
    }

    Ok(analysis)
}

pub async fn run(ctx: &CheckContext<'_>, out: &mut Findings) -> anyhow::Result<()> {
    let log_file = ctx.snapshot.layout.log_file();

    if !log_file.exists() {
        out.add(
            "Laravel Log File Not Found",
            Level::Info,
            "No log file found. This might be normal for new applications.",
        );
        return Ok(());
    }

    let settings = &ctx.settings.log_analysis;
    let lines = match read_tail(&log_file, settings.lines_to_check).await {
        Ok(lines) => lines,
        Err(e) => {
            out.add(
                "Laravel Log File Not Readable",
                Level::Error,
                format!("Make log file readable: chmod 644 storage/logs/laravel.log ({})", e),
            );
            return Ok(());
        }
    };
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();
    let analysis = analyze(&lines)?;

    if analysis.severities.is_empty() {
        out.add(
            "No Recent Log Errors",
            Level::Ok,
            "No errors found in recent log entries",
        );
    } else {
        out.add(
            "Log Errors Found",
            analysis.summary_level(),
            format!("Found errors in logs: {}", analysis.severity_line()),
        );
    }

    for (bucket, count) in &analysis.buckets {
        if *count > settings.issue_threshold {
            out.add(
                format!("Frequent {} Issues in Logs", bucket),
                Level::Warning,
                format!(
                    "Found {} {}-related log entries. Review logs for details.",
                    count, bucket
                ),
            );
        }
    }

    let skip = analysis.recent.len().saturating_sub(RECENT_ENTRIES);
    for entry in &analysis.recent[skip..] {
        let mut details = Map::new();
        details.insert("level".to_string(), json!(entry.level));
        details.insert("timestamp".to_string(), json!(entry.timestamp));
        out.add_with_details(
            format!("Recent Critical Error ({})", entry.timestamp),
            Level::Error,
            entry.message.clone(),
            details,
        );
    }

    out.add(
        "Log File Analysis Complete",
        Level::Ok,
        "Log file analysis completed successfully.",
    );
    Ok(())
}

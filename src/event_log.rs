//! Append-only detection event log.
//!
//! CSV with a `Timestamp,Event` header and one row per event:
//!
//! ```text
//! Timestamp,Event
//! 2024-05-01 09:12:44,Detection Started
//! 2024-05-01 09:13:02,Threat Detected - Screen Dimmed
//! ```
//!
//! Timestamps are local wall-clock time at second resolution. Rows are never
//! rewritten; opening in [`LogMode::Truncate`] discards previous history,
//! [`LogMode::Append`] keeps it.

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDateTime};
use serde::Deserialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub const DEFAULT_LOG_PATH: &str = "detection_log.csv";
pub const LOG_HEADER: [&str; 2] = ["Timestamp", "Event"];
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    DetectionStarted,
    DetectionStopped,
    ThreatDetected,
    ThreatCleared,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::DetectionStarted,
        EventKind::DetectionStopped,
        EventKind::ThreatDetected,
        EventKind::ThreatCleared,
    ];

    /// Exact text written to the log.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::DetectionStarted => "Detection Started",
            EventKind::DetectionStopped => "Detection Stopped",
            EventKind::ThreatDetected => "Threat Detected - Screen Dimmed",
            EventKind::ThreatCleared => "No Threat - Brightness Restored",
        }
    }

    pub fn is_threat(&self) -> bool {
        matches!(self, EventKind::ThreatDetected)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| anyhow!("unknown event '{}'", value))
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogMode {
    /// Start every process with an empty, freshly headered log.
    #[default]
    Truncate,
    /// Keep rows from previous runs.
    Append,
}

impl std::str::FromStr for LogMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "truncate" => Ok(LogMode::Truncate),
            "append" => Ok(LogMode::Append),
            other => Err(anyhow!(
                "unknown log mode '{}' (expected truncate or append)",
                other
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub kind: EventKind,
}

impl LogEntry {
    pub fn to_row(&self) -> String {
        let timestamp = self.timestamp.format(TIMESTAMP_FORMAT).to_string();
        write_row(&[timestamp.as_str(), self.kind.as_str()])
    }

    pub fn parse_row(line: &str) -> Result<Self> {
        let fields = parse_row(line)?;
        let [timestamp, event] = fields.as_slice() else {
            return Err(anyhow!("expected 2 fields, found {}", fields.len()));
        };
        let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .with_context(|| format!("invalid timestamp '{}'", timestamp))?;
        Ok(Self {
            timestamp,
            kind: event.parse()?,
        })
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.kind
        )
    }
}

/// Handle to the on-disk event log. Shared by the session and its worker.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    write_lock: Mutex<()>,
    write_failures: AtomicU64,
}

impl EventLog {
    pub fn open(path: impl Into<PathBuf>, mode: LogMode) -> Result<Self> {
        let path = path.into();
        match mode {
            LogMode::Truncate => {
                let mut file = File::create(&path)
                    .with_context(|| format!("create event log {}", path.display()))?;
                file.write_all(header_line().as_bytes())
                    .with_context(|| format!("write header to {}", path.display()))?;
            }
            LogMode::Append => {
                let existing = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                if existing == 0 {
                    let mut file = OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&path)
                        .with_context(|| format!("open event log {}", path.display()))?;
                    file.write_all(header_line().as_bytes())
                        .with_context(|| format!("write header to {}", path.display()))?;
                } else {
                    check_header(&path)?;
                }
            }
        }
        log::info!("event log {} opened ({:?})", path.display(), mode);
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
            write_failures: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event stamped with the current local time.
    pub fn append(&self, kind: EventKind) -> Result<LogEntry> {
        self.append_at(kind, Local::now().naive_local())
    }

    pub fn append_at(&self, kind: EventKind, timestamp: NaiveDateTime) -> Result<LogEntry> {
        let entry = LogEntry { timestamp, kind };
        let mut line = entry.to_row();
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open event log {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append to event log {}", self.path.display()))?;
        Ok(entry)
    }

    /// Best-effort append: failures are logged and counted, never returned.
    pub fn record(&self, kind: EventKind) -> Option<LogEntry> {
        match self.append(kind) {
            Ok(entry) => Some(entry),
            Err(e) => {
                self.write_failures.fetch_add(1, Ordering::Relaxed);
                log::warn!("event '{}' not logged: {:#}", kind, e);
                None
            }
        }
    }

    /// Number of events lost to write errors since open.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn read_entries(&self) -> Result<Vec<LogEntry>> {
        read_entries(&self.path)
    }

    /// The `n` most recent entries, oldest first.
    pub fn tail(&self, n: usize) -> Result<Vec<LogEntry>> {
        let mut entries = self.read_entries()?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.split_off(skip))
    }
}

/// Parse every row of the log at `path`, validating the header.
pub fn read_entries(path: &Path) -> Result<Vec<LogEntry>> {
    let file =
        File::open(path).with_context(|| format!("open event log {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let header = lines
        .next()
        .transpose()?
        .ok_or_else(|| anyhow!("event log {} has no header", path.display()))?;
    if parse_row(header.trim_end_matches('\r'))? != LOG_HEADER {
        return Err(anyhow!(
            "event log {} has unexpected header '{}'",
            path.display(),
            header
        ));
    }

    let mut entries = Vec::new();
    for (index, line) in lines.enumerate() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let entry = LogEntry::parse_row(line)
            .with_context(|| format!("{}:{}", path.display(), index + 2))?;
        entries.push(entry);
    }
    Ok(entries)
}

fn check_header(path: &Path) -> Result<()> {
    let file =
        File::open(path).with_context(|| format!("open event log {}", path.display()))?;
    let mut first = String::new();
    BufReader::new(file).read_line(&mut first)?;
    let first = first.trim_end_matches(['\r', '\n']);
    if parse_row(first)? != LOG_HEADER {
        return Err(anyhow!(
            "{} is not an event log (header '{}')",
            path.display(),
            first
        ));
    }
    Ok(())
}

fn header_line() -> String {
    let mut line = write_row(&LOG_HEADER);
    line.push('\n');
    line
}

fn write_row(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|field| {
            if field.contains([',', '"', '\n', '\r']) {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_row(line: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            (true, '"') => quoted = false,
            (true, c) => field.push(c),
            (false, '"') if field.is_empty() => quoted = true,
            (false, ',') => fields.push(std::mem::take(&mut field)),
            (false, c) => field.push(c),
        }
    }
    if quoted {
        return Err(anyhow!("unterminated quoted field"));
    }
    fields.push(field);
    Ok(fields)
}

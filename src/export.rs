//! Export of the aggregated history.
//!
//! Exports are derived views over the aggregator's append-only `LogEntry`
//! sequence; chronological order is always preserved. The JSON format is a
//! lossless serialization of every retained entry and round-trips back to
//! the in-memory sequence.

use std::collections::HashMap;
use std::fmt::Write as _;

use anyhow::{Context, Result};
use chrono::SecondsFormat;

use crate::aggregator::ProgressAggregator;
use crate::events::{LogEntry, Severity};
use crate::plan::OperationKind;

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    PlainText,
    Json,
    Csv,
    Html,
}

impl std::str::FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "plain" | "plain-text" | "txt" => Ok(Self::PlainText),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "html" => Ok(Self::Html),
            other => anyhow::bail!("unknown export format '{}'", other),
        }
    }
}

/// Optional restrictions applied before formatting.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    /// Keep only entries belonging to operations of these kinds
    pub kinds: Option<Vec<OperationKind>>,
    /// Keep only entries at or above this severity
    pub min_severity: Option<Severity>,
}

/// Serializes the aggregated history into exportable formats.
pub struct LogExporter<'a> {
    history: &'a [LogEntry],
    op_kinds: HashMap<String, OperationKind>,
}

impl<'a> LogExporter<'a> {
    /// Exporter over an aggregator's current history. Can be invoked at any
    /// time, mid-run included.
    pub fn new(aggregator: &'a ProgressAggregator) -> Self {
        let op_kinds = aggregator
            .operations()
            .iter()
            .map(|op| (op.id.clone(), op.kind))
            .collect();
        Self {
            history: aggregator.history(),
            op_kinds,
        }
    }

    /// Exporter over an explicit entry slice, for callers that retained a
    /// history of their own.
    pub fn over(history: &'a [LogEntry], op_kinds: HashMap<String, OperationKind>) -> Self {
        Self { history, op_kinds }
    }

    pub fn export(&self, format: ExportFormat, filter: &ExportFilter) -> Result<String> {
        let entries = self.filtered(filter);
        match format {
            ExportFormat::PlainText => Ok(self.plain_text(&entries)),
            ExportFormat::Json => self.json(&entries),
            ExportFormat::Csv => Ok(self.csv(&entries)),
            ExportFormat::Html => Ok(self.html(&entries)),
        }
    }

    fn filtered(&self, filter: &ExportFilter) -> Vec<&'a LogEntry> {
        self.history
            .iter()
            .filter(|entry| {
                if let Some(kinds) = &filter.kinds {
                    match self.op_kinds.get(entry.operation_id()) {
                        Some(kind) if kinds.contains(kind) => {}
                        _ => return false,
                    }
                }
                if let Some(min) = filter.min_severity {
                    if entry.severity() < min {
                        return false;
                    }
                }
                true
            })
            .collect()
    }

    fn plain_text(&self, entries: &[&LogEntry]) -> String {
        let mut out = String::new();
        for entry in entries {
            let _ = writeln!(
                out,
                "[{}] [{}] {}",
                entry
                    .timestamp()
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
                entry.operation_id(),
                entry.display_message()
            );
        }
        out
    }

    fn json(&self, entries: &[&LogEntry]) -> Result<String> {
        serde_json::to_string_pretty(entries).context("Failed to serialize log entries")
    }

    fn csv(&self, entries: &[&LogEntry]) -> String {
        let mut out = String::from("timestamp,operationId,kind,field,value\n");
        for entry in entries {
            let timestamp = entry
                .timestamp()
                .to_rfc3339_opts(SecondsFormat::Millis, true);
            let prefix = format!(
                "{},{},{}",
                timestamp,
                csv_escape(entry.operation_id()),
                entry_kind(entry)
            );
            for (field, value) in scalar_fields(entry) {
                let _ = writeln!(out, "{},{},{}", prefix, field, csv_escape(&value));
            }
        }
        out
    }

    fn html(&self, entries: &[&LogEntry]) -> String {
        let mut out = String::from(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>Setup log</title>\n<style>\n\
             body { font-family: monospace; background: #1e1e1e; color: #d4d4d4; }\n\
             .entry { padding: 1px 8px; }\n\
             .info { color: #d4d4d4; }\n\
             .warning { color: #d7ba7d; }\n\
             .error { color: #f48771; font-weight: bold; }\n\
             .op { color: #569cd6; }\n\
             .ts { color: #6a9955; }\n\
             </style>\n</head>\n<body>\n",
        );
        for entry in entries {
            let class = match entry.severity() {
                Severity::Info => "info",
                Severity::Warning => "warning",
                Severity::Error => "error",
            };
            let _ = writeln!(
                out,
                "<div class=\"entry {}\"><span class=\"ts\">[{}]</span> \
                 <span class=\"op\">[{}]</span> {}</div>",
                class,
                entry
                    .timestamp()
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
                html_escape(entry.operation_id()),
                html_escape(&entry.display_message())
            );
        }
        out.push_str("</body>\n</html>\n");
        out
    }
}

/// Serde tag of an entry, as it appears in the JSON export.
fn entry_kind(entry: &LogEntry) -> &'static str {
    match entry {
        LogEntry::Console { .. } => "console",
        LogEntry::Started { .. } => "started",
        LogEntry::Progress { .. } => "progress",
        LogEntry::Completing { .. } => "completing",
        LogEntry::Completed { .. } => "completed",
        LogEntry::Failed { .. } => "failed",
        LogEntry::Cancelled { .. } => "cancelled",
        LogEntry::Retried { .. } => "retried",
    }
}

/// Scalar fields of an entry, one CSV row each. Lifecycle entries lead with
/// the phase they enter.
fn scalar_fields(entry: &LogEntry) -> Vec<(&'static str, String)> {
    match entry {
        LogEntry::Console { line } => vec![
            (
                "stream",
                match line.stream {
                    crate::events::StdStream::Stdout => "stdout".to_string(),
                    crate::events::StdStream::Stderr => "stderr".to_string(),
                },
            ),
            ("content", line.content.clone()),
        ],
        LogEntry::Started { attempt, .. } => vec![
            ("phase", "in_progress".to_string()),
            ("attempt", attempt.to_string()),
        ],
        LogEntry::Progress {
            percent, message, ..
        } => {
            let mut fields = vec![("percent", percent.to_string())];
            if let Some(msg) = message {
                fields.push(("message", msg.clone()));
            }
            fields
        }
        LogEntry::Completing { .. } => vec![("phase", "completing".to_string())],
        LogEntry::Completed { message, .. } => {
            let mut fields = vec![("phase", "complete".to_string())];
            if let Some(msg) = message {
                fields.push(("message", msg.clone()));
            }
            fields
        }
        LogEntry::Failed { error, .. } => vec![
            ("phase", "failed".to_string()),
            ("message", error.message.clone()),
            ("recoverable", error.recoverable.to_string()),
        ],
        LogEntry::Cancelled { skipped, .. } => vec![
            ("phase", "cancelled".to_string()),
            ("skipped", skipped.to_string()),
        ],
        LogEntry::Retried { attempt, .. } => vec![
            ("phase", "initializing".to_string()),
            ("attempt", attempt.to_string()),
        ],
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ConsoleLine, ErrorRecord, FailureKind, StdStream};
    use chrono::{TimeZone, Utc};

    fn kinds() -> HashMap<String, OperationKind> {
        HashMap::from([
            ("clone".to_string(), OperationKind::RepositoryClone),
            ("install".to_string(), OperationKind::DependencyInstall),
        ])
    }

    fn sample_history() -> Vec<LogEntry> {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        vec![
            LogEntry::Started {
                operation_id: "clone".into(),
                timestamp: t0,
                attempt: 1,
            },
            LogEntry::Console {
                line: ConsoleLine {
                    operation_id: "clone".into(),
                    timestamp: t0 + chrono::Duration::seconds(1),
                    stream: StdStream::Stdout,
                    content: "Receiving objects: 42%".into(),
                },
            },
            LogEntry::Progress {
                operation_id: "clone".into(),
                timestamp: t0 + chrono::Duration::seconds(1),
                percent: 42,
                message: None,
            },
            LogEntry::Completed {
                operation_id: "clone".into(),
                timestamp: t0 + chrono::Duration::seconds(2),
                message: Some("exit status 0".into()),
            },
            LogEntry::Failed {
                operation_id: "install".into(),
                timestamp: t0 + chrono::Duration::seconds(3),
                error: ErrorRecord::new(
                    FailureKind::ProcessExit { code: Some(1) },
                    "npm exited with code 1",
                ),
            },
        ]
    }

    #[test]
    fn test_json_round_trips_losslessly() {
        for n in [0, 1, 5] {
            let history: Vec<LogEntry> = sample_history().into_iter().take(n).collect();
            let exporter = LogExporter::over(&history, kinds());
            let json = exporter
                .export(ExportFormat::Json, &ExportFilter::default())
                .unwrap();
            let back: Vec<LogEntry> = serde_json::from_str(&json).unwrap();
            assert_eq!(back, history);
        }
    }

    #[test]
    fn test_plain_text_line_format() {
        let history = sample_history();
        let exporter = LogExporter::over(&history, kinds());
        let text = exporter
            .export(ExportFormat::PlainText, &ExportFilter::default())
            .unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), history.len());
        assert_eq!(lines[0], "[2025-06-01T12:00:00.000Z] [clone] started");
        assert_eq!(
            lines[1],
            "[2025-06-01T12:00:01.000Z] [clone] Receiving objects: 42%"
        );
        assert_eq!(
            lines[4],
            "[2025-06-01T12:00:03.000Z] [install] failed: npm exited with code 1"
        );
    }

    #[test]
    fn test_csv_has_header_and_one_row_per_scalar_field() {
        let history = sample_history();
        let exporter = LogExporter::over(&history, kinds());
        let csv = exporter
            .export(ExportFormat::Csv, &ExportFilter::default())
            .unwrap();

        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "timestamp,operationId,kind,field,value");
        // started(2) + console(2) + progress(1) + completed(2) + failed(3)
        assert_eq!(lines.len(), 1 + 10);
        assert!(lines[1].ends_with("clone,started,phase,in_progress"));
        assert!(csv.contains("progress,percent,42"));
        assert!(csv.contains("failed,recoverable,true"));
    }

    #[test]
    fn test_csv_escapes_commas_and_quotes() {
        let history = vec![LogEntry::Console {
            line: ConsoleLine {
                operation_id: "clone".into(),
                timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
                stream: StdStream::Stdout,
                content: "objects: 10, deltas: \"5\"".into(),
            },
        }];
        let exporter = LogExporter::over(&history, kinds());
        let csv = exporter
            .export(ExportFormat::Csv, &ExportFilter::default())
            .unwrap();
        assert!(csv.contains("\"objects: 10, deltas: \"\"5\"\"\""));
    }

    #[test]
    fn test_html_groups_by_severity() {
        let history = sample_history();
        let exporter = LogExporter::over(&history, kinds());
        let html = exporter
            .export(ExportFormat::Html, &ExportFilter::default())
            .unwrap();

        assert!(html.contains("class=\"entry info\""));
        assert!(html.contains("class=\"entry error\""));
        assert!(html.contains("npm exited with code 1"));
    }

    #[test]
    fn test_html_escapes_content() {
        let history = vec![LogEntry::Console {
            line: ConsoleLine {
                operation_id: "clone".into(),
                timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
                stream: StdStream::Stdout,
                content: "<script>alert(1)</script>".into(),
            },
        }];
        let exporter = LogExporter::over(&history, kinds());
        let html = exporter
            .export(ExportFormat::Html, &ExportFilter::default())
            .unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_filter_by_operation_kind() {
        let history = sample_history();
        let exporter = LogExporter::over(&history, kinds());
        let filter = ExportFilter {
            kinds: Some(vec![OperationKind::DependencyInstall]),
            min_severity: None,
        };
        let text = exporter.export(ExportFormat::PlainText, &filter).unwrap();

        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("[install]"));
    }

    #[test]
    fn test_filter_by_min_severity() {
        let history = sample_history();
        let exporter = LogExporter::over(&history, kinds());
        let filter = ExportFilter {
            kinds: None,
            min_severity: Some(Severity::Error),
        };
        let text = exporter.export(ExportFormat::PlainText, &filter).unwrap();

        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("failed: npm exited with code 1"));
    }

    #[test]
    fn test_chronological_order_is_preserved() {
        let history = sample_history();
        let exporter = LogExporter::over(&history, kinds());
        let json = exporter
            .export(ExportFormat::Json, &ExportFilter::default())
            .unwrap();
        let back: Vec<LogEntry> = serde_json::from_str(&json).unwrap();
        let timestamps: Vec<_> = back.iter().map(LogEntry::timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!(
            "plain-text".parse::<ExportFormat>().unwrap(),
            ExportFormat::PlainText
        );
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("yaml".parse::<ExportFormat>().is_err());
    }
}

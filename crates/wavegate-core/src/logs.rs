//! Controller log records, log configuration and client-side log filters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Controller log level, ordered by severity (higher = more severe).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including raw serial traffic.
    Silly = 10,
    /// Intermediate values and decisions.
    Debug = 20,
    /// Verbose protocol chatter.
    Verbose = 30,
    /// Transport-level traffic.
    Http = 40,
    /// Outcomes and summaries.
    Info = 50,
    /// Non-fatal issues.
    Warn = 60,
    /// Errors.
    Error = 70,
}

impl LogLevel {
    /// Convert from string (case-insensitive). Unknown names map to `Info`.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "silly" | "trace" => Self::Silly,
            "debug" => Self::Debug,
            "verbose" => Self::Verbose,
            "http" => Self::Http,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Silly => "silly",
            Self::Debug => "debug",
            Self::Verbose => "verbose",
            Self::Http => "http",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// One log record emitted by the controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// RFC 3339 timestamp.
    pub timestamp: String,
    /// Severity.
    pub level: LogLevel,
    /// Subsystem label, e.g. `"CNTRLR"` or `"DRIVER"`.
    pub label: String,
    /// Message text.
    pub message: String,
    /// Structured context, e.g. `{"source": "node", "nodeId": 5}`.
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl LogRecord {
    /// New record stamped with the current time.
    pub fn now(level: LogLevel, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            label: label.into(),
            message: message.into(),
            context: Map::new(),
        }
    }

    /// Add a context field.
    #[must_use]
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        let _ = self.context.insert(key.to_string(), value.into());
        self
    }

    /// Single-line rendering used for `formattedMessage`.
    pub fn formatted(&self) -> String {
        format!("{} {} {}", self.timestamp, self.label, self.message)
    }

    /// Event body forwarded to log-listening clients.
    pub fn to_event(&self) -> Value {
        json!({
            "source": "driver",
            "event": "logging",
            "formattedMessage": self.formatted(),
            "timestamp": self.timestamp,
            "level": self.level,
            "label": self.label,
            "message": self.message,
            "context": self.context,
        })
    }
}

/// Controller log configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// Whether the controller logs at all.
    pub enabled: bool,
    /// Minimum level emitted.
    pub level: LogLevel,
    /// Whether records are also written to a file.
    pub log_to_file: bool,
    /// Log file name, when writing to file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Keep console output even when writing to file.
    pub force_console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: LogLevel::Info,
            log_to_file: false,
            filename: None,
            force_console: false,
        }
    }
}

impl LogConfig {
    /// Apply a partial update in place.
    pub fn apply(&mut self, update: LogConfigUpdate) {
        if let Some(enabled) = update.enabled {
            self.enabled = enabled;
        }
        if let Some(level) = update.level {
            self.level = level;
        }
        if let Some(log_to_file) = update.log_to_file {
            self.log_to_file = log_to_file;
        }
        if update.filename.is_some() {
            self.filename = update.filename;
        }
        if let Some(force_console) = update.force_console {
            self.force_console = force_console;
        }
    }
}

/// Partial [`LogConfig`] as sent by `updateLogConfig`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LogConfigUpdate {
    /// New `enabled` flag.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// New minimum level.
    #[serde(default)]
    pub level: Option<LogLevel>,
    /// New `logToFile` flag.
    #[serde(default)]
    pub log_to_file: Option<bool>,
    /// New file name.
    #[serde(default)]
    pub filename: Option<String>,
    /// New `forceConsole` flag.
    #[serde(default)]
    pub force_console: Option<bool>,
}

/// Client-supplied restriction on which records a log listener receives.
///
/// `minLevel` and `label` are checked first; every other key must equal the
/// record's context field of the same name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    /// Drop records below this level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_level: Option<LogLevel>,
    /// Only records with this subsystem label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Context fields that must match exactly.
    #[serde(flatten)]
    pub context: Map<String, Value>,
}

impl LogFilter {
    /// Whether `record` passes this filter.
    pub fn matches(&self, record: &LogRecord) -> bool {
        if self.min_level.is_some_and(|min| record.level < min) {
            return false;
        }
        if self.label.as_deref().is_some_and(|label| label != record.label) {
            return false;
        }
        self.context
            .iter()
            .all(|(key, expected)| record.context.get(key) == Some(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_record(level: LogLevel, node_id: u64) -> LogRecord {
        LogRecord::now(level, "CNTRLR", "hello")
            .with_context("source", "node")
            .with_context("nodeId", node_id)
    }

    #[test]
    fn level_ordering() {
        assert!(LogLevel::Silly < LogLevel::Debug);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn level_from_str_lossy() {
        assert_eq!(LogLevel::from_str_lossy("DEBUG"), LogLevel::Debug);
        assert_eq!(LogLevel::from_str_lossy("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from_str_lossy("nonsense"), LogLevel::Info);
    }

    #[test]
    fn level_display_matches_serde() {
        for level in [LogLevel::Silly, LogLevel::Http, LogLevel::Error] {
            let serde_name = serde_json::to_value(level).unwrap();
            assert_eq!(serde_name, level.to_string());
        }
    }

    #[test]
    fn record_event_shape() {
        let record = node_record(LogLevel::Info, 3);
        let event = record.to_event();
        assert_eq!(event["source"], "driver");
        assert_eq!(event["event"], "logging");
        assert_eq!(event["level"], "info");
        assert_eq!(event["label"], "CNTRLR");
        assert_eq!(event["context"]["nodeId"], 3);
        assert!(event["formattedMessage"].as_str().unwrap().ends_with("CNTRLR hello"));
    }

    #[test]
    fn config_apply_partial() {
        let mut config = LogConfig::default();
        config.apply(LogConfigUpdate {
            level: Some(LogLevel::Debug),
            filename: Some("zw.log".into()),
            ..LogConfigUpdate::default()
        });
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.filename.as_deref(), Some("zw.log"));
        assert!(config.enabled);
    }

    #[test]
    fn config_update_rejects_unknown_fields() {
        let parsed: Result<LogConfigUpdate, _> =
            serde_json::from_value(serde_json::json!({"levle": "debug"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn config_wire_names() {
        let value = serde_json::to_value(LogConfig::default()).unwrap();
        assert_eq!(value["logToFile"], false);
        assert_eq!(value["forceConsole"], false);
        assert!(value.get("filename").is_none());
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(LogFilter::default().matches(&node_record(LogLevel::Silly, 1)));
    }

    #[test]
    fn filter_by_min_level() {
        let filter = LogFilter {
            min_level: Some(LogLevel::Warn),
            ..LogFilter::default()
        };
        assert!(!filter.matches(&node_record(LogLevel::Info, 1)));
        assert!(filter.matches(&node_record(LogLevel::Error, 1)));
    }

    #[test]
    fn filter_by_context_equality() {
        let filter: LogFilter =
            serde_json::from_value(serde_json::json!({"source": "node", "nodeId": 5})).unwrap();
        assert!(filter.matches(&node_record(LogLevel::Info, 5)));
        assert!(!filter.matches(&node_record(LogLevel::Info, 6)));
    }

    #[test]
    fn filter_by_label() {
        let filter = LogFilter {
            label: Some("DRIVER".into()),
            ..LogFilter::default()
        };
        assert!(!filter.matches(&node_record(LogLevel::Info, 1)));
    }
}

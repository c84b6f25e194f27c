use serde::{Deserialize, Serialize};

/// Configuration from `.taskmirror/config.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Signed-in user. Absent means signed out.
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// strftime pattern for date separators
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// strftime pattern for the deadline time shown on a task row
    #[serde(default = "default_time_format")]
    pub time_format: String,
    #[serde(default = "default_true")]
    pub show_completed: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            date_format: default_date_format(),
            time_format: default_time_format(),
            show_completed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// One of error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How long the CLI waits for the first snapshot before giving up
    #[serde(default = "default_first_snapshot_timeout_ms")]
    pub first_snapshot_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            first_snapshot_timeout_ms: default_first_snapshot_timeout_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_date_format() -> String {
    "%a %d %b %Y".to_string()
}

fn default_time_format() -> String {
    "%H:%M".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_first_snapshot_timeout_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.session.user.is_none());
        assert_eq!(config.display.date_format, "%a %d %b %Y");
        assert_eq!(config.display.time_format, "%H:%M");
        assert!(config.display.show_completed);
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.sync.first_snapshot_timeout_ms, 2000);
    }

    #[test]
    fn partial_tables_fill_missing_keys() {
        let config: Config = toml::from_str(
            r#"
[session]
user = "alice"

[display]
show_completed = false
"#,
        )
        .unwrap();
        assert_eq!(config.session.user.as_deref(), Some("alice"));
        assert!(!config.display.show_completed);
        assert_eq!(config.display.date_format, "%a %d %b %Y");
    }
}

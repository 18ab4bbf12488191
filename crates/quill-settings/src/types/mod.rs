//! Settings type definitions.
//!
//! All types use camelCase JSON and `#[serde(default)]`, so partial files are
//! valid: missing fields take their compiled default.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings, loaded from `~/.quill/settings.json`.
///
/// ```json
/// {
///   "store": { "quotaBytes": 1048576 },
///   "agent": { "maxIterations": 10, "turnDelayMs": 0 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuillSettings {
    pub store: StoreSettings,
    pub agent: AgentSettings,
    pub retry: RetrySettings,
    pub persistence: PersistenceSettings,
    pub logging: LoggingSettings,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Upper bound on the summed content size of all files.
    pub quota_bytes: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            quota_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Hard cap on loop iterations per run.
    pub max_iterations: u32,
    /// Pause between continuing turns.
    pub turn_delay_ms: u64,
    /// Replaces the built-in core prompt when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            turn_delay_ms: 1000,
            system_prompt: None,
        }
    }
}

/// Provider retry policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceSettings {
    pub enabled: bool,
    /// SQLite database path. A leading `~/` expands to the home directory.
    pub db_path: String,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: "~/.quill/quill.db".to_owned(),
        }
    }
}

impl PersistenceSettings {
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
    /// Store WARN and above in the `logs` table of the database.
    pub persist_warnings: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
            persist_warnings: true,
        }
    }
}

/// Quill's home directory (`~/.quill`).
pub fn quill_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
    PathBuf::from(home).join(".quill")
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_owned());
            PathBuf::from(home).join(rest)
        }
        None => PathBuf::from(path),
    }
}

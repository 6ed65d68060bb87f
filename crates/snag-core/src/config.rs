use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the per-project state directory.
pub const SNAG_DIR: &str = ".snag";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub list: ListConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file, relative to `.snag/` unless absolute.
    #[serde(default = "default_db_file")]
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_file(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    /// Resolve the database path against the `.snag` directory.
    #[must_use]
    pub fn resolve_path(&self, snag_dir: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            snag_dir.join(&self.path)
        }
    }

    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListConfig {
    #[serde(default = "default_list_limit")]
    pub default_limit: u32,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            default_limit: default_list_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    /// Username used when neither `--as` nor `SNAG_USER` is given.
    #[serde(default)]
    pub default_actor: Option<String>,
}

/// Find the `.snag` directory by walking up from `start`.
#[must_use]
pub fn find_snag_dir(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(SNAG_DIR);
        if candidate.is_dir() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Load `.snag/config.toml` under `snag_dir`, falling back to defaults when
/// the file is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(snag_dir: &Path) -> Result<ProjectConfig> {
    let path = snag_dir.join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `<config_dir>/snag/config.toml`, falling back to defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("snag/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Resolve the output mode name (`pretty`, `text` or `json`) for this
/// process.
#[must_use]
pub fn output_mode(cli_json: bool, user: &UserConfig) -> String {
    resolve_output(
        cli_json,
        user.output.clone(),
        env::var("FORMAT").ok(),
        std::io::stdout().is_terminal(),
    )
}

/// Output precedence: `--json` > `FORMAT` env > user config > TTY default.
fn resolve_output(
    cli_json: bool,
    user_output: Option<String>,
    env_format: Option<String>,
    is_tty: bool,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    let fallback = if is_tty { "pretty" } else { "text" };
    fallback.to_string()
}

fn default_db_file() -> PathBuf {
    PathBuf::from("snag.db")
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

const fn default_list_limit() -> u32 {
    50
}

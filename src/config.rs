//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.soq/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SoqConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GeneralConfig {
    pub max_answers: Option<usize>,
    pub max_results: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub connect_timeout_secs: Option<u64>,
    pub call_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RenderConfig {
    pub color: Option<bool>,
    pub width: Option<usize>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_MAX_ANSWERS: usize = 3;
pub const DEFAULT_MAX_RESULTS: usize = 10;
pub const DEFAULT_SERVER_COMMAND: &str = "npx";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 180;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_WIDTH: usize = 100;

/// The hosted Stack Overflow MCP endpoint, bridged over stdio via mcp-remote.
pub const DEFAULT_SERVER_URL: &str = "https://mcp.stackoverflow.com";

pub fn default_server_args() -> Vec<String> {
    vec![
        "-y".to_string(),
        "mcp-remote".to_string(),
        DEFAULT_SERVER_URL.to_string(),
    ]
}

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub max_answers: usize,
    pub max_results: usize,
    pub server_command: String,
    pub server_args: Vec<String>,
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
    pub color: bool,
    pub width: usize,
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.soq/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".soq").join("config.toml"))
}

/// Load config from `~/.soq/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `SoqConfig::default()`. If it exists but is malformed,
/// returns `ConfigError::Parse`.
pub fn load_config() -> Result<SoqConfig, ConfigError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(SoqConfig::default());
        }
    };

    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(&path);
        return Ok(SoqConfig::default());
    }

    let contents = fs::read_to_string(&path).map_err(ConfigError::Io)?;
    let config: SoqConfig = toml::from_str(&contents).map_err(ConfigError::Parse)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &PathBuf) {
    let default_content = r#"# soq Configuration
# All settings are optional — defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [general]
# max_answers = 3                    # Answers shown per question (0 = all)
# max_results = 10                   # Rows shown in list mode

# [server]
# command = "npx"                    # MCP server launcher
# args = ["-y", "mcp-remote", "https://mcp.stackoverflow.com"]
# connect_timeout_secs = 180         # Startup handshake deadline
# call_timeout_secs = 120            # Per-query deadline

# [render]
# color = true                       # ANSI styling (false = plain text)
# width = 100                        # Wrap width for paragraphs
"#;

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Failed to create config directory: {}", e);
            return;
        }
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
///
/// `cli_server`, `cli_answers`, and `cli_no_color` come from CLI flags
/// (None / false = not specified).
pub fn resolve(
    config: &SoqConfig,
    cli_server: Option<&str>,
    cli_answers: Option<usize>,
    cli_no_color: bool,
) -> ResolvedConfig {
    // Server command: CLI → env → config → default
    let server_command = cli_server
        .map(|s| s.to_string())
        .or_else(|| std::env::var("SOQ_SERVER_COMMAND").ok())
        .or_else(|| config.server.command.clone())
        .unwrap_or_else(|| DEFAULT_SERVER_COMMAND.to_string());

    // Server args follow the config file only; a CLI command override keeps
    // the default bridge args unless the config replaces them too.
    let server_args = config
        .server
        .args
        .clone()
        .unwrap_or_else(default_server_args);

    // Answers shown: CLI → env → config → default
    let max_answers = cli_answers
        .or_else(|| {
            std::env::var("SOQ_MAX_ANSWERS")
                .ok()
                .and_then(|v| v.parse().ok())
        })
        .or(config.general.max_answers)
        .unwrap_or(DEFAULT_MAX_ANSWERS);

    // Color: --no-color and the conventional NO_COLOR env var both disable
    let color = if cli_no_color || std::env::var_os("NO_COLOR").is_some() {
        false
    } else {
        config.render.color.unwrap_or(true)
    };

    ResolvedConfig {
        max_answers,
        max_results: config.general.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
        server_command,
        server_args,
        connect_timeout: Duration::from_secs(
            config
                .server
                .connect_timeout_secs
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        ),
        call_timeout: Duration::from_secs(
            config
                .server
                .call_timeout_secs
                .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS),
        ),
        color,
        width: config.render.width.unwrap_or(DEFAULT_WIDTH),
    }
}

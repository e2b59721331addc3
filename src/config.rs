//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Command-line flags** on `serve` / `parse-log`
//! 2. **Environment variables** — `SUS_LISTEN_ADDR`, `SUS_REAL_IP_HEADER`,
//!    `SUS_DEST_URL_TEMPLATE`, `SUS_STOCK_MODEL_MAP`, `SUS_LOG_RETENTION_SECS`
//! 3. **Config file** — path via `--config <path>`, or
//!    `shelly-update-server.toml` in CWD
//! 4. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! real_ip_header = "X-Real-IP"          # empty = use the peer address
//! dest_url_template = "https://example.com/fw/shelly-homekit-%s.zip"
//! log_retention_secs = 300
//! shutdown_grace_secs = 5
//!
//! [models]
//! stock_model_map = "/etc/shelly-update-server/models.yaml"
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "shelly-update-server.toml";

/// Placeholder replaced with the model name in redirect URLs.
pub const MODEL_PLACEHOLDER: &str = "%s";

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind. Required for `serve`.
    #[serde(default)]
    pub listen: String,
    /// Header carrying the real client address when behind a reverse proxy.
    /// Empty means always use the TCP peer address.
    #[serde(default)]
    pub real_ip_header: String,
    /// Redirect target; `%s` is replaced with the model name. Required for `serve`.
    #[serde(default)]
    pub dest_url_template: String,
    /// How long per-client request history is kept (default 300 s).
    #[serde(default = "default_log_retention_secs")]
    pub log_retention_secs: u64,
    /// Seconds in-flight requests get to finish after a shutdown signal (default 5).
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

/// Model map location.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelsConfig {
    /// YAML or JSON file with the stock prefix -> HomeKit model table. Required.
    #[serde(default)]
    pub stock_model_map: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_retention_secs() -> u64 {
    5 * 60
}
fn default_shutdown_grace_secs() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: String::new(),
            real_ip_header: String::new(),
            dest_url_template: String::new(),
            log_retention_secs: default_log_retention_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Values given on the command line. `None` leaves the loaded value alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub listen: Option<String>,
    pub real_ip_header: Option<String>,
    pub dest_url_template: Option<String>,
    pub stock_model_map: Option<String>,
    pub log_retention_secs: Option<u64>,
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise
    /// `shelly-update-server.toml` in the current directory is used if present.
    pub fn load(path: Option<&str>) -> Result<Self, String> {
        let mut config = if let Some(p) = path {
            Self::from_file(p)?
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file(DEFAULT_CONFIG_FILE)?
        } else {
            Config::default()
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {path}: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file {path}: {e}"))
    }

    /// Apply `SUS_*` overrides. `lookup` is `std::env::var` outside of tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), String> {
        if let Some(listen) = lookup("SUS_LISTEN_ADDR") {
            self.server.listen = listen;
        }
        if let Some(header) = lookup("SUS_REAL_IP_HEADER") {
            self.server.real_ip_header = header;
        }
        if let Some(template) = lookup("SUS_DEST_URL_TEMPLATE") {
            self.server.dest_url_template = template;
        }
        if let Some(map) = lookup("SUS_STOCK_MODEL_MAP") {
            self.models.stock_model_map = map;
        }
        if let Some(secs) = lookup("SUS_LOG_RETENTION_SECS") {
            self.server.log_retention_secs = secs
                .parse()
                .map_err(|e| format!("Invalid SUS_LOG_RETENTION_SECS {secs:?}: {e}"))?;
        }
        Ok(())
    }

    /// Apply command-line flags on top of file and env settings.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(listen) = overrides.listen {
            self.server.listen = listen;
        }
        if let Some(header) = overrides.real_ip_header {
            self.server.real_ip_header = header;
        }
        if let Some(template) = overrides.dest_url_template {
            self.server.dest_url_template = template;
        }
        if let Some(map) = overrides.stock_model_map {
            self.models.stock_model_map = map;
        }
        if let Some(secs) = overrides.log_retention_secs {
            self.server.log_retention_secs = secs;
        }
    }

    /// Checks shared by every mode: a model map is always needed.
    pub fn validate_models(&self) -> Result<(), String> {
        if self.models.stock_model_map.is_empty() {
            return Err("Specify --stock-model-map to use".to_string());
        }
        Ok(())
    }

    /// Full validation for `serve`. Returns the parsed redirect template.
    pub fn validate_serve(&self) -> Result<RedirectTemplate, String> {
        self.validate_models()?;
        if self.server.listen.is_empty() {
            return Err("Specify --listen-addr to serve on".to_string());
        }
        if self.server.log_retention_secs == 0 {
            return Err("--log-retention-secs must be greater than zero".to_string());
        }
        RedirectTemplate::parse(&self.server.dest_url_template)
    }

    /// Model map path with a leading `~/` resolved against `$HOME`.
    pub fn stock_model_map_path(&self) -> PathBuf {
        home_relative(
            &self.models.stock_model_map,
            std::env::var_os("HOME").map(PathBuf::from),
        )
    }

    pub fn log_retention(&self) -> Duration {
        Duration::from_secs(self.server.log_retention_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_grace_secs)
    }

    /// Client address header, or `None` when unset.
    pub fn real_ip_header(&self) -> Option<&str> {
        Some(self.server.real_ip_header.as_str()).filter(|h| !h.is_empty())
    }
}

/// `~` or `~/rest` becomes `home` or `home/rest`. Other paths, and any path
/// when `home` is unknown, are used as given.
fn home_relative(path: &str, home: Option<PathBuf>) -> PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

/// Validated redirect URL template containing [`MODEL_PLACEHOLDER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTemplate(String);

impl RedirectTemplate {
    pub fn parse(template: &str) -> Result<Self, String> {
        if template.is_empty() {
            return Err("Specify --dest-url-template to use in redirects".to_string());
        }
        if !template.contains(MODEL_PLACEHOLDER) {
            return Err(format!(
                "--dest-url-template does not contain {MODEL_PLACEHOLDER}, this can't be right"
            ));
        }
        Ok(Self(template.to_string()))
    }

    /// Substitute `model` for the first placeholder.
    pub fn render(&self, model: &str) -> String {
        self.0.replacen(MODEL_PLACEHOLDER, model, 1)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

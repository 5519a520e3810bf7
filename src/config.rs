//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies the deployment env vars (`PORT`, `PORT_SERVER`, `CORS_ORIGIN`,
//! `PM2_APP_NAME`, `NODE_ENV`, `ASTRO_LOG_LEVEL`). Secrets — `API_KEY` and
//! `FIREBASE_CREDENTIALS_BASE64` — come from the environment only, never from
//! TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::AppError;

/// QR-pairing portal configuration.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// TCP port the portal binds once, on first successful flow load.
    pub port: u16,
}

/// Allowed CORS origins for the admin server.
#[derive(Debug, Clone, PartialEq)]
pub enum CorsOrigin {
    /// Wildcard: any origin.
    Any,
    /// Explicit allow-list.
    List(Vec<String>),
}

impl CorsOrigin {
    /// Parse `"*"` or a comma-separated origin list.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return CorsOrigin::Any;
        }
        CorsOrigin::List(
            trimmed
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }
}

/// Admin HTTP server configuration.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub port: u16,
    pub cors_origin: CorsOrigin,
    /// Fixed-window rate limit: max requests per window on admin routes.
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
}

/// Document-store (flow collection) configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Collection holding one document per top-level flow.
    pub collection: String,
    /// Poll interval for the live-reload watcher.
    pub poll_interval: Duration,
}

/// Process-manager configuration.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Default managed process name for restart/log operations.
    pub app_name: String,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    /// Deployment environment label (`NODE_ENV`), reported by `/health`.
    pub run_env: String,
    pub log_level: String,
    /// Directory for persistent provider session state (already expanded, no `~`).
    pub session_dir: PathBuf,
    pub portal: PortalConfig,
    pub admin: AdminConfig,
    pub store: StoreConfig,
    pub process: ProcessConfig,
    /// Shared admin secret from `API_KEY` — `None` means every admin request
    /// is answered with a server-misconfiguration error.
    pub api_key: Option<String>,
    /// Base64-encoded service-account JSON from `FIREBASE_CREDENTIALS_BASE64`.
    pub credentials_b64: Option<String>,
}

/// Env-var overrides, captured once so tests never mutate process env.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub portal_port: Option<String>,
    pub admin_port: Option<String>,
    pub cors_origin: Option<String>,
    pub app_name: Option<String>,
    pub run_env: Option<String>,
    pub log_level: Option<String>,
    pub api_key: Option<String>,
    pub credentials_b64: Option<String>,
}

impl EnvOverrides {
    /// Snapshot the recognized env vars.
    pub fn from_env() -> Self {
        Self {
            portal_port: env::var("PORT").ok(),
            admin_port: env::var("PORT_SERVER").ok(),
            cors_origin: env::var("CORS_ORIGIN").ok(),
            app_name: env::var("PM2_APP_NAME").ok(),
            run_env: env::var("NODE_ENV").ok(),
            log_level: env::var("ASTRO_LOG_LEVEL").ok(),
            api_key: env::var("API_KEY").ok(),
            credentials_b64: env::var("FIREBASE_CREDENTIALS_BASE64").ok(),
        }
    }
}

// ── raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    bot: RawBot,
    #[serde(default)]
    portal: RawPortal,
    #[serde(default)]
    admin: RawAdmin,
    #[serde(default)]
    store: RawStore,
    #[serde(default)]
    process: RawProcess,
}

#[derive(Deserialize)]
struct RawBot {
    #[serde(default = "default_bot_name")]
    name: String,
    #[serde(default = "default_session_dir")]
    session_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawPortal {
    #[serde(default = "default_portal_port")]
    port: u16,
}

#[derive(Deserialize)]
struct RawAdmin {
    #[serde(default = "default_admin_port")]
    port: u16,
    #[serde(default = "default_cors_origin")]
    cors_origin: String,
    #[serde(default = "default_rate_limit_max")]
    rate_limit_max: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    rate_limit_window_secs: u64,
}

#[derive(Deserialize)]
struct RawStore {
    #[serde(default = "default_collection")]
    collection: String,
    #[serde(default = "default_poll_interval_secs")]
    poll_interval_secs: u64,
}

#[derive(Deserialize)]
struct RawProcess {
    #[serde(default = "default_app_name")]
    app_name: String,
}

fn default_bot_name() -> String {
    "astro-bot".to_string()
}
fn default_session_dir() -> String {
    "~/.astro-bot/session".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_portal_port() -> u16 {
    3000
}
fn default_admin_port() -> u16 {
    3001
}
fn default_cors_origin() -> String {
    "*".to_string()
}
fn default_rate_limit_max() -> u32 {
    10
}
fn default_rate_limit_window_secs() -> u64 {
    60
}
fn default_collection() -> String {
    "flows".to_string()
}
fn default_poll_interval_secs() -> u64 {
    5
}
fn default_app_name() -> String {
    "bot-whatsapp".to_string()
}

impl Default for RawBot {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            session_dir: default_session_dir(),
            log_level: default_log_level(),
        }
    }
}

impl Default for RawPortal {
    fn default() -> Self {
        Self { port: default_portal_port() }
    }
}

impl Default for RawAdmin {
    fn default() -> Self {
        Self {
            port: default_admin_port(),
            cors_origin: default_cors_origin(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
        }
    }
}

impl Default for RawStore {
    fn default() -> Self {
        Self {
            collection: default_collection(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for RawProcess {
    fn default() -> Self {
        Self { app_name: default_app_name() }
    }
}

// ── loading ───────────────────────────────────────────────────────────────────

/// Load config from `path` (default `config/default.toml`), then apply env
/// overrides.
///
/// A missing default file is not an error — the original deployment of this
/// system is configured through env vars alone. An explicitly passed `-f`
/// path that does not exist is still rejected.
pub fn load(explicit_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = EnvOverrides::from_env();
    match explicit_path {
        Some(p) => load_from(Path::new(p), true, &overrides),
        None => load_from(Path::new("config/default.toml"), false, &overrides),
    }
}

/// Internal loader — accepts an explicit path and pre-captured overrides.
pub fn load_from(
    path: &Path,
    require_file: bool,
    overrides: &EnvOverrides,
) -> Result<Config, AppError> {
    let parsed: RawConfig = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str(&raw)
            .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?,
        Err(e) if !require_file && e.kind() == std::io::ErrorKind::NotFound => RawConfig::default(),
        Err(e) => {
            return Err(AppError::Config(format!("cannot read {}: {e}", path.display())));
        }
    };

    let portal_port = match &overrides.portal_port {
        Some(raw) => parse_port("PORT", raw)?,
        None => parsed.portal.port,
    };
    let admin_port = match &overrides.admin_port {
        Some(raw) => parse_port("PORT_SERVER", raw)?,
        None => parsed.admin.port,
    };

    let cors_raw = overrides
        .cors_origin
        .clone()
        .unwrap_or(parsed.admin.cors_origin);

    Ok(Config {
        bot_name: parsed.bot.name,
        run_env: overrides
            .run_env
            .clone()
            .unwrap_or_else(|| "development".to_string()),
        log_level: overrides
            .log_level
            .clone()
            .unwrap_or(parsed.bot.log_level),
        session_dir: expand_home(&parsed.bot.session_dir),
        portal: PortalConfig { port: portal_port },
        admin: AdminConfig {
            port: admin_port,
            cors_origin: CorsOrigin::parse(&cors_raw),
            rate_limit_max: parsed.admin.rate_limit_max,
            rate_limit_window: Duration::from_secs(parsed.admin.rate_limit_window_secs),
        },
        store: StoreConfig {
            collection: parsed.store.collection,
            poll_interval: Duration::from_secs(parsed.store.poll_interval_secs),
        },
        process: ProcessConfig {
            app_name: overrides
                .app_name
                .clone()
                .unwrap_or(parsed.process.app_name),
        },
        api_key: overrides.api_key.clone(),
        credentials_b64: overrides.credentials_b64.clone(),
    })
}

fn parse_port(var: &str, raw: &str) -> Result<u16, AppError> {
    raw.trim()
        .parse::<u16>()
        .map_err(|e| AppError::Config(format!("{var} must be a valid port, got '{raw}': {e}")))
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests — no secrets, ephemeral ports.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            bot_name: "test-bot".into(),
            run_env: "test".into(),
            log_level: "info".into(),
            session_dir: PathBuf::from("/tmp/astro-bot-test"),
            portal: PortalConfig { port: 0 },
            admin: AdminConfig {
                port: 0,
                cors_origin: CorsOrigin::Any,
                rate_limit_max: default_rate_limit_max(),
                rate_limit_window: Duration::from_secs(default_rate_limit_window_secs()),
            },
            store: StoreConfig {
                collection: default_collection(),
                poll_interval: Duration::from_millis(50),
            },
            process: ProcessConfig { app_name: default_app_name() },
            api_key: Some("test-key".into()),
            credentials_b64: None,
        }
    }
}

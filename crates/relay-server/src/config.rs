//! Top-level configuration for the relay proxy, loaded from a TOML file
//! with CLI overrides, following the corpus's `ActeonConfig` shape.

use serde::Deserialize;

/// Whole-process configuration, loaded from `relay.toml` (or defaults if
/// absent) and layered with CLI and environment overrides in `main`.
#[derive(Debug, Deserialize, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub routing: RoutingFlags,
    #[serde(default)]
    pub guardrails: GuardrailFlags,
}

/// HTTP bind configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8787
}

/// Which [`relay_state::ConfigStore`] backend to open.
#[derive(Debug, Deserialize)]
pub struct StateConfig {
    /// `"memory"` or `"sqlite"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// SQLite connection URL, relative to `DATA_DIR` when not absolute.
    #[serde(default = "default_sqlite_file")]
    pub sqlite_file: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { backend: default_backend(), sqlite_file: default_sqlite_file() }
    }
}

fn default_backend() -> String {
    "sqlite".to_owned()
}

fn default_sqlite_file() -> String {
    "relay.db".to_owned()
}

/// Dispatcher-level policy flags not tied to any single account or
/// tenant, per spec §7 / `DispatcherConfig`.
#[derive(Debug, Deserialize)]
pub struct RoutingFlags {
    #[serde(default)]
    pub tenants_enabled: bool,
    #[serde(default = "default_true")]
    pub auto_switch_on_error: bool,
    #[serde(default = "default_true")]
    pub auto_switch_on_rate_limit: bool,
    #[serde(default)]
    pub request_logging_default: bool,
}

impl Default for RoutingFlags {
    fn default() -> Self {
        Self { tenants_enabled: false, auto_switch_on_error: true, auto_switch_on_rate_limit: true, request_logging_default: false }
    }
}

/// Guardrail defaults, layered under each tenant's own setting override.
#[derive(Debug, Deserialize)]
pub struct GuardrailFlags {
    #[serde(default = "default_true")]
    pub enabled_default: bool,
}

impl Default for GuardrailFlags {
    fn default() -> Self {
        Self { enabled_default: true }
    }
}

fn default_true() -> bool {
    true
}

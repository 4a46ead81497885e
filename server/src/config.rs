//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `CONTAINER_SHELL_LISTEN`,
//!    `CONTAINER_SHELL_SELF`, `SHELL_IDLE_CHECK_INTERVAL_MINUTES`,
//!    `SHELL_STALENESS_THRESHOLD_MINUTES`
//! 2. **Config file** — path via `--config <path>`, or `container-shell.toml`
//!    in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:4200"
//! route_prefix = "/shell"
//!
//! [sessions]
//! socket_dir = "/var/run/container-shell"
//! socket_suffix = ".sock"
//! idle_check_interval_minutes = 1
//! staleness_threshold_minutes = 5
//! readiness_attempts = 50
//! readiness_interval_ms = 100
//!
//! [bridge]
//! program = "shellinaboxd"
//! runtime_cli = "docker"
//! user = "root"
//! group = "root"
//!
//! [runtime]
//! docker_host = "unix:///var/run/docker.sock"   # optional
//! self_container = "3f2a9c1b7d4e"               # optional, defaults to $HOSTNAME
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

/// Default config file looked up in the working directory.
const DEFAULT_CONFIG_FILE: &str = "container-shell.toml";

/// Upper bound for the minute settings (one year).
const MAX_MINUTES: u64 = 525_600;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP front door settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:4200`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Path prefix that routes a request to a container shell (default `/shell`).
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
}

/// Session lifecycle settings: socket placement, reaping and readiness bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Directory holding one bridge socket per live session.
    #[serde(default = "default_socket_dir")]
    pub socket_dir: String,
    /// Appended to the container ID to form the socket file name.
    #[serde(default = "default_socket_suffix")]
    pub socket_suffix: String,
    /// Minutes between idle sweeps (default 1).
    #[serde(default = "default_idle_check_interval_minutes")]
    pub idle_check_interval_minutes: u64,
    /// Minutes without traffic before a session is reaped (default 5).
    #[serde(default = "default_staleness_threshold_minutes")]
    pub staleness_threshold_minutes: u64,
    /// How many times the socket file is polled after spawning the bridge.
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,
    /// Sleep between two readiness polls, in milliseconds.
    #[serde(default = "default_readiness_interval_ms")]
    pub readiness_interval_ms: u64,
}

/// Terminal-bridging process settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Bridge daemon binary (default `shellinaboxd`).
    #[serde(default = "default_bridge_program")]
    pub program: String,
    /// Runtime CLI used inside the bridge to enter the container (default `docker`).
    #[serde(default = "default_runtime_cli")]
    pub runtime_cli: String,
    /// Owner of the bridge socket and the shell service (default `root`).
    #[serde(default = "default_bridge_user")]
    pub user: String,
    /// Group of the bridge socket and the shell service (default `root`).
    #[serde(default = "default_bridge_group")]
    pub group: String,
}

/// Container runtime connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuntimeConfig {
    /// Docker endpoint. `None` uses the local defaults (`DOCKER_HOST` or the
    /// standard unix socket).
    pub docker_host: Option<String>,
    /// Name or ID of the container this manager runs in. Override with
    /// `CONTAINER_SHELL_SELF`; falls back to `$HOSTNAME`.
    pub self_container: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:4200".to_string()
}
fn default_route_prefix() -> String {
    "/shell".to_string()
}
fn default_socket_dir() -> String {
    "/var/run/container-shell".to_string()
}
fn default_socket_suffix() -> String {
    ".sock".to_string()
}
fn default_idle_check_interval_minutes() -> u64 {
    1
}
fn default_staleness_threshold_minutes() -> u64 {
    5
}
fn default_readiness_attempts() -> u32 {
    50
}
fn default_readiness_interval_ms() -> u64 {
    100
}
fn default_bridge_program() -> String {
    "shellinaboxd".to_string()
}
fn default_runtime_cli() -> String {
    "docker".to_string()
}
fn default_bridge_user() -> String {
    "root".to_string()
}
fn default_bridge_group() -> String {
    "root".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            route_prefix: default_route_prefix(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            socket_dir: default_socket_dir(),
            socket_suffix: default_socket_suffix(),
            idle_check_interval_minutes: default_idle_check_interval_minutes(),
            staleness_threshold_minutes: default_staleness_threshold_minutes(),
            readiness_attempts: default_readiness_attempts(),
            readiness_interval_ms: default_readiness_interval_ms(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: default_bridge_program(),
            runtime_cli: default_runtime_cli(),
            user: default_bridge_user(),
            group: default_bridge_group(),
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

impl SessionsConfig {
    /// Never zero: a zero period would stall the reaper's ticker.
    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_interval_minutes.clamp(1, MAX_MINUTES) * 60)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_minutes.min(MAX_MINUTES) * 60)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file. Otherwise looks for
    /// `container-shell.toml` in the current directory, falling back to
    /// compiled defaults.
    pub fn load(path: Option<&str>) -> Result<Self, String> {
        let mut config = match path {
            Some(p) => Self::from_file(Path::new(p))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };

        config.sessions.idle_check_interval_minutes = checked_minutes(
            "sessions.idle_check_interval_minutes",
            config.sessions.idle_check_interval_minutes,
            default_idle_check_interval_minutes(),
        );
        config.sessions.staleness_threshold_minutes = checked_minutes(
            "sessions.staleness_threshold_minutes",
            config.sessions.staleness_threshold_minutes,
            default_staleness_threshold_minutes(),
        );

        // Env var overrides
        if let Ok(listen) = std::env::var("CONTAINER_SHELL_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(name) = std::env::var("CONTAINER_SHELL_SELF") {
            config.runtime.self_container = Some(name);
        }
        if let Ok(raw) = std::env::var("SHELL_IDLE_CHECK_INTERVAL_MINUTES") {
            config.sessions.idle_check_interval_minutes = parse_minutes(
                "SHELL_IDLE_CHECK_INTERVAL_MINUTES",
                &raw,
                default_idle_check_interval_minutes(),
            );
        }
        if let Ok(raw) = std::env::var("SHELL_STALENESS_THRESHOLD_MINUTES") {
            config.sessions.staleness_threshold_minutes = parse_minutes(
                "SHELL_STALENESS_THRESHOLD_MINUTES",
                &raw,
                default_staleness_threshold_minutes(),
            );
        }

        config.server.route_prefix = normalize_prefix(&config.server.route_prefix);
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {e}", path.display()))
    }
}

/// Parse a minute count from the environment. Unparsable, zero or absurdly
/// large values fall back to `default` with a warning.
pub fn parse_minutes(var: &str, raw: &str, default: u64) -> u64 {
    match raw.trim().parse::<u64>() {
        Ok(minutes) => checked_minutes(var, minutes, default),
        Err(_) => {
            warn!("Ignoring {var}={raw:?}, using default of {default} minute(s)");
            default
        }
    }
}

/// Zero would reap every session on every sweep; anything past a year is
/// treated as a typo.
fn checked_minutes(name: &str, minutes: u64, default: u64) -> u64 {
    if minutes == 0 || minutes > MAX_MINUTES {
        warn!("Ignoring {name}={minutes}, using default of {default} minute(s)");
        default
    } else {
        minutes
    }
}

/// Ensure the routing prefix starts with `/` and has no trailing slash.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        default_route_prefix()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serializes tests that read or write process environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_VARS: &[&str] = &[
        "CONTAINER_SHELL_LISTEN",
        "CONTAINER_SHELL_SELF",
        "SHELL_IDLE_CHECK_INTERVAL_MINUTES",
        "SHELL_STALENESS_THRESHOLD_MINUTES",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    fn write_config(dir: &tempfile::TempDir, content: &str) -> String {
        let path = dir.path().join("container-shell.toml");
        std::fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_parse_minutes_valid() {
        assert_eq!(parse_minutes("X", "7", 5), 7);
        assert_eq!(parse_minutes("X", " 12 ", 5), 12);
    }

    #[test]
    fn test_parse_minutes_falls_back() {
        assert_eq!(parse_minutes("X", "soon", 5), 5);
        assert_eq!(parse_minutes("X", "-3", 5), 5);
        assert_eq!(parse_minutes("X", "0", 1), 1);
        assert_eq!(parse_minutes("X", "", 1), 1);
    }

    #[test]
    fn test_parse_minutes_rejects_huge_values() {
        assert_eq!(parse_minutes("X", "307445734561825861", 5), 5);
        assert_eq!(parse_minutes("X", "525601", 5), 5);
        assert_eq!(parse_minutes("X", "525600", 5), 525_600);
    }

    #[test]
    fn test_durations_never_overflow() {
        let sessions = SessionsConfig {
            idle_check_interval_minutes: u64::MAX,
            staleness_threshold_minutes: u64::MAX,
            ..SessionsConfig::default()
        };
        assert_eq!(
            sessions.staleness_threshold(),
            Duration::from_secs(MAX_MINUTES * 60)
        );
        assert_eq!(
            sessions.idle_check_interval(),
            Duration::from_secs(MAX_MINUTES * 60)
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[server]\nlisten = \"127.0.0.1:9000\"\n\n[sessions]\nstaleness_threshold_minutes = 30\nidle_check_interval_minutes = 2\n",
        );
        std::env::set_var("CONTAINER_SHELL_LISTEN", "127.0.0.1:9100");
        std::env::set_var("SHELL_STALENESS_THRESHOLD_MINUTES", "7");

        let config = Config::load(Some(path.as_str()));
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.server.listen, "127.0.0.1:9100");
        assert_eq!(config.sessions.staleness_threshold_minutes, 7);
        // Not overridden: the file value stands.
        assert_eq!(config.sessions.idle_check_interval_minutes, 2);
    }

    #[test]
    fn test_file_zero_minutes_fall_back_to_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[sessions]\nstaleness_threshold_minutes = 0\nidle_check_interval_minutes = 0\n",
        );

        let config = Config::load(Some(path.as_str())).unwrap();

        assert_eq!(config.sessions.staleness_threshold_minutes, 5);
        assert_eq!(config.sessions.idle_check_interval_minutes, 1);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let err = Config::load(Some("/nonexistent/container-shell.toml")).unwrap_err();
        assert!(err.contains("Failed to read config file"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.route_prefix, "/shell");
        assert_eq!(config.sessions.idle_check_interval(), Duration::from_secs(60));
        assert_eq!(config.sessions.staleness_threshold(), Duration::from_secs(300));
        assert_eq!(config.bridge.program, "shellinaboxd");
        assert!(config.runtime.self_container.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            "[sessions]\nstaleness_threshold_minutes = 30\n\n[server]\nroute_prefix = \"/term\"\n",
        )
        .unwrap();
        assert_eq!(config.sessions.staleness_threshold_minutes, 30);
        assert_eq!(config.sessions.idle_check_interval_minutes, 1);
        assert_eq!(config.sessions.readiness_attempts, 50);
        assert_eq!(config.server.route_prefix, "/term");
        assert_eq!(config.server.listen, "0.0.0.0:4200");
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix("shell"), "/shell");
        assert_eq!(normalize_prefix("/shell/"), "/shell");
        assert_eq!(normalize_prefix("/"), "/shell");
    }
}

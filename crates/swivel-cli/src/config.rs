//! Configuration Vault – reads/writes `~/.swivel/config.toml`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use swivel_types::{CommandTable, Direction, SwivelError, parse_hex};

/// Supported gimbal transport choices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum TransportMode {
    /// The companion BLE gateway process, spoken to over WebSocket.
    #[default]
    Gateway,
    /// In-memory simulator, for development without hardware.
    Sim,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportMode::Gateway => write!(f, "gateway"),
            TransportMode::Sim => write!(f, "sim"),
        }
    }
}

/// Persisted daemon configuration stored in `~/.swivel/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub gimbal: GimbalConfig,
    #[serde(default)]
    pub arbiter: ArbiterConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub commands: CommandFrames,
}

/// `[broker]` – the command channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// WebSocket URL of the pub/sub broker.
    #[serde(default = "default_broker_url")]
    pub url: String,

    /// Client identifier announced to the broker. A fresh one is generated
    /// per process when left empty.
    #[serde(default)]
    pub client_id: String,

    /// Topics carrying directional commands.
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// Pause between dial attempts while the broker is unreachable.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl BrokerConfig {
    /// The configured client id, or a fresh `swivel-<hex>` when unset.
    pub fn effective_client_id(&self) -> String {
        if self.client_id.is_empty() {
            format!("swivel-{}", uuid::Uuid::new_v4().simple())
        } else {
            self.client_id.clone()
        }
    }
}

/// `[gimbal]` – the device and its transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GimbalConfig {
    #[serde(default)]
    pub transport: TransportMode,

    /// WebSocket URL of the BLE gateway (ignored in `sim` mode).
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Device address the transport dials.
    #[serde(default = "default_address")]
    pub address: String,

    /// UUID of the vendor control service.
    #[serde(default = "default_service_id")]
    pub service_id: String,

    /// UUID of the write characteristic inside the control service.
    #[serde(default = "default_write_characteristic_id")]
    pub write_characteristic_id: String,

    /// Deadline for one connect attempt, in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Deadline for one write round trip, in seconds.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,

    /// Connect attempts before the daemon gives up at startup.
    #[serde(default = "default_startup_attempts")]
    pub startup_attempts: u32,

    /// Pause between startup attempts, in seconds.
    #[serde(default = "default_startup_retry_delay_secs")]
    pub startup_retry_delay_secs: u64,
}

/// `[arbiter]` – command debounce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Active command lifetime in milliseconds. A command older than this is
    /// dropped instead of forwarded.
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

/// `[delivery]` – the forwarding loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Pause between delivery ticks, in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

/// `[supervisor]` – background link repair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_attempts_per_cycle")]
    pub attempts_per_cycle: u32,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
}

/// `[commands]` – vendor frames keyed by direction, as whitespace-separated
/// hex strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandFrames {
    #[serde(default = "default_frame_up")]
    pub up: String,
    #[serde(default = "default_frame_down")]
    pub down: String,
    #[serde(default = "default_frame_left")]
    pub left: String,
    #[serde(default = "default_frame_right")]
    pub right: String,
}

fn default_broker_url() -> String {
    "ws://localhost:9090".to_string()
}
fn default_topics() -> Vec<String> {
    vec!["gimbal/commands".to_string()]
}
fn default_retry_delay_secs() -> u64 {
    2
}
fn default_gateway_url() -> String {
    "ws://localhost:9230".to_string()
}
fn default_address() -> String {
    "C8:47:8C:12:34:56".to_string()
}
fn default_service_id() -> String {
    "0000ffe5-0000-1000-8000-00805f9a34fb".to_string()
}
fn default_write_characteristic_id() -> String {
    "0000ffe9-0000-1000-8000-00805f9a34fb".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_write_timeout_secs() -> u64 {
    5
}
fn default_startup_attempts() -> u32 {
    5
}
fn default_startup_retry_delay_secs() -> u64 {
    5
}
fn default_command_timeout_ms() -> u64 {
    500
}
fn default_tick_ms() -> u64 {
    50
}
fn default_check_interval_secs() -> u64 {
    5
}
fn default_attempts_per_cycle() -> u32 {
    3
}
fn default_retry_backoff_secs() -> u64 {
    2
}
fn default_frame_up() -> String {
    "24 3a 07 00 02 00 01 1a".to_string()
}
fn default_frame_down() -> String {
    "24 3a 07 00 02 00 02 1b".to_string()
}
fn default_frame_left() -> String {
    "24 3a 07 00 02 00 03 1c".to_string()
}
fn default_frame_right() -> String {
    "24 3a 07 00 02 00 04 1d".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            client_id: String::new(),
            topics: default_topics(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Default for GimbalConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::default(),
            gateway_url: default_gateway_url(),
            address: default_address(),
            service_id: default_service_id(),
            write_characteristic_id: default_write_characteristic_id(),
            connect_timeout_secs: default_connect_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            startup_attempts: default_startup_attempts(),
            startup_retry_delay_secs: default_startup_retry_delay_secs(),
        }
    }
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval_secs(),
            attempts_per_cycle: default_attempts_per_cycle(),
            retry_backoff_secs: default_retry_backoff_secs(),
        }
    }
}

impl Default for CommandFrames {
    fn default() -> Self {
        Self {
            up: default_frame_up(),
            down: default_frame_down(),
            left: default_frame_left(),
            right: default_frame_right(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            gimbal: GimbalConfig::default(),
            arbiter: ArbiterConfig::default(),
            delivery: DeliveryConfig::default(),
            supervisor: SupervisorConfig::default(),
            commands: CommandFrames::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Runtime wiring
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Debounce window for the arbiter.
    pub fn arbiter_timeout(&self) -> Duration {
        Duration::from_millis(self.arbiter.command_timeout_ms)
    }

    /// Connection parameters for the gimbal session.
    pub fn link_config(&self) -> swivel_link::LinkConfig {
        swivel_link::LinkConfig {
            address: self.gimbal.address.clone(),
            service_id: self.gimbal.service_id.clone(),
            write_characteristic_id: self.gimbal.write_characteristic_id.clone(),
            connect_timeout: Duration::from_secs(self.gimbal.connect_timeout_secs),
            write_timeout: Duration::from_secs(self.gimbal.write_timeout_secs),
        }
    }

    /// Broker parameters for the intake client.
    pub fn intake_config(&self) -> swivel_intake::IntakeConfig {
        swivel_intake::IntakeConfig {
            broker_url: self.broker.url.clone(),
            client_id: self.broker.effective_client_id(),
            topics: self.broker.topics.clone(),
            retry_delay: Duration::from_secs(self.broker.retry_delay_secs),
        }
    }

    /// Timing knobs for the reconnect supervisor.
    pub fn supervisor_config(&self) -> swivel_link::SupervisorConfig {
        swivel_link::SupervisorConfig {
            check_interval: Duration::from_secs(self.supervisor.check_interval_secs),
            attempts_per_cycle: self.supervisor.attempts_per_cycle,
            retry_backoff: Duration::from_secs(self.supervisor.retry_backoff_secs),
        }
    }

    /// Timing knobs for the delivery loop.
    pub fn delivery_config(&self) -> swivel_runtime::DeliveryConfig {
        swivel_runtime::DeliveryConfig {
            tick: Duration::from_millis(self.delivery.tick_ms),
        }
    }

    /// Parse the `[commands]` hex strings into a validated [`CommandTable`].
    ///
    /// # Errors
    ///
    /// [`SwivelError::Config`] for malformed hex or an empty frame.
    pub fn command_table(&self) -> Result<CommandTable, SwivelError> {
        let mut frames = HashMap::new();
        frames.insert(Direction::Up, parse_hex(&self.commands.up)?);
        frames.insert(Direction::Down, parse_hex(&self.commands.down)?);
        frames.insert(Direction::Left, parse_hex(&self.commands.left)?);
        frames.insert(Direction::Right, parse_hex(&self.commands.right)?);
        CommandTable::new(frames)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Disk I/O
// ─────────────────────────────────────────────────────────────────────────────

/// Return the path to `~/.swivel/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".swivel").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SWIVEL_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `SWIVEL_BROKER_URL` | `broker.url` |
/// | `SWIVEL_GATEWAY_URL` | `gimbal.gateway_url` |
/// | `SWIVEL_GIMBAL_ADDRESS` | `gimbal.address` |
/// | `SWIVEL_TRANSPORT` | `gimbal.transport` (`gateway` or `sim`) |
/// | `SWIVEL_COMMAND_TIMEOUT_MS` | `arbiter.command_timeout_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SWIVEL_BROKER_URL") {
        cfg.broker.url = v;
    }
    if let Ok(v) = std::env::var("SWIVEL_GATEWAY_URL") {
        cfg.gimbal.gateway_url = v;
    }
    if let Ok(v) = std::env::var("SWIVEL_GIMBAL_ADDRESS") {
        cfg.gimbal.address = v;
    }
    if let Ok(v) = std::env::var("SWIVEL_TRANSPORT") {
        match v.to_lowercase().as_str() {
            "gateway" => cfg.gimbal.transport = TransportMode::Gateway,
            "sim" => cfg.gimbal.transport = TransportMode::Sim,
            _ => {}
        }
    }
    if let Ok(v) = std::env::var("SWIVEL_COMMAND_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>() {
            cfg.arbiter.command_timeout_ms = ms;
        }
}

/// Save the config to disk, creating `~/.swivel/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Write the file with owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.broker.topics, vec!["gimbal/commands".to_string()]);
        assert_eq!(loaded.broker.retry_delay_secs, 2);
        assert_eq!(loaded.gimbal.connect_timeout_secs, 30);
        assert_eq!(loaded.gimbal.write_timeout_secs, 5);
        assert_eq!(loaded.delivery.tick_ms, 50);
        assert_eq!(loaded.supervisor.attempts_per_cycle, 3);
        assert_eq!(loaded.commands.up, default_frame_up());
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn config_path_points_to_swivel_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".swivel"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let file_meta = std::fs::metadata(&path).expect("file metadata");
        let file_mode = file_meta.permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        let dir_mode = dir_meta.permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: Config = toml::from_str("[broker]\nurl = \"ws://hub:9090\"\n").expect("parse");
        assert_eq!(cfg.broker.url, "ws://hub:9090");
        assert_eq!(cfg.broker.retry_delay_secs, 2);
        assert_eq!(cfg.gimbal.transport, TransportMode::Gateway);
        assert_eq!(cfg.delivery.tick_ms, 50);
    }

    #[test]
    fn transport_mode_parses_lowercase() {
        let cfg: Config = toml::from_str("[gimbal]\ntransport = \"sim\"\n").expect("parse");
        assert_eq!(cfg.gimbal.transport, TransportMode::Sim);
    }

    #[test]
    fn command_table_parses_default_frames() {
        let table = Config::default().command_table().expect("table");
        let frame = table.frame(Direction::Up).expect("up frame");
        assert_eq!(frame.len(), 8);
        assert_eq!(&frame[..2], &[0x24, 0x3a]);
    }

    #[test]
    fn command_table_rejects_bad_hex() {
        let mut cfg = Config::default();
        cfg.commands.left = "not hex".to_string();
        assert!(cfg.command_table().is_err());
    }

    #[test]
    fn command_table_rejects_empty_frame() {
        let mut cfg = Config::default();
        cfg.commands.down = String::new();
        assert!(cfg.command_table().is_err());
    }

    #[test]
    fn effective_client_id_generates_when_empty() {
        let broker = BrokerConfig::default();
        let a = broker.effective_client_id();
        let b = broker.effective_client_id();
        assert!(a.starts_with("swivel-"));
        assert_ne!(a, b, "generated ids must be unique per call");
    }

    #[test]
    fn effective_client_id_keeps_configured_value() {
        let broker = BrokerConfig {
            client_id: "bridge-7".to_string(),
            ..BrokerConfig::default()
        };
        assert_eq!(broker.effective_client_id(), "bridge-7");
    }

    #[test]
    fn apply_env_overrides_changes_broker_url() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("SWIVEL_BROKER_URL", "ws://hub:19090") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.broker.url, "ws://hub:19090");
        unsafe { std::env::remove_var("SWIVEL_BROKER_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_gimbal_address() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("SWIVEL_GIMBAL_ADDRESS", "AA:BB:CC:DD:EE:FF") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.gimbal.address, "AA:BB:CC:DD:EE:FF");
        unsafe { std::env::remove_var("SWIVEL_GIMBAL_ADDRESS") };
    }

    #[test]
    fn apply_env_overrides_guards_transport() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("SWIVEL_TRANSPORT", "sim") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.gimbal.transport, TransportMode::Sim);

        unsafe { std::env::set_var("SWIVEL_TRANSPORT", "carrier-pigeon") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.gimbal.transport, TransportMode::Sim, "junk must not change the mode");
        unsafe { std::env::remove_var("SWIVEL_TRANSPORT") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_timeout() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("SWIVEL_COMMAND_TIMEOUT_MS", "never") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.arbiter.command_timeout_ms, 500);
        unsafe { std::env::remove_var("SWIVEL_COMMAND_TIMEOUT_MS") };
    }
}

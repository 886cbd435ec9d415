//! Shared configuration for duetly front ends.
//!
//! TOML profiles, password resolution (keyring, env, plaintext) and
//! translation to `duetly_core::ConnectorConfig`. The CLI layers its
//! `GlobalOpts` overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use duetly_core::{ConnectorConfig, Protocol, TlsVerification};

const KEYRING_SERVICE: &str = "duetly";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("unknown profile '{profile}'")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named controller profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up `name`, or the default profile when `name` is `None`.
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get_key_value(name)
            .map(|(k, p)| (k.as_str(), p))
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// Request timeout before a session exists, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Live query interval on standalone controllers, in milliseconds.
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout_ms: default_timeout_ms(),
            update_interval_ms: default_update_interval_ms(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout_ms() -> u64 {
    4000
}
fn default_update_interval_ms() -> u64 {
    250
}

/// A named controller profile.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Controller address, e.g. "duet3.local" or "https://192.168.1.20".
    pub host: String,

    /// "auto", "poll" or "rest".
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Board password (plaintext, prefer keyring).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    pub insecure: Option<bool>,

    pub timeout_ms: Option<u64>,

    pub update_interval_ms: Option<u64>,

    /// Keep `.bak` copies of config files before overwriting them.
    pub backup_config_files: Option<bool>,
}

fn default_protocol() -> String {
    "auto".into()
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "duetly", "duetly").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("duetly");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path`, then `DUETLY_` environment variables
/// (`DUETLY_DEFAULTS__TIMEOUT_MS=8000`). A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DUETLY_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(&config_path(), cfg)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credentials ─────────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password"))
}

/// Resolve the board password: keyring, then the profile's env var, then
/// plaintext. Boards without a password accept an empty one.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> SecretString {
    // 1. System keyring
    if let Ok(secret) = keyring_entry(profile_name).and_then(|e| e.get_password()) {
        return SecretString::from(secret);
    }

    // 2. Profile's password_env → env var lookup
    if let Some(val) = profile
        .password_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
    {
        return SecretString::from(val);
    }

    // 3. Plaintext in config
    SecretString::from(profile.password.clone().unwrap_or_default())
}

/// Store the board password for `profile_name` in the system keyring.
pub fn store_password(profile_name: &str, password: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(password.expose_secret())?;
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Accept bare hostnames; Duet boards serve plain HTTP by default.
pub fn parse_host(host: &str) -> Result<Url, ConfigError> {
    let candidate = if host.contains("://") {
        host.to_owned()
    } else {
        format!("http://{host}")
    };
    Url::parse(&candidate).map_err(|e| ConfigError::Validation {
        field: "host".into(),
        reason: format!("invalid URL '{host}': {e}"),
    })
}

pub fn parse_protocol(protocol: &str) -> Result<Protocol, ConfigError> {
    match protocol {
        "auto" => Ok(Protocol::Auto),
        "poll" | "standalone" => Ok(Protocol::Poll),
        "rest" | "sbc" => Ok(Protocol::Rest),
        other => Err(ConfigError::Validation {
            field: "protocol".into(),
            reason: format!("expected 'auto', 'poll', or 'rest', got '{other}'"),
        }),
    }
}

/// Build a `ConnectorConfig` from a profile, no CLI flag overrides.
pub fn profile_to_connector_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<ConnectorConfig, ConfigError> {
    let url = parse_host(&profile.host)?;
    let password = resolve_password(profile, profile_name);

    let mut config = ConnectorConfig::new(url, password);
    config.protocol = parse_protocol(&profile.protocol)?;
    config.tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };
    config.default_timeout =
        Duration::from_millis(profile.timeout_ms.unwrap_or(defaults.timeout_ms));
    config.update_interval = Duration::from_millis(
        profile
            .update_interval_ms
            .unwrap_or(defaults.update_interval_ms),
    );
    if let Some(backup) = profile.backup_config_files {
        config.backup_config_files = backup;
    }
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn profile(host: &str) -> Profile {
        Profile {
            host: host.into(),
            protocol: default_protocol(),
            password: Some("reprap".into()),
            ..Profile::default()
        }
    }

    #[test]
    fn bare_hosts_default_to_http() {
        assert_eq!(parse_host("duet3.local").unwrap().as_str(), "http://duet3.local/");
        assert_eq!(
            parse_host("https://10.0.0.5").unwrap().as_str(),
            "https://10.0.0.5/"
        );
        assert!(parse_host("http://").is_err());
    }

    #[test]
    fn unknown_protocol_is_rejected() {
        assert!(matches!(parse_protocol("sbc"), Ok(Protocol::Rest)));
        assert!(matches!(
            parse_protocol("serial"),
            Err(ConfigError::Validation { ref field, .. }) if field == "protocol"
        ));
    }

    #[test]
    fn profile_overrides_defaults() {
        let mut p = profile("duet3.local");
        p.protocol = "poll".into();
        p.timeout_ms = Some(9000);
        p.backup_config_files = Some(false);
        let defaults = Defaults::default();

        let config = profile_to_connector_config(&p, "workshop", &defaults).unwrap();
        assert!(matches!(config.protocol, Protocol::Poll));
        assert_eq!(config.default_timeout, Duration::from_secs(9));
        assert_eq!(config.update_interval, Duration::from_millis(250));
        assert!(!config.backup_config_files);
        assert!(matches!(config.tls, TlsVerification::SystemDefaults));
    }

    #[test]
    fn insecure_wins_over_ca_cert() {
        let mut p = profile("https://duet.lan");
        p.insecure = Some(true);
        p.ca_cert = Some(PathBuf::from("/etc/duet-ca.pem"));
        let config = profile_to_connector_config(&p, "lan", &Defaults::default()).unwrap();
        assert!(matches!(config.tls, TlsVerification::DangerAcceptInvalid));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut cfg = Config::default();
        cfg.profiles.insert("default".into(), profile("duet3.local"));
        cfg.defaults.update_interval_ms = 500;
        save_config_to(&path, &cfg).unwrap();

        let loaded = load_config_from(&path).unwrap();
        let (name, p) = loaded.profile(None).unwrap();
        assert_eq!(name, "default");
        assert_eq!(p.host, "duet3.local");
        assert_eq!(p.protocol, "auto");
        assert_eq!(loaded.defaults.update_interval_ms, 500);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.default_profile.as_deref(), Some("default"));
        assert!(matches!(
            loaded.profile(Some("shop")),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }
}

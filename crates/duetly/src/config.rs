//! CLI configuration: thin wrapper around `duetly_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides (--host,
//! --password, --protocol, ...).

use std::time::Duration;

use secrecy::SecretString;

use duetly_core::{ConnectorConfig, Protocol, TlsVerification};

use crate::cli::{GlobalOpts, ProtocolArg};
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use duetly_config::{
    Config, Defaults, Profile, config_path, load_config_or_default, parse_host, save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .or_else(|| config.default_profile.clone())
        .unwrap_or_else(|| "default".into())
}

pub fn available_profiles(config: &Config) -> String {
    let mut names: Vec<_> = config.profiles.keys().cloned().collect();
    if names.is_empty() {
        return "(none)".into();
    }
    names.sort();
    names.join(", ")
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Auto => Self::Auto,
            ProtocolArg::Poll => Self::Poll,
            ProtocolArg::Rest => Self::Rest,
        }
    }
}

/// Build a `ConnectorConfig` from the config file, profile, and CLI
/// overrides. Flags win over profile values.
pub fn build_connector_config(global: &GlobalOpts) -> Result<ConnectorConfig, CliError> {
    let cfg = load_config_or_default();
    let profile_name = active_profile_name(global, &cfg);

    let mut config = if let Some(profile) = cfg.profiles.get(&profile_name) {
        duetly_config::profile_to_connector_config(profile, &profile_name, &cfg.defaults)?
    } else if global.profile.is_some() {
        return Err(CliError::ProfileNotFound {
            name: profile_name,
            available: available_profiles(&cfg),
        });
    } else {
        // No profile: the host must come from flags or env.
        let host = global.host.as_deref().ok_or_else(|| CliError::NoConfig {
            path: config_path().display().to_string(),
        })?;
        let mut config = ConnectorConfig::new(parse_host(host)?, SecretString::from(String::new()));
        config.default_timeout = Duration::from_millis(cfg.defaults.timeout_ms);
        config.update_interval = Duration::from_millis(cfg.defaults.update_interval_ms);
        if cfg.defaults.insecure {
            config.tls = TlsVerification::DangerAcceptInvalid;
        }
        config
    };

    if let Some(ref host) = global.host {
        config.url = parse_host(host)?;
    }
    if let Some(ref password) = global.password {
        config.password = SecretString::from(password.clone());
    }
    if let Some(protocol) = global.protocol {
        config.protocol = protocol.into();
    }
    if global.insecure {
        config.tls = TlsVerification::DangerAcceptInvalid;
    }
    if let Some(ms) = global.timeout_ms {
        config.default_timeout = Duration::from_millis(ms);
    }
    Ok(config)
}

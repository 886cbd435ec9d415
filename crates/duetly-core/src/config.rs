// ── Runtime connection configuration ──
//
// These types describe how to reach one controller and how the connector
// behaves once connected. The CLI builds a `ConnectorConfig` from its
// profile files; core never reads config files itself.

use std::time::Duration;

use duetly_api::{ReconnectPolicy, RetryPolicy, TlsMode, TransportConfig, Variant};
use secrecy::SecretString;
use url::Url;

/// Which wire variant to speak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Protocol {
    /// Probe the standalone endpoints first, fall back to REST.
    #[default]
    Auto,
    Poll,
    Rest,
}

impl From<Variant> for Protocol {
    fn from(variant: Variant) -> Self {
        match variant {
            Variant::Poll => Self::Poll,
            Variant::Rest => Self::Rest,
        }
    }
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed certificates).
    DangerAcceptInvalid,
}

impl From<&TlsVerification> for TlsMode {
    fn from(tls: &TlsVerification) -> Self {
        match tls {
            TlsVerification::SystemDefaults => Self::System,
            TlsVerification::CustomCa(path) => Self::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => Self::DangerAcceptInvalid,
        }
    }
}

/// Files backed up to `<name>.bak` before they are overwritten.
pub const PROTECTED_CONFIG_FILES: &[&str] = &["sys/config.g", "sys/config-override.g"];

/// 350 KiB.
pub const DEFAULT_RETRY_THRESHOLD: u64 = 350 * 1024;

/// Configuration for one controller connection.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Controller URL, e.g. `http://duet3.local`.
    pub url: Url,
    pub password: SecretString,
    pub protocol: Protocol,
    pub tls: TlsVerification,
    /// Request timeout before a session exists.
    pub default_timeout: Duration,
    /// Extra attempts for requests failing with a transient error.
    pub max_retries: u32,
    /// Delay between live queries on the standalone variant.
    pub update_interval: Duration,
    /// Keep-alive interval on the model WebSocket.
    pub ping_interval: Duration,
    pub reconnect: ReconnectPolicy,
    /// Send a CRC-32 with standalone uploads.
    pub crc_uploads: bool,
    /// Uploads up to this size are retried after a failed transfer.
    pub file_transfer_retry_threshold: u64,
    /// Skip unknown model keys instead of keeping them in `extra`.
    pub strict_merge: bool,
    /// Copy config files to `.bak` before overwriting them.
    pub backup_config_files: bool,
}

impl ConnectorConfig {
    pub fn new(url: Url, password: SecretString) -> Self {
        Self {
            url,
            password,
            protocol: Protocol::Auto,
            tls: TlsVerification::default(),
            default_timeout: Duration::from_secs(4),
            max_retries: 2,
            update_interval: Duration::from_millis(250),
            ping_interval: Duration::from_secs(8),
            reconnect: ReconnectPolicy::default(),
            crc_uploads: true,
            file_transfer_retry_threshold: DEFAULT_RETRY_THRESHOLD,
            strict_merge: true,
            backup_config_files: true,
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: TlsMode::from(&self.tls),
            default_timeout: self.default_timeout,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                ..RetryPolicy::default()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn transport_carries_retry_settings() {
        let mut config = ConnectorConfig::new(
            "http://duet.local".parse().unwrap(),
            SecretString::from(String::new()),
        );
        config.max_retries = 5;
        config.tls = TlsVerification::DangerAcceptInvalid;
        let transport = config.transport();
        assert_eq!(transport.retry.max_retries, 5);
        assert!(matches!(transport.tls, TlsMode::DangerAcceptInvalid));
    }
}

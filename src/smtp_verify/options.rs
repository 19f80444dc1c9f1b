use std::net::SocketAddr;
use std::time::Duration;

use native_tls::TlsConnector;
#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use crate::smtp_verify::error::ProbeError;

/// Submission, plain SMTP, then SMTPS.
pub const DEFAULT_PORTS: [u16; 3] = [587, 25, 465];

/// Port on which TLS is established at connect time instead of via STARTTLS.
pub const SMTPS_PORT: u16 = 465;

/// Process-wide settings read by [`Validator`](crate::Validator). Nothing here
/// changes during a validation call.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "with-serde", serde(default))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Envelope sender, sent verbatim in `MAIL FROM`.
    pub sender: String,
    /// Recursive resolver used for MX and reverse lookups.
    pub resolver: SocketAddr,
    /// Per connection attempt; also applied to socket reads and writes.
    pub timeout_ms: u64,
    pub dns_timeout_ms: u64,
    /// Candidate ports, tried in order for every address of a host.
    pub ports: Vec<u16>,
    pub implicit_tls_port: u16,
    /// Skip certificate chain and hostname checks on TLS sessions.
    pub accept_invalid_certs: bool,
    /// Keep going in cleartext when a STARTTLS upgrade fails.
    pub continue_without_tls: bool,
    pub sort_mx_by_preference: bool,
    /// Overrides the derived `EHLO` name.
    pub helo_name: Option<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            sender: String::new(),
            resolver: SocketAddr::from(([8, 8, 8, 8], 53)),
            timeout_ms: 5_000,
            dns_timeout_ms: 5_000,
            ports: DEFAULT_PORTS.to_vec(),
            implicit_tls_port: SMTPS_PORT,
            accept_invalid_certs: true,
            continue_without_tls: true,
            sort_mx_by_preference: false,
            helo_name: None,
        }
    }
}

impl ProbeConfig {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            ..Self::default()
        }
    }

    /// Return the timeout as a [`Duration`]. A zero timeout disables the
    /// connection/read deadline.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_ms))
        }
    }

    pub fn dns_timeout(&self) -> Option<Duration> {
        if self.dns_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.dns_timeout_ms))
        }
    }

    /// Configured `EHLO` name, if any non-blank one was set.
    pub fn helo_override(&self) -> Option<&str> {
        self.helo_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    pub fn tls_connector(&self) -> Result<TlsConnector, ProbeError> {
        TlsConnector::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .danger_accept_invalid_hostnames(self.accept_invalid_certs)
            .build()
            .map_err(|source| ProbeError::TlsInit { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_uses_documented_defaults() {
        let config = ProbeConfig::new("probe@example.org");
        assert_eq!(config.sender, "probe@example.org");
        assert_eq!(config.ports, vec![587, 25, 465]);
        assert_eq!(config.timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.resolver.to_string(), "8.8.8.8:53");
        assert!(config.accept_invalid_certs);
        assert!(config.continue_without_tls);
        assert!(!config.sort_mx_by_preference);
    }

    #[test]
    fn zero_timeout_disables_deadline() {
        let config = ProbeConfig {
            timeout_ms: 0,
            dns_timeout_ms: 0,
            ..ProbeConfig::default()
        };
        assert_eq!(config.timeout(), None);
        assert_eq!(config.dns_timeout(), None);
    }

    #[test]
    fn blank_helo_override_is_ignored() {
        let mut config = ProbeConfig::default();
        assert_eq!(config.helo_override(), None);
        config.helo_name = Some("   ".to_string());
        assert_eq!(config.helo_override(), None);
        config.helo_name = Some("probe.example.net".to_string());
        assert_eq!(config.helo_override(), Some("probe.example.net"));
    }

    #[cfg(feature = "with-serde")]
    #[test]
    fn partial_json_keeps_defaults() {
        let config: ProbeConfig =
            serde_json::from_str(r#"{"sender":"me@example.org","resolver":"1.1.1.1:53"}"#)
                .expect("valid config");
        assert_eq!(config.sender, "me@example.org");
        assert_eq!(config.resolver.to_string(), "1.1.1.1:53");
        assert_eq!(config.ports, DEFAULT_PORTS.to_vec());
    }
}

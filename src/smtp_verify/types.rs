use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

/// A host/port pair that accepted a TCP connection, as picked by the locator.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpEndpoint {
    pub hostname: String,
    pub ip_address: IpAddr,
    pub port: u16,
    /// TLS must be negotiated before the greeting (SMTPS).
    pub implicit_tls: bool,
}

impl SmtpEndpoint {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip_address, self.port)
    }

    pub fn protocol(&self) -> &'static str {
        if self.implicit_tls { "SMTPS" } else { "SMTP" }
    }
}

impl fmt::Display for SmtpEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} ({}, {})",
            self.hostname,
            self.port,
            self.protocol(),
            self.ip_address
        )
    }
}

/// Final answer of [`Validator::validate`](crate::Validator::validate).
///
/// Verdicts are only built through the named constructors, which keep two
/// invariants: a catch-all verdict is always valid, and a verdict without MX
/// records is never valid.
#[cfg_attr(feature = "with-serde", derive(Serialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    is_valid: bool,
    is_catch_all: bool,
    has_mx_records: bool,
    error_message: String,
    #[cfg_attr(feature = "with-serde", serde(skip_serializing_if = "Option::is_none"))]
    endpoint: Option<SmtpEndpoint>,
}

impl ValidationVerdict {
    fn new(is_valid: bool, is_catch_all: bool, has_mx_records: bool, message: String) -> Self {
        Self {
            is_valid,
            is_catch_all,
            has_mx_records,
            error_message: message,
            endpoint: None,
        }
    }

    pub fn invalid_format() -> Self {
        Self::new(false, false, false, "invalid email format".to_string())
    }

    pub fn no_mx_records() -> Self {
        Self::new(false, false, false, "no MX records found".to_string())
    }

    pub fn accepted() -> Self {
        Self::new(true, false, true, String::new())
    }

    pub fn reverse_dns_deferred() -> Self {
        Self::new(
            true,
            false,
            true,
            "reverse DNS lookup required but email might be valid".to_string(),
        )
    }

    pub fn rejected() -> Self {
        Self::new(false, false, true, "recipient does not exist.".to_string())
    }

    pub fn catch_all() -> Self {
        Self::new(true, true, true, String::new())
    }

    /// Every MX host was tried without a classified answer.
    pub fn exhausted(last_error: impl Into<String>) -> Self {
        Self::new(false, false, true, last_error.into())
    }

    /// The caller's deadline expired before the probe finished. The MX lookup
    /// may or may not have completed, so `has_mx_records` is false and the
    /// message says the MX status is unknown.
    pub fn timed_out(deadline: Duration) -> Self {
        Self::new(
            false,
            false,
            false,
            format!(
                "validation timed out after {} ms (MX status unknown)",
                deadline.as_millis()
            ),
        )
    }

    pub fn with_endpoint(mut self, endpoint: SmtpEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn is_catch_all(&self) -> bool {
        self.is_catch_all
    }

    pub fn has_mx_records(&self) -> bool {
        self.has_mx_records
    }

    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn endpoint(&self) -> Option<&SmtpEndpoint> {
        self.endpoint.as_ref()
    }
}

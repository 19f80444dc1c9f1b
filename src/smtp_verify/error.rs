use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

use crate::mx::MxError;
use crate::smtp_verify::session::SmtpReply;

/// Step of the SMTP dialogue an attempt failed in.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStage {
    Connect,
    Greeting,
    Hello,
    StartTls,
    MailFrom,
    RcptTo,
}

impl fmt::Display for HandshakeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connection",
            Self::Greeting => "greeting",
            Self::Hello => "HELO",
            Self::StartTls => "STARTTLS",
            Self::MailFrom => "MAIL FROM",
            Self::RcptTo => "RCPT TO",
        })
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid email format")]
    InvalidFormat,
    #[error("no MX records found: {source}")]
    NoMxRecords {
        #[source]
        source: MxError,
    },
    #[error("failed to lookup IP for {host}: {source}")]
    HostLookup {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no available SMTP servers found for {host}")]
    Unreachable { host: String },
    #[error("{stage} failed: {detail}")]
    HandshakeFailed {
        stage: HandshakeStage,
        detail: String,
    },
    #[error("recipient check failed: {reply}")]
    RecipientUnclassified { reply: SmtpReply },
    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
    #[error("TLS handshake failed: {source}")]
    Tls {
        #[source]
        source: native_tls::Error,
    },
    #[error("TLS connector initialization failed: {source}")]
    TlsInit {
        #[source]
        source: native_tls::Error,
    },
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ProbeError {
    pub(crate) fn handshake(stage: HandshakeStage, detail: impl fmt::Display) -> Self {
        Self::HandshakeFailed {
            stage,
            detail: detail.to_string(),
        }
    }

    pub(crate) fn io(source: std::io::Error) -> Self {
        Self::Io { source }
    }

    /// True for the errors that move the orchestrator on to the next MX host
    /// without trying a handshake.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::HostLookup { .. } | Self::Unreachable { .. })
    }
}

impl From<MxError> for ProbeError {
    fn from(source: MxError) -> Self {
        Self::NoMxRecords { source }
    }
}

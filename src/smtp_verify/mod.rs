//! SMTP deliverability probing.
//!
//! The public entry points are [`Validator::validate`] and the one-shot
//! [`check_mailaddress_exists`]. A probe resolves the domain's MX hosts, finds
//! a reachable SMTP port on each, runs the dialogue up to `RCPT TO` (first in
//! cleartext, then with STARTTLS) and classifies the recipient reply into a
//! [`ValidationVerdict`]. No message is ever sent.

mod classify;
mod error;
mod handshake;
mod identity;
mod locator;
mod options;
mod probe;
mod session;
mod types;

pub use classify::{RecipientOutcome, classify};
pub use error::{HandshakeStage, ProbeError};
pub use identity::FALLBACK_HELO_NAME;
pub use options::{DEFAULT_PORTS, ProbeConfig, SMTPS_PORT};
pub use probe::{Validator, check_mailaddress_exists};
pub use session::SmtpReply;
pub use types::{SmtpEndpoint, ValidationVerdict};

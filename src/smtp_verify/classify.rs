use std::fmt;

#[cfg(feature = "with-serde")]
use serde::{Deserialize, Serialize};

use crate::smtp_verify::error::ProbeError;
use crate::smtp_verify::session::SmtpReply;
use crate::smtp_verify::types::ValidationVerdict;

/// Interpretation of the server's answer to `RCPT TO`.
#[cfg_attr(feature = "with-serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientOutcome {
    /// 2xx: the mailbox was accepted.
    Accepted,
    /// 450 asking for a reverse DNS entry on our side. The server deferred
    /// rather than rejected, so the address is assumed deliverable.
    ReverseDnsDeferred,
    /// 550: the mailbox does not exist.
    Rejected,
    /// A failure reply that still carries a 250 indicator: the domain accepts
    /// every recipient and the answer says nothing about this mailbox.
    CatchAll,
}

impl RecipientOutcome {
    pub fn into_verdict(self) -> ValidationVerdict {
        match self {
            Self::Accepted => ValidationVerdict::accepted(),
            Self::ReverseDnsDeferred => ValidationVerdict::reverse_dns_deferred(),
            Self::Rejected => ValidationVerdict::rejected(),
            Self::CatchAll => ValidationVerdict::catch_all(),
        }
    }
}

impl fmt::Display for RecipientOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accepted => "recipient accepted",
            Self::ReverseDnsDeferred => "reverse DNS deferred",
            Self::Rejected => "recipient rejected",
            Self::CatchAll => "catch-all detected",
        })
    }
}

/// Classifies a `RCPT TO` reply. Replies matching none of the rules come back
/// as [`ProbeError::RecipientUnclassified`] so the caller can fall back to the
/// next attempt.
pub fn classify(reply: &SmtpReply) -> Result<RecipientOutcome, ProbeError> {
    if reply.code == 450 && mentions_reverse_dns(reply) {
        return Ok(RecipientOutcome::ReverseDnsDeferred);
    }
    if reply.code == 550 {
        return Ok(RecipientOutcome::Rejected);
    }
    if !reply.is_positive_completion() && embeds_positive_code(reply) {
        return Ok(RecipientOutcome::CatchAll);
    }
    if reply.is_positive_completion() {
        return Ok(RecipientOutcome::Accepted);
    }
    Err(ProbeError::RecipientUnclassified {
        reply: reply.clone(),
    })
}

fn mentions_reverse_dns(reply: &SmtpReply) -> bool {
    let text = reply.text().to_ascii_lowercase();
    text.contains("4.7.1")
        || text.contains("reverse")
        || text.contains("rdns")
        || tokens(&text).any(|token| token == "ptr")
}

fn embeds_positive_code(reply: &SmtpReply) -> bool {
    tokens(&reply.text()).any(|token| token == "250" || token.starts_with("250-"))
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '(' | ')' | '[' | ']'))
        .filter(|token| !token.is_empty())
}

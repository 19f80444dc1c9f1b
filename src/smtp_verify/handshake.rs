use native_tls::TlsConnector;
use tracing::{debug, warn};

use crate::smtp_verify::classify::{RecipientOutcome, classify};
use crate::smtp_verify::error::{HandshakeStage as Stage, ProbeError};
use crate::smtp_verify::options::ProbeConfig;
use crate::smtp_verify::session::{SmtpReply, SmtpSession};
use crate::smtp_verify::types::SmtpEndpoint;

/// Everything one handshake attempt needs besides the process configuration.
pub(crate) struct HandshakeRequest<'a> {
    pub endpoint: &'a SmtpEndpoint,
    pub recipient: &'a str,
    pub helo: &'a str,
    pub request_tls: bool,
}

/// Runs greeting, optional STARTTLS, `MAIL FROM` and `RCPT TO` on a fresh
/// connection, then hangs up. No message body is ever sent.
///
/// Any failure before the recipient step is a [`ProbeError::HandshakeFailed`].
/// The `RCPT TO` reply goes through [`classify`].
pub(crate) fn attempt_handshake(
    request: &HandshakeRequest<'_>,
    config: &ProbeConfig,
    connector: &TlsConnector,
) -> Result<RecipientOutcome, ProbeError> {
    let endpoint = request.endpoint;
    debug!(
        host = %endpoint.hostname,
        port = endpoint.port,
        request_tls = request.request_tls,
        "starting SMTP handshake"
    );

    let mut session = SmtpSession::connect(endpoint, connector, config.timeout())
        .map_err(|err| ProbeError::handshake(Stage::Connect, err))?;

    let banner = session
        .read_banner()
        .map_err(|err| ProbeError::handshake(Stage::Greeting, err))?;
    if !banner.is_positive_completion() {
        session.quit().ok();
        return Err(ProbeError::handshake(Stage::Greeting, banner));
    }

    let capabilities = hello(&mut session, request.helo)?;

    let starttls_offered = capabilities
        .as_ref()
        .is_some_and(|ehlo| ehlo.has_capability("STARTTLS"));
    if !session.is_tls() && request.request_tls && starttls_offered {
        if let Err(err) = upgrade(&mut session, endpoint, request.helo, connector) {
            if !config.continue_without_tls {
                session.quit().ok();
                return Err(err);
            }
            warn!(host = %endpoint.hostname, error = %err, "continuing without TLS");
        }
    }

    let envelope = format!("MAIL FROM:<{}>", config.sender);
    let mail_reply = session
        .send_command(&envelope)
        .map_err(|err| ProbeError::handshake(Stage::MailFrom, err))?;
    if !mail_reply.is_positive_completion() {
        session.quit().ok();
        return Err(ProbeError::handshake(Stage::MailFrom, mail_reply));
    }

    let rcpt_reply = session
        .send_command(&format!("RCPT TO:<{}>", request.recipient))
        .map_err(|err| ProbeError::handshake(Stage::RcptTo, err))?;
    session.quit().ok();

    let outcome = classify(&rcpt_reply);
    debug!(host = %endpoint.hostname, reply = %rcpt_reply, ?outcome, "recipient step answered");
    outcome
}

/// `EHLO`, falling back to `HELO` when the server refuses the extended
/// greeting. Returns the `EHLO` reply (capabilities) when it was accepted.
fn hello(session: &mut SmtpSession, helo: &str) -> Result<Option<SmtpReply>, ProbeError> {
    let ehlo = session
        .send_command(&format!("EHLO {helo}"))
        .map_err(|err| ProbeError::handshake(Stage::Hello, err))?;
    if ehlo.is_positive_completion() {
        return Ok(Some(ehlo));
    }

    let reply = session
        .send_command(&format!("HELO {helo}"))
        .map_err(|err| ProbeError::handshake(Stage::Hello, err))?;
    if reply.is_positive_completion() {
        Ok(None)
    } else {
        Err(ProbeError::handshake(Stage::Hello, reply))
    }
}

fn upgrade(
    session: &mut SmtpSession,
    endpoint: &SmtpEndpoint,
    helo: &str,
    connector: &TlsConnector,
) -> Result<(), ProbeError> {
    let reply = session
        .starttls(&endpoint.hostname, connector)
        .map_err(|err| ProbeError::handshake(Stage::StartTls, err))?;
    if !reply.is_positive_completion() {
        return Err(ProbeError::handshake(Stage::StartTls, reply));
    }
    // the session state is reset by the upgrade: greet again over TLS
    let ehlo = session
        .send_command(&format!("EHLO {helo}"))
        .map_err(|err| ProbeError::handshake(Stage::StartTls, err))?;
    if !ehlo.is_positive_completion() {
        return Err(ProbeError::handshake(Stage::StartTls, ehlo));
    }
    Ok(())
}

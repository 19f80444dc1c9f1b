use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use native_tls::TlsConnector;
use tracing::{debug, info};
use trust_dns_resolver::Resolver;

use crate::address::{extract_domain, split_address};
use crate::mx::{LookupMx, MxRecord, build_resolver, resolve_with};
use crate::smtp_verify::error::ProbeError;
use crate::smtp_verify::handshake::{HandshakeRequest, attempt_handshake};
use crate::smtp_verify::identity::{HostIdentity, SystemIdentity, derive_helo_name};
use crate::smtp_verify::locator::{LookupHost, SystemHosts, locate_reachable_endpoint};
use crate::smtp_verify::options::ProbeConfig;
use crate::smtp_verify::types::{SmtpEndpoint, ValidationVerdict};

/// One-shot helper: builds a [`Validator`] for `config` and probes `addr`.
///
/// Only resolver or TLS initialisation can fail; every outcome of the probe
/// itself is a [`ValidationVerdict`].
pub fn check_mailaddress_exists(
    addr: &str,
    config: &ProbeConfig,
) -> Result<ValidationVerdict, ProbeError> {
    Ok(Validator::new(config.clone())?.validate(addr))
}

/// Probes addresses under one configuration (sender identity, resolver,
/// timeouts). Holds no state between calls besides that configuration, so a
/// process can run several validators with different senders side by side.
pub struct Validator {
    config: ProbeConfig,
    resolver: Resolver,
    connector: TlsConnector,
}

impl Validator {
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeError> {
        let resolver = build_resolver(config.resolver, config.dns_timeout())?;
        let connector = config.tls_connector()?;
        Ok(Self {
            config,
            resolver,
            connector,
        })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Full probe of `email`: format check, MX lookup, then handshakes against
    /// each MX host until one of them yields a classified answer.
    pub fn validate(&self, email: &str) -> ValidationVerdict {
        let identity = SystemIdentity::new(&self.resolver);
        self.probe(&identity).validate(email)
    }

    /// Like [`validate`](Self::validate) but gives up after `deadline`.
    ///
    /// The probe runs on a worker thread; when the deadline passes the worker
    /// is left to finish on its own (its result is discarded) and a timed-out
    /// verdict is returned.
    pub fn validate_with_deadline(self: &Arc<Self>, email: &str, deadline: Duration) -> ValidationVerdict {
        let (tx, rx) = mpsc::channel();
        let validator = Arc::clone(self);
        let email_owned = email.to_string();
        thread::spawn(move || {
            tx.send(validator.validate(&email_owned)).ok();
        });
        match rx.recv_timeout(deadline) {
            Ok(verdict) => verdict,
            Err(_) => {
                info!(%email, ?deadline, "validation deadline expired");
                ValidationVerdict::timed_out(deadline)
            }
        }
    }

    /// Mail-exchange hostnames for `domain`, in the configured order.
    pub fn mail_servers(&self, domain: &str) -> Result<Vec<String>, ProbeError> {
        let records = resolve_with(&self.resolver, domain, self.config.sort_mx_by_preference)?;
        Ok(records.into_iter().map(|r| r.exchange).collect())
    }

    /// Mail-exchange hostnames for the domain of `email`.
    pub fn mail_servers_for_recipient(&self, email: &str) -> Result<Vec<String>, ProbeError> {
        self.mail_servers(extract_domain(email)?)
    }

    /// First reachable SMTP endpoint of a mail-exchange host.
    pub fn locate(&self, hostname: &str) -> Result<SmtpEndpoint, ProbeError> {
        locate_reachable_endpoint(hostname, &SystemHosts, &self.config)
    }

    /// A single handshake against `endpoint`. `Err` means the attempt did not
    /// produce a classified answer and another attempt may be worth making.
    pub fn attempt(
        &self,
        endpoint: &SmtpEndpoint,
        recipient: &str,
        helo: &str,
        request_tls: bool,
    ) -> Result<ValidationVerdict, ProbeError> {
        let request = HandshakeRequest {
            endpoint,
            recipient,
            helo,
            request_tls,
        };
        attempt_handshake(&request, &self.config, &self.connector)
            .map(|outcome| outcome.into_verdict().with_endpoint(endpoint.clone()))
    }

    /// The name announced in `EHLO` (configured override or derived).
    pub fn local_helo_name(&self) -> String {
        match self.config.helo_override() {
            Some(name) => name.to_string(),
            None => derive_helo_name(&SystemIdentity::new(&self.resolver)),
        }
    }

    fn probe<'a, I: HostIdentity>(&'a self, identity: &'a I) -> Probe<'a, Resolver, SystemHosts, I> {
        Probe {
            config: &self.config,
            mx: &self.resolver,
            hosts: &SystemHosts,
            identity,
            connector: &self.connector,
        }
    }
}

/// Order in which the two negotiation modes are tried against a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TlsMode {
    Plain,
    StartTls,
}

const TLS_MODES: [TlsMode; 2] = [TlsMode::Plain, TlsMode::StartTls];

/// A single entry of the attempt plan: MX host (by position) and mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlannedAttempt<'a> {
    pub host_index: usize,
    pub host: &'a str,
    pub mode: TlsMode,
}

/// Host × mode, in MX order, evaluated lazily.
pub(crate) fn attempt_plan(records: &[MxRecord]) -> impl Iterator<Item = PlannedAttempt<'_>> {
    records.iter().enumerate().flat_map(|(host_index, record)| {
        TLS_MODES.into_iter().map(move |mode| PlannedAttempt {
            host_index,
            host: record.exchange.as_str(),
            mode,
        })
    })
}

/// The orchestration, with every network dependency behind a trait.
pub(crate) struct Probe<'a, R: ?Sized, H: ?Sized, I: ?Sized> {
    pub config: &'a ProbeConfig,
    pub mx: &'a R,
    pub hosts: &'a H,
    pub identity: &'a I,
    pub connector: &'a TlsConnector,
}

impl<R, H, I> Probe<'_, R, H, I>
where
    R: LookupMx + ?Sized,
    H: LookupHost + ?Sized,
    I: HostIdentity + ?Sized,
{
    pub(crate) fn validate(&self, email: &str) -> ValidationVerdict {
        let Some(address) = split_address(email) else {
            debug!(%email, "rejected by format check");
            return ValidationVerdict::invalid_format();
        };

        let records = match resolve_with(self.mx, address.domain, self.config.sort_mx_by_preference) {
            Ok(records) => records,
            Err(err) => {
                info!(%email, error = %err, "no MX records");
                return ValidationVerdict::no_mx_records();
            }
        };

        let helo = match self.config.helo_override() {
            Some(name) => name.to_string(),
            None => derive_helo_name(self.identity),
        };

        let mut last_error: Option<ProbeError> = None;
        let mut located: Option<(usize, Option<SmtpEndpoint>)> = None;

        for attempt in attempt_plan(&records) {
            if located.as_ref().map(|(index, _)| *index) != Some(attempt.host_index) {
                let endpoint = match locate_reachable_endpoint(attempt.host, self.hosts, self.config) {
                    Ok(endpoint) => Some(endpoint),
                    Err(err) => {
                        debug!(host = %attempt.host, error = %err, "skipping MX host");
                        last_error = Some(err);
                        None
                    }
                };
                located = Some((attempt.host_index, endpoint));
            }
            let Some((_, Some(endpoint))) = located.as_ref() else {
                continue;
            };

            let request = HandshakeRequest {
                endpoint,
                recipient: email,
                helo: &helo,
                request_tls: attempt.mode == TlsMode::StartTls,
            };
            match attempt_handshake(&request, self.config, self.connector) {
                Ok(outcome) => {
                    info!(%email, host = %endpoint.hostname, %outcome, "validation finished");
                    return outcome.into_verdict().with_endpoint(endpoint.clone());
                }
                Err(err) => {
                    debug!(host = %endpoint.hostname, mode = ?attempt.mode, error = %err, "attempt failed");
                    last_error = Some(err);
                }
            }
        }

        let message = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "no mail exchange host could be probed".to_string());
        info!(%email, %message, "every MX host exhausted");
        ValidationVerdict::exhausted(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;

    #[test]
    fn expired_deadline_reports_unknown_mx_status() {
        // a resolver that receives queries and never answers
        let silent_dns = UdpSocket::bind("127.0.0.1:0").expect("bind udp");
        let mut config = ProbeConfig::new("probe@sender.test");
        config.resolver = silent_dns.local_addr().expect("addr");
        config.dns_timeout_ms = 2_000;
        let validator = Arc::new(Validator::new(config).expect("validator"));

        let verdict = validator.validate_with_deadline("user@example.com", Duration::from_millis(100));
        assert!(!verdict.is_valid());
        assert!(!verdict.has_mx_records());
        assert_eq!(
            verdict.error_message(),
            "validation timed out after 100 ms (MX status unknown)"
        );
        assert!(verdict.endpoint().is_none());
    }

    #[test]
    fn deadline_does_not_alter_a_fast_verdict() {
        let config = ProbeConfig::new("probe@sender.test");
        let validator = Arc::new(Validator::new(config).expect("validator"));
        // rejected by the format check before any network activity
        let verdict = validator.validate_with_deadline("not-an-address", Duration::from_secs(5));
        assert_eq!(verdict, ValidationVerdict::invalid_format());
    }
}

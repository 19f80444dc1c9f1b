use std::net::SocketAddr;
use std::time::Duration;

use tracing::debug;
use trust_dns_resolver::{
    Resolver,
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    error::{ResolveError, ResolveErrorKind},
};

use super::{MxError, MxRecord};
use crate::smtp_verify::ProbeConfig;

/// Lookup MX hosts for `domain` through the resolver configured in `config`.
///
/// Records come back in DNS answer order unless
/// [`ProbeConfig::sort_mx_by_preference`] is set. Zero records is an error:
/// a domain without MX hosts cannot be probed.
pub fn lookup_mail_exchangers(
    domain: &str,
    config: &ProbeConfig,
) -> Result<Vec<MxRecord>, MxError> {
    let resolver = build_resolver(config.resolver, config.dns_timeout())?;
    resolve_with(&resolver, domain, config.sort_mx_by_preference)
}

/// Builds a synchronous resolver that only talks to `endpoint` (plain UDP/TCP,
/// no DNSSEC).
pub fn build_resolver(
    endpoint: SocketAddr,
    timeout: Option<Duration>,
) -> Result<Resolver, MxError> {
    let name_servers = NameServerConfigGroup::from_ips_clear(&[endpoint.ip()], endpoint.port(), true);
    let config = ResolverConfig::from_parts(None, Vec::new(), name_servers);
    let mut opts = ResolverOpts::default();
    if let Some(timeout) = timeout {
        opts.timeout = timeout;
    }
    Resolver::new(config, opts).map_err(MxError::resolver_init)
}

pub(crate) fn resolve_with<R>(
    resolver: &R,
    domain: &str,
    sort_by_preference: bool,
) -> Result<Vec<MxRecord>, MxError>
where
    R: LookupMx + ?Sized,
{
    let domain = domain.trim();
    if domain.is_empty() {
        return Err(MxError::EmptyDomain);
    }

    debug!(%domain, "looking up MX records");
    let mut records = Vec::new();
    for record in resolver.lookup_mx(domain).map_err(MxError::lookup)? {
        let exchange = normalize_exchange(&record.exchange);
        if exchange.is_empty() || records.iter().any(|r: &MxRecord| r.exchange == exchange) {
            continue;
        }
        records.push(MxRecord::new(record.preference, exchange));
    }

    if sort_by_preference {
        // stable: equal preferences keep their answer order
        records.sort_by_key(|r| r.preference);
    }

    if records.is_empty() {
        return Err(MxError::no_records(domain));
    }
    debug!(%domain, count = records.len(), "MX records resolved");
    Ok(records)
}

pub(crate) fn normalize_exchange(exchange: &str) -> String {
    exchange.trim_end_matches('.').to_ascii_lowercase()
}

pub(crate) trait LookupMx {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError>;
}

impl LookupMx for Resolver {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, ResolveError> {
        let lookup = match Resolver::mx_lookup(self, domain) {
            Ok(lookup) => lookup,
            Err(err) if matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. }) => {
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        Ok(lookup
            .iter()
            .map(|mx| MxRecord::new(mx.preference(), mx.exchange().to_utf8()))
            .collect())
    }
}

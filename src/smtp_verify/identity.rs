use std::io;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};

use tracing::debug;
use trust_dns_resolver::Resolver;

/// Name announced when the machine hostname cannot be read.
pub const FALLBACK_HELO_NAME: &str = "verifier.local";

const LOCAL_SUFFIX: &str = ".local";

/// Sources used to work out the name this machine announces in `EHLO`.
pub(crate) trait HostIdentity {
    fn hostname(&self) -> Option<String>;
    fn forward(&self, hostname: &str) -> io::Result<Vec<IpAddr>>;
    fn reverse(&self, ip: Ipv4Addr) -> Option<String>;
}

/// Machine hostname, system forward resolution, PTR lookups through the
/// configured resolver.
pub(crate) struct SystemIdentity<'a> {
    resolver: &'a Resolver,
}

impl<'a> SystemIdentity<'a> {
    pub(crate) fn new(resolver: &'a Resolver) -> Self {
        Self { resolver }
    }
}

impl HostIdentity for SystemIdentity<'_> {
    fn hostname(&self) -> Option<String> {
        gethostname::gethostname()
            .into_string()
            .ok()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
    }

    fn forward(&self, hostname: &str) -> io::Result<Vec<IpAddr>> {
        Ok((hostname, 0).to_socket_addrs()?.map(|addr| addr.ip()).collect())
    }

    fn reverse(&self, ip: Ipv4Addr) -> Option<String> {
        let lookup = self.resolver.reverse_lookup(IpAddr::V4(ip)).ok()?;
        lookup.iter().next().map(|name| name.to_string())
    }
}

/// Works out the `EHLO` name: the machine hostname, upgraded to the PTR name
/// of its first IPv4 address that has one. Never fails; the name only has to
/// be plausible, not routable.
pub(crate) fn derive_helo_name<I>(identity: &I) -> String
where
    I: HostIdentity + ?Sized,
{
    let Some(hostname) = identity.hostname() else {
        debug!("hostname unavailable, using {FALLBACK_HELO_NAME}");
        return FALLBACK_HELO_NAME.to_string();
    };

    match identity.forward(&hostname) {
        Ok(addresses) => {
            let public_name = addresses
                .iter()
                .filter_map(|ip| match ip {
                    IpAddr::V4(v4) => Some(*v4),
                    IpAddr::V6(_) => None,
                })
                .find_map(|v4| identity.reverse(v4))
                .map(|name| name.trim_end_matches('.').to_string())
                .filter(|name| !name.is_empty());
            if let Some(name) = public_name {
                return name;
            }
        }
        Err(err) => debug!(%hostname, error = %err, "hostname does not resolve"),
    }

    local_name(&hostname)
}

fn local_name(hostname: &str) -> String {
    if hostname.ends_with(LOCAL_SUFFIX) {
        hostname.to_string()
    } else {
        format!("{hostname}{LOCAL_SUFFIX}")
    }
}

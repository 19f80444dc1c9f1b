use std::io;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::smtp_verify::error::ProbeError;
use crate::smtp_verify::options::ProbeConfig;
use crate::smtp_verify::types::SmtpEndpoint;

/// Forward resolution of a mail-exchange host to its A/AAAA addresses.
pub(crate) trait LookupHost {
    fn lookup_host(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Uses the operating system resolver (`getaddrinfo`).
pub(crate) struct SystemHosts;

impl LookupHost for SystemHosts {
    fn lookup_host(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in (host, 0).to_socket_addrs()? {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        Ok(ips)
    }
}

/// Finds the first address/port combination of `hostname` that accepts a TCP
/// connection. Addresses are tried in resolver order, and for each address the
/// configured ports in order. The probe connection is closed before returning;
/// the handshake opens its own.
pub(crate) fn locate_reachable_endpoint<H>(
    hostname: &str,
    hosts: &H,
    config: &ProbeConfig,
) -> Result<SmtpEndpoint, ProbeError>
where
    H: LookupHost + ?Sized,
{
    let addresses = hosts
        .lookup_host(hostname)
        .map_err(|source| ProbeError::HostLookup {
            host: hostname.to_string(),
            source,
        })?;

    for ip in addresses {
        for &port in &config.ports {
            let addr = SocketAddr::new(ip, port);
            match dial(&addr, config.timeout()) {
                Ok(stream) => {
                    drop(stream);
                    debug!(host = %hostname, %addr, "SMTP endpoint reachable");
                    return Ok(SmtpEndpoint {
                        hostname: hostname.to_string(),
                        ip_address: ip,
                        port,
                        implicit_tls: port == config.implicit_tls_port,
                    });
                }
                Err(err) => debug!(host = %hostname, %addr, error = %err, "endpoint refused"),
            }
        }
    }

    Err(ProbeError::Unreachable {
        host: hostname.to_string(),
    })
}

fn dial(addr: &SocketAddr, timeout: Option<Duration>) -> io::Result<TcpStream> {
    match timeout {
        Some(timeout) => TcpStream::connect_timeout(addr, timeout),
        None => TcpStream::connect(addr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp_verify::tests::{StubHosts, closed_port, loopback_config};
    use std::io::Read;
    use std::net::{Ipv4Addr, TcpListener};
    use std::thread;

    #[test]
    fn picks_first_open_port_and_releases_probe_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let open = listener.local_addr().expect("addr").port();
        let closed = closed_port();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 16];
            // the locator must hang up without sending anything
            stream.read(&mut buf).unwrap_or(0)
        });

        let mut config = loopback_config(open);
        config.ports = vec![closed, open];
        let hosts = StubHosts::new().with("mx.test", &[Ipv4Addr::LOCALHOST.into()]);

        let endpoint = locate_reachable_endpoint("mx.test", &hosts, &config).expect("endpoint");
        assert_eq!(endpoint.hostname, "mx.test");
        assert_eq!(endpoint.port, open);
        assert_eq!(endpoint.ip_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(!endpoint.implicit_tls);

        let read = server.join().expect("server thread");
        assert_eq!(read, 0, "probe connection should be closed, not written to");
    }

    #[test]
    fn marks_implicit_tls_port() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let open = listener.local_addr().expect("addr").port();
        let mut config = loopback_config(open);
        config.implicit_tls_port = open;
        let hosts = StubHosts::new().with("smtps.test", &[Ipv4Addr::LOCALHOST.into()]);

        let endpoint = locate_reachable_endpoint("smtps.test", &hosts, &config).expect("endpoint");
        assert!(endpoint.implicit_tls);
        assert_eq!(endpoint.protocol(), "SMTPS");
        drop(listener);
    }

    #[test]
    fn tries_next_address_when_first_refuses() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let open = listener.local_addr().expect("addr").port();
        let config = loopback_config(open);
        let hosts = StubHosts::new().with(
            "mx.test",
            &[Ipv4Addr::new(127, 0, 0, 2).into(), Ipv4Addr::LOCALHOST.into()],
        );

        let endpoint = locate_reachable_endpoint("mx.test", &hosts, &config).expect("endpoint");
        assert_eq!(endpoint.ip_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        drop(listener);
    }

    #[test]
    fn unreachable_when_nothing_listens() {
        let config = loopback_config(closed_port());
        let hosts = StubHosts::new().with("dead.test", &[Ipv4Addr::LOCALHOST.into()]);
        let err = locate_reachable_endpoint("dead.test", &hosts, &config).expect_err("no listener");
        assert!(err.is_unreachable());
        assert_eq!(err.to_string(), "no available SMTP servers found for dead.test");
    }

    #[test]
    fn host_lookup_failure_is_reported() {
        let config = loopback_config(closed_port());
        let hosts = StubHosts::new();
        let err = locate_reachable_endpoint("unknown.test", &hosts, &config).expect_err("no host");
        assert!(matches!(err, ProbeError::HostLookup { ref host, .. } if host == "unknown.test"));
        assert!(err.is_unreachable());
    }
}

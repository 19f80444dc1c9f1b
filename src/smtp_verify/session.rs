use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use native_tls::{HandshakeError, TlsConnector, TlsStream};
use tracing::trace;

use crate::smtp_verify::error::ProbeError;
use crate::smtp_verify::types::SmtpEndpoint;

/// Longest reply line accepted, CRLF included (RFC 5321 4.5.3.1.5).
const MAX_LINE_LEN: usize = 512;
const MAX_REPLY_LINES: usize = 64;

#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// All reply lines joined with a space, without the status codes.
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    pub fn has_capability(&self, cap: &str) -> bool {
        let upper = cap.to_ascii_uppercase();
        self.lines.iter().any(|line| {
            line.split_whitespace()
                .next()
                .map(|token| token.eq_ignore_ascii_case(&upper))
                .unwrap_or(false)
        })
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lines.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.text())
        }
    }
}

#[derive(Debug)]
enum StreamState {
    Plain(TcpStream),
    Tls(TlsStream<TcpStream>),
    Invalid,
}

#[derive(Debug)]
pub struct SmtpStream {
    state: StreamState,
    buffer: Vec<u8>,
}

fn open_tcp(addr: &SocketAddr, timeout: Option<Duration>) -> Result<TcpStream, ProbeError> {
    let stream = match timeout {
        Some(timeout) => TcpStream::connect_timeout(addr, timeout),
        None => TcpStream::connect(addr),
    }
    .map_err(|source| ProbeError::Connect {
        addr: *addr,
        source,
    })?;
    stream.set_read_timeout(timeout).map_err(ProbeError::io)?;
    stream.set_write_timeout(timeout).map_err(ProbeError::io)?;
    Ok(stream)
}

impl SmtpStream {
    pub fn connect(addr: &SocketAddr, timeout: Option<Duration>) -> Result<Self, ProbeError> {
        Ok(Self {
            state: StreamState::Plain(open_tcp(addr, timeout)?),
            buffer: Vec::new(),
        })
    }

    /// Connects and wraps the socket in TLS before anything is read (SMTPS).
    pub fn connect_tls(
        addr: &SocketAddr,
        domain: &str,
        connector: &TlsConnector,
        timeout: Option<Duration>,
    ) -> Result<Self, ProbeError> {
        let tcp = open_tcp(addr, timeout)?;
        Ok(Self {
            state: StreamState::Tls(complete_handshake(connector, domain, tcp)?),
            buffer: Vec::new(),
        })
    }

    pub fn is_tls(&self) -> bool {
        matches!(self.state, StreamState::Tls(_))
    }

    /// Swaps the plain socket for a TLS session. A failed handshake leaves the
    /// stream unusable: every later read or write reports a protocol error.
    pub fn upgrade_tls(
        &mut self,
        domain: &str,
        connector: &TlsConnector,
    ) -> Result<(), ProbeError> {
        let state = std::mem::replace(&mut self.state, StreamState::Invalid);
        let plain = match state {
            StreamState::Plain(stream) => stream,
            StreamState::Tls(stream) => {
                self.state = StreamState::Tls(stream);
                return Ok(());
            }
            StreamState::Invalid => {
                return Err(ProbeError::Protocol("invalid stream state".into()));
            }
        };

        // socket timeouts carry over: the TLS stream wraps the same TcpStream
        self.buffer.clear();
        let tls = complete_handshake(connector, domain, plain)?;
        self.state = StreamState::Tls(tls);
        Ok(())
    }

    pub fn send_command(&mut self, command: &str) -> Result<(), ProbeError> {
        let mut data = command.as_bytes().to_vec();
        data.extend_from_slice(b"\r\n");
        self.write_all(&data)
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), ProbeError> {
        match &mut self.state {
            StreamState::Plain(stream) => {
                stream.write_all(data).map_err(ProbeError::io)?;
                stream.flush().map_err(ProbeError::io)?
            }
            StreamState::Tls(stream) => {
                stream.write_all(data).map_err(ProbeError::io)?;
                stream.flush().map_err(ProbeError::io)?
            }
            StreamState::Invalid => {
                return Err(ProbeError::Protocol("invalid stream state".into()));
            }
        }
        Ok(())
    }

    pub fn read_reply(&mut self) -> Result<SmtpReply, ProbeError> {
        let mut lines = Vec::new();
        let mut code: Option<u16> = None;
        loop {
            let line = self.read_line()?;
            if line.len() < 3 {
                return Err(ProbeError::Protocol(format!("invalid reply: {line}")));
            }
            let parsed_code = line
                .get(..3)
                .and_then(|digits| digits.parse::<u16>().ok())
                .ok_or_else(|| ProbeError::Protocol(format!("invalid code in line: {line}")))?;
            if let Some(existing) = code {
                if existing != parsed_code {
                    return Err(ProbeError::Protocol(format!(
                        "inconsistent reply codes: {existing} vs {parsed_code}"
                    )));
                }
            } else {
                code = Some(parsed_code);
            }
            let is_last = line.as_bytes().get(3) != Some(&b'-');
            if !is_last && lines.len() + 1 >= MAX_REPLY_LINES {
                return Err(ProbeError::Protocol(format!(
                    "reply exceeds {MAX_REPLY_LINES} lines"
                )));
            }
            let text = line.get(4..).unwrap_or_default().to_string();
            lines.push(text);
            if is_last {
                break;
            }
        }
        Ok(SmtpReply {
            code: code.unwrap_or(0),
            lines,
        })
    }

    fn read_line(&mut self) -> Result<String, ProbeError> {
        loop {
            let newline = self.buffer.iter().position(|byte| *byte == b'\n');
            let line_len = newline.map_or(self.buffer.len(), |pos| pos + 1);
            if line_len > MAX_LINE_LEN {
                return Err(ProbeError::Protocol(format!(
                    "reply line longer than {MAX_LINE_LEN} bytes"
                )));
            }
            if let Some(pos) = newline {
                let mut line = self.buffer.drain(..=pos).collect::<Vec<_>>();
                if line.ends_with(b"\r\n") {
                    line.truncate(line.len() - 2);
                } else if line.ends_with(b"\n") {
                    line.truncate(line.len() - 1);
                }
                return String::from_utf8(line)
                    .map_err(|err| ProbeError::Protocol(format!("utf8 error: {err}")));
            }

            let mut buf = [0u8; 512];
            let read = match &mut self.state {
                StreamState::Plain(stream) => stream.read(&mut buf),
                StreamState::Tls(stream) => stream.read(&mut buf),
                StreamState::Invalid => {
                    return Err(ProbeError::Protocol("invalid stream state".into()));
                }
            };
            let read = read.map_err(ProbeError::io)?;
            if read == 0 {
                return Err(ProbeError::io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
            self.buffer.extend_from_slice(&buf[..read]);
        }
    }
}

fn complete_handshake(
    connector: &TlsConnector,
    domain: &str,
    stream: TcpStream,
) -> Result<TlsStream<TcpStream>, ProbeError> {
    match connector.connect(domain, stream) {
        Ok(tls) => Ok(tls),
        Err(HandshakeError::Failure(err)) => Err(ProbeError::Tls { source: err }),
        // the socket is blocking: WouldBlock only surfaces once the read timeout expired
        Err(HandshakeError::WouldBlock(_)) => Err(ProbeError::io(io::Error::new(
            io::ErrorKind::TimedOut,
            "TLS handshake timed out",
        ))),
    }
}

/// One SMTP conversation. Dropping the session closes the socket, so every
/// early return in the handshake releases the connection.
pub struct SmtpSession {
    host: String,
    stream: SmtpStream,
}

impl SmtpSession {
    pub fn connect(
        endpoint: &SmtpEndpoint,
        connector: &TlsConnector,
        timeout: Option<Duration>,
    ) -> Result<Self, ProbeError> {
        let addr = endpoint.socket_addr();
        let stream = if endpoint.implicit_tls {
            SmtpStream::connect_tls(&addr, &endpoint.hostname, connector, timeout)?
        } else {
            SmtpStream::connect(&addr, timeout)?
        };
        Ok(Self {
            host: endpoint.hostname.clone(),
            stream,
        })
    }

    pub fn is_tls(&self) -> bool {
        self.stream.is_tls()
    }

    fn record(&self, direction: &str, message: &str) {
        trace!(host = %self.host, "{direction}: {message}");
    }

    pub fn read_banner(&mut self) -> Result<SmtpReply, ProbeError> {
        let reply = self.stream.read_reply()?;
        self.record_reply(&reply);
        Ok(reply)
    }

    pub fn send_command(&mut self, command: &str) -> Result<SmtpReply, ProbeError> {
        self.record("C", command);
        self.stream.send_command(command)?;
        let reply = self.stream.read_reply()?;
        self.record_reply(&reply);
        Ok(reply)
    }

    /// Issues `STARTTLS` and, on a 2xx answer, upgrades the stream. A refusal
    /// is returned as the reply; a failed TLS handshake is an error.
    pub fn starttls(
        &mut self,
        domain: &str,
        connector: &TlsConnector,
    ) -> Result<SmtpReply, ProbeError> {
        let reply = self.send_command("STARTTLS")?;
        if !reply.is_positive_completion() {
            return Ok(reply);
        }
        self.stream.upgrade_tls(domain, connector)?;
        Ok(reply)
    }

    pub fn quit(&mut self) -> Result<(), ProbeError> {
        self.record("C", "QUIT");
        self.stream.send_command("QUIT")?;
        if let Ok(reply) = self.stream.read_reply() {
            self.record_reply(&reply);
        }
        Ok(())
    }

    fn record_reply(&self, reply: &SmtpReply) {
        if reply.lines.is_empty() {
            self.record("S", &format!("{}", reply.code));
        } else {
            for line in &reply.lines {
                self.record("S", &format!("{} {}", reply.code, line));
            }
        }
    }
}

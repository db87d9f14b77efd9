//! HAProxy PROXY protocol (version 1) preamble parsing.
//!
//! When a TACACS+ deployment sits behind an L4 proxy, the proxy conveys the
//! original client address in an ASCII line before the first TACACS+ frame.
//! The parsed source address becomes the *effective* remote address for
//! secret-provider lookups and logging.

use std::net::{IpAddr, SocketAddr};
use std::str;

use thiserror::Error;

/// Upper bound on a v1 preamble, per the haproxy spec (including `\r\n`).
pub const MAX_PREAMBLE_LENGTH: usize = 108;

/// A parse failure in a PROXY preamble; the connection is closed.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum ProxyError {
    /// The line did not start with the `PROXY ` signature.
    #[error("missing PROXY signature")]
    MissingSignature,

    /// The line exceeded the 108-byte bound without a terminator.
    #[error("preamble exceeded {MAX_PREAMBLE_LENGTH} bytes")]
    TooLong,

    /// The line was not `\r\n`-terminated or held non-ASCII bytes.
    #[error("preamble was not a well-formed ASCII line")]
    MalformedLine,

    /// The protocol token was not one of TCP, TCP4, TCP6 or UNKNOWN.
    #[error("unsupported protocol token {0:?}")]
    UnsupportedProtocol(String),

    /// An address or port field did not parse.
    #[error("malformed address field {0:?}")]
    MalformedAddress(String),

    /// The line had the wrong number of fields.
    #[error("wrong number of fields in preamble")]
    WrongFieldCount,
}

/// The addresses conveyed by a PROXY v1 preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyHeader {
    /// The original client address, or `None` for the UNKNOWN protocol.
    pub source: Option<SocketAddr>,

    /// The address the proxy accepted the connection on, if conveyed.
    pub destination: Option<SocketAddr>,
}

/// Parses one PROXY v1 line, **including** its `\r\n` terminator.
///
/// Grammar: `PROXY (TCP|TCP4|TCP6) <src-ip> <dst-ip> <src-port> <dst-port>\r\n`,
/// or `PROXY UNKNOWN[ ...]\r\n` in which case no addresses are conveyed.
pub fn parse_preamble(line: &[u8]) -> Result<ProxyHeader, ProxyError> {
    if line.len() > MAX_PREAMBLE_LENGTH {
        return Err(ProxyError::TooLong);
    }

    let text = str::from_utf8(line).map_err(|_| ProxyError::MalformedLine)?;
    let text = text
        .strip_suffix("\r\n")
        .ok_or(ProxyError::MalformedLine)?;

    let rest = text.strip_prefix("PROXY ").ok_or(ProxyError::MissingSignature)?;

    let mut fields = rest.split(' ');
    let protocol = fields.next().ok_or(ProxyError::WrongFieldCount)?;

    match protocol {
        // an UNKNOWN preamble is legal; the rest of the line is ignored
        "UNKNOWN" => Ok(ProxyHeader {
            source: None,
            destination: None,
        }),

        "TCP" | "TCP4" | "TCP6" => {
            let source_ip = parse_ip(fields.next().ok_or(ProxyError::WrongFieldCount)?)?;
            let destination_ip = parse_ip(fields.next().ok_or(ProxyError::WrongFieldCount)?)?;
            let source_port = parse_port(fields.next().ok_or(ProxyError::WrongFieldCount)?)?;
            let destination_port = parse_port(fields.next().ok_or(ProxyError::WrongFieldCount)?)?;

            if fields.next().is_some() {
                return Err(ProxyError::WrongFieldCount);
            }

            Ok(ProxyHeader {
                source: Some(SocketAddr::new(source_ip, source_port)),
                destination: Some(SocketAddr::new(destination_ip, destination_port)),
            })
        }

        other => Err(ProxyError::UnsupportedProtocol(other.to_string())),
    }
}

fn parse_ip(field: &str) -> Result<IpAddr, ProxyError> {
    field
        .parse()
        .map_err(|_| ProxyError::MalformedAddress(field.to_string()))
}

fn parse_port(field: &str) -> Result<u16, ProxyError> {
    field
        .parse()
        .map_err(|_| ProxyError::MalformedAddress(field.to_string()))
}

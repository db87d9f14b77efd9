//! Typed per-request metadata handed to handlers.

use std::net::SocketAddr;

use tacplus_protocol::{HeaderInfo, PacketType};

/// Connection-level facts a handler may need while forming a verdict.
///
/// This is deliberately a plain struct with typed fields rather than a
/// dynamic key/value bag; log keys derive from it deterministically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// The peer address of the TCP connection itself.
    pub remote_address: SocketAddr,

    /// The client address after any PROXY preamble is applied; equals
    /// [`remote_address`](Self::remote_address) when no proxy is involved.
    pub effective_remote_address: SocketAddr,

    /// The name of the scope the connection was matched to.
    pub scope: String,
}

/// One inbound packet as seen by a handler: parsed header, raw (already
/// deobfuscated) body bytes, and the connection context.
pub struct Request<'packet> {
    /// The parsed packet header.
    pub header: HeaderInfo,

    /// The packet type from the wire header.
    pub packet_type: PacketType,

    /// The deobfuscated body; handlers decode it with the body type the
    /// session state calls for.
    pub body: &'packet [u8],

    /// Connection-level metadata.
    pub context: &'packet RequestContext,
}

impl Request<'_> {
    /// The session this packet belongs to.
    pub fn session_id(&self) -> u32 {
        self.header.session_id()
    }
}

//! The per-connection driver.
//!
//! Each accepted connection runs one task that owns the socket, the
//! pre-shared key, and the session table. The loop is strictly
//! read-dispatch-write; parsing, obfuscation and handler dispatch never
//! suspend, so a connection task only ever waits on the network.

use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use tracing::{debug, info, warn};

use tacplus_protocol::{
    accounting, authentication, authorization, xor_body_with_pad, Arguments, DeserializeError,
    FieldText, HeaderInfo, Packet, PacketFlags, PacketType, SerializeError, MAX_BODY_LENGTH,
};

use crate::context::{Request, RequestContext};
use crate::error::{ConnectionError, HandlerError};
use crate::handlers::Handler;
use crate::metrics::metrics;
use crate::proxy;
use crate::response::Response;
use crate::secrets::ConnectionPolicy;
use crate::session::{SessionDispatch, SessionMultiplexer, SessionState};

/// Deadlines and transport options for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Maximum quiet time between packets before the connection is dropped.
    pub read_timeout: Duration,

    /// Deadline for writing one reply, refreshed per write.
    pub write_timeout: Duration,

    /// Whether to expect a PROXY v1 preamble before the first frame.
    pub proxy_protocol: bool,

    /// Whether the transport already provides confidentiality (e.g. a
    /// TLS-terminating listener). Disables obfuscation in both directions and
    /// requires peers to set the unencrypted flag on every packet.
    pub clear_mode: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(5),
            proxy_protocol: false,
            clear_mode: false,
        }
    }
}

/// One accepted connection with its codec state and session table.
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,

    secret: Vec<u8>,
    root: Arc<dyn Handler>,
    scope: String,

    remote_address: SocketAddr,
    effective_remote_address: SocketAddr,

    sessions: SessionMultiplexer,
    settings: ConnectionSettings,
    cancel: CancellationToken,

    first_reply_sent: bool,
}

impl Connection {
    /// Wraps an accepted stream with its resolved policy.
    pub fn new(
        stream: TcpStream,
        policy: ConnectionPolicy,
        remote_address: SocketAddr,
        settings: ConnectionSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();

        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            secret: policy.secret,
            root: policy.handler,
            scope: policy.scope,
            remote_address,
            effective_remote_address: remote_address,
            sessions: SessionMultiplexer::new(),
            settings,
            cancel,
            first_reply_sent: false,
        }
    }

    /// Drives the connection until the peer closes, an error occurs, or the
    /// server shuts down.
    pub async fn run(mut self) {
        match self.serve().await {
            Ok(()) => debug!(remote = %self.remote_address, "connection closed"),
            Err(ConnectionError::Sequence(error)) => {
                // no reply: a peer that cannot count packets is not trusted
                warn!(remote = %self.remote_address, %error, "closing connection");
            }
            Err(ConnectionError::BadSecret) => {
                warn!(remote = %self.remote_address, "closing connection: shared secret mismatch");
            }
            Err(error) => {
                info!(remote = %self.remote_address, %error, "closing connection");
            }
        }

        // sessions cut short by the close still get their durations recorded
        for (_, state) in self.sessions.drain() {
            metrics().session_completed(state.started_at.elapsed());
        }

        metrics().connection_closed();
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        if self.settings.proxy_protocol {
            self.read_proxy_preamble().await?;
        }

        let cancel = self.cancel.clone();

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(remote = %self.remote_address, "shutdown requested");
                    return Ok(());
                }
                frame = self.read_frame() => frame?,
            };

            let Some((header, packet_type, body)) = frame else {
                // peer closed between frames
                return Ok(());
            };

            metrics().packet_read();
            self.dispatch(header, packet_type, body).await?;
        }
    }

    /// Consumes the PROXY v1 line and adopts the conveyed client address.
    async fn read_proxy_preamble(&mut self) -> Result<(), ConnectionError> {
        let mut line = Vec::new();
        let mut limited = (&mut self.reader).take(proxy::MAX_PREAMBLE_LENGTH as u64);

        let read = timeout(self.settings.read_timeout, limited.read_until(b'\n', &mut line))
            .await
            .map_err(|_| ConnectionError::ReadTimeout)??;

        if read == 0 || !line.ends_with(b"\n") {
            // EOF, or the 108-byte cap was hit without a terminator
            return Err(proxy::ProxyError::MalformedLine.into());
        }

        let preamble = proxy::parse_preamble(&line)?;

        if let Some(source) = preamble.source {
            debug!(
                remote = %self.remote_address,
                effective = %source,
                "adopted proxied client address"
            );
            self.effective_remote_address = source;
        }

        Ok(())
    }

    /// Reads exactly one frame and normalizes its body to cleartext.
    ///
    /// Returns `None` on a clean close at a frame boundary.
    async fn read_frame(
        &mut self,
    ) -> Result<Option<(HeaderInfo, PacketType, Vec<u8>)>, ConnectionError> {
        let mut header_bytes = [0u8; HeaderInfo::HEADER_SIZE_BYTES];

        match timeout(
            self.settings.read_timeout,
            self.reader.read_exact(&mut header_bytes),
        )
        .await
        {
            Err(_) => return Err(ConnectionError::ReadTimeout),
            Ok(Err(error)) if error.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None)
            }
            Ok(Err(error)) => return Err(error.into()),
            Ok(Ok(_)) => {}
        }

        let header =
            HeaderInfo::try_from(&header_bytes[..]).map_err(ConnectionError::Framing)?;
        let packet_type = HeaderInfo::declared_packet_type(&header_bytes)
            .map_err(ConnectionError::Framing)?;

        // the body length is bounded before a single body byte is read
        let body_length = HeaderInfo::declared_body_length(&header_bytes)
            .map_err(ConnectionError::Framing)?;
        if body_length as usize > MAX_BODY_LENGTH {
            return Err(ConnectionError::Framing(
                DeserializeError::BodyLengthExceedsMaximum(body_length),
            ));
        }

        let mut body = vec![0u8; body_length as usize];
        match timeout(self.settings.read_timeout, self.reader.read_exact(&mut body)).await {
            Err(_) => return Err(ConnectionError::ReadTimeout),
            Ok(result) => result?,
        };

        let unencrypted = header.flags().contains(PacketFlags::UNENCRYPTED);

        if self.settings.clear_mode {
            // a secured transport runs without obfuscation; peers must say so
            if !unencrypted {
                self.write_cleartext_error_reply(packet_type, &header, "unencrypted flag not set")
                    .await?;
                return Err(ConnectionError::UnencryptedFlagMismatch);
            }
        } else if unencrypted {
            self.write_cleartext_error_reply(packet_type, &header, "unexpected unencrypted flag")
                .await?;
            return Err(ConnectionError::UnencryptedFlagMismatch);
        } else {
            xor_body_with_pad(&header, &self.secret, &mut body);
        }

        Ok(Some((header, packet_type, body)))
    }

    async fn dispatch(
        &mut self,
        header: HeaderInfo,
        packet_type: PacketType,
        body: Vec<u8>,
    ) -> Result<(), ConnectionError> {
        let session_id = header.session_id();

        let disposition = self
            .sessions
            .take(session_id, header.sequence_number())
            .map_err(|error| {
                metrics().sequence_error();
                error
            })?;

        enum Dispatched {
            Root(Arc<dyn Handler>),
            Continuation(Box<dyn Handler>),
        }

        let (handler, started_at) = match disposition {
            SessionDispatch::New { started_at } => {
                metrics().session_started();
                (Dispatched::Root(self.root.clone()), started_at)
            }
            SessionDispatch::Continuation(state) => {
                (Dispatched::Continuation(state.handler), state.started_at)
            }
        };

        let context = RequestContext {
            remote_address: self.remote_address,
            effective_remote_address: self.effective_remote_address,
            scope: self.scope.clone(),
        };

        let request = Request {
            header: header.clone(),
            packet_type,
            body: &body,
            context: &context,
        };

        let secret = if self.settings.clear_mode {
            None
        } else {
            Some(self.secret.as_slice())
        };
        let mut response = Response::new(&header, secret, self.reply_flags(&header));

        let handler_ref: &dyn Handler = match &handler {
            Dispatched::Root(root) => root.as_ref(),
            Dispatched::Continuation(continuation) => continuation.as_ref(),
        };

        // a panicking handler must not take the whole server down with it
        let verdict = catch_unwind(AssertUnwindSafe(|| {
            handler_ref.handle(&mut response, &request)
        }))
        .unwrap_or(Err(HandlerError::Panicked));

        // consume the response (and with it the borrow of the secret) before
        // any further writes on the connection
        let (reply, next) = response.into_outcome();

        match verdict {
            Ok(()) => {
                let Some(sent) = reply else {
                    // dispatched but neither replied nor failed: synthesize a
                    // verdict rather than stalling the client
                    metrics().handler_error();
                    self.write_error_reply(packet_type, &header, "no verdict from policy")
                        .await?;
                    metrics().session_completed(started_at.elapsed());
                    return Ok(());
                };

                self.write_packet(&sent.bytes).await?;
                self.first_reply_sent = true;
                metrics().reply_written();

                if let Some(next_handler) = next {
                    self.sessions.park(
                        session_id,
                        SessionState {
                            last_server_sequence_number: sent.sequence_number,
                            handler: next_handler,
                            started_at,
                        },
                    );
                } else {
                    metrics().session_completed(started_at.elapsed());
                }

                Ok(())
            }

            Err(HandlerError::Codec(error)) if error.indicates_bad_secret() => {
                metrics().bad_secret();
                metrics().session_completed(started_at.elapsed());
                self.write_cleartext_error_reply(packet_type, &header, "bad secret")
                    .await?;
                Err(ConnectionError::BadSecret)
            }

            Err(HandlerError::Codec(error)) => {
                metrics().codec_error();
                metrics().session_completed(started_at.elapsed());
                self.write_error_reply(packet_type, &header, "invalid request body")
                    .await?;
                Err(ConnectionError::Framing(error))
            }

            Err(HandlerError::Sequence(error)) => {
                metrics().sequence_error();
                metrics().session_completed(started_at.elapsed());
                Err(error.into())
            }

            Err(error) => {
                // handler faults get an Error verdict; the connection remains
                // usable for its other sessions
                warn!(remote = %self.remote_address, %error, "handler fault");
                metrics().handler_error();
                metrics().session_completed(started_at.elapsed());
                self.write_error_reply(packet_type, &header, "internal server error")
                    .await?;
                Ok(())
            }
        }
    }

    /// Flags for a normal reply: echo the client's single-connect offer on
    /// the connection's first reply; ignore it afterwards per RFC8907.
    fn reply_flags(&self, request_header: &HeaderInfo) -> PacketFlags {
        if !self.first_reply_sent
            && request_header
                .flags()
                .contains(PacketFlags::SINGLE_CONNECTION)
        {
            PacketFlags::SINGLE_CONNECTION
        } else {
            PacketFlags::empty()
        }
    }

    /// Writes a type-matched Error reply in the session's sequence ladder,
    /// obfuscated like any normal reply.
    async fn write_error_reply(
        &mut self,
        packet_type: PacketType,
        request_header: &HeaderInfo,
        message: &str,
    ) -> Result<(), ConnectionError> {
        let Some(sequence_number) = request_header.sequence_number().checked_add(1) else {
            // no representable reply sequence number; close without a reply
            return Ok(());
        };

        let header = HeaderInfo::new(
            request_header.version(),
            sequence_number,
            self.reply_flags(request_header),
            request_header.session_id(),
        );

        let bytes = if self.settings.clear_mode {
            serialize_error_reply(packet_type, header, message, None)?
        } else {
            serialize_error_reply(packet_type, header, message, Some(&self.secret))?
        };

        self.write_packet(&bytes).await?;
        metrics().reply_written();
        Ok(())
    }

    /// Writes a type-matched Error reply with `sequence_number = 1` and the
    /// unencrypted flag set.
    ///
    /// Used when the obfuscation state itself is broken (wrong shared secret,
    /// or a mismatched unencrypted flag): the peer could not decode an
    /// obfuscated reply, and the sequence ladder cannot be trusted either.
    async fn write_cleartext_error_reply(
        &mut self,
        packet_type: PacketType,
        request_header: &HeaderInfo,
        message: &str,
    ) -> Result<(), ConnectionError> {
        let header = HeaderInfo::new(
            request_header.version(),
            1,
            PacketFlags::empty(),
            request_header.session_id(),
        );

        let bytes = serialize_error_reply(packet_type, header, message, None)?;

        self.write_packet(&bytes).await?;
        metrics().reply_written();
        Ok(())
    }

    async fn write_packet(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        match timeout(self.settings.write_timeout, async {
            self.writer.write_all(bytes).await?;
            self.writer.flush().await
        })
        .await
        {
            Err(_) => Err(ConnectionError::WriteTimeout),
            Ok(result) => result.map_err(Into::into),
        }
    }
}

/// Marshals a type-matched `status = Error` reply body into a full packet.
///
/// With `secret = None` the packet is written in cleartext with the
/// unencrypted flag set.
fn serialize_error_reply(
    packet_type: PacketType,
    header: HeaderInfo,
    message: &str,
    secret: Option<&[u8]>,
) -> Result<Vec<u8>, ConnectionError> {
    let message = FieldText::try_from(message).unwrap_or_default();

    match packet_type {
        PacketType::Authentication => {
            let body = authentication::Reply::new(
                authentication::Status::Error,
                message,
                b"",
                authentication::ReplyFlags::empty(),
            )
            .ok_or(SerializeError::LengthOverflow)?;
            serialize_reply(Packet::new(header, body), secret)
        }
        PacketType::Authorization => {
            let body = authorization::Reply::new(
                authorization::Status::Error,
                message,
                b"",
                Arguments::default(),
            )
            .ok_or(SerializeError::LengthOverflow)?;
            serialize_reply(Packet::new(header, body), secret)
        }
        PacketType::Accounting => {
            let body = accounting::Reply::new(
                accounting::Status::Error,
                message,
                FieldText::assert(""),
            )
            .ok_or(SerializeError::LengthOverflow)?;
            serialize_reply(Packet::new(header, body), secret)
        }
    }
}

fn serialize_reply<B: tacplus_protocol::PacketBody + tacplus_protocol::Serialize>(
    packet: Packet<B>,
    secret: Option<&[u8]>,
) -> Result<Vec<u8>, ConnectionError> {
    let mut buffer = vec![0u8; packet.wire_size()];
    let written = match secret {
        Some(secret_key) => packet.serialize(secret_key, &mut buffer)?,
        None => packet.serialize_unobfuscated(&mut buffer)?,
    };
    buffer.truncate(written);
    Ok(buffer)
}

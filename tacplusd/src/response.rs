//! The reply object handed to handlers.
//!
//! A [`Response`] encodes at most one reply packet per inbound request,
//! captures the continuation handler for multi-exchange sessions, and fans
//! marshalled reply bytes out to any registered writer taps.

use std::io;

use tracing::warn;

use tacplus_protocol::{
    authentication, HeaderInfo, Packet, PacketBody, PacketFlags, Serialize, Version,
};

use crate::error::{HandlerError, SequenceError};
use crate::handlers::Handler;

/// Observer of fully-marshalled reply packets.
///
/// Taps see the exact bytes that will hit the network (obfuscated when the
/// connection obfuscates), before emission. Tap failures are logged and never
/// affect the reply itself.
pub trait ResponseWriter: Send {
    /// Called once per reply with the complete marshalled packet.
    fn write_packet(&mut self, packet: &[u8]) -> io::Result<()>;
}

/// A marshalled reply ready for the connection driver to emit.
pub struct SentReply {
    /// The complete packet image, header included.
    pub bytes: Vec<u8>,

    /// The sequence number the reply carries.
    pub sequence_number: u8,
}

/// The per-request reply builder passed to handlers.
pub struct Response<'conn> {
    version: Version,
    session_id: u32,
    request_sequence_number: u8,
    flags: PacketFlags,

    /// The connection's pre-shared key, or `None` on a connection whose
    /// transport already provides confidentiality (obfuscation disabled).
    secret: Option<&'conn [u8]>,

    reply: Option<SentReply>,
    next: Option<Box<dyn Handler>>,
    writers: Vec<Box<dyn ResponseWriter>>,
}

impl<'conn> Response<'conn> {
    pub(crate) fn new(
        request_header: &HeaderInfo,
        secret: Option<&'conn [u8]>,
        flags: PacketFlags,
    ) -> Self {
        Self {
            version: request_header.version(),
            session_id: request_header.session_id(),
            request_sequence_number: request_header.sequence_number(),
            flags,
            secret,
            reply: None,
            next: None,
            writers: Vec::new(),
        }
    }

    /// Encodes and queues the reply packet for this request.
    ///
    /// The outbound header mirrors the request's version, session id and
    /// connection flags, with `sequence_number = request + 1`.
    pub fn reply<B: PacketBody + Serialize>(&mut self, body: B) -> Result<(), HandlerError> {
        let sequence_number = self.next_sequence_number()?;
        self.reply_with_sequence(body, sequence_number)
    }

    /// Encodes and queues an authentication reply.
    ///
    /// This is the same as [`reply`](Self::reply) except for the `Restart`
    /// carve-out: a restart verdict resets the session's sequence ladder to 1.
    pub fn reply_authentication(
        &mut self,
        reply: authentication::Reply<'_>,
    ) -> Result<(), HandlerError> {
        let sequence_number = if reply.status() == authentication::Status::Restart {
            1
        } else {
            self.next_sequence_number()?
        };

        self.reply_with_sequence(reply, sequence_number)
    }

    /// Captures the handler to invoke on the next inbound packet of this session.
    pub fn schedule_next(&mut self, handler: Box<dyn Handler>) {
        self.next = Some(handler);
    }

    /// Registers a tap that observes the marshalled reply bytes.
    pub fn register_writer(&mut self, writer: Box<dyn ResponseWriter>) {
        self.writers.push(writer);
    }

    fn next_sequence_number(&self) -> Result<u8, HandlerError> {
        self.request_sequence_number
            .checked_add(1)
            .ok_or(HandlerError::Sequence(SequenceError::Overflow))
    }

    fn reply_with_sequence<B: PacketBody + Serialize>(
        &mut self,
        body: B,
        sequence_number: u8,
    ) -> Result<(), HandlerError> {
        if self.reply.is_some() {
            return Err(HandlerError::AlreadyReplied);
        }

        let header = HeaderInfo::new(self.version, sequence_number, self.flags, self.session_id);
        let packet = Packet::new(header, body);

        let mut buffer = vec![0u8; packet.wire_size()];
        let written = match self.secret {
            Some(secret_key) => packet.serialize(secret_key, &mut buffer)?,
            None => packet.serialize_unobfuscated(&mut buffer)?,
        };
        buffer.truncate(written);

        for writer in &mut self.writers {
            // taps are best-effort observers
            if let Err(error) = writer.write_packet(&buffer) {
                warn!(%error, "response writer tap failed");
            }
        }

        self.reply = Some(SentReply {
            bytes: buffer,
            sequence_number,
        });

        Ok(())
    }

    pub(crate) fn into_outcome(self) -> (Option<SentReply>, Option<Box<dyn Handler>>) {
        (self.reply, self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use tacplus_protocol::authentication::{Reply, ReplyFlags, Status};
    use tacplus_protocol::{FieldText, MajorVersion, MinorVersion};

    fn request_header(sequence_number: u8) -> HeaderInfo {
        HeaderInfo::new(
            Version::new(MajorVersion::RFC8907, MinorVersion::Default),
            sequence_number,
            PacketFlags::empty(),
            77,
        )
    }

    fn get_user_reply() -> Reply<'static> {
        Reply::new(
            Status::GetUser,
            FieldText::assert("username:"),
            b"",
            ReplyFlags::empty(),
        )
        .unwrap()
    }

    #[test]
    fn reply_sequence_is_request_plus_one() {
        let header = request_header(3);
        let mut response = Response::new(&header, Some(b"secret"), PacketFlags::empty());

        response
            .reply_authentication(get_user_reply())
            .expect("first reply should be accepted");

        let (sent, next) = response.into_outcome();
        let sent = sent.expect("a reply should have been queued");
        assert_eq!(sent.sequence_number, 4);
        assert!(next.is_none());

        // wire image round-trips with the same key
        let mut bytes = sent.bytes;
        let parsed = Packet::<Reply>::deserialize(b"secret", &mut bytes)
            .expect("reply should deserialize with the same key");
        assert_eq!(parsed.header().sequence_number(), 4);
        assert_eq!(parsed.body().status(), Status::GetUser);
    }

    #[test]
    fn restart_resets_sequence_to_one() {
        let header = request_header(5);
        let mut response = Response::new(&header, Some(b"secret"), PacketFlags::empty());

        let restart = Reply::new(
            Status::Restart,
            FieldText::assert(""),
            b"",
            ReplyFlags::empty(),
        )
        .unwrap();
        response.reply_authentication(restart).unwrap();

        let (sent, _) = response.into_outcome();
        assert_eq!(sent.unwrap().sequence_number, 1);
    }

    #[test]
    fn second_reply_is_rejected() {
        let header = request_header(1);
        let mut response = Response::new(&header, Some(b"secret"), PacketFlags::empty());

        response.reply_authentication(get_user_reply()).unwrap();
        let error = response
            .reply_authentication(get_user_reply())
            .expect_err("second reply must be rejected");
        assert!(matches!(error, HandlerError::AlreadyReplied));
    }

    #[test]
    fn sequence_overflow_is_an_error() {
        let header = request_header(u8::MAX);
        let mut response = Response::new(&header, Some(b"secret"), PacketFlags::empty());

        let error = response
            .reply_authentication(get_user_reply())
            .expect_err("reply to sequence 255 cannot be numbered");
        assert!(matches!(
            error,
            HandlerError::Sequence(SequenceError::Overflow)
        ));
    }

    struct RecordingWriter(Arc<Mutex<Vec<Vec<u8>>>>);

    impl ResponseWriter for RecordingWriter {
        fn write_packet(&mut self, packet: &[u8]) -> io::Result<()> {
            self.0.lock().unwrap().push(packet.to_vec());
            Ok(())
        }
    }

    struct FailingWriter;

    impl ResponseWriter for FailingWriter {
        fn write_packet(&mut self, _packet: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "tap exploded"))
        }
    }

    #[test]
    fn writer_taps_see_wire_bytes_and_failures_are_not_fatal() {
        let header = request_header(1);
        let mut response = Response::new(&header, Some(b"secret"), PacketFlags::empty());

        let seen = Arc::new(Mutex::new(Vec::new()));
        response.register_writer(Box::new(FailingWriter));
        response.register_writer(Box::new(RecordingWriter(seen.clone())));

        response
            .reply_authentication(get_user_reply())
            .expect("tap failure must not fail the reply");

        let (sent, _) = response.into_outcome();
        let taps = seen.lock().unwrap();
        assert_eq!(taps.len(), 1);
        assert_eq!(taps[0], sent.unwrap().bytes);
    }
}

use core::fmt;
use core::iter::zip;
use core::ops::Range;

use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};
use getset::{CopyGetters, Getters, MutGetters};
use md5::{Digest, Md5};
use num_enum::{TryFromPrimitive, TryFromPrimitiveError};

use super::{Deserialize, DeserializeError, SerializeError};
use super::{PacketBody, Serialize, Version};

#[cfg(test)]
mod tests;

/// The largest body length a TACACS+ packet header may declare.
///
/// RFC8907 leaves the bound to implementations; this matches the widely-used
/// 64 KiB limit, which comfortably covers every legitimate body.
pub const MAX_BODY_LENGTH: usize = 65536;

/// Flags to indicate information about packets or the client/server.
#[repr(transparent)]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct PacketFlags(u8);

bitflags! {
    impl PacketFlags: u8 {
        /// Indicates the body of the packet is unobfuscated.
        ///
        /// Note that RFC 8907 specifies that "this option is deprecated and **MUST NOT** be used in production" ([section 4.5]),
        /// except on TLS transports where the obfuscation is disabled entirely.
        ///
        /// [section 4.5]: https://www.rfc-editor.org/rfc/rfc8907.html#section-4.5-16
        const UNENCRYPTED       = 0b00000001;

        /// Signals that the client would like to reuse a TCP connection across multiple sessions.
        const SINGLE_CONNECTION = 0b00000100;
    }
}

impl fmt::Display for PacketFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no flags set");
        }

        let mut names = self.iter_names().map(|(name, _)| name);

        // space-separate the set flags
        if let Some(first) = names.next() {
            write!(f, "{first}")?;
        }
        for name in names {
            write!(f, " {name}")?;
        }

        Ok(())
    }
}

/// The type of a protocol packet.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, TryFromPrimitive)]
pub enum PacketType {
    /// Authentication packet.
    Authentication = 0x1,

    /// Authorization packet.
    Authorization = 0x2,

    /// Accounting packet.
    Accounting = 0x3,
}

#[doc(hidden)]
impl From<TryFromPrimitiveError<PacketType>> for DeserializeError {
    fn from(value: TryFromPrimitiveError<PacketType>) -> Self {
        Self::InvalidPacketType(value.number)
    }
}

/// Information included in a TACACS+ packet header.
///
/// The header is the only part of a packet that is never obfuscated, so a
/// server reads these twelve bytes first and uses them to bound, deobfuscate
/// and route the body that follows.
#[derive(PartialEq, Eq, Debug, Clone, CopyGetters, MutGetters)]
pub struct HeaderInfo {
    #[getset(get_copy = "pub", get_mut)]
    /// The protocol major and minor version.
    version: Version,

    #[getset(get_copy = "pub")]
    /// The sequence number of the packet. This should be odd for client packets, and even for server packets.
    sequence_number: u8,

    #[getset(get_copy = "pub", get_mut)]
    /// Session/packet flags.
    flags: PacketFlags,

    #[getset(get_copy = "pub")]
    /// ID of the current session.
    session_id: u32,
}

impl HeaderInfo {
    /// Size of a full TACACS+ packet header.
    pub const HEADER_SIZE_BYTES: usize = 12;

    // field offsets within the twelve header bytes
    const VERSION_OFFSET: usize = 0;
    const TYPE_OFFSET: usize = 1;
    const SEQUENCE_NUMBER_OFFSET: usize = 2;
    const FLAGS_OFFSET: usize = 3;
    const SESSION_ID_RANGE: Range<usize> = 4..8;
    const BODY_LENGTH_RANGE: Range<usize> = 8..12;

    /// Bundles some information to be put in the header of a TACACS+ packet.
    pub fn new(version: Version, sequence_number: u8, flags: PacketFlags, session_id: u32) -> Self {
        Self {
            version,
            sequence_number,
            flags,
            session_id,
        }
    }

    /// Reads the packet type byte out of raw header bytes without parsing the
    /// rest; a framed reader needs the type before it knows which body
    /// deserializer applies.
    pub fn declared_packet_type(buffer: &[u8]) -> Result<PacketType, DeserializeError> {
        if buffer.len() < Self::HEADER_SIZE_BYTES {
            Err(DeserializeError::UnexpectedEnd)
        } else {
            PacketType::try_from(buffer[Self::TYPE_OFFSET]).map_err(Into::into)
        }
    }

    /// Reads the body length raw header bytes declare, so a framed reader can
    /// bound and size its body read before parsing anything else.
    pub fn declared_body_length(buffer: &[u8]) -> Result<u32, DeserializeError> {
        if buffer.len() < Self::HEADER_SIZE_BYTES {
            Err(DeserializeError::UnexpectedEnd)
        } else {
            Ok(NetworkEndian::read_u32(&buffer[Self::BODY_LENGTH_RANGE]))
        }
    }

    /// Serializes the header, supplementing the packet type & body length
    /// that are derived from the body rather than stored here.
    fn serialize(
        &self,
        buffer: &mut [u8],
        packet_type: PacketType,
        body_length: u32,
    ) -> Result<usize, SerializeError> {
        if buffer.len() < Self::HEADER_SIZE_BYTES {
            return Err(SerializeError::NotEnoughSpace);
        }

        buffer[Self::VERSION_OFFSET] = self.version.into();
        buffer[Self::TYPE_OFFSET] = packet_type as u8;
        buffer[Self::SEQUENCE_NUMBER_OFFSET] = self.sequence_number;
        buffer[Self::FLAGS_OFFSET] = self.flags.bits();
        NetworkEndian::write_u32(&mut buffer[Self::SESSION_ID_RANGE], self.session_id);
        NetworkEndian::write_u32(&mut buffer[Self::BODY_LENGTH_RANGE], body_length);

        Ok(Self::HEADER_SIZE_BYTES)
    }
}

impl TryFrom<&[u8]> for HeaderInfo {
    type Error = DeserializeError;

    fn try_from(buffer: &[u8]) -> Result<Self, Self::Error> {
        // a server reads headers straight off the network, so a short buffer
        // must surface as an error rather than a panic
        if buffer.len() < Self::HEADER_SIZE_BYTES {
            return Err(DeserializeError::UnexpectedEnd);
        }

        let flag_byte = buffer[Self::FLAGS_OFFSET];

        Ok(Self {
            version: buffer[Self::VERSION_OFFSET].try_into()?,
            sequence_number: buffer[Self::SEQUENCE_NUMBER_OFFSET],
            flags: PacketFlags::from_bits(flag_byte)
                .ok_or(DeserializeError::InvalidHeaderFlags(flag_byte))?,
            session_id: NetworkEndian::read_u32(&buffer[Self::SESSION_ID_RANGE]),
        })
    }
}

/// A full TACACS+ protocol packet.
#[derive(Getters, Debug, PartialEq, Eq)]
pub struct Packet<B: PacketBody> {
    /// Gets some of the header information associated with a packet.
    #[getset(get = "pub")]
    header: HeaderInfo,

    /// Gets the body of the packet.
    #[getset(get = "pub")]
    body: B,
}

impl<B: PacketBody> Packet<B> {
    /// Location of the start of the packet body, after the header.
    pub(super) const BODY_START: usize = 12;

    /// Assembles a header and body into a full packet.
    ///
    /// NOTE: Some fields in the provided header may be updated for consistency.
    /// These may include:
    /// - The protocol minor version, depending on authentication method choice
    /// - The [`UNENCRYPTED`](PacketFlags::UNENCRYPTED) flag, depending on if a key is specified
    pub fn new(mut header: HeaderInfo, body: B) -> Self {
        // update minor version to what is required by the body, if applicable
        if let Some(minor) = body.required_minor_version() {
            header.version_mut().1 = minor;
        }

        Self { header, body }
    }

    /// Splits a packet into its header and body.
    pub fn into_parts(self) -> (HeaderInfo, B) {
        (self.header, self.body)
    }
}

/// MD5 hash output size, in bytes.
const MD5_OUTPUT_SIZE: usize = 16;

/// (De)obfuscates the body of a packet as specified in [RFC8907 section 4.5].
///
/// Since obfuscation is done by XOR, obfuscating & deobfuscating are the same
/// operation; applying this function twice with the same key and header is a
/// no-op. The session id, version, and sequence number that key the pad are
/// taken from the supplied header, so both directions derive the same pad
/// from the header as it appears on the wire.
///
/// [RFC8907 section 4.5]: https://www.rfc-editor.org/rfc/rfc8907.html#name-data-obfuscation
pub fn xor_body_with_pad(header: &HeaderInfo, secret_key: &[u8], body_buffer: &mut [u8]) {
    // nothing to do for an empty body; the chunk logic below assumes at least one chunk
    if body_buffer.is_empty() {
        return;
    }

    let mut pseudo_pad = [0; MD5_OUTPUT_SIZE];

    // prehash common prefix for all hash invocations
    // prefix: session id -> key -> version -> sequence number
    let mut prefix_hasher = Md5::new();
    prefix_hasher.update(header.session_id().to_be_bytes());
    prefix_hasher.update(secret_key);

    // technically these to_be_bytes calls don't do anything since both fields end up as `u8`s but still
    prefix_hasher.update(u8::from(header.version()).to_be_bytes());
    prefix_hasher.update(header.sequence_number().to_be_bytes());

    let mut chunks_iter = body_buffer.chunks_mut(MD5_OUTPUT_SIZE);

    // first chunk just uses hashed prefix
    prefix_hasher
        .clone()
        .finalize_into((&mut pseudo_pad).into());

    // SAFETY: the body is checked to be nonempty above, so there is at least one chunk
    let first_chunk = chunks_iter.next().unwrap();

    // xor pseudo-pad with chunk
    xor_slices(first_chunk, &pseudo_pad);

    for chunk in chunks_iter {
        // previous pad chunk is appended to prefix prehashed above
        let mut hasher = prefix_hasher.clone();
        hasher.update(pseudo_pad);
        hasher.finalize_into((&mut pseudo_pad).into());

        // xor pseudo-pad with chunk
        xor_slices(chunk, &pseudo_pad);
    }
}

/// XORs two byte slices together, truncating to the shorter of the two argument lengths.
fn xor_slices(output: &mut [u8], pseudo_pad: &[u8]) {
    for (out, pad) in zip(output, pseudo_pad) {
        *out ^= pad;
    }
}

impl<B: PacketBody + Serialize> Packet<B> {
    /// Calculates the size of this packet as encoded into its binary format.
    pub fn wire_size(&self) -> usize {
        HeaderInfo::HEADER_SIZE_BYTES + self.body.wire_size()
    }

    /// Serializes the packet into a buffer, obfuscating the body using a pseudo-pad generated by iterating the MD5 hash function.
    ///
    /// This consumes the packet and also ensures the [`UNENCRYPTED`](PacketFlags::UNENCRYPTED) flag is unset.
    pub fn serialize<K: AsRef<[u8]>>(
        mut self,
        secret_key: K,
        buffer: &mut [u8],
    ) -> Result<usize, SerializeError> {
        // remove unencrypted flag from header
        self.header.flags_mut().remove(PacketFlags::UNENCRYPTED);

        let packet_length = self.serialize_packet(buffer)?;

        xor_body_with_pad(
            &self.header,
            secret_key.as_ref(),
            &mut buffer[Self::BODY_START..packet_length],
        );

        Ok(packet_length)
    }

    /// Serializes the packet into a buffer, leaving the body as cleartext.
    ///
    /// This consumes the packet and sets the [`UNENCRYPTED`](PacketFlags::UNENCRYPTED) flag if necessary.
    ///
    /// Note that RFC8907 deprecated the UNENCRYPTED flag and states that it "**MUST NOT** be used in production" ([section 4.5])
    /// outside of TLS transports.
    ///
    /// [section 4.5]: https://www.rfc-editor.org/rfc/rfc8907.html#section-4.5-16
    pub fn serialize_unobfuscated(mut self, buffer: &mut [u8]) -> Result<usize, SerializeError> {
        // ensure unencrypted flag is set
        self.header.flags_mut().insert(PacketFlags::UNENCRYPTED);

        self.serialize_packet(buffer)
    }

    fn serialize_packet(&self, buffer: &mut [u8]) -> Result<usize, SerializeError> {
        let wire_size = self.wire_size();

        if self.body.wire_size() > MAX_BODY_LENGTH {
            Err(SerializeError::BodyTooLong)
        } else if buffer.len() >= wire_size {
            // serialize body first to get its length, which is stored in the header
            let body_length = self
                .body
                .serialize_into_buffer(&mut buffer[Self::BODY_START..wire_size])?;

            // fill in header information
            let header_bytes = self.header.serialize(
                &mut buffer[..HeaderInfo::HEADER_SIZE_BYTES],
                B::TYPE,
                body_length.try_into()?,
            )?;

            // return total length written
            Ok(header_bytes + body_length)
        } else {
            Err(SerializeError::NotEnoughSpace)
        }
    }
}

impl<'raw, B: PacketBody + Deserialize<'raw>> Packet<B> {
    /// Attempts to deserialize an obfuscated packet with the provided secret key.
    ///
    /// This function also ensures that the [`UNENCRYPTED`](PacketFlags::UNENCRYPTED)
    /// flag is not set, and returns an error if it is.
    pub fn deserialize<K: AsRef<[u8]>>(
        secret_key: K,
        buffer: &'raw mut [u8],
    ) -> Result<Self, DeserializeError> {
        let header = HeaderInfo::try_from(&buffer[..])?;

        // ensure unencrypted flag is not set
        if !header.flags().contains(PacketFlags::UNENCRYPTED) {
            xor_body_with_pad(
                &header,
                secret_key.as_ref(),
                &mut buffer[Self::BODY_START..],
            );

            let body = Self::deserialize_body(buffer)?;

            Ok(Self::new(header, body))
        } else {
            Err(DeserializeError::IncorrectUnencryptedFlag)
        }
    }

    /// Attempts to deserialize a cleartext packet from a buffer.
    ///
    /// This function also ensures that the [`UNENCRYPTED`](PacketFlags::UNENCRYPTED)
    /// flag is set, and returns an error if it is not.
    pub fn deserialize_unobfuscated(buffer: &'raw [u8]) -> Result<Self, DeserializeError> {
        let header = HeaderInfo::try_from(buffer)?;

        // ensure unencrypted flag is set
        if header.flags().contains(PacketFlags::UNENCRYPTED) {
            let body = Self::deserialize_body(buffer)?;
            Ok(Self::new(header, body))
        } else {
            Err(DeserializeError::IncorrectUnencryptedFlag)
        }
    }

    fn deserialize_body(buffer: &'raw [u8]) -> Result<B, DeserializeError> {
        if buffer.len() > HeaderInfo::HEADER_SIZE_BYTES {
            let actual_packet_type = HeaderInfo::declared_packet_type(buffer)?;
            if actual_packet_type == B::TYPE {
                // body length is stored at the end of the 12-byte header
                let body_length = HeaderInfo::declared_body_length(buffer)?;

                // enforce the protocol bound before trusting the length for slicing
                if body_length as usize > MAX_BODY_LENGTH {
                    return Err(DeserializeError::BodyLengthExceedsMaximum(body_length));
                }

                // NOTE: the rest of the buffer is checked here to avoid a panic if it's shorter than body_length when trying to slice that large
                // ensure buffer actually contains whole body
                if buffer[Self::BODY_START..].len() >= body_length as usize {
                    let body = B::deserialize_from_buffer(
                        &buffer[Self::BODY_START..Self::BODY_START + body_length as usize],
                    )?;
                    Ok(body)
                } else {
                    Err(DeserializeError::UnexpectedEnd)
                }
            } else {
                Err(DeserializeError::PacketTypeMismatch {
                    expected: B::TYPE,
                    actual: actual_packet_type,
                })
            }
        } else {
            Err(DeserializeError::UnexpectedEnd)
        }
    }
}

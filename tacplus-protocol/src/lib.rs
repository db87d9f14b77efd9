//! # tacplus-protocol
//!
//! Serialization & deserialization of (RFC8907) TACACS+ protocol packets,
//! covering both directions of every packet body so it can back a server as
//! well as a client.

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::cast_possible_truncation)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

#[cfg(feature = "std")]
extern crate std;

use core::{fmt, num::TryFromIntError};

pub mod accounting;
pub mod authentication;
pub mod authorization;

mod packet;
pub use packet::{
    xor_body_with_pad, HeaderInfo, Packet, PacketFlags, PacketType, MAX_BODY_LENGTH,
};

mod arguments;
pub use arguments::{Argument, Arguments, ArgumentsIterator, InvalidArgument};

#[cfg(feature = "std")]
pub use arguments::ArgumentOwned;

mod fields;
pub use fields::*;

mod text;
pub use text::FieldText;

#[cfg(feature = "std")]
mod owned;

#[cfg(feature = "std")]
pub use owned::FromBorrowedBody;

/// An error that occurred when serializing a packet or any of its components into their binary format.
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq)]
pub enum SerializeError {
    /// The provided buffer did not have enough space to serialize the object.
    NotEnoughSpace,

    /// The length of a field exceeded the maximum value encodeable on the wire.
    LengthOverflow,

    /// The body exceeded the maximum length a header can declare.
    BodyTooLong,

    /// Mismatch between expected/actual number of bytes written.
    LengthMismatch {
        /// The expected number of bytes to have been written.
        expected: usize,
        /// That actual number of bytes written during serialization.
        actual: usize,
    },
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotEnoughSpace => write!(f, "not enough space in buffer"),
            Self::LengthOverflow => write!(f, "field length overflowed"),
            Self::BodyTooLong => write!(
                f,
                "packet body exceeded the maximum length of {MAX_BODY_LENGTH} bytes"
            ),
            Self::LengthMismatch { expected, actual } => write!(
                f,
                "mismatch in number of bytes written: expected {expected}, actual {actual}"
            ),
        }
    }
}

#[doc(hidden)]
impl From<TryFromIntError> for SerializeError {
    fn from(_value: TryFromIntError) -> Self {
        Self::LengthOverflow
    }
}

/// An error that occurred during deserialization of a full/partial packet.
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq)]
pub enum DeserializeError {
    /// Invalid binary status representation in response.
    InvalidStatus(u8),

    /// Invalid packet type number on the wire.
    InvalidPacketType(u8),

    /// Invalid authentication action byte.
    InvalidAction(u8),

    /// Invalid authentication method byte.
    InvalidMethod(u8),

    /// Invalid authentication type byte.
    InvalidAuthenticationType(u8),

    /// Authentication type was `NotSet`, which authentication start packets disallow.
    AuthenticationTypeNotSet,

    /// Invalid authentication service byte.
    InvalidService(u8),

    /// Privilege level byte was outside the valid 0-15 range.
    InvalidPrivilegeLevel(u8),

    /// Invalid header flag byte.
    InvalidHeaderFlags(u8),

    /// Invalid body flag byte.
    InvalidBodyFlags(u8),

    /// Invalid version number.
    InvalidVersion(u8),

    /// Invalid arguments when deserializing.
    InvalidArgument(InvalidArgument),

    /// Mismatch between expected/received packet types.
    PacketTypeMismatch {
        /// The expected packet type.
        expected: PacketType,

        /// The actual packet type that was parsed.
        actual: PacketType,
    },

    /// Text field was not printable ASCII when it should have been.
    BadText,

    /// Unencrypted flag was not the expected value.
    IncorrectUnencryptedFlag,

    /// Header declared a body longer than the protocol maximum.
    BodyLengthExceedsMaximum(u32),

    /// Buffer containing raw body had incorrect length with respect to length fields in the body.
    ///
    /// On a server this is the strongest available signal of a shared-secret
    /// mismatch: the obfuscation XOR preserves body length, so a wrong key
    /// scrambles the declared sub-field lengths while the actual body size
    /// stays fixed.
    WrongBodyBufferSize {
        /// The expected buffer length, based on length fields in the packet body.
        expected: usize,
        /// The size of the buffer being deserialized, sliced to just the body section.
        buffer_size: usize,
    },

    /// Object representation was cut off in some way.
    UnexpectedEnd,
}

impl DeserializeError {
    /// Whether this error indicates a likely shared-secret mismatch rather
    /// than a malformed packet.
    pub fn indicates_bad_secret(&self) -> bool {
        matches!(self, Self::WrongBodyBufferSize { .. })
    }
}

impl fmt::Display for DeserializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStatus(num) => write!(f, "invalid status byte in raw packet: {num:#x}"),
            Self::InvalidPacketType(num) => write!(f, "invalid packet type byte: {num:#x}"),
            Self::InvalidAction(num) => write!(f, "invalid authentication action byte: {num:#x}"),
            Self::InvalidMethod(num) => write!(f, "invalid authentication method byte: {num:#x}"),
            Self::InvalidAuthenticationType(num) => {
                write!(f, "invalid authentication type byte: {num:#x}")
            }
            Self::AuthenticationTypeNotSet => write!(
                f,
                "authentication type must be set in authentication packets"
            ),
            Self::InvalidService(num) => {
                write!(f, "invalid authentication service byte: {num:#x}")
            }
            Self::InvalidPrivilegeLevel(num) => {
                write!(f, "privilege level {num} outside valid range 0-15")
            }
            Self::InvalidHeaderFlags(num) => write!(f, "invalid header flags: {num:#x}"),
            Self::InvalidBodyFlags(num) => write!(f, "invalid body flags: {num:#x}"),
            Self::InvalidVersion(num) => write!(
                f,
                "invalid version number: major {:#x}, minor {:#x}",
                num >> 4,     // major version is 4 upper bits of byte
                num & 0b1111  // minor version is 4 lower bits
            ),
            Self::InvalidArgument(reason) => write!(f, "invalid argument: {reason}"),
            Self::BadText => write!(f, "text field was not printable ASCII"),
            Self::IncorrectUnencryptedFlag => write!(f, "unencrypted flag had an incorrect value"),
            Self::BodyLengthExceedsMaximum(length) => write!(
                f,
                "header declared a {length}-byte body, over the {MAX_BODY_LENGTH}-byte maximum"
            ),
            Self::PacketTypeMismatch { expected, actual } => write!(f, "packet type mismatch: expected {expected:?} but got {actual:?}"),
            Self::WrongBodyBufferSize { expected, buffer_size } => write!(f, "body buffer size didn't match length fields: expected {expected} bytes, but buffer was actually {buffer_size}"),
            Self::UnexpectedEnd => write!(f, "unexpected end of buffer when deserializing object"),
        }
    }
}

// Error trait is only available on std (on stable; stabilized in nightly 1.81) so this has to be std-gated
#[cfg(feature = "std")]
mod error_impls {
    use std::error::Error;

    use super::{DeserializeError, InvalidArgument, SerializeError};

    impl Error for DeserializeError {}
    impl Error for SerializeError {}
    impl Error for InvalidArgument {}
    impl Error for super::authentication::BadStart {}
}

// suggestion from Rust API guidelines: https://rust-lang.github.io/api-guidelines/future-proofing.html#sealed-traits-protect-against-downstream-implementations-c-sealed
// seals the PacketBody trait
mod sealed {
    use super::{accounting, authentication, authorization};
    use super::{Packet, PacketBody};

    pub trait Sealed {}

    // authentication packet types
    impl Sealed for authentication::Start<'_> {}
    impl Sealed for authentication::Continue<'_> {}
    impl Sealed for authentication::Reply<'_> {}

    // authorization packet bodies
    impl Sealed for authorization::Request<'_> {}
    impl Sealed for authorization::Reply<'_> {}

    // accounting packet bodies
    impl Sealed for accounting::Request<'_> {}
    impl Sealed for accounting::Reply<'_> {}

    // full packet type
    impl<B: PacketBody> Sealed for Packet<B> {}

    // owned body mirrors
    #[cfg(feature = "std")]
    mod owned {
        use super::Sealed;

        impl Sealed for crate::authentication::StartOwned {}
        impl Sealed for crate::authentication::ContinueOwned {}
        impl Sealed for crate::authentication::ReplyOwned {}
        impl Sealed for crate::authorization::RequestOwned {}
        impl Sealed for crate::authorization::ReplyOwned {}
        impl Sealed for crate::accounting::RequestOwned {}
        impl Sealed for crate::accounting::ReplyOwned {}
    }
}

/// The major version of the TACACS+ protocol.
#[repr(u8)]
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MajorVersion {
    /// The only current major version specified in RFC8907.
    RFC8907 = 0xc,
}

/// The minor version of the TACACS+ protocol in use, which specifies choices for authentication methods.
#[repr(u8)]
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MinorVersion {
    /// Default minor version, used for ASCII authentication.
    Default = 0x0,
    /// Minor version 1, which is used for (MS)CHAP and PAP authentication.
    V1 = 0x1,
}

/// The full protocol version.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Version(pub(crate) MajorVersion, pub(crate) MinorVersion);

impl Version {
    /// Bundles together a TACACS+ protocol major and minor version.
    pub fn new(major: MajorVersion, minor: MinorVersion) -> Self {
        Self(major, minor)
    }

    /// Gets the major TACACS+ version.
    pub fn major(&self) -> MajorVersion {
        self.0
    }

    /// Gets the minor TACACS+ version.
    pub fn minor(&self) -> MinorVersion {
        self.1
    }
}

impl Default for Version {
    fn default() -> Self {
        Self(MajorVersion::RFC8907, MinorVersion::Default)
    }
}

impl TryFrom<u8> for Version {
    type Error = DeserializeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        // only major version is 0xc currently
        if value >> 4 == MajorVersion::RFC8907 as u8 {
            let minor_version = match value & 0xf {
                0 => Ok(MinorVersion::Default),
                1 => Ok(MinorVersion::V1),
                _ => Err(DeserializeError::InvalidVersion(value)),
            }?;

            Ok(Self(MajorVersion::RFC8907, minor_version))
        } else {
            Err(DeserializeError::InvalidVersion(value))
        }
    }
}

impl From<Version> for u8 {
    fn from(value: Version) -> Self {
        ((value.0 as u8) << 4) | (value.1 as u8 & 0xf)
    }
}

/// A type that can be treated as a TACACS+ protocol packet body.
///
/// This trait is sealed per the [Rust API guidelines], so it cannot be implemented by external types.
///
/// [Rust API guidelines]: https://rust-lang.github.io/api-guidelines/future-proofing.html#sealed-traits-protect-against-downstream-implementations-c-sealed
pub trait PacketBody: sealed::Sealed {
    /// Type of the packet (one of authentication, authorization, or accounting).
    const TYPE: PacketType;

    /// Length of body just including required fields.
    const REQUIRED_FIELDS_LENGTH: usize;

    /// Required protocol minor version based on the contents of the packet body.
    ///
    /// This is used since [`AuthenticationType`]s are partitioned by protocol minor version.
    fn required_minor_version(&self) -> Option<MinorVersion> {
        None
    }
}

/// Something that can be serialized into a binary format.
pub trait Serialize: sealed::Sealed {
    /// Returns the current size of the packet as represented on the wire.
    fn wire_size(&self) -> usize;

    /// Serializes data into a buffer, returning the resulting length on success.
    fn serialize_into_buffer(&self, buffer: &mut [u8]) -> Result<usize, SerializeError>;
}

/// Something that can be deserialized from a binary format.
pub trait Deserialize<'raw>: sealed::Sealed + Sized {
    /// Attempts to deserialize an object from a buffer holding exactly one packet body.
    fn deserialize_from_buffer(buffer: &'raw [u8]) -> Result<Self, DeserializeError>;
}

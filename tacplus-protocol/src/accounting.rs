//! Accounting protocol packet (de)serialization.

use core::fmt;

use bitflags::bitflags;
use byteorder::{ByteOrder, NetworkEndian};
use getset::{CopyGetters, Getters};
use num_enum::{TryFromPrimitive, TryFromPrimitiveError};

use super::{
    Arguments, AuthenticationContext, AuthenticationMethod, Deserialize, DeserializeError,
    PacketBody, PacketType, Serialize, SerializeError, UserInformation,
};
use crate::FieldText;

#[cfg(test)]
mod tests;

#[cfg(feature = "std")]
mod owned;

#[cfg(feature = "std")]
pub use owned::{ReplyOwned, RequestOwned};

bitflags! {
    /// Raw bitflags for accounting request packet.
    #[derive(PartialEq, Eq)]
    struct RawFlags: u8 {
        const START    = 0b00000010;
        const STOP     = 0b00000100;
        const WATCHDOG = 0b00001000;
    }
}

/// Valid flag combinations for a TACACS+ accounting REQUEST packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flags {
    /// Start of a task.
    StartRecord,

    /// Task complete.
    StopRecord,

    /// Indication that task is still running, with no extra arguments.
    WatchdogNoUpdate,

    /// Update on long-running task, including updated/new argument values.
    WatchdogUpdate,
}

impl From<Flags> for RawFlags {
    fn from(value: Flags) -> Self {
        match value {
            Flags::StartRecord => RawFlags::START,
            Flags::StopRecord => RawFlags::STOP,
            Flags::WatchdogNoUpdate => RawFlags::WATCHDOG,
            Flags::WatchdogUpdate => RawFlags::WATCHDOG | RawFlags::START,
        }
    }
}

impl Flags {
    /// The number of bytes occupied by a flag set on the wire.
    const WIRE_SIZE: usize = 1;

    /// Maps a raw flag byte to one of the combinations RFC8907 permits in an
    /// accounting request.
    fn from_wire(flag_byte: u8) -> Result<Self, DeserializeError> {
        let raw =
            RawFlags::from_bits(flag_byte).ok_or(DeserializeError::InvalidBodyFlags(flag_byte))?;

        match raw {
            _ if raw == RawFlags::START => Ok(Flags::StartRecord),
            _ if raw == RawFlags::STOP => Ok(Flags::StopRecord),
            _ if raw == RawFlags::WATCHDOG => Ok(Flags::WatchdogNoUpdate),
            _ if raw == RawFlags::WATCHDOG | RawFlags::START => Ok(Flags::WatchdogUpdate),
            _ => Err(DeserializeError::InvalidBodyFlags(flag_byte)),
        }
    }

    /// Whether this is one of the two watchdog record kinds.
    pub fn is_watchdog(&self) -> bool {
        matches!(self, Flags::WatchdogNoUpdate | Flags::WatchdogUpdate)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::StartRecord => "start",
                Self::StopRecord => "stop",
                Self::WatchdogNoUpdate => "watchdog",
                Self::WatchdogUpdate => "watchdog-update",
            }
        )
    }
}

/// An accounting request packet, used to start, stop, or provide progress on a running job.
#[derive(Debug, PartialEq, Eq, Getters, CopyGetters)]
pub struct Request<'packet> {
    /// Gets the flags that indicate what kind of accounting record this packet includes.
    #[getset(get_copy = "pub")]
    flags: Flags,

    /// Gets the method used to authenticate to the TACACS+ client.
    #[getset(get_copy = "pub")]
    authentication_method: AuthenticationMethod,

    /// Gets the client authentication context.
    #[getset(get = "pub")]
    authentication: AuthenticationContext,

    /// Gets the information about the user connected to the client.
    #[getset(get = "pub")]
    user_information: UserInformation<'packet>,

    /// Gets the arguments that provide additional information to the server.
    #[getset(get = "pub")]
    arguments: Arguments<'packet>,
}

impl<'packet> Request<'packet> {
    /// Argument lengths in a request packet start at index 9, if present.
    const ARGUMENT_LENGTHS_OFFSET: usize = 9;

    /// Assembles a new accounting request packet body.
    pub fn new(
        flags: Flags,
        authentication_method: AuthenticationMethod,
        authentication: AuthenticationContext,
        user_information: UserInformation<'packet>,
        arguments: Arguments<'packet>,
    ) -> Self {
        Self {
            flags,
            authentication_method,
            authentication,
            user_information,
            arguments,
        }
    }
}

impl PacketBody for Request<'_> {
    const TYPE: PacketType = PacketType::Accounting;

    // 4 extra bytes come from user information lengths (user, port, remote address) & argument count
    const REQUIRED_FIELDS_LENGTH: usize =
        Flags::WIRE_SIZE + AuthenticationMethod::WIRE_SIZE + AuthenticationContext::WIRE_SIZE + 4;
}

impl Serialize for Request<'_> {
    fn wire_size(&self) -> usize {
        Flags::WIRE_SIZE
            + AuthenticationMethod::WIRE_SIZE
            + AuthenticationContext::WIRE_SIZE
            + self.user_information.wire_size()
            + self.arguments.wire_size()
    }

    fn serialize_into_buffer(&self, buffer: &mut [u8]) -> Result<usize, SerializeError> {
        let wire_size = self.wire_size();

        if buffer.len() >= wire_size {
            buffer[0] = RawFlags::from(self.flags).bits();
            buffer[1] = self.authentication_method as u8;

            // header information (lengths, etc.)
            self.authentication.serialize(&mut buffer[2..5]);
            self.user_information
                .serialize_field_lengths(&mut buffer[5..8])?;

            let argument_count = self.arguments.argument_count() as usize;

            // body starts after the required fields & the argument lengths (1 byte per argument)
            let body_start = Self::ARGUMENT_LENGTHS_OFFSET + argument_count;

            // actual request content
            // as below, slice bounds are capped to end of packet body to avoid overflowing
            let user_information_len = self
                .user_information
                .serialize_field_values(&mut buffer[body_start..wire_size])?;

            let arguments_serialized_len =
                // argument count sits at index 8, with the lengths just after
                self.arguments.serialize_count_and_lengths(&mut buffer[8..8 + argument_count + 1])?
                    // argument values go after the user information values in the body
                    + self
                        .arguments
                        .serialize_encoded_values(&mut buffer[body_start + user_information_len..wire_size])?;

            // NOTE: as with authorization, 1 is subtracted from REQUIRED_FIELDS_LENGTH as the argument count would be double counted otherwise
            let actual_written_len = (Self::REQUIRED_FIELDS_LENGTH - 1)
                + user_information_len
                + arguments_serialized_len;

            // ensure expected/actual sizes match
            if actual_written_len == wire_size {
                Ok(actual_written_len)
            } else {
                Err(SerializeError::LengthMismatch {
                    expected: wire_size,
                    actual: actual_written_len,
                })
            }
        } else {
            Err(SerializeError::NotEnoughSpace)
        }
    }
}

impl<'raw> Deserialize<'raw> for Request<'raw> {
    fn deserialize_from_buffer(buffer: &'raw [u8]) -> Result<Self, DeserializeError> {
        if buffer.len() < Self::REQUIRED_FIELDS_LENGTH {
            return Err(DeserializeError::UnexpectedEnd);
        }

        let user_information_lengths = UserInformation::extract_field_lengths(&buffer[5..8])?;
        let argument_count = usize::from(buffer[8]);

        // a declared argument count that overruns the body is itself a
        // length-redundancy failure, i.e. the bad-secret signal
        let values_offset = Self::ARGUMENT_LENGTHS_OFFSET + argument_count;
        if buffer.len() < values_offset {
            return Err(DeserializeError::WrongBodyBufferSize {
                expected: values_offset,
                buffer_size: buffer.len(),
            });
        }

        let argument_lengths = &buffer[Self::ARGUMENT_LENGTHS_OFFSET..values_offset];
        let arguments_total: usize = argument_lengths
            .iter()
            .map(|&length| usize::from(length))
            .sum();

        // the length redundancy check runs before any field decoding, so that
        // a body scrambled by a shared-secret mismatch consistently surfaces
        // as WrongBodyBufferSize rather than an arbitrary field error
        let expected_length = values_offset + user_information_lengths.total() + arguments_total;
        if expected_length != buffer.len() {
            return Err(DeserializeError::WrongBodyBufferSize {
                expected: expected_length,
                buffer_size: buffer.len(),
            });
        }

        let flags = Flags::from_wire(buffer[0])?;
        let authentication_method = AuthenticationMethod::try_from(buffer[1])?;
        let authentication = AuthenticationContext::deserialize(&buffer[2..5])?;

        let user_information = UserInformation::deserialize_field_values(
            buffer,
            values_offset,
            user_information_lengths,
        )?;

        let arguments_start = values_offset + user_information_lengths.total();

        // accounting requests admit zero-length argument slots
        let arguments = Arguments::in_place_with_empty_slots(
            argument_lengths,
            &buffer[arguments_start..expected_length],
        )?;

        Ok(Self {
            flags,
            authentication_method,
            authentication,
            user_information,
            arguments,
        })
    }
}

/// The server's reply status in an accounting session.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, TryFromPrimitive)]
pub enum Status {
    /// Task logging succeeded.
    Success = 0x01,

    /// Something went wrong when logging the task.
    Error = 0x02,

    /// Forward accounting request to an alternative daemon.
    #[deprecated = "Forwarding to an alternative daemon was deprecated in RFC-8907."]
    Follow = 0x21,
}

impl Status {
    /// The number of bytes an accounting reply status occupies on the wire.
    const WIRE_SIZE: usize = 1;
}

#[doc(hidden)]
impl From<TryFromPrimitiveError<Status>> for DeserializeError {
    fn from(value: TryFromPrimitiveError<Status>) -> Self {
        Self::InvalidStatus(value.number)
    }
}

/// An accounting reply packet, sent by a TACACS+ server.
#[derive(PartialEq, Eq, Debug, Getters, CopyGetters)]
pub struct Reply<'packet> {
    /// Gets the status of an accounting reply.
    #[getset(get_copy = "pub")]
    status: Status,

    /// Gets the server message, which may be presented to a user connected to a client.
    #[getset(get = "pub")]
    server_message: FieldText<'packet>,

    /// Gets the administrative/log data sent by the server.
    #[getset(get = "pub")]
    data: FieldText<'packet>,
}

/// Field lengths of a reply packet as well as the total length.
struct ReplyFieldLengths {
    server_message_length: u16,
    data_length: u16,
    total_length: u32,
}

impl<'packet> Reply<'packet> {
    /// Offset of the server message in an accounting reply packet body, if present.
    const SERVER_MESSAGE_OFFSET: usize = 5;

    /// Assembles an accounting reply body, checking that the server message
    /// and data are short enough to be encodeable.
    pub fn new(
        status: Status,
        server_message: FieldText<'packet>,
        data: FieldText<'packet>,
    ) -> Option<Self> {
        if u16::try_from(server_message.len()).is_ok() && u16::try_from(data.len()).is_ok() {
            Some(Self {
                status,
                server_message,
                data,
            })
        } else {
            None
        }
    }

    /// Extracts the server message and data field lengths from a buffer, treating it as if it were a serialized reply packet body.
    fn extract_field_lengths(buffer: &[u8]) -> Result<ReplyFieldLengths, DeserializeError> {
        // ensure buffer is large enough to comprise a valid reply packet
        if buffer.len() >= Self::REQUIRED_FIELDS_LENGTH {
            // server message length is at the beginning of the packet
            let server_message_length = NetworkEndian::read_u16(&buffer[..2]);

            // data length is just after the server message length
            let data_length = NetworkEndian::read_u16(&buffer[2..4]);

            // full packet has required fields/lengths as well as the field values themselves
            // SAFETY: REQUIRED_FIELDS_LENGTH is guaranteed to fit in a u32 based on its defined value
            let total_length = u32::try_from(Self::REQUIRED_FIELDS_LENGTH).unwrap()
                + u32::from(server_message_length)
                + u32::from(data_length);

            Ok(ReplyFieldLengths {
                server_message_length,
                data_length,
                total_length,
            })
        } else {
            Err(DeserializeError::UnexpectedEnd)
        }
    }
}

impl PacketBody for Reply<'_> {
    const TYPE: PacketType = PacketType::Accounting;

    // 4 extra bytes are 2 bytes each for lengths of server message/data
    const REQUIRED_FIELDS_LENGTH: usize = Status::WIRE_SIZE + 4;
}

impl Serialize for Reply<'_> {
    fn wire_size(&self) -> usize {
        Self::REQUIRED_FIELDS_LENGTH + self.server_message.len() + self.data.len()
    }

    fn serialize_into_buffer(&self, buffer: &mut [u8]) -> Result<usize, SerializeError> {
        let wire_size = self.wire_size();

        if buffer.len() >= wire_size {
            let server_message_len = self.server_message.len().try_into()?;
            NetworkEndian::write_u16(&mut buffer[..2], server_message_len);

            let data_len = self.data.len().try_into()?;
            NetworkEndian::write_u16(&mut buffer[2..4], data_len);

            // status sits between the length fields and the string section
            buffer[4] = self.status as u8;

            let data_offset = Self::SERVER_MESSAGE_OFFSET + usize::from(server_message_len);
            buffer[Self::SERVER_MESSAGE_OFFSET..data_offset]
                .copy_from_slice(self.server_message.as_bytes());
            buffer[data_offset..data_offset + usize::from(data_len)]
                .copy_from_slice(self.data.as_bytes());

            Ok(wire_size)
        } else {
            Err(SerializeError::NotEnoughSpace)
        }
    }
}

impl<'raw> Deserialize<'raw> for Reply<'raw> {
    fn deserialize_from_buffer(buffer: &'raw [u8]) -> Result<Self, DeserializeError> {
        let extracted_lengths = Self::extract_field_lengths(buffer)?;

        // the provided buffer is sliced to the length reported in the packet header in Packet::deserialize_body(),
        // so we can compare against it this way
        let length_from_header = buffer.len();

        // ensure buffer length & calculated length from body fields match
        if extracted_lengths.total_length as usize == length_from_header {
            // SAFETY: extract_field_lengths() performs a check against REQUIRED_FIELDS_LENGTH (5), so this will not panic
            let status = Status::try_from(buffer[4])?;

            let data_offset =
                Self::SERVER_MESSAGE_OFFSET + extracted_lengths.server_message_length as usize;

            let server_message =
                FieldText::try_from(&buffer[Self::SERVER_MESSAGE_OFFSET..data_offset])
                    .map_err(|_| DeserializeError::BadText)?;
            let data = FieldText::try_from(
                &buffer[data_offset..data_offset + extracted_lengths.data_length as usize],
            )
            .map_err(|_| DeserializeError::BadText)?;

            Ok(Self {
                status,
                server_message,
                data,
            })
        } else {
            Err(DeserializeError::WrongBodyBufferSize {
                expected: extracted_lengths.total_length as usize,
                buffer_size: length_from_header,
            })
        }
    }
}

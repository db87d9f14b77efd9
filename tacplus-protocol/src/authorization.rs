//! Authorization features/packets of the TACACS+ protocol.

use byteorder::{ByteOrder, NetworkEndian};
use getset::{CopyGetters, Getters};
use num_enum::{TryFromPrimitive, TryFromPrimitiveError};

use super::{
    Arguments, AuthenticationContext, AuthenticationMethod, DeserializeError, PacketBody,
    PacketType, Serialize, SerializeError, UserInformation,
};
use crate::{Deserialize, FieldText};

#[cfg(test)]
mod tests;

#[cfg(feature = "std")]
mod owned;

#[cfg(feature = "std")]
pub use owned::{ReplyOwned, RequestOwned};

/// An authorization request packet body, including arguments.
#[derive(Debug, PartialEq, Eq, Getters, CopyGetters)]
pub struct Request<'packet> {
    /// Gets the method used to authenticate to the TACACS+ client.
    #[getset(get_copy = "pub")]
    method: AuthenticationMethod,

    /// Gets the client authentication context.
    #[getset(get = "pub")]
    authentication: AuthenticationContext,

    /// Gets the information about the user connected to the TACACS+ client.
    #[getset(get = "pub")]
    user_information: UserInformation<'packet>,

    /// Gets the arguments provided as part of the authorization request.
    #[getset(get = "pub")]
    arguments: Arguments<'packet>,
}

impl<'packet> Request<'packet> {
    /// Argument lengths in a request packet start at index 8, just after the argument count.
    const ARGUMENT_LENGTHS_OFFSET: usize = 8;

    /// Assembles an authorization request packet from its fields.
    pub fn new(
        method: AuthenticationMethod,
        authentication: AuthenticationContext,
        user_information: UserInformation<'packet>,
        arguments: Arguments<'packet>,
    ) -> Self {
        Self {
            method,
            authentication,
            user_information,
            arguments,
        }
    }
}

impl PacketBody for Request<'_> {
    const TYPE: PacketType = PacketType::Authorization;

    // 4 extra bytes come from user information lengths (user, port, remote address) and argument count
    const REQUIRED_FIELDS_LENGTH: usize =
        AuthenticationMethod::WIRE_SIZE + AuthenticationContext::WIRE_SIZE + 4;
}

impl Serialize for Request<'_> {
    fn wire_size(&self) -> usize {
        AuthenticationMethod::WIRE_SIZE
            + AuthenticationContext::WIRE_SIZE
            + self.user_information.wire_size()
            + self.arguments.wire_size()
    }

    fn serialize_into_buffer(&self, buffer: &mut [u8]) -> Result<usize, SerializeError> {
        let wire_size = self.wire_size();

        if buffer.len() >= wire_size {
            buffer[0] = self.method as u8;

            // header information (lengths, etc.)
            self.authentication.serialize(&mut buffer[1..4]);
            self.user_information
                .serialize_field_lengths(&mut buffer[4..7])?;

            let argument_count = self.arguments.argument_count() as usize;

            // body values start after the required fields & the argument lengths (1 byte per argument)
            let body_start = Self::ARGUMENT_LENGTHS_OFFSET + argument_count;

            // as elsewhere, slice bounds are capped to the wire size to avoid overflows
            let user_information_len = self
                .user_information
                .serialize_field_values(&mut buffer[body_start..wire_size])?;

            let arguments_serialized_len =
                // argument count itself sits at index 7, with the lengths just after
                self.arguments.serialize_count_and_lengths(&mut buffer[7..7 + argument_count + 1])?
                    // argument values go after the user information values in the body
                    + self
                        .arguments
                        .serialize_encoded_values(&mut buffer[body_start + user_information_len..wire_size])?;

            // NOTE: 1 is subtracted from REQUIRED_FIELDS_LENGTH since otherwise the argument count field would be double counted
            let actual_written_len = (Self::REQUIRED_FIELDS_LENGTH - 1)
                + user_information_len
                + arguments_serialized_len;

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

        let user_information_lengths = UserInformation::extract_field_lengths(&buffer[4..7])?;
        let argument_count = usize::from(buffer[7]);

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

        let method = AuthenticationMethod::try_from(buffer[0])?;
        let authentication = AuthenticationContext::deserialize(&buffer[1..4])?;

        let user_information = UserInformation::deserialize_field_values(
            buffer,
            values_offset,
            user_information_lengths,
        )?;

        let arguments_start = values_offset + user_information_lengths.total();
        let arguments =
            Arguments::in_place(argument_lengths, &buffer[arguments_start..expected_length])?;

        Ok(Self {
            method,
            authentication,
            user_information,
            arguments,
        })
    }
}

/// The status of an authorization operation, as returned by the server.
#[repr(u8)]
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash, TryFromPrimitive)]
pub enum Status {
    /// Authorization passed; server may have additional arguments for the client.
    PassAdd = 0x01,

    /// Authorization passed; server provides argument values to override those provided in the request.
    PassReplace = 0x02,

    /// Authorization request was denied.
    Fail = 0x10,

    /// An error occurred on the server.
    Error = 0x11,

    /// Forward authorization request to an alternative daemon.
    #[deprecated = "Forwarding to an alternative daemon was deprecated in RFC 8907."]
    Follow = 0x21,
}

impl Status {
    /// The wire size of an authorization reply status in bytes.
    const WIRE_SIZE: usize = 1;
}

#[doc(hidden)]
impl From<TryFromPrimitiveError<Status>> for DeserializeError {
    fn from(value: TryFromPrimitiveError<Status>) -> Self {
        Self::InvalidStatus(value.number)
    }
}

/// The body of an authorization reply packet.
#[derive(Debug, PartialEq, Eq, Getters, CopyGetters)]
pub struct Reply<'packet> {
    /// Gets the status returned in an authorization exchange.
    #[getset(get_copy = "pub")]
    status: Status,

    /// Gets the message sent by the server, to be displayed to the user.
    #[getset(get = "pub")]
    server_message: FieldText<'packet>,

    /// Gets the administrative/log data returned from the server.
    #[getset(get_copy = "pub")]
    data: &'packet [u8],

    /// Gets the arguments returned by the server.
    #[getset(get = "pub")]
    arguments: Arguments<'packet>,
}

/// The non-argument field lengths of a (raw) authorization reply packet, as well as its total length.
struct ReplyFieldLengths {
    server_message_length: usize,
    data_length: usize,
    total_length: usize,
}

impl<'packet> Reply<'packet> {
    /// Argument lengths start at index 6, after the fixed fields.
    const ARGUMENT_LENGTHS_START: usize = 6;

    /// Assembles an authorization reply body, checking that the server
    /// message and data are short enough to be encodeable.
    pub fn new(
        status: Status,
        server_message: FieldText<'packet>,
        data: &'packet [u8],
        arguments: Arguments<'packet>,
    ) -> Option<Self> {
        if u16::try_from(server_message.len()).is_ok() && u16::try_from(data.len()).is_ok() {
            Some(Self {
                status,
                server_message,
                data,
                arguments,
            })
        } else {
            None
        }
    }

    /// Extracts the server message, data & argument lengths from a raw reply packet, if possible.
    fn extract_field_lengths(buffer: &[u8]) -> Result<ReplyFieldLengths, DeserializeError> {
        // data length is the last field in the required part of the header, so we need a full (minimal) header
        if buffer.len() >= Self::REQUIRED_FIELDS_LENGTH {
            let argument_count = buffer[1] as usize;

            // also ensure that all argument lengths are present
            if buffer.len() >= Self::REQUIRED_FIELDS_LENGTH + argument_count {
                let server_message_length = NetworkEndian::read_u16(&buffer[2..4]) as usize;
                let data_length = NetworkEndian::read_u16(&buffer[4..6]) as usize;

                let encoded_arguments_length: usize = buffer
                    [Self::ARGUMENT_LENGTHS_START..Self::ARGUMENT_LENGTHS_START + argument_count]
                    .iter()
                    .map(|&length| length as usize)
                    .sum();

                let total_length = Self::REQUIRED_FIELDS_LENGTH
                    + argument_count // argument lengths in "header"
                    + server_message_length
                    + data_length
                    + encoded_arguments_length;

                Ok(ReplyFieldLengths {
                    server_message_length,
                    data_length,
                    total_length,
                })
            } else {
                Err(DeserializeError::UnexpectedEnd)
            }
        } else {
            Err(DeserializeError::UnexpectedEnd)
        }
    }
}

impl PacketBody for Reply<'_> {
    const TYPE: PacketType = PacketType::Authorization;

    // 1 byte for status, 1 byte for argument count, 2 bytes each for lengths of server message/data
    const REQUIRED_FIELDS_LENGTH: usize = Status::WIRE_SIZE + 1 + 4;
}

impl Serialize for Reply<'_> {
    fn wire_size(&self) -> usize {
        // subtract 1 since the argument count is part of both the required fields & Arguments::wire_size()
        (Self::REQUIRED_FIELDS_LENGTH - 1)
            + self.arguments.wire_size()
            + self.server_message.len()
            + self.data.len()
    }

    fn serialize_into_buffer(&self, buffer: &mut [u8]) -> Result<usize, SerializeError> {
        let wire_size = self.wire_size();

        if buffer.len() >= wire_size {
            buffer[0] = self.status as u8;

            let argument_count = self.arguments.argument_count() as usize;

            // the count & lengths are split around the message/data lengths in
            // a reply body, so the contiguous encoding is written first and
            // the lengths are then moved to where they belong
            let count_and_lengths = self
                .arguments
                .serialize_count_and_lengths(&mut buffer[1..2 + argument_count])?;
            buffer.copy_within(2..1 + count_and_lengths, Self::ARGUMENT_LENGTHS_START);

            let server_message_len = self.server_message.len().try_into()?;
            NetworkEndian::write_u16(&mut buffer[2..4], server_message_len);

            let data_len = self.data.len().try_into()?;
            NetworkEndian::write_u16(&mut buffer[4..6], data_len);

            let message_start = Self::ARGUMENT_LENGTHS_START + argument_count;
            let data_start = message_start + usize::from(server_message_len);
            let arguments_start = data_start + usize::from(data_len);

            buffer[message_start..data_start].copy_from_slice(self.server_message.as_bytes());
            buffer[data_start..arguments_start].copy_from_slice(self.data);

            let argument_values_len = self
                .arguments
                .serialize_encoded_values(&mut buffer[arguments_start..wire_size])?;

            let actual_written_len = arguments_start + argument_values_len;
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

impl<'raw> Deserialize<'raw> for Reply<'raw> {
    fn deserialize_from_buffer(buffer: &'raw [u8]) -> Result<Self, DeserializeError> {
        let ReplyFieldLengths {
            server_message_length,
            data_length,
            total_length,
        } = Self::extract_field_lengths(buffer)?;

        if buffer.len() == total_length {
            let status: Status = buffer[0].try_into()?;
            let argument_count = buffer[1] as usize;

            let body_start = Self::ARGUMENT_LENGTHS_START + argument_count;
            let data_start = body_start + server_message_length;
            let arguments_start = data_start + data_length;

            let server_message = FieldText::try_from(&buffer[body_start..data_start])
                .map_err(|_| DeserializeError::BadText)?;
            let data = &buffer[data_start..arguments_start];

            // arguments occupy the rest of the buffer
            let argument_lengths = &buffer[Self::ARGUMENT_LENGTHS_START..body_start];
            let arguments =
                Arguments::in_place(argument_lengths, &buffer[arguments_start..total_length])?;

            Ok(Self {
                status,
                server_message,
                data,
                arguments,
            })
        } else {
            Err(DeserializeError::WrongBodyBufferSize {
                expected: total_length,
                buffer_size: buffer.len(),
            })
        }
    }
}

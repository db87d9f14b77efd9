use core::fmt;
use core::iter::zip;

use getset::{CopyGetters, Getters, Setters};

use super::{DeserializeError, SerializeError};
use crate::FieldText;


#[cfg(feature = "std")]
mod owned;

#[cfg(feature = "std")]
pub use owned::ArgumentOwned;

/// An argument in the TACACS+ protocol, which exists for extensibility.
#[derive(Clone, Default, PartialEq, Eq, Debug, Hash, Getters, CopyGetters, Setters)]
#[getset(set = "pub")]
pub struct Argument<'data> {
    /// The name of the argument.
    #[getset(get = "pub")]
    name: FieldText<'data>,

    /// The value of the argument.
    #[getset(get = "pub")]
    value: FieldText<'data>,

    /// Whether processing this argument is mandatory.
    #[getset(get_copy = "pub")]
    mandatory: bool,
}

impl fmt::Display for Argument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // just write as encoded form (name + delimiter + value)
        write!(f, "{}{}{}", self.name, self.delimiter(), self.value)
    }
}

/// Ways an argument can be invalid on either side of the wire.
#[derive(Debug, PartialEq, Eq)]
pub enum InvalidArgument {
    /// Argument had empty name.
    EmptyName,

    /// Argument name contained a delimiter (= or *).
    NameContainsDelimiter,

    /// Argument encoding did not contain a delimiter.
    NoDelimiter,

    /// Argument was too long to be encodeable.
    TooLong,

    /// Encoded argument was too short to hold a name and a delimiter.
    TooShort,

    /// Argument wasn't valid printable ASCII, as specified in [RFC8907 section 3.7].
    ///
    /// [RFC8907 section 3.7]: https://www.rfc-editor.org/rfc/rfc8907.html#section-6.1-18
    BadText,
}

impl fmt::Display for InvalidArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "arguments cannot have empty names"),
            Self::NameContainsDelimiter => write!(
                f,
                "names cannot contain value delimiter characters (= or *)"
            ),
            Self::NoDelimiter => write!(f, "encoded argument value had no delimiter"),
            Self::TooLong => write!(f, "the total length of an argument (name + length + delimiter) must not exceed u8::MAX, for encoding reasons"),
            Self::TooShort => write!(f, "an encoded argument needs at least a 1-character name and a delimiter"),
            Self::BadText => write!(f, "encoded argument value was not printable ASCII"),
        }
    }
}

impl From<InvalidArgument> for DeserializeError {
    fn from(value: InvalidArgument) -> Self {
        Self::InvalidArgument(value)
    }
}

impl<'data> Argument<'data> {
    /// The delimiter used for a required argument.
    const MANDATORY_DELIMITER: char = '=';

    /// The delimiter used for an optional argument.
    const OPTIONAL_DELIMITER: char = '*';

    /// The smallest valid encoding: a 1-character name plus a delimiter.
    const MIN_ENCODED_LENGTH: u8 = 2;

    /// Constructs an argument, enforcing a maximum combined name + value + delimiter length of `u8::MAX` (as it must fit in a single byte for encoding reasons).
    pub fn new(
        name: FieldText<'data>,
        value: FieldText<'data>,
        mandatory: bool,
    ) -> Result<Self, InvalidArgument> {
        // NOTE: since both name/value are already `FieldText`s, we don't have to check if they are ASCII

        if name.is_empty() {
            Err(InvalidArgument::EmptyName)
        } else if name.contains_any(&[Self::MANDATORY_DELIMITER, Self::OPTIONAL_DELIMITER]) {
            // "An argument name MUST NOT contain either of the separators." [RFC 8907]
            Err(InvalidArgument::NameContainsDelimiter)
        } else if u8::try_from(name.len() + 1 + value.len()).is_err() {
            // length of encoded argument (i.e., including delimiter) must also fit in a u8 to be encodeable
            Err(InvalidArgument::TooLong)
        } else {
            Ok(Argument {
                name,
                value,
                mandatory,
            })
        }
    }

    /// Extends the lifetime of an `Argument` by converting its fields to
    /// owned backing storage.
    #[cfg(feature = "std")]
    pub fn into_owned(self) -> Argument<'static> {
        Argument {
            name: self.name.into_owned(),
            value: self.value.into_owned(),
            mandatory: self.mandatory,
        }
    }

    /// The encoded length of an argument, including the name/value/delimiter but not the byte holding its length earlier on in a packet.
    fn encoded_length(&self) -> u8 {
        // SAFETY: this should never panic due to length checks in new()
        // length includes delimiter
        (self.name.len() + 1 + self.value.len()).try_into().unwrap()
    }

    /// Serializes an argument's name-value encoding, as done in the body of a packet.
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, SerializeError> {
        let name_len = self.name.len();
        let value_len = self.value.len();

        // delimiter is placed just after name, meaning its index is exactly the name length
        let delimiter_index = name_len;

        // name + value + 1 extra byte for delimiter
        let encoded_len = name_len + 1 + value_len;

        // buffer must be large enough to hold name, value, and delimiter
        if buffer.len() >= encoded_len {
            buffer[..delimiter_index].copy_from_slice(self.name.as_bytes());

            // choose delimiter based on whether argument is required
            buffer[delimiter_index] = self.delimiter() as u8;

            // value goes just after delimiter
            buffer[delimiter_index + 1..encoded_len].copy_from_slice(self.value.as_bytes());

            Ok(encoded_len)
        } else {
            Err(SerializeError::NotEnoughSpace)
        }
    }

    /// Returns the delimiter that will be used for this argument when it's encoded on the wire,
    /// based on whether it's mandatory or not.
    fn delimiter(&self) -> char {
        if self.mandatory {
            Self::MANDATORY_DELIMITER
        } else {
            Self::OPTIONAL_DELIMITER
        }
    }

    /// Attempts to deserialize an argument from its name-value encoding on the wire.
    pub(super) fn deserialize(buffer: &'data [u8]) -> Result<Self, InvalidArgument> {
        // note: these are guaranteed to be unequal, since a single index cannot contain two characters at once
        let equals_index = buffer.iter().position(|c| *c == b'=');
        let star_index = buffer.iter().position(|c| *c == b'*');

        // determine first delimiter that appears, which is the actual delimiter as names MUST NOT (RFC 8907) contain either delimiter character
        let delimiter_index = match (equals_index, star_index) {
            (None, star) => star,
            (equals, None) => equals,
            (Some(equals), Some(star)) => Some(equals.min(star)),
        }
        .ok_or(InvalidArgument::NoDelimiter)?;

        // at this point, delimiter_index was non-None and must contain one of {*, =}
        let mandatory = buffer[delimiter_index] == Self::MANDATORY_DELIMITER as u8;

        // ensure name/value are valid text values per RFC 8907 (i.e., fully printable ASCII)
        let name = FieldText::try_from(&buffer[..delimiter_index])
            .map_err(|_| InvalidArgument::BadText)?;
        let value = FieldText::try_from(&buffer[delimiter_index + 1..])
            .map_err(|_| InvalidArgument::BadText)?;

        // use constructor here to perform checks on fields to avoid diverging code paths
        Self::new(name, value, mandatory)
    }
}

/// The backing storage of an [`Arguments`] set: either a slice of already-built
/// arguments (when constructing a packet), or the lengths & values sections of
/// a packet body referenced in place (when parsing one).
#[derive(Debug, Clone, Copy)]
enum ArgumentsInner<'args> {
    Slice(&'args [Argument<'args>]),

    InPlace {
        argument_lengths: &'args [u8],
        values_buffer: &'args [u8],
    },
}

/// A set of arguments known to be valid for use in a TACACS+ packet.
///
/// Authorization arguments must be at least two bytes each (a nonempty name
/// plus a delimiter); accounting packets additionally admit zero-length
/// argument slots, which iterate as empty arguments.
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'args>(ArgumentsInner<'args>);

impl<'args> Arguments<'args> {
    /// Constructs a new `Arguments`, returning `Some` if the provided slice has less than `u8::MAX` elements and None otherwise.
    ///
    /// The `u8::MAX` restriction is due to the argument count being required to fit into a single byte when encoding.
    pub fn new<T: AsRef<[Argument<'args>]>>(arguments: &'args T) -> Option<Self> {
        if u8::try_from(arguments.as_ref().len()).is_ok() {
            Some(Self(ArgumentsInner::Slice(arguments.as_ref())))
        } else {
            None
        }
    }

    /// Validates the argument-lengths & values sections of a packet body and
    /// wraps them without copying, requiring every argument to be nonempty.
    pub(super) fn in_place(
        argument_lengths: &'args [u8],
        values_buffer: &'args [u8],
    ) -> Result<Self, InvalidArgument> {
        if argument_lengths
            .iter()
            .any(|&length| length < Argument::MIN_ENCODED_LENGTH)
        {
            Err(InvalidArgument::TooShort)
        } else {
            Self::in_place_with_empty_slots(argument_lengths, values_buffer)
        }
    }

    /// Validates an in-place argument list, permitting zero-length slots (the
    /// accounting convention).
    pub(super) fn in_place_with_empty_slots(
        argument_lengths: &'args [u8],
        values_buffer: &'args [u8],
    ) -> Result<Self, InvalidArgument> {
        let mut argument_start = 0;

        for &length in argument_lengths {
            let argument_end = argument_start + length as usize;

            // nonzero-length slots must parse; the specific error is kept
            if length > 0 {
                Argument::deserialize(&values_buffer[argument_start..argument_end])?;
            }

            argument_start = argument_end;
        }

        Ok(Self(ArgumentsInner::InPlace {
            argument_lengths,
            values_buffer,
        }))
    }

    /// Returns the number of arguments an `Arguments` object contains.
    pub fn argument_count(&self) -> u8 {
        // SAFETY: neither constructor admits more than u8::MAX arguments
        match self.0 {
            ArgumentsInner::Slice(arguments) => arguments.len(),
            ArgumentsInner::InPlace {
                argument_lengths, ..
            } => argument_lengths.len(),
        }
        .try_into()
        .unwrap()
    }

    /// Returns an iterator over the contained arguments.
    ///
    /// Zero-length accounting slots iterate as default (empty) arguments.
    pub fn iter(&self) -> ArgumentsIterator<'args> {
        match self.0 {
            ArgumentsInner::Slice(arguments) => ArgumentsIterator::Slice {
                arguments,
                next_argument_number: 0,
            },
            ArgumentsInner::InPlace {
                argument_lengths,
                values_buffer,
            } => ArgumentsIterator::InPlace {
                argument_lengths,
                values_buffer,
                next_argument_number: 0,
                next_offset: 0,
            },
        }
    }

    /// The combined length of all encoded argument values, excluding count/length bytes.
    fn values_length(&self) -> usize {
        match self.0 {
            ArgumentsInner::Slice(arguments) => arguments
                .iter()
                .map(|argument| argument.encoded_length() as usize)
                .sum(),
            ArgumentsInner::InPlace { values_buffer, .. } => values_buffer.len(),
        }
    }

    /// Returns the size of this set of arguments on the wire, including encoded values as well as lengths & the argument count.
    pub(super) fn wire_size(&self) -> usize {
        // number of arguments itself takes up extra byte when serializing
        1 + self.argument_count() as usize + self.values_length()
    }

    /// Serializes the argument count & lengths of the stored arguments into a buffer.
    pub(super) fn serialize_count_and_lengths(
        &self,
        buffer: &mut [u8],
    ) -> Result<usize, SerializeError> {
        let argument_count = self.argument_count();

        // strict greater than to allow room for encoded argument count itself
        if buffer.len() > argument_count as usize {
            buffer[0] = argument_count;

            match self.0 {
                ArgumentsInner::Slice(arguments) => {
                    // fill in argument lengths after argument count
                    for (position, argument) in
                        zip(&mut buffer[1..1 + argument_count as usize], arguments)
                    {
                        *position = argument.encoded_length();
                    }
                }
                ArgumentsInner::InPlace {
                    argument_lengths, ..
                } => {
                    // lengths are carried verbatim, preserving empty slots
                    buffer[1..1 + argument_count as usize].copy_from_slice(argument_lengths);
                }
            }

            // total bytes written: number of arguments + one extra byte for argument count itself
            Ok(1 + argument_count as usize)
        } else {
            Err(SerializeError::NotEnoughSpace)
        }
    }

    /// Serializes the stored arguments in their proper encoding to a buffer.
    pub(super) fn serialize_encoded_values(
        &self,
        buffer: &mut [u8],
    ) -> Result<usize, SerializeError> {
        let full_encoded_length = self.values_length();

        if buffer.len() >= full_encoded_length {
            match self.0 {
                ArgumentsInner::Slice(arguments) => {
                    let mut argument_start = 0;
                    let mut total_written = 0;

                    for argument in arguments {
                        let argument_length = argument.encoded_length() as usize;
                        let next_argument_start = argument_start + argument_length;
                        let written_length =
                            argument.serialize(&mut buffer[argument_start..next_argument_start])?;

                        // update loop state
                        argument_start = next_argument_start;
                        total_written += written_length;
                    }

                    if total_written != full_encoded_length {
                        return Err(SerializeError::LengthMismatch {
                            expected: full_encoded_length,
                            actual: total_written,
                        });
                    }
                }
                ArgumentsInner::InPlace { values_buffer, .. } => {
                    buffer[..full_encoded_length].copy_from_slice(values_buffer);
                }
            }

            Ok(full_encoded_length)
        } else {
            Err(SerializeError::NotEnoughSpace)
        }
    }

    /// Copies the arguments into owned storage.
    #[cfg(feature = "std")]
    pub fn to_owned_arguments(&self) -> std::vec::Vec<ArgumentOwned> {
        self.iter().map(|argument| argument.to_owned()).collect()
    }
}

// equality is defined over the argument sequence, regardless of backing storage
impl PartialEq for Arguments<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.argument_count() == other.argument_count()
            && zip(self.iter(), other.iter()).all(|(ours, theirs)| ours == theirs)
    }
}

impl Eq for Arguments<'_> {}

impl Default for Arguments<'_> {
    fn default() -> Self {
        Self(ArgumentsInner::Slice(&[]))
    }
}

/// An iterator over the arguments in an [`Arguments`] set.
pub enum ArgumentsIterator<'iter> {
    #[doc(hidden)]
    Slice {
        arguments: &'iter [Argument<'iter>],
        next_argument_number: usize,
    },

    #[doc(hidden)]
    InPlace {
        argument_lengths: &'iter [u8],
        values_buffer: &'iter [u8],
        next_argument_number: usize,
        next_offset: usize,
    },
}

impl<'iter> Iterator for ArgumentsIterator<'iter> {
    type Item = Argument<'iter>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Slice {
                arguments,
                next_argument_number,
            } => {
                let argument = arguments.get(*next_argument_number).cloned();
                *next_argument_number += 1;
                argument
            }
            Self::InPlace {
                argument_lengths,
                values_buffer,
                next_argument_number,
                next_offset,
            } => {
                if *next_argument_number < argument_lengths.len() {
                    let next_length = argument_lengths[*next_argument_number] as usize;
                    let raw_argument = &values_buffer[*next_offset..*next_offset + next_length];

                    // update iterator state
                    *next_argument_number += 1;
                    *next_offset += next_length;

                    if raw_argument.is_empty() {
                        // accounting packets may carry empty argument slots
                        Some(Argument::default())
                    } else {
                        // NOTE: this should always be Some, since the validity of arguments is checked on construction
                        Argument::deserialize(raw_argument).ok()
                    }
                } else {
                    None
                }
            }
        }
    }

    // required for ExactSizeIterator impl
    fn size_hint(&self) -> (usize, Option<usize>) {
        let size = match self {
            Self::Slice {
                arguments,
                next_argument_number,
            } => arguments.len() - next_argument_number,
            Self::InPlace {
                argument_lengths,
                next_argument_number,
                ..
            } => argument_lengths.len() - next_argument_number,
        };

        // these are asserted to be equal in the default ExactSizeIterator::len() implementation
        (size, Some(size))
    }
}

// Gives ArgumentsIterator a .len() method
impl ExactSizeIterator for ArgumentsIterator<'_> {}

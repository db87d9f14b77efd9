//! Convenience type for enforcing valid ASCII printable strings.

use core::fmt;

mod inner;
use inner::FieldTextInner;

#[cfg(test)]
mod tests;

/// A string checked to be printable ASCII, which is defined as not containing
/// control characters in [RFC8907 section 3.7].
///
/// This type implements `TryFrom<&str>` and `TryFrom<&[u8]>`; in both cases,
/// an invalid argument will be returned as an `Err` variant.
///
/// # Examples
///
/// Conversions from `&str`:
///
/// ```
/// use tacplus_protocol::FieldText;
///
/// let valid_ascii = "a string";
/// assert!(FieldText::try_from(valid_ascii).is_ok());
///
/// let beyond_ascii = "💀";
/// assert!(FieldText::try_from(beyond_ascii).is_err());
/// ```
///
/// Conversions from `&[u8]`:
///
/// ```
/// use tacplus_protocol::FieldText;
///
/// let valid_slice = b"this is (almost) a string";
/// assert!(FieldText::try_from(valid_slice.as_slice()).is_ok());
///
/// let not_printable = b"all ASCII characters with - oh no! - a\ttab";
/// assert!(FieldText::try_from(not_printable.as_slice()).is_err());
///
/// let invalid_utf8 = [0x80]; // where'd the rest of the codepoint go?
/// assert!(FieldText::try_from(invalid_utf8.as_slice()).is_err());
/// ```
///
/// [RFC8907 section 3.7]: https://www.rfc-editor.org/rfc/rfc8907.html#section-3.7
#[derive(Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct FieldText<'string>(FieldTextInner<'string>);

impl<'string> FieldText<'string> {
    /// Gets the length of the underlying string.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Gets the byte slice representation of the underlying string.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Returns true if the underlying string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the underlying string contains any of the provided characters, or false otherwise.
    pub fn contains_any(&self, characters: &[char]) -> bool {
        self.0.contains(characters)
    }

    /// Extends the lifetime of the text by converting the backing storage to
    /// an owned variant.
    #[cfg(feature = "std")]
    pub fn into_owned(self) -> FieldText<'static> {
        FieldText(self.0.into_owned())
    }

    fn is_printable_ascii(string: &str) -> bool {
        // all characters must be ASCII printable (i.e., not control characers)
        string.is_ascii() && string.chars().all(|c| !c.is_ascii_control())
    }

    /// Asserts a string is ASCII, converting it to a [`FieldText`] or panicking if it is not actually ASCII.
    ///
    /// Meant for test fixtures and other contexts where the input is a literal.
    pub fn assert(string: &'string str) -> FieldText<'string> {
        if Self::is_printable_ascii(string) {
            FieldText(FieldTextInner::Borrowed(string))
        } else {
            panic!("non-printable-ASCII string passed to FieldText::assert");
        }
    }
}

#[cfg(feature = "std")]
impl FieldText<'static> {
    /// Converts an owned `String` into a `FieldText`, returning it back as the
    /// error value if it is not printable ASCII.
    pub fn try_from_string(string: std::string::String) -> Result<Self, std::string::String> {
        if Self::is_printable_ascii(&string) {
            Ok(FieldText(FieldTextInner::Owned(string)))
        } else {
            Err(string)
        }
    }
}

impl AsRef<str> for FieldText<'_> {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl<'string> TryFrom<&'string str> for FieldText<'string> {
    type Error = &'string str;

    fn try_from(value: &'string str) -> Result<Self, Self::Error> {
        if Self::is_printable_ascii(value) {
            Ok(Self(FieldTextInner::Borrowed(value)))
        } else {
            Err(value)
        }
    }
}

impl<'bytes> TryFrom<&'bytes [u8]> for FieldText<'bytes> {
    type Error = &'bytes [u8];

    fn try_from(value: &'bytes [u8]) -> Result<Self, Self::Error> {
        if let Ok(value_str) = core::str::from_utf8(value) {
            // defer to TryFrom<&str> impl for ASCII check consistency
            value_str.try_into().map_err(str::as_bytes)
        } else {
            Err(value)
        }
    }
}

impl PartialEq<&str> for FieldText<'_> {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<FieldText<'_>> for &str {
    fn eq(&self, other: &FieldText<'_>) -> bool {
        *self == other.0
    }
}

// boilerplate impls, mostly for tests and also lets us #[derive(Debug)] for packet component structs
impl fmt::Debug for FieldText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl fmt::Display for FieldText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

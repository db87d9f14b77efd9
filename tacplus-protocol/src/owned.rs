//! Conversions from borrowed packet bodies to ones that own their fields.

use crate::sealed::Sealed;

/// Converts a reference-based packet body to one that owns its fields.
///
/// A [`Borrow`](std::borrow::Borrow) impl for the different packet types
/// would be nontrivial, if even possible, which is why the
/// [`ToOwned`](std::borrow::ToOwned) trait isn't used.
pub trait FromBorrowedBody: Sealed {
    /// The borrowed body type this owned body mirrors.
    type Borrowed<'b>;

    /// Copies the borrowed body's fields into owned storage.
    fn from_borrowed(borrowed: &Self::Borrowed<'_>) -> Self;
}

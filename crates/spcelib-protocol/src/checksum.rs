//! Additive frame checksum.
//!
//! Every SPCe frame carries a two-digit hex checksum: the sum of all bytes
//! transmitted before the checksum field, modulo 256. For requests that
//! includes the leading `~`; for both directions it includes the space that
//! separates the last field from the checksum. The checksum digits and the
//! terminating `\r` are never part of the sum.

use std::fmt;

/// A frame checksum, rendered as two uppercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum(pub u8);

impl Checksum {
    /// Parse a checksum field.
    ///
    /// Accepts exactly two hex digits in either case; anything else is
    /// `None`.
    pub fn parse(field: &str) -> Option<Checksum> {
        if field.len() != 2 || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        u8::from_str_radix(field, 16).ok().map(Checksum)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}", self.0)
    }
}

/// Sum of `bytes` modulo 256. The empty span sums to `00`.
pub fn compute(bytes: &[u8]) -> Checksum {
    Checksum(bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b)))
}

/// Check `claimed` against the checksum of `bytes`.
///
/// The comparison is case-insensitive. A claimed value that is not exactly
/// two hex digits never verifies.
pub fn verify(bytes: &[u8], claimed: &str) -> bool {
    Checksum::parse(claimed).is_some_and(|c| c == compute(bytes))
}

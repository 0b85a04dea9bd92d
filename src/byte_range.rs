//! Byte ranges within a file.
//!
//! A [`ByteRange`] is an offset from the start or end of a byte sequence with an optional length.
//! The [storage](crate::storage) layer reads by byte range, and a contiguous dataset maps an [array subset](crate::array_subset::ArraySubset) to byte ranges which [`coalesce_byte_ranges`] merges where they abut.

use std::ops::Range;

/// A byte offset.
pub type ByteOffset = u64;

/// A byte length.
pub type ByteLength = u64;

/// A byte range.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ByteRange {
    /// `length` bytes from `offset`, or every byte after `offset` if the length is [`None`].
    FromStart(ByteOffset, Option<ByteLength>),
    /// `length` bytes ending `offset` bytes before the end, or every byte before that if the length is [`None`].
    FromEnd(ByteOffset, Option<ByteLength>),
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::FromStart(offset, None) => write!(f, "{offset}.."),
            Self::FromStart(offset, Some(length)) => write!(f, "{offset}..{}", offset + length),
            Self::FromEnd(offset, None) => write!(f, "..-{offset}"),
            Self::FromEnd(offset, Some(length)) => write!(f, "-{}..-{offset}", offset + length),
        }
    }
}

impl ByteRange {
    /// The start of the byte range in a sequence of `size` bytes.
    #[must_use]
    pub fn start(&self, size: u64) -> u64 {
        match *self {
            Self::FromStart(offset, _) => offset,
            Self::FromEnd(_, None) => 0,
            Self::FromEnd(offset, Some(length)) => size - offset - length,
        }
    }

    /// The exclusive end of the byte range in a sequence of `size` bytes.
    #[must_use]
    pub fn end(&self, size: u64) -> u64 {
        match *self {
            Self::FromStart(_, None) => size,
            Self::FromStart(offset, Some(length)) => offset + length,
            Self::FromEnd(offset, _) => size - offset,
        }
    }

    /// The length of the byte range in a sequence of `size` bytes.
    #[must_use]
    pub fn length(&self, size: u64) -> u64 {
        match *self {
            Self::FromStart(offset, None) | Self::FromEnd(offset, None) => size - offset,
            Self::FromStart(_, Some(length)) | Self::FromEnd(_, Some(length)) => length,
        }
    }

    /// The byte range as a [`Range`] in a sequence of `size` bytes.
    #[must_use]
    pub fn to_range(&self, size: u64) -> Range<u64> {
        self.start(size)..self.end(size)
    }

    /// Returns true if the byte range lies within a sequence of `size` bytes.
    #[must_use]
    pub fn is_within(&self, size: u64) -> bool {
        let (Self::FromStart(offset, length) | Self::FromEnd(offset, length)) = *self;
        offset
            .checked_add(length.unwrap_or(0))
            .is_some_and(|end| end <= size)
    }
}

/// Merge each [`ByteRange::FromStart`] with a known length into its predecessor when the predecessor ends where it starts.
///
/// Order is preserved and other byte ranges pass through unchanged.
#[must_use]
pub fn coalesce_byte_ranges(byte_ranges: &[ByteRange]) -> Vec<ByteRange> {
    let mut coalesced: Vec<ByteRange> = Vec::with_capacity(byte_ranges.len());
    for &byte_range in byte_ranges {
        if let (
            Some(ByteRange::FromStart(previous_offset, Some(previous_length))),
            ByteRange::FromStart(offset, Some(length)),
        ) = (coalesced.last_mut(), byte_range)
        {
            if *previous_offset + *previous_length == offset {
                *previous_length += length;
                continue;
            }
        }
        coalesced.push(byte_range);
    }
    coalesced
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_range_bounds() {
        let byte_range = ByteRange::FromStart(1, None);
        assert_eq!(byte_range.to_range(10), 1..10);
        assert_eq!(byte_range.length(10), 9);

        let byte_range = ByteRange::FromEnd(1, None);
        assert_eq!(byte_range.to_range(10), 0..9);
        assert_eq!(byte_range.length(10), 9);

        let byte_range = ByteRange::FromStart(1, Some(5));
        assert_eq!(byte_range.to_range(10), 1..6);
        assert_eq!(byte_range.length(10), 5);

        assert_eq!(ByteRange::FromEnd(2, Some(3)).to_range(10), 5..8);
    }

    #[test]
    fn byte_range_within() {
        assert!(ByteRange::FromStart(1, Some(5)).is_within(6));
        assert!(!ByteRange::FromStart(1, Some(5)).is_within(2));
        assert!(ByteRange::FromEnd(1, Some(5)).is_within(6));
        assert!(!ByteRange::FromEnd(1, Some(5)).is_within(2));
        assert!(!ByteRange::FromStart(u64::MAX, Some(5)).is_within(u64::MAX));
    }

    #[test]
    fn byte_range_display() {
        assert_eq!(ByteRange::FromStart(0, None).to_string(), "0..");
        assert_eq!(ByteRange::FromStart(5, Some(2)).to_string(), "5..7");
        assert_eq!(ByteRange::FromEnd(0, Some(3)).to_string(), "-3..-0");
        assert_eq!(ByteRange::FromEnd(1, None).to_string(), "..-1");
    }

    #[test]
    fn byte_ranges_coalesce() {
        let byte_ranges = [
            ByteRange::FromStart(0, Some(4)),
            ByteRange::FromStart(4, Some(4)),
            ByteRange::FromStart(12, Some(4)),
            ByteRange::FromEnd(0, Some(2)),
            ByteRange::FromStart(16, Some(4)),
        ];
        assert_eq!(
            coalesce_byte_ranges(&byte_ranges),
            vec![
                ByteRange::FromStart(0, Some(8)),
                ByteRange::FromStart(12, Some(4)),
                ByteRange::FromEnd(0, Some(2)),
                ByteRange::FromStart(16, Some(4)),
            ]
        );
    }
}

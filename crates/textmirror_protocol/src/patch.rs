//! Text patches in UTF-16 code units and sequential application.

use crate::error::{ProtocolError, ProtocolResult};
use std::ops::Range;

/// A replacement of `range` (UTF-16 code units) by `content`.
///
/// An empty range is an insertion; empty content is a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Half-open code-unit range in the original text.
    pub range: Range<usize>,
    /// Replacement content.
    pub content: String,
}

impl Patch {
    /// Creates a replacement patch.
    pub fn new(range: Range<usize>, content: impl Into<String>) -> Self {
        Self {
            range,
            content: content.into(),
        }
    }

    /// Creates an insertion at `at`.
    pub fn insert(at: usize, content: impl Into<String>) -> Self {
        Self::new(at..at, content)
    }

    /// Creates a deletion of `range`.
    pub fn delete(range: Range<usize>) -> Self {
        Self::new(range, String::new())
    }

    /// Length of the content in UTF-16 code units.
    pub fn content_len(&self) -> usize {
        self.content.encode_utf16().count()
    }
}

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

fn check_boundary(units: &[u16], offset: usize) -> ProtocolResult<()> {
    if offset > units.len() {
        return Err(ProtocolError::OutOfBounds {
            offset,
            len: units.len(),
        });
    }
    if offset > 0 && offset < units.len() && is_low_surrogate(units[offset]) {
        return Err(ProtocolError::SplitSurrogate { offset });
    }
    Ok(())
}

/// Applies `patches` to `text`.
///
/// Every range refers to the original text. Patches must be sorted by start
/// and must not overlap; each one is shifted by the net length change of
/// the patches before it and then spliced in.
pub fn apply(text: &str, patches: &[Patch]) -> ProtocolResult<String> {
    let mut units: Vec<u16> = text.encode_utf16().collect();

    let mut previous_end = 0;
    for patch in patches {
        let Range { start, end } = patch.range;
        if end < start {
            return Err(ProtocolError::InvertedRange { start, end });
        }
        if start < previous_end {
            return Err(ProtocolError::Overlapping {
                start,
                previous_end,
            });
        }
        check_boundary(&units, start)?;
        check_boundary(&units, end)?;
        previous_end = end;
    }

    let mut delta: isize = 0;
    let mut shifted = Vec::with_capacity(patches.len());
    for patch in patches {
        let start = patch.range.start.saturating_add_signed(delta);
        let end = patch.range.end.saturating_add_signed(delta);
        delta += patch.content_len() as isize - (end - start) as isize;
        shifted.push(start..end);
    }

    for (patch, range) in patches.iter().zip(shifted) {
        units.splice(range, patch.content.encode_utf16());
    }

    String::from_utf16(&units).map_err(|_| ProtocolError::InvalidUtf16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_patches_is_identity() {
        assert_eq!(apply("unchanged", &[]).unwrap(), "unchanged");
    }

    #[test]
    fn later_patches_shift_by_earlier_deltas() {
        let patches = vec![
            Patch::insert(0, ">> "),
            Patch::new(6..11, "there"),
            Patch::delete(11..12),
        ];
        assert_eq!(apply("hello world!", &patches).unwrap(), ">> hello there");
    }

    #[test]
    fn delete_then_insert_at_its_end() {
        let patches = vec![Patch::delete(1..2), Patch::insert(2, "a")];
        assert_eq!(apply("hello", &patches).unwrap(), "hallo");
    }

    #[test]
    fn surrogate_content_shifts_by_code_units() {
        let patches = vec![Patch::insert(0, "😀"), Patch::new(1..2, "B")];
        assert_eq!(apply("ab", &patches).unwrap(), "😀aB");
    }

    #[test]
    fn overlapping_patches_are_rejected() {
        let patches = vec![Patch::delete(0..3), Patch::delete(2..4)];
        assert_eq!(
            apply("abcdef", &patches),
            Err(ProtocolError::Overlapping {
                start: 2,
                previous_end: 3
            })
        );
    }

    #[test]
    fn unsorted_patches_are_rejected() {
        let patches = vec![Patch::insert(4, "x"), Patch::insert(1, "y")];
        assert!(matches!(
            apply("abcdef", &patches),
            Err(ProtocolError::Overlapping { .. })
        ));
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        assert_eq!(
            apply("abc", &[Patch::delete(2..9)]),
            Err(ProtocolError::OutOfBounds { offset: 9, len: 3 })
        );
    }

    #[test]
    fn splitting_a_pair_is_rejected() {
        assert_eq!(
            apply("😀", &[Patch::insert(1, "x")]),
            Err(ProtocolError::SplitSurrogate { offset: 1 })
        );
    }
}

//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while decoding, translating or applying patches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A wire range was not of the form `[start:end)`.
    #[error("malformed patch range: {range:?}")]
    MalformedRange {
        /// The range text as received.
        range: String,
    },

    /// A range ends before it starts.
    #[error("inverted range {start}..{end}")]
    InvertedRange {
        /// Range start.
        start: usize,
        /// Range end.
        end: usize,
    },

    /// An offset lies past the end of the text.
    #[error("offset {offset} is past the end of the text (length {len})")]
    OutOfBounds {
        /// The requested offset.
        offset: usize,
        /// Length of the text in the same units.
        len: usize,
    },

    /// An offset falls between the halves of a surrogate pair.
    #[error("offset {offset} splits a surrogate pair")]
    SplitSurrogate {
        /// The offending code-unit offset.
        offset: usize,
    },

    /// Patches overlap or are not sorted ascending.
    #[error("patch starting at {start} overlaps the previous patch ending at {previous_end}")]
    Overlapping {
        /// Start of the offending patch.
        start: usize,
        /// End of the patch before it.
        previous_end: usize,
    },

    /// A translator was asked to seek backwards.
    #[error("position {requested} is behind the cursor at {cursor}")]
    NonMonotonic {
        /// The requested position.
        requested: usize,
        /// The cursor position.
        cursor: usize,
    },

    /// An update carried both or neither of `body` and `patches`.
    #[error("update must carry exactly one of body or patches")]
    AmbiguousPayload,

    /// A patch used a unit other than `text`.
    #[error("unsupported patch unit: {0}")]
    UnsupportedUnit(String),

    /// Splicing produced text that is not valid UTF-16.
    #[error("patched text is not valid UTF-16")]
    InvalidUtf16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::MalformedRange {
            range: "[1-2]".into(),
        };
        assert_eq!(err.to_string(), "malformed patch range: \"[1-2]\"");

        let err = ProtocolError::OutOfBounds { offset: 9, len: 4 };
        assert!(err.to_string().contains('9'));
        assert!(err.to_string().contains('4'));
    }
}

//! Property-based test generators using proptest.
//!
//! Text is drawn from a small alphabet mixing ASCII, two-byte, three-byte
//! and astral-plane characters. A small alphabet keeps diffs interesting:
//! random strings over a large alphabet share almost nothing.

use proptest::prelude::*;
use std::ops::Range;

/// Characters used by the text strategies.
///
/// The astral characters are encoded as surrogate pairs in UTF-16, and
/// U+1F600 / U+1F601 share their high surrogate.
pub const ALPHABET: &[char] = &[
    'a', 'b', 'c', ' ', '\n', 'é', 'ß', '中', '😀', '😁', '𝄞',
];

/// Strategy for a single character from [`ALPHABET`].
pub fn char_strategy() -> impl Strategy<Value = char> {
    prop::sample::select(ALPHABET)
}

/// Strategy for text whose length in characters lies in `len`.
pub fn text_strategy(len: Range<usize>) -> impl Strategy<Value = String> {
    prop::collection::vec(char_strategy(), len).prop_map(|chars| chars.into_iter().collect())
}

/// A single character-level edit.
#[derive(Debug, Clone)]
pub enum TextEdit {
    /// Insert text before the character at `at` (modulo length + 1).
    Insert {
        /// Position hint.
        at: usize,
        /// Inserted text.
        text: String,
    },
    /// Delete up to `len` characters starting at `at` (modulo length).
    Delete {
        /// Position hint.
        at: usize,
        /// Maximum number of characters to delete.
        len: usize,
    },
}

impl TextEdit {
    /// Applies the edit to `text`, clamping positions into range.
    pub fn apply_to(&self, text: &str) -> String {
        let mut chars: Vec<char> = text.chars().collect();
        match self {
            TextEdit::Insert { at, text } => {
                let at = at % (chars.len() + 1);
                chars.splice(at..at, text.chars());
            }
            TextEdit::Delete { at, len } => {
                if !chars.is_empty() {
                    let start = at % chars.len();
                    let end = (start + len).min(chars.len());
                    chars.drain(start..end);
                }
            }
        }
        chars.into_iter().collect()
    }
}

/// Strategy for a single edit.
pub fn text_edit_strategy() -> impl Strategy<Value = TextEdit> {
    prop_oneof![
        (any::<usize>(), text_strategy(1..6)).prop_map(|(at, text)| TextEdit::Insert { at, text }),
        (any::<usize>(), 1usize..6).prop_map(|(at, len)| TextEdit::Delete { at, len }),
    ]
}

/// Strategy for a text and a lightly edited copy of it.
pub fn edited_text_strategy() -> impl Strategy<Value = (String, String)> {
    (
        text_strategy(0..80),
        prop::collection::vec(text_edit_strategy(), 1..5),
    )
        .prop_map(|(before, edits)| {
            let after = edits.iter().fold(before.clone(), |text, edit| edit.apply_to(&text));
            (before, after)
        })
}

/// Case counts for property tests over generated text.
///
/// Diffing is quadratic in the worst case, so the default stays well below
/// proptest's own 256 cases.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Cases per property.
    pub cases: u32,
    /// Shrink iterations before giving up on a failure.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 128,
            max_shrink_iters: 512,
        }
    }
}

impl PropTestConfig {
    /// Fewer cases, for properties whose generator already sweeps every
    /// boundary of each input.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 48,
            max_shrink_iters: 128,
        }
    }

    /// Overrides the number of cases.
    #[must_use]
    pub fn with_cases(mut self, cases: u32) -> Self {
        self.cases = cases;
        self
    }

    /// Builds the proptest configuration.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_clamps_position() {
        let edit = TextEdit::Insert {
            at: 7,
            text: "X".into(),
        };
        // 7 % 4 == 3
        assert_eq!(edit.apply_to("abc"), "abcX");
    }

    #[test]
    fn delete_on_empty_text_is_noop() {
        let edit = TextEdit::Delete { at: 3, len: 2 };
        assert_eq!(edit.apply_to(""), "");
    }

    #[test]
    fn config_overrides_cases() {
        let config = PropTestConfig::quick().with_cases(7).to_proptest_config();
        assert_eq!(config.cases, 7);
        assert_eq!(config.max_shrink_iters, 128);
        assert!(PropTestConfig::default().cases > PropTestConfig::quick().cases);
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn text_uses_the_alphabet(text in text_strategy(0..20)) {
            prop_assert!(text.chars().all(|c| ALPHABET.contains(&c)));
            prop_assert!(text.chars().count() < 20);
        }

        #[test]
        fn edits_keep_text_valid((before, after) in edited_text_strategy()) {
            prop_assert!(before.chars().all(|c| ALPHABET.contains(&c)));
            prop_assert!(after.chars().all(|c| ALPHABET.contains(&c)));
        }
    }
}

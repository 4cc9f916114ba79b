//! Updates exchanged with the remote origin and the local document store.

use crate::error::{ProtocolError, ProtocolResult};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// The only patch unit understood by this crate.
pub const TEXT_UNIT: &str = "text";

fn text_unit() -> String {
    TEXT_UNIT.to_string()
}

/// A patch as it travels on the wire.
///
/// The range is kept as text, e.g. `"[3:7)"`, in Unicode code-point units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WirePatch {
    /// Range unit; always `"text"`.
    #[serde(default = "text_unit")]
    pub unit: String,
    /// Half-open range in code points, formatted as `[start:end)`.
    pub range: String,
    /// Replacement content.
    pub content: String,
}

impl WirePatch {
    /// Creates a text patch over a code-point range.
    pub fn new(range: Range<usize>, content: impl Into<String>) -> Self {
        Self {
            unit: text_unit(),
            range: format!("[{}:{})", range.start, range.end),
            content: content.into(),
        }
    }

    /// Parses the range into code-point offsets.
    pub fn code_point_range(&self) -> ProtocolResult<Range<usize>> {
        if self.unit != TEXT_UNIT {
            return Err(ProtocolError::UnsupportedUnit(self.unit.clone()));
        }
        parse_range(&self.range)
    }
}

/// Parses a range of the form `[start:end)`.
///
/// A closing `]` is accepted as well, since some peers emit it.
pub fn parse_range(text: &str) -> ProtocolResult<Range<usize>> {
    let malformed = || ProtocolError::MalformedRange {
        range: text.to_string(),
    };

    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(')').or_else(|| rest.strip_suffix(']')))
        .ok_or_else(malformed)?;
    let (start, end) = inner.split_once(':').ok_or_else(malformed)?;
    let start: usize = start.trim().parse().map_err(|_| malformed())?;
    let end: usize = end.trim().parse().map_err(|_| malformed())?;

    if end < start {
        return Err(ProtocolError::InvertedRange { start, end });
    }
    Ok(start..end)
}

/// A versioned change to one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    /// The version this update produces.
    pub version: Version,
    /// The version this update was made against.
    pub parents: Version,
    /// Full replacement text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Patches against the parent text, in code-point units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patches: Option<Vec<WirePatch>>,
}

/// The content carried by an [`Update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload<'a> {
    /// Full replacement text.
    Body(&'a str),
    /// Patches against the parent text.
    Patches(&'a [WirePatch]),
}

impl Update {
    /// Creates an update carrying the full document text.
    pub fn snapshot(version: Version, parents: Version, body: impl Into<String>) -> Self {
        Self {
            version,
            parents,
            body: Some(body.into()),
            patches: None,
        }
    }

    /// Creates an update carrying patches.
    pub fn patched(version: Version, parents: Version, patches: Vec<WirePatch>) -> Self {
        Self {
            version,
            parents,
            body: None,
            patches: Some(patches),
        }
    }

    /// Returns the payload, rejecting updates with both or neither.
    pub fn payload(&self) -> ProtocolResult<Payload<'_>> {
        match (&self.body, &self.patches) {
            (Some(body), None) => Ok(Payload::Body(body)),
            (None, Some(patches)) => Ok(Payload::Patches(patches)),
            _ => Err(ProtocolError::AmbiguousPayload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_patch_formats_half_open_range() {
        let patch = WirePatch::new(3..7, "abc");
        assert_eq!(patch.range, "[3:7)");
        assert_eq!(patch.unit, "text");
        assert_eq!(patch.code_point_range().unwrap(), 3..7);
    }

    #[test]
    fn parse_accepts_both_closers() {
        assert_eq!(parse_range("[0:0)").unwrap(), 0..0);
        assert_eq!(parse_range("[12:15]").unwrap(), 12..15);
        assert_eq!(parse_range(" [ 1 : 2 ) ").unwrap(), 1..2);
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "1:2", "[1:2", "[a:b)", "[1,2)", "[-1:2)", "[1:2:3)"] {
            assert!(
                matches!(parse_range(bad), Err(ProtocolError::MalformedRange { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn parse_rejects_inverted() {
        assert_eq!(
            parse_range("[5:2)"),
            Err(ProtocolError::InvertedRange { start: 5, end: 2 })
        );
    }

    #[test]
    fn unsupported_unit() {
        let mut patch = WirePatch::new(0..1, "");
        patch.unit = "json".into();
        assert_eq!(
            patch.code_point_range(),
            Err(ProtocolError::UnsupportedUnit("json".into()))
        );
    }

    #[test]
    fn payload_requires_exactly_one() {
        let body = Update::snapshot(Version::single("a-0"), Version::empty(), "hi");
        assert_eq!(body.payload().unwrap(), Payload::Body("hi"));

        let patched = Update::patched(Version::single("a-1"), Version::single("a-0"), vec![]);
        assert!(matches!(patched.payload().unwrap(), Payload::Patches(p) if p.is_empty()));

        let mut both = body.clone();
        both.patches = Some(vec![]);
        assert_eq!(both.payload(), Err(ProtocolError::AmbiguousPayload));

        let neither = Update::default();
        assert_eq!(neither.payload(), Err(ProtocolError::AmbiguousPayload));
    }

    #[test]
    fn json_shape() {
        let update = Update::patched(
            Version::single("p-3"),
            Version::single("p-1"),
            vec![WirePatch::new(1..2, "a")],
        );
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["version"], serde_json::json!(["p-3"]));
        assert_eq!(json["patches"][0]["range"], "[1:2)");
        assert!(json.get("body").is_none());

        let decoded: Update = serde_json::from_str(
            r#"{"version":["b"],"parents":["a"],"patches":[{"range":"[0:1]","content":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(decoded.patches.unwrap()[0].unit, "text");
    }
}

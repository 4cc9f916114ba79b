//! Version sets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in a document's edit history.
///
/// A version is an unordered set of opaque identifiers. The ids are kept
/// sorted and de-duplicated on construction, so `==` compares sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Version(Vec<String>);

impl Version {
    /// Creates a version from any collection of ids.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        ids.sort();
        ids.dedup();
        Self(ids)
    }

    /// Creates the empty version (no history yet).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a version naming a single event.
    pub fn single(id: impl Into<String>) -> Self {
        Self(vec![id.into()])
    }

    /// Returns true if no ids are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of ids.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the sorted ids.
    pub fn ids(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for Version {
    fn from(ids: Vec<String>) -> Self {
        Self::new(ids)
    }
}

impl From<Version> for Vec<String> {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl<S: Into<String>> FromIterator<S> for Version {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Formats as a structured-header list, e.g. `"alice-4", "bob-2"`.
impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{id:?}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_order() {
        let a = Version::new(["b-2", "a-1"]);
        let b = Version::new(["a-1", "b-2"]);
        assert_eq!(a, b);
        assert_eq!(a.ids(), &["a-1".to_string(), "b-2".to_string()]);
    }

    #[test]
    fn duplicates_collapse() {
        let v = Version::new(["x-1", "x-1"]);
        assert_eq!(v.len(), 1);
    }

    #[test]
    fn empty_version() {
        assert!(Version::empty().is_empty());
        assert!(!Version::single("p-0").is_empty());
    }

    #[test]
    fn display_as_header_list() {
        let v = Version::new(["bob-2", "alice-4"]);
        assert_eq!(v.to_string(), r#""alice-4", "bob-2""#);
        assert_eq!(Version::empty().to_string(), "");
    }

    #[test]
    fn deserialize_sorts() {
        let v: Version = serde_json::from_str(r#"["z-9", "a-1"]"#).unwrap();
        assert_eq!(v, Version::new(["a-1", "z-9"]));
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"["a-1","z-9"]"#);
    }
}

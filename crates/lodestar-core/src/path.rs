//! YANG-style hierarchical paths
//!
//! Paths look like
//! `/openconfig-platform:components/component[name=oe1]/config/name`. A
//! segment is a node name with zero or more `[key=value]` predicates. Key
//! values may contain `/` (interface names such as `Ethernet1/1`), so
//! splitting only happens outside brackets.

use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One step of a path: a node name plus optional list keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathSegment {
    /// Node name, possibly module-qualified (`module:node`)
    pub name: String,
    /// List key predicates in declaration order
    pub keys: Vec<(String, String)>,
}

impl PathSegment {
    /// Plain container or leaf segment
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Vec::new(),
        }
    }

    /// List entry segment with a single key
    pub fn keyed(name: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: vec![(key.into(), value.into())],
        }
    }

    /// True when the segment addresses a list entry
    pub fn is_keyed(&self) -> bool {
        !self.keys.is_empty()
    }

    /// Value of a given key predicate
    pub fn key(&self, key: &str) -> Option<&str> {
        self.keys
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn parse(raw: &str, full: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidPath {
            path: full.to_string(),
            reason: reason.to_string(),
        };

        let (name, mut rest) = match raw.find('[') {
            Some(idx) => (&raw[..idx], &raw[idx..]),
            None => (raw, ""),
        };
        if name.is_empty() {
            return Err(invalid("empty segment name"));
        }

        let mut keys = Vec::new();
        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return Err(invalid("unexpected text after key predicate"));
            }
            let close = rest.find(']').ok_or_else(|| invalid("unterminated key predicate"))?;
            let predicate = &rest[1..close];
            let (key, value) = predicate
                .split_once('=')
                .ok_or_else(|| invalid("key predicate without '='"))?;
            if key.is_empty() {
                return Err(invalid("empty key name"));
            }
            keys.push((key.to_string(), value.to_string()));
            rest = &rest[close + 1..];
        }

        Ok(Self {
            name: name.to_string(),
            keys,
        })
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (key, value) in &self.keys {
            write!(f, "[{key}={value}]")?;
        }
        Ok(())
    }
}

/// Absolute hierarchical configuration path
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YangPath {
    segments: Vec<PathSegment>,
}

impl YangPath {
    /// The root path `/`
    pub fn root() -> Self {
        Self::default()
    }

    /// Build from already-validated segments
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Parse an absolute path
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        let body = raw
            .strip_prefix('/')
            .ok_or_else(|| invalid("path must start with '/'"))?;
        if body.is_empty() {
            return Ok(Self::root());
        }

        let mut segments = Vec::new();
        let mut depth = 0usize;
        let mut start = 0usize;
        for (idx, ch) in body.char_indices() {
            match ch {
                '[' => depth += 1,
                ']' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| invalid("unbalanced ']'"))?;
                }
                '/' if depth == 0 => {
                    segments.push(PathSegment::parse(&body[start..idx], raw)?);
                    start = idx + 1;
                }
                _ => {}
            }
        }
        if depth != 0 {
            return Err(invalid("unbalanced '['"));
        }
        segments.push(PathSegment::parse(&body[start..], raw)?);

        Ok(Self { segments })
    }

    /// Path segments, root first
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for the root path
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a plain segment
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::new(name));
        Self { segments }
    }

    /// Append a list entry segment
    pub fn keyed_child(
        &self,
        name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::keyed(name, key, value));
        Self { segments }
    }

    /// Append a relative path such as `config/enabled`
    pub fn join(&self, relative: &str) -> Result<Self, ValidationError> {
        let tail = Self::parse(&format!("/{}", relative.trim_start_matches('/')))?;
        let mut segments = self.segments.clone();
        segments.extend(tail.segments);
        Ok(Self { segments })
    }

    /// Parent path, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    /// Segment-wise prefix test; a path starts with itself
    pub fn starts_with(&self, prefix: &YangPath) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }

    /// Path up to and including the deepest list entry segment
    pub fn entry_prefix(&self) -> Option<Self> {
        let idx = self.segments.iter().rposition(PathSegment::is_keyed)?;
        Some(Self {
            segments: self.segments[..=idx].to_vec(),
        })
    }

    /// Last segment, `None` for the root
    pub fn last(&self) -> Option<&PathSegment> {
        self.segments.last()
    }
}

impl fmt::Display for YangPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for YangPath {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for YangPath {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<YangPath> for String {
    fn from(path: YangPath) -> Self {
        path.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSCEIVER: &str = "/openconfig-platform:components/component[name=oe1]/openconfig-platform-transceiver:transceiver/config/enabled";

    #[test]
    fn test_parse_and_display_are_inverse() {
        let path = YangPath::parse(TRANSCEIVER).unwrap();
        assert_eq!(path.len(), 5);
        assert_eq!(path.segments()[1].key("name"), Some("oe1"));
        assert_eq!(path.to_string(), TRANSCEIVER);
    }

    #[test]
    fn test_key_values_may_contain_slashes() {
        let path = YangPath::parse("/interfaces/interface[name=Ethernet1/1]/config/enabled").unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path.segments()[1].key("name"), Some("Ethernet1/1"));
    }

    #[test]
    fn test_rejects_malformed_paths() {
        for raw in ["relative/path", "/a//b", "/a[name=x", "/a]", "/a[=x]", "/a[x]", "/a/"] {
            assert!(YangPath::parse(raw).is_err(), "{raw} should not parse");
        }
        assert!(YangPath::parse("/").unwrap().is_root());
    }

    #[test]
    fn test_entry_prefix_and_starts_with() {
        let path = YangPath::parse(TRANSCEIVER).unwrap();
        let entry = path.entry_prefix().unwrap();
        assert_eq!(
            entry.to_string(),
            "/openconfig-platform:components/component[name=oe1]"
        );
        assert!(path.starts_with(&entry));
        assert!(!entry.starts_with(&path));
        assert!(YangPath::parse("/a/b").unwrap().entry_prefix().is_none());
    }

    #[test]
    fn test_join_appends_relative_segments() {
        let base = YangPath::root().keyed_child("interface", "name", "oe2");
        let leaf = base.join("config/enabled").unwrap();
        assert_eq!(leaf.to_string(), "/interface[name=oe2]/config/enabled");
        assert_eq!(leaf.parent().unwrap().parent().unwrap(), base);
    }

    #[test]
    fn test_serde_uses_text_form() {
        let path = YangPath::parse("/a/b[k=v]").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/a/b[k=v]\"");
        let back: YangPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}

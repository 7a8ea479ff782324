//! Dotted, hashed addresses for suspension control.
//!
//! A [`HashedPath`] such as `modules.synth1.attribute` is stored as one
//! 32-bit FNV-1a hash per segment, so rejecting a pattern on the producer
//! thread is a short loop of integer compares with no string work. Distinct
//! segments can share a hash, so a full hash match is confirmed against the
//! text before it counts. A segment written as `*` is a wildcard that
//! matches exactly one segment of the other path.
//!
//! Matching is prefix-based: a pattern addresses a sub-tree, so
//! `modules.*` matches `modules.synth1.attribute` as well as
//! `modules.synth1`.

use core::fmt;
use core::str::FromStr;

use crate::error::DispatchError;

/// 32-bit FNV-1a over the bytes of one path segment.
pub const fn hash_segment(segment: &str) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;

    let bytes = segment.as_bytes();
    let mut hash = OFFSET;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u32;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }
    hash
}

/// One component of a [`HashedPath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    /// `*`, matches any single segment.
    Wildcard,
    /// A literal segment, stored by hash.
    Hashed(u32),
}

impl Segment {
    /// Hash a literal segment, or return [`Segment::Wildcard`] for `*`.
    pub fn new(text: &str) -> Self {
        if text == "*" {
            Segment::Wildcard
        } else {
            Segment::Hashed(hash_segment(text))
        }
    }

    /// Whether this segment matches `other` (either side may be a wildcard).
    #[inline]
    pub fn matches(self, other: Segment) -> bool {
        match (self, other) {
            (Segment::Wildcard, _) | (_, Segment::Wildcard) => true,
            (Segment::Hashed(a), Segment::Hashed(b)) => a == b,
        }
    }
}

/// Check that `segment` can appear inside a dotted path.
pub fn validate_segment(segment: &str) -> Result<(), DispatchError> {
    if segment.is_empty() {
        return Err(DispatchError::invalid_path(segment, "empty segment"));
    }
    if !segment.is_ascii() {
        return Err(DispatchError::invalid_path(segment, "non-ASCII segment"));
    }
    if segment.contains('.') {
        return Err(DispatchError::invalid_path(segment, "segment contains '.'"));
    }
    if segment != "*" && segment.contains('*') {
        return Err(DispatchError::invalid_path(
            segment,
            "'*' must be a whole segment",
        ));
    }
    Ok(())
}

/// A dot-separated path of hashed segments with `*` wildcards.
///
/// Hashing uses the segment hashes only; equality also compares the text.
#[derive(Clone)]
pub struct HashedPath {
    text: String,
    segments: Vec<Segment>,
}

impl HashedPath {
    /// Parse a dotted path such as `modules.*.attribute`.
    pub fn parse(text: &str) -> Result<Self, DispatchError> {
        if text.is_empty() {
            return Err(DispatchError::invalid_path(text, "empty path"));
        }
        let mut segments = Vec::new();
        for part in text.split('.') {
            validate_segment(part).map_err(|e| match e {
                DispatchError::InvalidPath { reason, .. } => {
                    DispatchError::invalid_path(text, reason)
                }
                other => other,
            })?;
            segments.push(Segment::new(part));
        }
        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    /// A single-segment path.
    ///
    /// Like [`child`](Self::child), the segment is not validated.
    pub fn single(segment: &str) -> HashedPath {
        Self {
            text: segment.to_string(),
            segments: vec![Segment::new(segment)],
        }
    }

    /// Append one segment.
    ///
    /// The segment is taken literally (apart from `*`) and is not validated;
    /// callers building paths from entity ids validate the id up front.
    pub fn child(&self, segment: &str) -> HashedPath {
        let mut text = String::with_capacity(self.text.len() + 1 + segment.len());
        text.push_str(&self.text);
        text.push('.');
        text.push_str(segment);

        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend_from_slice(&self.segments);
        segments.push(Segment::new(segment));

        Self { text, segments }
    }

    /// Whether `target` lies inside the sub-tree this path addresses.
    ///
    /// Every segment of `self` must match the segment at the same depth in
    /// `target`; `target` may be deeper.
    pub fn matches(&self, target: &HashedPath) -> bool {
        self.segments.len() <= target.segments.len()
            && self
                .segments
                .iter()
                .zip(target.segments.iter())
                .all(|(a, b)| a.matches(*b))
            && self
                .text
                .split('.')
                .zip(target.text.split('.'))
                .all(|(a, b)| a == "*" || b == "*" || a == b)
    }

    /// The original dotted text.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The hashed segments.
    #[inline]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments.
    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always `false`; a parsed path has at least one segment.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether any segment is `*`.
    pub fn has_wildcard(&self) -> bool {
        self.segments.contains(&Segment::Wildcard)
    }
}

impl PartialEq for HashedPath {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments && self.text == other.text
    }
}

impl Eq for HashedPath {}

impl core::hash::Hash for HashedPath {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl fmt::Display for HashedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for HashedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashedPath({})", self.text)
    }
}

impl FromStr for HashedPath {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for HashedPath {
    type Error = DispatchError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

/// Two distinct segment names with the same FNV-1a hash.
#[cfg(test)]
pub(crate) fn colliding_segments() -> (String, String) {
    let mut seen = std::collections::HashMap::new();
    for i in 0..1_000_000u32 {
        let name = format!("p{i}");
        if let Some(first) = seen.insert(hash_segment(&name), name.clone()) {
            return (first, name);
        }
    }
    panic!("no FNV-1a collision among a million names");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> HashedPath {
        HashedPath::parse(s).unwrap()
    }

    #[test]
    fn fnv_reference_values() {
        assert_eq!(hash_segment(""), 0x811c_9dc5);
        assert_eq!(hash_segment("a"), 0xe40c_292c);
        assert_ne!(hash_segment("bypassed"), hash_segment("property"));
    }

    #[test]
    fn parse_and_display() {
        let p = path("modules.synth1.attribute");
        assert_eq!(p.len(), 3);
        assert_eq!(p.to_string(), "modules.synth1.attribute");
        assert!(!p.has_wildcard());
        assert!(path("modules.*").has_wildcard());
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(HashedPath::parse("").is_err());
        assert!(HashedPath::parse("modules..attribute").is_err());
        assert!(HashedPath::parse("modules.").is_err());
        assert!(HashedPath::parse("modules.syn*").is_err());
        assert!(HashedPath::parse("modules.sÿnth").is_err());
    }

    #[test]
    fn exact_and_prefix_matching() {
        let target = path("modules.test_processor.attribute");
        assert!(path("modules.test_processor.attribute").matches(&target));
        assert!(path("modules.test_processor").matches(&target));
        assert!(path("modules").matches(&target));
        assert!(!path("modules.other").matches(&target));
        assert!(!path("modules.test_processor.attribute.deeper").matches(&target));
    }

    #[test]
    fn wildcard_matches_one_level() {
        let target = path("modules.synth1.attribute");
        assert!(path("modules.*").matches(&target));
        assert!(path("modules.*.attribute").matches(&target));
        assert!(path("*.synth1").matches(&target));
        assert!(!path("modules.*.bypass").matches(&target));
        assert!(!path("automation.*").matches(&target));
    }

    #[test]
    fn child_appends_segment() {
        let base = path("modules");
        let child = base.child("synth1").child("attribute");
        assert_eq!(child, path("modules.synth1.attribute"));
        assert_eq!(child.as_str(), "modules.synth1.attribute");
        assert_eq!(HashedPath::single("modules"), base);
    }

    #[test]
    fn equality_compares_text() {
        assert_eq!(path("a.b"), "a.b".parse::<HashedPath>().unwrap());
        assert_ne!(path("a.b"), path("a.c"));

        let (a, b) = colliding_segments();
        assert_eq!(hash_segment(&a), hash_segment(&b));
        assert_ne!(HashedPath::single(&a), HashedPath::single(&b));
    }

    #[test]
    fn hash_collision_does_not_match() {
        let (a, b) = colliding_segments();
        let pattern = path("modules").child(&a);
        let other = path("modules").child(&b).child("attribute");
        assert!(!pattern.matches(&other));
        assert!(pattern.matches(&path("modules").child(&a).child("attribute")));
        assert!(path("modules.*").matches(&other));
    }

    #[test]
    fn validate_segment_rules() {
        assert!(validate_segment("synth1").is_ok());
        assert!(validate_segment("*").is_ok());
        assert!(validate_segment("").is_err());
        assert!(validate_segment("a.b").is_err());
        assert!(validate_segment("a*").is_err());
    }
}

//! Store paths, typed paths, and the patterns watches are registered with.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

// ---------------------------------------------------------------------------
// StorePath
// ---------------------------------------------------------------------------

/// A concrete location in the store, e.g. `social/followers/u1/u2`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Split on `/`, ignoring leading, trailing and doubled separators.
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Append one segment. Keys are opaque but must not contain `/`.
    pub fn child(&self, segment: impl fmt::Display) -> Self {
        let segment = segment.to_string();
        debug_assert!(
            !segment.is_empty() && !segment.contains('/'),
            "invalid path segment {segment:?}"
        );
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<StorePath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// True if `prefix` is this path or one of its ancestors.
    pub fn starts_with(&self, prefix: &StorePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl Serialize for StorePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StorePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(StorePath::parse(&raw))
    }
}

// ---------------------------------------------------------------------------
// TypedPath
// ---------------------------------------------------------------------------

/// A store path that knows the type of the value living there.
///
/// Path builders hand these out so that reads decode into, and batch entries
/// encode from, the one record type each location holds.
pub struct TypedPath<T> {
    path: StorePath,
    _value: PhantomData<fn() -> T>,
}

impl<T> TypedPath<T> {
    pub fn new(path: StorePath) -> Self {
        Self {
            path,
            _value: PhantomData,
        }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    pub fn into_path(self) -> StorePath {
        self.path
    }
}

impl<T> Clone for TypedPath<T> {
    fn clone(&self) -> Self {
        Self::new(self.path.clone())
    }
}

impl<T> fmt::Debug for TypedPath<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypedPath").field(&self.path).finish()
    }
}

impl<T> fmt::Display for TypedPath<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.path.fmt(f)
    }
}

impl<T> PartialEq for TypedPath<T> {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl<T> Eq for TypedPath<T> {}

// ---------------------------------------------------------------------------
// PathPattern
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("empty path pattern")]
    Empty,

    #[error("malformed pattern segment: {0:?}")]
    MalformedSegment(String),

    #[error("capture {0:?} appears more than once")]
    DuplicateCapture(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Capture(String),
}

/// Static segments mixed with named captures: `uploads/comments/{post}/{comment}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let mut segments = Vec::new();
        let mut captures: Vec<&str> = Vec::new();

        for part in pattern.split('/').filter(|s| !s.is_empty()) {
            if let Some(inner) = part.strip_prefix('{') {
                let name = inner
                    .strip_suffix('}')
                    .filter(|n| !n.is_empty() && !n.contains(['{', '}']))
                    .ok_or_else(|| PatternError::MalformedSegment(part.to_string()))?;
                if captures.contains(&name) {
                    return Err(PatternError::DuplicateCapture(name.to_string()));
                }
                captures.push(name);
                segments.push(Segment::Capture(name.to_string()));
            } else if part.contains(['{', '}']) {
                return Err(PatternError::MalformedSegment(part.to_string()));
            } else {
                segments.push(Segment::Static(part.to_string()));
            }
        }

        if segments.is_empty() {
            return Err(PatternError::Empty);
        }

        Ok(Self {
            raw: pattern.trim_matches('/').to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn arity(&self) -> usize {
        self.segments.len()
    }

    /// Exact-arity match. Captures are bound positionally.
    pub fn matches(&self, path: &StorePath) -> Option<PathParams> {
        if path.len() != self.segments.len() {
            return None;
        }
        let mut params = PathParams::default();
        for (segment, value) in self.segments.iter().zip(path.segments()) {
            match segment {
                Segment::Static(expected) if expected == value => {}
                Segment::Static(_) => return None,
                Segment::Capture(name) => params.push(name.clone(), value.clone()),
            }
        }
        Some(params)
    }

    /// Whether a change written at `path` can alter a location this pattern
    /// matches: the shorter of the two must be segment-compatible with the
    /// other's prefix.
    pub fn overlaps(&self, path: &StorePath) -> bool {
        self.segments
            .iter()
            .zip(path.segments())
            .all(|(segment, value)| match segment {
                Segment::Static(expected) => expected == value,
                Segment::Capture(_) => true,
            })
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ---------------------------------------------------------------------------
// PathParams
// ---------------------------------------------------------------------------

/// Capture values bound by a successful [`PathPattern::matches`], in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    bindings: Vec<(String, String)>,
}

impl PathParams {
    fn push(&mut self, name: String, value: String) {
        self.bindings.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn positional(&self, index: usize) -> Option<&str> {
        self.bindings.get(index).map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

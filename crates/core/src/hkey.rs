//! Hierarchical keys.
//!
//! An `HKey` locates a stored row by the path of tables leading to it: one
//! segment per level, each holding the table ordinal and that table's key
//! values. Ordering is segment-wise, so a parent's key sorts immediately
//! before its descendants'.

use crate::value::Value;
use core::fmt;

/// One level of a hierarchical key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HKeySegment {
    /// Ordinal of the table at this level.
    pub ordinal: u32,
    /// Key values of the row at this level.
    pub values: Vec<Value>,
}

/// A storage row locator reflecting table nesting.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HKey {
    segments: Vec<HKeySegment>,
}

impl HKey {
    /// Creates an empty key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a segment and returns the extended key.
    pub fn with_segment(mut self, ordinal: u32, values: Vec<Value>) -> Self {
        self.segments.push(HKeySegment { ordinal, values });
        self
    }

    /// Appends a segment in place.
    pub fn push_segment(&mut self, ordinal: u32, values: Vec<Value>) {
        self.segments.push(HKeySegment { ordinal, values });
    }

    /// Returns the segments, outermost first.
    pub fn segments(&self) -> &[HKeySegment] {
        &self.segments
    }

    /// Returns the nesting depth.
    #[inline]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if the key has no segments.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns true if `self` is a proper prefix of `other`.
    pub fn is_ancestor_of(&self, other: &HKey) -> bool {
        self.depth() < other.depth() && other.segments.starts_with(&self.segments)
    }

    /// Returns the first `depth` segments: the key of the enclosing row at
    /// that level. A depth at or past this key's own returns a copy.
    pub fn truncated(&self, depth: usize) -> HKey {
        HKey {
            segments: self.segments[..depth.min(self.segments.len())].to_vec(),
        }
    }

    /// Returns true if the table ordinals of `self` lead those of `other`,
    /// i.e. a row keyed like `self` could enclose one keyed like `other`.
    pub fn ordinals_lead(&self, other: &HKey) -> bool {
        self.depth() <= other.depth()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.ordinal == b.ordinal)
    }

    /// Returns the key of the enclosing row, or None at the top level.
    pub fn parent(&self) -> Option<HKey> {
        if self.segments.is_empty() {
            return None;
        }
        Some(HKey {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

impl fmt::Display for HKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", segment.ordinal)?;
            for value in &segment.values {
                write!(f, ",{}", value)?;
            }
        }
        f.write_str("}")
    }
}

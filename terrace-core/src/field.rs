//! Field paths
//!
//! Dotted paths such as `my-inst.config.replicas` or `targets[2]` used to point
//! users at the exact import or element that failed validation.

use std::fmt;

/// A path to a field inside a nested document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Child(String),
    Index(usize),
}

impl FieldPath {
    /// Creates a path rooted at `root`
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Child(root.into())],
        }
    }

    /// Returns a new path with `name` appended
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Child(name.into()));
        Self { segments }
    }

    /// Returns a new path pointing at element `index` of this path
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Index(index));
        Self { segments }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Child(name) if i == 0 => write!(f, "{}", name)?,
                Segment::Child(name) => write!(f, ".{}", name)?,
                Segment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

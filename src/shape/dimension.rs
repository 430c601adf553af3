use std::fmt;

use serde::{Deserialize, Serialize};

/// A single axis length that may be unknown until runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic,
}

impl Dimension {
    pub fn is_static(&self) -> bool {
        matches!(self, Dimension::Static(_))
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Dimension::Dynamic)
    }

    /// Concrete length, if known.
    pub fn get_length(&self) -> Option<usize> {
        match self {
            Dimension::Static(v) => Some(*v),
            Dimension::Dynamic => None,
        }
    }

    /// Two dimensions are compatible when they are equal or either is dynamic.
    pub fn compatible(&self, other: &Dimension) -> bool {
        match (self, other) {
            (Dimension::Static(a), Dimension::Static(b)) => a == b,
            _ => true,
        }
    }

    /// Merge two dimensions, keeping the more specific side. Returns `None`
    /// when both are static and differ.
    pub fn merge(a: Dimension, b: Dimension) -> Option<Dimension> {
        match (a, b) {
            (Dimension::Dynamic, other) | (other, Dimension::Dynamic) => Some(other),
            (Dimension::Static(x), Dimension::Static(y)) if x == y => Some(Dimension::Static(x)),
            _ => None,
        }
    }
}

impl From<usize> for Dimension {
    fn from(value: usize) -> Self {
        Dimension::Static(value)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Static(v) => write!(f, "{}", v),
            Dimension::Dynamic => write!(f, "?"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_static() {
        assert_eq!(Dimension::merge(Dimension::Dynamic, 4.into()), Some(Dimension::Static(4)));
        assert_eq!(Dimension::merge(4.into(), Dimension::Dynamic), Some(Dimension::Static(4)));
        assert_eq!(Dimension::merge(Dimension::Dynamic, Dimension::Dynamic), Some(Dimension::Dynamic));
        assert_eq!(Dimension::merge(3.into(), 4.into()), None);
    }

    #[test]
    fn test_compatible() {
        assert!(Dimension::Static(2).compatible(&Dimension::Dynamic));
        assert!(!Dimension::Static(2).compatible(&Dimension::Static(3)));
        assert_eq!(Dimension::Dynamic.to_string(), "?");
    }
}

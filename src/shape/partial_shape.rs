use std::fmt;

use serde::{Deserialize, Serialize};

use super::dimension::Dimension;

/// A shape whose rank and individual dimensions may be unknown.
///
/// `dims == None` means the rank itself is dynamic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartialShape {
    dims: Option<Vec<Dimension>>,
}

impl PartialShape {
    pub fn new(dims: Vec<Dimension>) -> Self {
        Self { dims: Some(dims) }
    }

    /// Shape of unknown rank.
    pub fn dynamic() -> Self {
        Self { dims: None }
    }

    /// Shape of known rank where every dimension is dynamic.
    pub fn dynamic_of_rank(rank: usize) -> Self {
        Self::new(vec![Dimension::Dynamic; rank])
    }

    pub fn from_static(dims: &[usize]) -> Self {
        Self::new(dims.iter().map(|&d| Dimension::Static(d)).collect())
    }

    pub fn scalar() -> Self {
        Self::new(Vec::new())
    }

    pub fn rank(&self) -> Option<usize> {
        self.dims.as_ref().map(|d| d.len())
    }

    pub fn is_rank_static(&self) -> bool {
        self.dims.is_some()
    }

    /// True when the rank and every dimension are known.
    pub fn is_static(&self) -> bool {
        match &self.dims {
            Some(dims) => dims.iter().all(Dimension::is_static),
            None => false,
        }
    }

    pub fn dims(&self) -> Option<&[Dimension]> {
        self.dims.as_deref()
    }

    pub fn dim(&self, index: usize) -> Option<Dimension> {
        self.dims.as_ref().and_then(|d| d.get(index).copied())
    }

    pub fn set_dim(&mut self, index: usize, dim: Dimension) {
        if let Some(dims) = self.dims.as_mut() {
            if index < dims.len() {
                dims[index] = dim;
            }
        }
    }

    /// Concrete dimensions when the shape is fully static.
    pub fn to_shape(&self) -> Option<Vec<usize>> {
        self.dims
            .as_ref()
            .and_then(|dims| dims.iter().map(Dimension::get_length).collect())
    }

    /// Whether this shape can have the given rank.
    pub fn rank_compatible(&self, rank: usize) -> bool {
        self.rank().map_or(true, |r| r == rank)
    }

    pub fn compatible(&self, other: &PartialShape) -> bool {
        match (&self.dims, &other.dims) {
            (Some(a), Some(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.compatible(y)),
            _ => true,
        }
    }

    /// Merge `src` into `dst`, keeping the more specific side per dimension.
    /// Returns false (leaving `dst` untouched) when the shapes conflict.
    pub fn merge_into(dst: &mut PartialShape, src: &PartialShape) -> bool {
        match (&dst.dims, &src.dims) {
            (_, None) => true,
            (None, Some(_)) => {
                *dst = src.clone();
                true
            }
            (Some(a), Some(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                let merged: Option<Vec<Dimension>> = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| Dimension::merge(*x, *y))
                    .collect();
                match merged {
                    Some(dims) => {
                        dst.dims = Some(dims);
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Give a dynamic-rank shape the requested rank; false when the ranks
    /// disagree.
    pub fn merge_rank(&mut self, rank: usize) -> bool {
        match &self.dims {
            None => {
                *self = Self::dynamic_of_rank(rank);
                true
            }
            Some(dims) => dims.len() == rank,
        }
    }

    /// Number of elements, if static.
    pub fn element_count(&self) -> Option<usize> {
        self.to_shape().map(|s| s.iter().product())
    }
}

impl From<Vec<usize>> for PartialShape {
    fn from(dims: Vec<usize>) -> Self {
        Self::from_static(&dims)
    }
}

impl From<&[usize]> for PartialShape {
    fn from(dims: &[usize]) -> Self {
        Self::from_static(dims)
    }
}

impl fmt::Display for PartialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dims {
            None => write!(f, "[...]"),
            Some(dims) => {
                write!(f, "[")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", d)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_into_keeps_specific_dims() {
        let mut dst = PartialShape::new(vec![Dimension::Dynamic, 3.into(), Dimension::Dynamic]);
        let src = PartialShape::new(vec![2.into(), Dimension::Dynamic, Dimension::Dynamic]);
        assert!(PartialShape::merge_into(&mut dst, &src));
        assert_eq!(dst.to_string(), "[2,3,?]");
    }

    #[test]
    fn test_merge_into_conflict_leaves_dst() {
        let mut dst = PartialShape::from_static(&[2, 3]);
        assert!(!PartialShape::merge_into(&mut dst, &PartialShape::from_static(&[2, 4])));
        assert!(!PartialShape::merge_into(&mut dst, &PartialShape::from_static(&[2])));
        assert_eq!(dst, PartialShape::from_static(&[2, 3]));
    }

    #[test]
    fn test_dynamic_rank() {
        let mut dst = PartialShape::dynamic();
        assert!(dst.rank_compatible(7));
        assert!(PartialShape::merge_into(&mut dst, &PartialShape::from_static(&[1, 2])));
        assert_eq!(dst.to_shape(), Some(vec![1, 2]));

        let mut any = PartialShape::dynamic();
        assert!(any.merge_rank(3));
        assert_eq!(any.rank(), Some(3));
        assert!(!any.is_static());
        assert_eq!(PartialShape::dynamic().to_string(), "[...]");
    }
}

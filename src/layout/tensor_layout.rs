use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{Error, Result};

/// Physical arrangement of a tensor's elements.
///
/// Logical dimensions are always given as `[N, C, spatial...]`; the format
/// decides how they are laid out in memory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MemoryFormat {
    /// Plain row-major (`bfyx`).
    Ncsp,
    /// Channels last.
    Nspc,
    /// Channels packed in blocks of 8, stored innermost.
    Blocked8,
    /// Channels packed in blocks of 16, stored innermost.
    Blocked16,
}

impl MemoryFormat {
    pub fn block_size(&self) -> Option<usize> {
        match self {
            MemoryFormat::Blocked8 => Some(8),
            MemoryFormat::Blocked16 => Some(16),
            _ => None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.block_size().is_some()
    }

    pub fn supports_rank(&self, rank: usize) -> bool {
        match self {
            MemoryFormat::Ncsp => true,
            _ => rank >= 3,
        }
    }
}

impl Default for MemoryFormat {
    fn default() -> Self {
        MemoryFormat::Ncsp
    }
}

/// Mapping between logical coordinates and physical offsets for one
/// `(dims, format)` pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TensorLayout {
    format: MemoryFormat,
    /// Logical dimensions `[N, C, spatial...]`
    dims: Vec<usize>,
    /// Physical dimensions, outermost first
    block_dims: Vec<usize>,
    /// Logical axis backing each physical dimension
    order: Vec<usize>,
    /// Row-major strides over `block_dims`, in elements
    strides: Vec<usize>,
}

impl TensorLayout {
    pub fn new(dims: &[usize], format: MemoryFormat) -> Result<Self> {
        let rank = dims.len();
        if !format.supports_rank(rank) {
            return Err(Error::ConfigurationError(format!(
                "Memory format {} requires rank >= 3, got dims {:?}",
                format, dims
            )));
        }

        let (block_dims, order) = match format {
            MemoryFormat::Ncsp => (dims.to_vec(), (0..rank).collect::<Vec<_>>()),
            MemoryFormat::Nspc => {
                let mut order = vec![0];
                order.extend(2..rank);
                order.push(1);
                (order.iter().map(|&a| dims[a]).collect(), order)
            }
            MemoryFormat::Blocked8 | MemoryFormat::Blocked16 => {
                let block = format.block_size().unwrap_or(1);
                let mut block_dims = dims.to_vec();
                block_dims[1] = div_up(dims[1], block);
                block_dims.push(block);
                let mut order: Vec<usize> = (0..rank).collect();
                order.push(1);
                (block_dims, order)
            }
        };

        let strides = Self::compute_contiguous_strides(&block_dims);
        Ok(Self {
            format,
            dims: dims.to_vec(),
            block_dims,
            order,
            strides,
        })
    }

    /// Plain row-major layout for the given dims.
    pub fn contiguous_layout(dims: &[usize]) -> Self {
        Self {
            format: MemoryFormat::Ncsp,
            dims: dims.to_vec(),
            block_dims: dims.to_vec(),
            order: (0..dims.len()).collect(),
            strides: Self::compute_contiguous_strides(dims),
        }
    }

    /// Calculate contiguous strides for a given shape in row-major (C-style) order.
    /// e.g., for shape [2, 3, 4], strides would be [12, 4, 1]
    pub fn compute_contiguous_strides(shape: &[usize]) -> Vec<usize> {
        let mut strides = vec![1; shape.len()];
        for i in (0..shape.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * shape[i + 1];
        }
        strides
    }

    pub fn format(&self) -> MemoryFormat {
        self.format
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn block_dims(&self) -> &[usize] {
        &self.block_dims
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Logical element count.
    pub fn size(&self) -> usize {
        self.dims.iter().product()
    }

    /// Element count of the physical buffer, including blocked channel tails.
    pub fn physical_size(&self) -> usize {
        self.block_dims.iter().product()
    }

    /// Physical element offset of a logical coordinate.
    pub fn offset_of(&self, coords: &[usize]) -> usize {
        match self.format {
            MemoryFormat::Ncsp => coords.iter().zip(&self.strides).map(|(c, s)| c * s).sum(),
            MemoryFormat::Nspc => self
                .order
                .iter()
                .zip(&self.strides)
                .map(|(&axis, s)| coords[axis] * s)
                .sum(),
            MemoryFormat::Blocked8 | MemoryFormat::Blocked16 => {
                let block = self.block_dims[self.block_dims.len() - 1];
                let rank = self.dims.len();
                let mut offset = 0;
                for axis in 0..rank {
                    let c = if axis == 1 { coords[1] / block } else { coords[axis] };
                    offset += c * self.strides[axis];
                }
                offset + coords[1] % block
            }
        }
    }

    /// Inverse of [`offset_of`](Self::offset_of). Writes the logical
    /// coordinate into `coords` and returns false when the offset points at
    /// blocked channel padding.
    pub fn logical_coords(&self, offset: usize, coords: &mut [usize]) -> bool {
        let mut rem = offset;
        let mut channel = 0;
        for (p, (&axis, &stride)) in self.order.iter().zip(&self.strides).enumerate() {
            let v = rem / stride;
            rem %= stride;
            if self.format.is_blocked() && axis == 1 {
                if p == 1 {
                    channel = v * self.block_dims[self.block_dims.len() - 1];
                } else {
                    channel += v;
                }
            } else {
                coords[axis] = v;
            }
        }
        if self.format.is_blocked() {
            coords[1] = channel;
            return channel < self.dims[1];
        }
        true
    }
}

impl fmt::Debug for TensorLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TensorLayout {{ format: {}, dims: {:?}, block_dims: {:?}, strides: {:?} }}",
            self.format, self.dims, self.block_dims, self.strides
        )
    }
}

pub(crate) fn div_up(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_nspc_offsets() {
        let layout = TensorLayout::new(&[1, 3, 2, 2], MemoryFormat::Nspc).unwrap();
        assert_eq!(layout.block_dims(), &[1, 2, 2, 3]);
        assert_eq!(layout.order(), &[0, 2, 3, 1]);
        // c=1, h=0, w=1 -> (0*2 + 1)*3 + 1
        assert_eq!(layout.offset_of(&[0, 1, 0, 1]), 4);
    }

    #[test]
    fn test_blocked_layout_round_trip() {
        let layout = TensorLayout::new(&[2, 10, 3], MemoryFormat::Blocked8).unwrap();
        assert_eq!(layout.block_dims(), &[2, 2, 3, 8]);
        assert_eq!(layout.physical_size(), 96);

        let mut coords = vec![0; 3];
        for n in 0..2 {
            for c in 0..10 {
                for w in 0..3 {
                    let off = layout.offset_of(&[n, c, w]);
                    assert!(layout.logical_coords(off, &mut coords));
                    assert_eq!(coords, vec![n, c, w]);
                }
            }
        }

        // c = 8 + 7 = 15 is a padded tail element
        let pad_offset = layout.strides()[1] + 7;
        assert!(!layout.logical_coords(pad_offset, &mut coords));
    }

    #[test]
    fn test_rank_requirements() {
        assert!(TensorLayout::new(&[4, 4], MemoryFormat::Blocked16).is_err());
        assert!(TensorLayout::new(&[], MemoryFormat::Ncsp).is_ok());
        assert_eq!(TensorLayout::contiguous_layout(&[2, 3, 4]).strides(), &[12, 4, 1]);
        assert_eq!(MemoryFormat::from_str("blocked16").unwrap(), MemoryFormat::Blocked16);
    }
}

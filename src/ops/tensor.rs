use std::fmt;

use half::{bf16, f16};
use ndarray::{ArrayD, IxDyn};
use num_traits::{Bounded, NumCast};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::error::{Error, Result};
use crate::layout::{MemoryFormat, TensorLayout};
use crate::shape::PartialShape;

/// Represents rounding strategy for floating-point to integer conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingStrategy {
    /// Round to the nearest, ties to even
    RoundHalfEven,
    /// Always round toward zero (truncate)
    Truncate,
}

/// Element precisions supported by the kernels.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    F32,
    F16,
    BF16,
    I8,
    U8,
    I32,
    I64,
}

impl DataType {
    /// Get the size in bytes
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DataType::F32 | DataType::I32 => 4,
            DataType::F16 | DataType::BF16 => 2,
            DataType::I8 | DataType::U8 => 1,
            DataType::I64 => 8,
        }
    }

    /// Check if data type is a floating point type
    pub fn is_floating_point(&self) -> bool {
        matches!(self, DataType::F32 | DataType::F16 | DataType::BF16)
    }

    /// Get minimum and maximum value for the data type (as f64)
    pub fn get_value_range(&self) -> (f64, f64) {
        match self {
            DataType::F32 => (f32::MIN as f64, f32::MAX as f64),
            DataType::F16 => (-65504.0, 65504.0),
            DataType::BF16 => (bf16::MIN.to_f64(), bf16::MAX.to_f64()),
            DataType::I8 => (i8::MIN as f64, i8::MAX as f64),
            DataType::U8 => (0.0, u8::MAX as f64),
            DataType::I32 => (i32::MIN as f64, i32::MAX as f64),
            DataType::I64 => (i64::MIN as f64, i64::MAX as f64),
        }
    }

    /// Decode one element from little-endian bytes.
    pub fn read_f64(&self, bytes: &[u8]) -> f64 {
        match self {
            DataType::F32 => f32::read_le(bytes) as f64,
            DataType::F16 => f16::read_le(bytes).to_f64(),
            DataType::BF16 => bf16::read_le(bytes).to_f64(),
            DataType::I8 => i8::read_le(bytes) as f64,
            DataType::U8 => u8::read_le(bytes) as f64,
            DataType::I32 => i32::read_le(bytes) as f64,
            DataType::I64 => i64::read_le(bytes) as f64,
        }
    }

    /// Decode an integer element exactly; `None` for floating point types.
    pub fn read_i64(&self, bytes: &[u8]) -> Option<i64> {
        match self {
            DataType::I8 => Some(i8::read_le(bytes) as i64),
            DataType::U8 => Some(u8::read_le(bytes) as i64),
            DataType::I32 => Some(i32::read_le(bytes) as i64),
            DataType::I64 => Some(i64::read_le(bytes)),
            DataType::F32 | DataType::F16 | DataType::BF16 => None,
        }
    }

    /// Encode an integer with saturation. Floating point targets round to
    /// the nearest representable value.
    pub fn write_i64(&self, value: i64, out: &mut [u8]) {
        match self {
            DataType::F32 => (value as f32).write_le(out),
            DataType::F16 => f16::from_f64(value as f64).write_le(out),
            DataType::BF16 => bf16::from_f64(value as f64).write_le(out),
            DataType::I8 => saturating_int::<i8>(value).write_le(out),
            DataType::U8 => saturating_int::<u8>(value).write_le(out),
            DataType::I32 => saturating_int::<i32>(value).write_le(out),
            DataType::I64 => value.write_le(out),
        }
    }

    /// Encode one element, converting with saturation and the given rounding.
    pub fn write_f64(&self, value: f64, rounding: RoundingStrategy, out: &mut [u8]) {
        let v = convert_value(value, *self, rounding);
        match self {
            DataType::F32 => (v as f32).write_le(out),
            DataType::F16 => f16::from_f64(v).write_le(out),
            DataType::BF16 => bf16::from_f64(v).write_le(out),
            DataType::I8 => saturating_cast::<i8>(v).write_le(out),
            DataType::U8 => saturating_cast::<u8>(v).write_le(out),
            DataType::I32 => saturating_cast::<i32>(v).write_le(out),
            DataType::I64 => saturating_cast::<i64>(v).write_le(out),
        }
    }

    /// Byte pattern of a single value of this type.
    pub fn encode(&self, value: f64) -> Vec<u8> {
        let mut bytes = vec![0u8; self.size_in_bytes()];
        self.write_f64(value, RoundingStrategy::RoundHalfEven, &mut bytes);
        bytes
    }
}

fn saturating_cast<T: NumCast + Bounded>(v: f64) -> T {
    NumCast::from(v).unwrap_or_else(|| if v > 0.0 { T::max_value() } else { T::min_value() })
}

fn saturating_int<T: NumCast + Bounded>(v: i64) -> T {
    NumCast::from(v).unwrap_or_else(|| if v > 0 { T::max_value() } else { T::min_value() })
}

/// Re-encode one element of `src_type` as `dst_type`. Equal types copy the
/// bytes and integer sources convert exactly; only float sources go through
/// f64.
pub fn convert_bytes(src_type: DataType, bytes: &[u8], dst_type: DataType, rounding: RoundingStrategy, out: &mut [u8]) {
    if src_type == dst_type {
        out.copy_from_slice(bytes);
    } else if let Some(v) = src_type.read_i64(bytes) {
        dst_type.write_i64(v, out);
    } else {
        dst_type.write_f64(src_type.read_f64(bytes), rounding, out);
    }
}

fn round_half_even(v: f64) -> f64 {
    if (v - v.trunc()).abs() == 0.5 {
        2.0 * (v / 2.0).round()
    } else {
        v.round()
    }
}

/// Prepare `value` for storage in `target_type`: integers are rounded and
/// saturated, NaN becomes zero for integers.
pub fn convert_value(value: f64, target_type: DataType, rounding: RoundingStrategy) -> f64 {
    if target_type.is_floating_point() {
        return value;
    }
    if value.is_nan() {
        return 0.0;
    }
    let rounded = match rounding {
        RoundingStrategy::RoundHalfEven => round_half_even(value),
        RoundingStrategy::Truncate => value.trunc(),
    };
    let (min, max) = target_type.get_value_range();
    rounded.clamp(min, max)
}

/// Native element type with a fixed `DataType` and little-endian encoding.
pub trait Element: Copy + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    fn read_le(bytes: &[u8]) -> Self;

    fn write_le(self, out: &mut [u8]);
}

macro_rules! impl_element {
    ($t:ty, $dt:expr, $n:expr) => {
        impl Element for $t {
            const DATA_TYPE: DataType = $dt;

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $n];
                raw.copy_from_slice(&bytes[..$n]);
                <$t>::from_le_bytes(raw)
            }

            fn write_le(self, out: &mut [u8]) {
                out[..$n].copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_element!(f32, DataType::F32, 4);
impl_element!(f16, DataType::F16, 2);
impl_element!(bf16, DataType::BF16, 2);
impl_element!(i8, DataType::I8, 1);
impl_element!(u8, DataType::U8, 1);
impl_element!(i32, DataType::I32, 4);
impl_element!(i64, DataType::I64, 8);

/// Logical dims, precision and memory format of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDesc {
    pub dims: Vec<usize>,
    pub data_type: DataType,
    pub format: MemoryFormat,
}

impl TensorDesc {
    pub fn new(dims: &[usize], data_type: DataType, format: MemoryFormat) -> Self {
        Self {
            dims: dims.to_vec(),
            data_type,
            format,
        }
    }

    /// Plain row-major descriptor.
    pub fn plain(dims: &[usize], data_type: DataType) -> Self {
        Self::new(dims, data_type, MemoryFormat::Ncsp)
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn layout(&self) -> Result<TensorLayout> {
        TensorLayout::new(&self.dims, self.format)
    }

    /// Size of the physical buffer in bytes, including blocked channel tails.
    pub fn byte_size(&self) -> Result<usize> {
        Ok(self.layout()?.physical_size() * self.data_type.size_in_bytes())
    }

    pub fn partial_shape(&self) -> PartialShape {
        PartialShape::from_static(&self.dims)
    }
}

/// Dense tensor stored as raw little-endian bytes in its memory format.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    desc: TensorDesc,
    data: Vec<u8>,
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor {{ dims: {:?}, data_type: {}, format: {}, bytes: {} }}",
            self.desc.dims,
            self.desc.data_type,
            self.desc.format,
            self.data.len()
        )
    }
}

impl Tensor {
    /// Create a zero-filled tensor for the descriptor
    pub fn zeros(desc: TensorDesc) -> Result<Self> {
        let size = desc.byte_size()?;
        Ok(Self {
            desc,
            data: vec![0u8; size],
        })
    }

    /// Wrap an existing physical buffer
    pub fn from_raw_data(desc: TensorDesc, data: Vec<u8>) -> Result<Self> {
        let expected = desc.byte_size()?;
        if data.len() != expected {
            return Err(Error::ValidationError(format!(
                "Buffer of {} bytes does not match {:?} ({} bytes expected)",
                data.len(),
                desc,
                expected
            )));
        }
        Ok(Self { desc, data })
    }

    /// Plain row-major tensor from values in logical order.
    pub fn from_vec<T: Element>(dims: &[usize], values: Vec<T>) -> Result<Self> {
        let expected: usize = dims.iter().product();
        if values.len() != expected {
            return Err(Error::ValidationError(format!(
                "{} values do not fill shape {:?}",
                values.len(),
                dims
            )));
        }
        let size = T::DATA_TYPE.size_in_bytes();
        let mut data = vec![0u8; expected * size];
        for (chunk, v) in data.chunks_exact_mut(size).zip(values) {
            v.write_le(chunk);
        }
        Ok(Self {
            desc: TensorDesc::plain(dims, T::DATA_TYPE),
            data,
        })
    }

    pub fn scalar<T: Element>(value: T) -> Self {
        let mut data = vec![0u8; T::DATA_TYPE.size_in_bytes()];
        value.write_le(&mut data);
        Self {
            desc: TensorDesc::plain(&[], T::DATA_TYPE),
            data,
        }
    }

    pub fn from_ndarray<T: Element>(arr: &ArrayD<T>) -> Self {
        let values: Vec<T> = arr.iter().copied().collect();
        let dims = arr.shape().to_vec();
        let size = T::DATA_TYPE.size_in_bytes();
        let mut data = vec![0u8; values.len() * size];
        for (chunk, v) in data.chunks_exact_mut(size).zip(values) {
            v.write_le(chunk);
        }
        Self {
            desc: TensorDesc::plain(&dims, T::DATA_TYPE),
            data,
        }
    }

    /// Logical view as an ndarray; only plain tensors of type `T`.
    pub fn to_ndarray<T: Element>(&self) -> Result<ArrayD<T>> {
        if self.desc.format != MemoryFormat::Ncsp {
            return Err(Error::ValidationError(format!(
                "to_ndarray requires a plain tensor, got {}",
                self.desc.format
            )));
        }
        let values = self.to_vec::<T>()?;
        ArrayD::from_shape_vec(IxDyn(&self.desc.dims), values)
            .map_err(|e| Error::InternalError(format!("Failed to build array: {}", e)))
    }

    /// Elements in physical order.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DATA_TYPE != self.desc.data_type {
            return Err(Error::ValidationError(format!(
                "Tensor holds {} but {} was requested",
                self.desc.data_type,
                T::DATA_TYPE
            )));
        }
        let size = T::DATA_TYPE.size_in_bytes();
        Ok(self.data.chunks_exact(size).map(T::read_le).collect())
    }

    /// Elements in physical order, widened to f64.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        let dt = self.desc.data_type;
        self.data
            .chunks_exact(dt.size_in_bytes())
            .map(|c| dt.read_f64(c))
            .collect()
    }

    /// Integer contents, e.g. pad amounts or a target shape.
    pub fn to_i64_vec(&self) -> Result<Vec<i64>> {
        match self.desc.data_type {
            DataType::I64 => self.to_vec::<i64>(),
            DataType::I32 => Ok(self.to_vec::<i32>()?.into_iter().map(|v| v as i64).collect()),
            DataType::U8 => Ok(self.to_vec::<u8>()?.into_iter().map(|v| v as i64).collect()),
            DataType::I8 => Ok(self.to_vec::<i8>()?.into_iter().map(|v| v as i64).collect()),
            other => Err(Error::ConfigurationError(format!(
                "Expected an integer tensor, got {}",
                other
            ))),
        }
    }

    /// Keep only the first `rows` entries of the outermost dimension.
    pub fn truncate_outer(&mut self, rows: usize) -> Result<()> {
        if self.desc.format != MemoryFormat::Ncsp || self.desc.dims.is_empty() {
            return Err(Error::InternalError(
                "truncate_outer requires a plain tensor of rank >= 1".to_string(),
            ));
        }
        if rows > self.desc.dims[0] {
            return Err(Error::InternalError(format!(
                "Cannot grow outer dimension from {} to {}",
                self.desc.dims[0], rows
            )));
        }
        self.desc.dims[0] = rows;
        let size = self.desc.byte_size()?;
        self.data.truncate(size);
        Ok(())
    }

    pub fn desc(&self) -> &TensorDesc {
        &self.desc
    }

    pub fn dims(&self) -> &[usize] {
        &self.desc.dims
    }

    pub fn data_type(&self) -> DataType {
        self.desc.data_type
    }

    pub fn format(&self) -> MemoryFormat {
        self.desc.format
    }

    pub fn element_count(&self) -> usize {
        self.desc.element_count()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

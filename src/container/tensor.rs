// --- File: src/container/tensor.rs ---

//! In-memory representation of a dataset once it has been read out of a container.

use super::{ContainerError, ContainerResult};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of a dataset, named the way numpy names them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Float16,
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
}

impl DType {
    /// Canonical lowercase name, e.g. `"float32"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Float16 => "float16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::UInt64 => "uint64",
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::Float16 | DType::Float32 | DType::Float64)
    }

    pub fn is_signed_int(&self) -> bool {
        matches!(self, DType::Int8 | DType::Int16 | DType::Int32 | DType::Int64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element storage, widened to 64 bits per family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayValues {
    Float(ArrayD<f64>),
    Int(ArrayD<i64>),
    UInt(ArrayD<u64>),
}

impl ArrayValues {
    fn family(&self) -> &'static str {
        match self {
            ArrayValues::Float(_) => "float",
            ArrayValues::Int(_) => "signed integer",
            ArrayValues::UInt(_) => "unsigned integer",
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            ArrayValues::Float(arr) => arr.shape(),
            ArrayValues::Int(arr) => arr.shape(),
            ArrayValues::UInt(arr) => arr.shape(),
        }
    }
}

/// A fully read dataset: its element type plus its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    dtype: DType,
    values: ArrayValues,
}

impl Tensor {
    /// Builds a tensor, checking that `dtype` belongs to the storage family of `values`.
    pub fn new(dtype: DType, values: ArrayValues) -> ContainerResult<Self> {
        let compatible = match &values {
            ArrayValues::Float(_) => dtype.is_float(),
            ArrayValues::Int(_) => dtype.is_signed_int(),
            ArrayValues::UInt(_) => !dtype.is_float() && !dtype.is_signed_int(),
        };
        if !compatible {
            return Err(ContainerError::UnsupportedDtype(format!(
                "{} cannot hold {} storage",
                dtype,
                values.family()
            )));
        }
        Ok(Self { dtype, values })
    }

    /// Creates a `float32` tensor from a flat buffer and a shape.
    pub fn from_f32(shape: &[usize], data: Vec<f32>) -> ContainerResult<Self> {
        let wide = data.into_iter().map(f64::from).collect();
        let arr = shape_vec(shape, wide)?;
        Ok(Self { dtype: DType::Float32, values: ArrayValues::Float(arr) })
    }

    /// Creates a `float64` tensor from a flat buffer and a shape.
    pub fn from_f64(shape: &[usize], data: Vec<f64>) -> ContainerResult<Self> {
        let arr = shape_vec(shape, data)?;
        Ok(Self { dtype: DType::Float64, values: ArrayValues::Float(arr) })
    }

    /// Creates an `int64` tensor from a flat buffer and a shape.
    pub fn from_i64(shape: &[usize], data: Vec<i64>) -> ContainerResult<Self> {
        let arr = shape_vec(shape, data)?;
        Ok(Self { dtype: DType::Int64, values: ArrayValues::Int(arr) })
    }

    /// Zero-dimensional `int64` tensor, e.g. an optimizer's iteration counter.
    pub fn scalar_i64(value: i64) -> Self {
        Self {
            dtype: DType::Int64,
            values: ArrayValues::Int(ArrayD::from_elem(IxDyn(&[]), value)),
        }
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn values(&self) -> &ArrayValues {
        &self.values
    }
}

fn shape_vec<T>(shape: &[usize], data: Vec<T>) -> ContainerResult<ArrayD<T>> {
    let len = data.len();
    ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|_| ContainerError::ShapeMismatch {
        shape: shape.to_vec(),
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_names_are_lowercase() {
        assert_eq!(DType::Float32.as_str(), "float32");
        assert_eq!(DType::UInt8.to_string(), "uint8");
        assert_eq!(serde_json::to_string(&DType::Int64).unwrap(), "\"int64\"");
    }

    #[test]
    fn test_from_f32_widens_and_keeps_shape() {
        let t = Tensor::from_f32(&[2, 2], vec![1.0, 2.0, 3.0, 0.5]).unwrap();
        assert_eq!(t.dtype(), DType::Float32);
        assert_eq!(t.shape(), &[2, 2]);
        match t.values() {
            ArrayValues::Float(arr) => assert_eq!(arr[IxDyn(&[1, 1])], 0.5),
            other => panic!("unexpected storage {:?}", other),
        }
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let err = Tensor::from_f64(&[3, 2], vec![1.0; 5]).unwrap_err();
        assert!(matches!(err, ContainerError::ShapeMismatch { len: 5, .. }));
    }

    #[test]
    fn test_new_rejects_wrong_family() {
        let values = ArrayValues::Int(ArrayD::zeros(IxDyn(&[2])));
        assert!(Tensor::new(DType::Float32, values.clone()).is_err());
        assert!(Tensor::new(DType::Int32, values).is_ok());
    }

    #[test]
    fn test_scalar_has_empty_shape() {
        let t = Tensor::scalar_i64(42);
        assert!(t.shape().is_empty());
    }
}

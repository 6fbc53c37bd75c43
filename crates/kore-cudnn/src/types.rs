//! Layout, pooling and element-type enums, and their cuDNN translations.

use std::fmt;
use std::str::FromStr;

use crate::context::CudnnError;
use crate::ffi::{
    CudnnConvolutionModeT, CudnnDataTypeT, CudnnNanPropagationT, CudnnPoolingModeT,
    CudnnTensorFormatT,
};

/// Physical axis order of a 4-D activation tensor, as the framework sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataLayout {
    /// Channel-last
    Nhwc,
    /// Channel-first
    #[default]
    Nchw,
    /// Channel-first with channels vectorized in groups of 4 or 32
    NchwVectC,
}

impl fmt::Display for DataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLayout::Nhwc => write!(f, "nhwc"),
            DataLayout::Nchw => write!(f, "nchw"),
            DataLayout::NchwVectC => write!(f, "nchw_vect_c"),
        }
    }
}

impl FromStr for DataLayout {
    type Err = CudnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nhwc" => Ok(DataLayout::Nhwc),
            "nchw" => Ok(DataLayout::Nchw),
            "nchw_vect_c" => Ok(DataLayout::NchwVectC),
            _ => Err(CudnnError::Parse { what: "layout", input: s.to_string() }),
        }
    }
}

/// `cudnnTensorFormat_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorFormat {
    Nchw,
    Nhwc,
    NchwVectC,
}

impl TensorFormat {
    pub fn to_raw(self) -> CudnnTensorFormatT {
        match self {
            TensorFormat::Nchw => 0,
            TensorFormat::Nhwc => 1,
            TensorFormat::NchwVectC => 2,
        }
    }
}

/// Translate a framework layout to the vendor tensor format.
///
/// `NchwVectC` has no plain equivalent here and is rejected.
pub fn tensor_format(layout: DataLayout) -> Result<TensorFormat, CudnnError> {
    match layout {
        DataLayout::Nhwc => Ok(TensorFormat::Nhwc),
        DataLayout::Nchw => Ok(TensorFormat::Nchw),
        other => Err(CudnnError::UnsupportedLayout(other)),
    }
}

impl TryFrom<DataLayout> for TensorFormat {
    type Error = CudnnError;

    fn try_from(layout: DataLayout) -> Result<Self, Self::Error> {
        tensor_format(layout)
    }
}

/// Pooling window reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolingMode {
    Maximum,
    /// Average over the in-bounds part of the window (padding excluded).
    Average,
}

impl PoolingMode {
    pub fn to_raw(self) -> CudnnPoolingModeT {
        match self {
            PoolingMode::Maximum => 0, // CUDNN_POOLING_MAX
            PoolingMode::Average => 2, // CUDNN_POOLING_AVERAGE_COUNT_EXCLUDE_PADDING
        }
    }
}

impl fmt::Display for PoolingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolingMode::Maximum => write!(f, "max"),
            PoolingMode::Average => write!(f, "avg"),
        }
    }
}

impl FromStr for PoolingMode {
    type Err = CudnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "max" | "maximum" => Ok(PoolingMode::Maximum),
            "avg" | "average" => Ok(PoolingMode::Average),
            _ => Err(CudnnError::Parse { what: "pooling mode", input: s.to_string() }),
        }
    }
}

/// `cudnnNanPropagation_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NanPropagation {
    NotPropagate,
    Propagate,
}

impl NanPropagation {
    pub fn to_raw(self) -> CudnnNanPropagationT {
        match self {
            NanPropagation::NotPropagate => 0,
            NanPropagation::Propagate => 1,
        }
    }
}

/// `cudnnConvolutionMode_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvolutionMode {
    Convolution,
    CrossCorrelation,
}

impl ConvolutionMode {
    pub fn to_raw(self) -> CudnnConvolutionModeT {
        match self {
            ConvolutionMode::Convolution => 0,
            ConvolutionMode::CrossCorrelation => 1,
        }
    }
}

/// Element types cuDNN descriptors can carry (`cudnnDataType_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit IEEE 754 float
    Float,
    /// 64-bit IEEE 754 float
    Double,
    /// 16-bit IEEE 754 half
    Half,
    Int8,
    Int32,
    Uint8,
    /// 16-bit brain float (cuDNN >= 8.1)
    BFloat16,
}

impl DataType {
    pub fn to_raw(self) -> CudnnDataTypeT {
        match self {
            DataType::Float => 0,
            DataType::Double => 1,
            DataType::Half => 2,
            DataType::Int8 => 3,
            DataType::Int32 => 4,
            DataType::Uint8 => 6,
            DataType::BFloat16 => 9,
        }
    }

    /// Size in bytes of a single element.
    pub fn element_size(self) -> usize {
        match self {
            DataType::Int8 | DataType::Uint8 => 1,
            DataType::Half | DataType::BFloat16 => 2,
            DataType::Float | DataType::Int32 => 4,
            DataType::Double => 8,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Float => write!(f, "f32"),
            DataType::Double => write!(f, "f64"),
            DataType::Half => write!(f, "f16"),
            DataType::Int8 => write!(f, "i8"),
            DataType::Int32 => write!(f, "i32"),
            DataType::Uint8 => write!(f, "u8"),
            DataType::BFloat16 => write!(f, "bf16"),
        }
    }
}

impl FromStr for DataType {
    type Err = CudnnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "float" => Ok(DataType::Float),
            "f64" | "double" => Ok(DataType::Double),
            "f16" | "half" => Ok(DataType::Half),
            "i8" => Ok(DataType::Int8),
            "i32" => Ok(DataType::Int32),
            "u8" => Ok(DataType::Uint8),
            "bf16" => Ok(DataType::BFloat16),
            _ => Err(CudnnError::Parse { what: "data type", input: s.to_string() }),
        }
    }
}

/// Compile-time lookup from a Rust element type to its cuDNN type tag.
pub trait CudnnDataType {
    const DATA_TYPE: DataType;
}

impl CudnnDataType for f32 {
    const DATA_TYPE: DataType = DataType::Float;
}

impl CudnnDataType for f64 {
    const DATA_TYPE: DataType = DataType::Double;
}

impl CudnnDataType for half::f16 {
    const DATA_TYPE: DataType = DataType::Half;
}

impl CudnnDataType for half::bf16 {
    const DATA_TYPE: DataType = DataType::BFloat16;
}

impl CudnnDataType for i8 {
    const DATA_TYPE: DataType = DataType::Int8;
}

impl CudnnDataType for i32 {
    const DATA_TYPE: DataType = DataType::Int32;
}

impl CudnnDataType for u8 {
    const DATA_TYPE: DataType = DataType::Uint8;
}

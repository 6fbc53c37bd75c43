//! # kore-cudnn
//!
//! Scoped cuDNN descriptor handles for Kore.
//!
//! Provides:
//! - Runtime loading of `libcudnn` via `libloading` (no build-time CUDA dependency)
//! - RAII tensor, filter, convolution and pooling descriptors
//! - Layout → tensor-format and element type → cuDNN data-type translation
//! - Grouped-convolution dimension adjustment and dilation/version checks
//!
//! Kernels are not invoked here: callers pass the raw handles from
//! `descriptor(..)` / `as_raw()` straight to the cuDNN compute entry points.

pub mod api;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod ffi;
pub mod types;

pub use api::DescriptorApi;
pub use config::LoaderConfig;
pub use context::{is_cudnn_available, version, CudnnError};
pub use descriptor::{
    ConvolutionConfig, FilterConfig, PoolingConfig, ScopedConvolutionDescriptor,
    ScopedFilterDescriptor, ScopedPoolingDescriptor, ScopedTensorDescriptor, TensorConfig,
};
pub use ffi::{cudnn_api, require_cudnn, CudnnApi};
pub use types::{tensor_format, CudnnDataType, DataLayout, DataType, PoolingMode, TensorFormat};

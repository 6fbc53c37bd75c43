//! The descriptor entry points the scoped wrappers call.
//!
//! `CudnnApi` forwards each call through its loaded function pointer and
//! turns the status code into a `Result`. Slices passed to the setters have
//! already been validated by the matching `*Config` type; array lengths are
//! checked once more here since cuDNN reads them through a single count.

use std::ffi::c_int;

use crate::context::CudnnError;
use crate::ffi::{
    check_cudnn, CudnnApi, CudnnConvolutionDescriptor, CudnnFilterDescriptor,
    CudnnPoolingDescriptor, CudnnTensorDescriptor,
};
use crate::types::{ConvolutionMode, DataType, NanPropagation, PoolingMode, TensorFormat};

/// Create / set / destroy entry points for the four descriptor kinds.
///
/// Setters and destructors are `unsafe`: implementations hand the handle and
/// slices straight to cuDNN.
///
/// # Safety
///
/// For every `set_*` and `destroy_*` method the caller must guarantee that
/// `desc` was returned by the matching `create_*` method of the same API and
/// has not been destroyed yet. Setters additionally require every slice to
/// have the same length as the first shape slice (`dims`, `pads` or
/// `window`). The scoped descriptors uphold both conditions.
pub trait DescriptorApi {
    /// `cudnnGetVersion()`.
    fn version(&self) -> usize;

    fn create_tensor_descriptor(&self) -> Result<CudnnTensorDescriptor, CudnnError>;
    /// # Safety
    /// See the trait docs. `strides.len() == dims.len()`.
    unsafe fn set_tensor_nd_descriptor(
        &self,
        desc: CudnnTensorDescriptor,
        dtype: DataType,
        dims: &[c_int],
        strides: &[c_int],
    ) -> Result<(), CudnnError>;
    /// # Safety
    /// `desc` is live and is not used again afterwards.
    unsafe fn destroy_tensor_descriptor(
        &self,
        desc: CudnnTensorDescriptor,
    ) -> Result<(), CudnnError>;

    fn create_filter_descriptor(&self) -> Result<CudnnFilterDescriptor, CudnnError>;
    /// # Safety
    /// See the trait docs.
    unsafe fn set_filter_nd_descriptor(
        &self,
        desc: CudnnFilterDescriptor,
        dtype: DataType,
        format: TensorFormat,
        dims: &[c_int],
    ) -> Result<(), CudnnError>;
    /// # Safety
    /// `desc` is live and is not used again afterwards.
    unsafe fn destroy_filter_descriptor(
        &self,
        desc: CudnnFilterDescriptor,
    ) -> Result<(), CudnnError>;

    fn create_convolution_descriptor(&self) -> Result<CudnnConvolutionDescriptor, CudnnError>;
    /// # Safety
    /// See the trait docs. `strides` and `dilations` match `pads` in length.
    unsafe fn set_convolution_nd_descriptor(
        &self,
        desc: CudnnConvolutionDescriptor,
        pads: &[c_int],
        strides: &[c_int],
        dilations: &[c_int],
        mode: ConvolutionMode,
        compute_type: DataType,
    ) -> Result<(), CudnnError>;
    /// # Safety
    /// `desc` is live and is not used again afterwards.
    unsafe fn destroy_convolution_descriptor(
        &self,
        desc: CudnnConvolutionDescriptor,
    ) -> Result<(), CudnnError>;

    fn create_pooling_descriptor(&self) -> Result<CudnnPoolingDescriptor, CudnnError>;
    /// # Safety
    /// See the trait docs. `pads` and `strides` match `window` in length.
    unsafe fn set_pooling_nd_descriptor(
        &self,
        desc: CudnnPoolingDescriptor,
        mode: PoolingMode,
        nan: NanPropagation,
        window: &[c_int],
        pads: &[c_int],
        strides: &[c_int],
    ) -> Result<(), CudnnError>;
    /// # Safety
    /// `desc` is live and is not used again afterwards.
    unsafe fn destroy_pooling_descriptor(
        &self,
        desc: CudnnPoolingDescriptor,
    ) -> Result<(), CudnnError>;
}

/// Slices must all have `expected` entries before they reach cuDNN.
fn check_lengths(context: &str, expected: usize, slices: &[&[c_int]]) -> Result<(), CudnnError> {
    if slices.iter().any(|s| s.len() != expected) {
        return Err(CudnnError::InvalidShape(format!(
            "{context}: argument arrays must all have {expected} entries"
        )));
    }
    Ok(())
}

impl DescriptorApi for CudnnApi {
    fn version(&self) -> usize {
        CudnnApi::version(self)
    }

    fn create_tensor_descriptor(&self) -> Result<CudnnTensorDescriptor, CudnnError> {
        let mut desc: CudnnTensorDescriptor = std::ptr::null_mut();
        check_cudnn(
            unsafe { (self.cudnn_create_tensor_descriptor)(&mut desc) },
            "cudnnCreateTensorDescriptor",
        )?;
        Ok(desc)
    }

    unsafe fn set_tensor_nd_descriptor(
        &self,
        desc: CudnnTensorDescriptor,
        dtype: DataType,
        dims: &[c_int],
        strides: &[c_int],
    ) -> Result<(), CudnnError> {
        check_lengths("cudnnSetTensorNdDescriptor", dims.len(), &[strides])?;
        check_cudnn(
            unsafe {
                (self.cudnn_set_tensor_nd_descriptor)(
                    desc,
                    dtype.to_raw(),
                    dims.len() as c_int,
                    dims.as_ptr(),
                    strides.as_ptr(),
                )
            },
            "cudnnSetTensorNdDescriptor",
        )
    }

    unsafe fn destroy_tensor_descriptor(
        &self,
        desc: CudnnTensorDescriptor,
    ) -> Result<(), CudnnError> {
        check_cudnn(
            unsafe { (self.cudnn_destroy_tensor_descriptor)(desc) },
            "cudnnDestroyTensorDescriptor",
        )
    }

    fn create_filter_descriptor(&self) -> Result<CudnnFilterDescriptor, CudnnError> {
        let mut desc: CudnnFilterDescriptor = std::ptr::null_mut();
        check_cudnn(
            unsafe { (self.cudnn_create_filter_descriptor)(&mut desc) },
            "cudnnCreateFilterDescriptor",
        )?;
        Ok(desc)
    }

    unsafe fn set_filter_nd_descriptor(
        &self,
        desc: CudnnFilterDescriptor,
        dtype: DataType,
        format: TensorFormat,
        dims: &[c_int],
    ) -> Result<(), CudnnError> {
        check_cudnn(
            unsafe {
                (self.cudnn_set_filter_nd_descriptor)(
                    desc,
                    dtype.to_raw(),
                    format.to_raw(),
                    dims.len() as c_int,
                    dims.as_ptr(),
                )
            },
            "cudnnSetFilterNdDescriptor",
        )
    }

    unsafe fn destroy_filter_descriptor(
        &self,
        desc: CudnnFilterDescriptor,
    ) -> Result<(), CudnnError> {
        check_cudnn(
            unsafe { (self.cudnn_destroy_filter_descriptor)(desc) },
            "cudnnDestroyFilterDescriptor",
        )
    }

    fn create_convolution_descriptor(&self) -> Result<CudnnConvolutionDescriptor, CudnnError> {
        let mut desc: CudnnConvolutionDescriptor = std::ptr::null_mut();
        check_cudnn(
            unsafe { (self.cudnn_create_convolution_descriptor)(&mut desc) },
            "cudnnCreateConvolutionDescriptor",
        )?;
        Ok(desc)
    }

    unsafe fn set_convolution_nd_descriptor(
        &self,
        desc: CudnnConvolutionDescriptor,
        pads: &[c_int],
        strides: &[c_int],
        dilations: &[c_int],
        mode: ConvolutionMode,
        compute_type: DataType,
    ) -> Result<(), CudnnError> {
        check_lengths("cudnnSetConvolutionNdDescriptor", pads.len(), &[strides, dilations])?;
        check_cudnn(
            unsafe {
                (self.cudnn_set_convolution_nd_descriptor)(
                    desc,
                    pads.len() as c_int,
                    pads.as_ptr(),
                    strides.as_ptr(),
                    dilations.as_ptr(),
                    mode.to_raw(),
                    compute_type.to_raw(),
                )
            },
            "cudnnSetConvolutionNdDescriptor",
        )
    }

    unsafe fn destroy_convolution_descriptor(
        &self,
        desc: CudnnConvolutionDescriptor,
    ) -> Result<(), CudnnError> {
        check_cudnn(
            unsafe { (self.cudnn_destroy_convolution_descriptor)(desc) },
            "cudnnDestroyConvolutionDescriptor",
        )
    }

    fn create_pooling_descriptor(&self) -> Result<CudnnPoolingDescriptor, CudnnError> {
        let mut desc: CudnnPoolingDescriptor = std::ptr::null_mut();
        check_cudnn(
            unsafe { (self.cudnn_create_pooling_descriptor)(&mut desc) },
            "cudnnCreatePoolingDescriptor",
        )?;
        Ok(desc)
    }

    unsafe fn set_pooling_nd_descriptor(
        &self,
        desc: CudnnPoolingDescriptor,
        mode: PoolingMode,
        nan: NanPropagation,
        window: &[c_int],
        pads: &[c_int],
        strides: &[c_int],
    ) -> Result<(), CudnnError> {
        check_lengths("cudnnSetPoolingNdDescriptor", window.len(), &[pads, strides])?;
        check_cudnn(
            unsafe {
                (self.cudnn_set_pooling_nd_descriptor)(
                    desc,
                    mode.to_raw(),
                    nan.to_raw(),
                    window.len() as c_int,
                    window.as_ptr(),
                    pads.as_ptr(),
                    strides.as_ptr(),
                )
            },
            "cudnnSetPoolingNdDescriptor",
        )
    }

    unsafe fn destroy_pooling_descriptor(
        &self,
        desc: CudnnPoolingDescriptor,
    ) -> Result<(), CudnnError> {
        check_cudnn(
            unsafe { (self.cudnn_destroy_pooling_descriptor)(desc) },
            "cudnnDestroyPoolingDescriptor",
        )
    }
}

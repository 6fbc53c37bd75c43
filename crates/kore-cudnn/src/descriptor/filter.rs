use std::fmt;

use crate::api::DescriptorApi;
use crate::context::CudnnError;
use crate::ffi::{require_cudnn, CudnnApi, CudnnFilterDescriptor};
use crate::types::{tensor_format, CudnnDataType, DataLayout, DataType, TensorFormat};

use super::{check_dims, split_groups};

/// Validated arguments for `cudnnSetFilterNdDescriptor`.
///
/// Filter layout is MCHW: M output channels, C input channels, then the
/// spatial extents. With `groups > 1` M is divided by `groups`; C is expected
/// to already be the per-group input channel count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
    format: TensorFormat,
    dtype: DataType,
    dims: Vec<i32>,
    groups: i32,
}

impl FilterConfig {
    pub fn new(
        format: TensorFormat,
        dtype: DataType,
        kernel: &[i32],
        groups: i32,
    ) -> Result<Self, CudnnError> {
        check_dims("filter dims", kernel)?;
        let dims = split_groups("filter output channel", kernel, 0, groups)?;
        Ok(Self { format, dtype, dims, groups })
    }

    pub fn format(&self) -> TensorFormat {
        self.format
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    pub fn dims(&self) -> &[i32] {
        &self.dims
    }

    pub fn groups(&self) -> i32 {
        self.groups
    }
}

/// Owns one `cudnnFilterDescriptor_t` for its lifetime.
pub struct ScopedFilterDescriptor<'a, A: DescriptorApi + ?Sized = CudnnApi> {
    api: &'a A,
    desc: CudnnFilterDescriptor,
    config: Option<FilterConfig>,
}

impl ScopedFilterDescriptor<'static> {
    pub fn create() -> Result<Self, CudnnError> {
        Self::new(require_cudnn()?)
    }
}

impl<'a, A: DescriptorApi + ?Sized> ScopedFilterDescriptor<'a, A> {
    pub fn new(api: &'a A) -> Result<Self, CudnnError> {
        let desc = api.create_filter_descriptor()?;
        tracing::trace!("created filter descriptor {:p}", desc);
        Ok(Self { api, desc, config: None })
    }

    pub fn descriptor(
        &mut self,
        format: TensorFormat,
        dtype: DataType,
        kernel: &[i32],
        groups: i32,
    ) -> Result<CudnnFilterDescriptor, CudnnError> {
        let config = FilterConfig::new(format, dtype, kernel, groups)?;
        self.apply(config)
    }

    pub fn descriptor_for<T: CudnnDataType>(
        &mut self,
        layout: DataLayout,
        kernel: &[i32],
        groups: i32,
    ) -> Result<CudnnFilterDescriptor, CudnnError> {
        self.descriptor(tensor_format(layout)?, T::DATA_TYPE, kernel, groups)
    }

    pub fn apply(&mut self, config: FilterConfig) -> Result<CudnnFilterDescriptor, CudnnError> {
        // Safety: `self.desc` came from `create_filter_descriptor` in `new` and
        // is destroyed only in `Drop`.
        let set = unsafe {
            self.api
                .set_filter_nd_descriptor(self.desc, config.dtype, config.format, &config.dims)
        };
        if let Err(e) = set {
            self.config = None;
            return Err(e);
        }
        tracing::debug!(
            "filter descriptor {:p}: {} {:?} dims={:?} groups={}",
            self.desc,
            config.dtype,
            config.format,
            config.dims,
            config.groups
        );
        self.config = Some(config);
        Ok(self.desc)
    }

    pub fn as_raw(&self) -> CudnnFilterDescriptor {
        self.desc
    }

    pub fn config(&self) -> Option<&FilterConfig> {
        self.config.as_ref()
    }
}

// cuDNN descriptors are host-side parameter blocks with no thread affinity.
unsafe impl<A: DescriptorApi + Sync + ?Sized> Send for ScopedFilterDescriptor<'_, A> {}
unsafe impl<A: DescriptorApi + Sync + ?Sized> Sync for ScopedFilterDescriptor<'_, A> {}

impl<A: DescriptorApi + ?Sized> Drop for ScopedFilterDescriptor<'_, A> {
    fn drop(&mut self) {
        tracing::trace!("destroying filter descriptor {:p}", self.desc);
        // Safety: the handle is live and never used after this point.
        if let Err(e) = unsafe { self.api.destroy_filter_descriptor(self.desc) } {
            tracing::error!("failed to destroy filter descriptor {:p}: {}", self.desc, e);
        }
    }
}

impl<A: DescriptorApi + ?Sized> fmt::Debug for ScopedFilterDescriptor<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedFilterDescriptor")
            .field("desc", &self.desc)
            .field("config", &self.config)
            .finish()
    }
}

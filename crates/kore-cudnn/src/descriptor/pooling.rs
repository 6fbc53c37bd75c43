use std::fmt;

use crate::api::DescriptorApi;
use crate::context::CudnnError;
use crate::ffi::{require_cudnn, CudnnApi, CudnnPoolingDescriptor, CUDNN_DIM_MAX};
use crate::types::{NanPropagation, PoolingMode};

use super::{check_min, check_rank, check_same_len};

/// Validated arguments for `cudnnSetPoolingNdDescriptor`. NaNs always propagate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolingConfig {
    mode: PoolingMode,
    kernel: Vec<i32>,
    pads: Vec<i32>,
    strides: Vec<i32>,
}

impl PoolingConfig {
    pub fn new(
        mode: PoolingMode,
        kernel: &[i32],
        pads: &[i32],
        strides: &[i32],
    ) -> Result<Self, CudnnError> {
        check_same_len("pooling pads", kernel.len(), pads)?;
        check_same_len("pooling strides", kernel.len(), strides)?;
        check_rank("pooling window", kernel, CUDNN_DIM_MAX - 2)?;
        check_min("pooling window", kernel, 1)?;
        check_min("pooling pads", pads, 0)?;
        check_min("pooling strides", strides, 1)?;
        Ok(Self {
            mode,
            kernel: kernel.to_vec(),
            pads: pads.to_vec(),
            strides: strides.to_vec(),
        })
    }

    pub fn mode(&self) -> PoolingMode {
        self.mode
    }

    pub fn kernel(&self) -> &[i32] {
        &self.kernel
    }

    pub fn pads(&self) -> &[i32] {
        &self.pads
    }

    pub fn strides(&self) -> &[i32] {
        &self.strides
    }

    pub fn nan_propagation(&self) -> NanPropagation {
        NanPropagation::Propagate
    }
}

/// Owns one `cudnnPoolingDescriptor_t` for its lifetime.
pub struct ScopedPoolingDescriptor<'a, A: DescriptorApi + ?Sized = CudnnApi> {
    api: &'a A,
    desc: CudnnPoolingDescriptor,
    config: Option<PoolingConfig>,
}

impl ScopedPoolingDescriptor<'static> {
    pub fn create() -> Result<Self, CudnnError> {
        Self::new(require_cudnn()?)
    }
}

impl<'a, A: DescriptorApi + ?Sized> ScopedPoolingDescriptor<'a, A> {
    pub fn new(api: &'a A) -> Result<Self, CudnnError> {
        let desc = api.create_pooling_descriptor()?;
        tracing::trace!("created pooling descriptor {:p}", desc);
        Ok(Self { api, desc, config: None })
    }

    pub fn descriptor(
        &mut self,
        mode: PoolingMode,
        kernel: &[i32],
        pads: &[i32],
        strides: &[i32],
    ) -> Result<CudnnPoolingDescriptor, CudnnError> {
        let config = PoolingConfig::new(mode, kernel, pads, strides)?;
        self.apply(config)
    }

    pub fn apply(&mut self, config: PoolingConfig) -> Result<CudnnPoolingDescriptor, CudnnError> {
        // Safety: `self.desc` came from `create_pooling_descriptor` in `new` and
        // is destroyed only in `Drop`; `PoolingConfig` keeps pads and strides
        // the length of the window.
        let set = unsafe {
            self.api.set_pooling_nd_descriptor(
                self.desc,
                config.mode,
                config.nan_propagation(),
                &config.kernel,
                &config.pads,
                &config.strides,
            )
        };
        if let Err(e) = set {
            self.config = None;
            return Err(e);
        }
        tracing::debug!(
            "pooling descriptor {:p}: {} window={:?} pads={:?} strides={:?}",
            self.desc,
            config.mode,
            config.kernel,
            config.pads,
            config.strides
        );
        self.config = Some(config);
        Ok(self.desc)
    }

    pub fn as_raw(&self) -> CudnnPoolingDescriptor {
        self.desc
    }

    pub fn config(&self) -> Option<&PoolingConfig> {
        self.config.as_ref()
    }
}

// cuDNN descriptors are host-side parameter blocks with no thread affinity.
unsafe impl<A: DescriptorApi + Sync + ?Sized> Send for ScopedPoolingDescriptor<'_, A> {}
unsafe impl<A: DescriptorApi + Sync + ?Sized> Sync for ScopedPoolingDescriptor<'_, A> {}

impl<A: DescriptorApi + ?Sized> Drop for ScopedPoolingDescriptor<'_, A> {
    fn drop(&mut self) {
        tracing::trace!("destroying pooling descriptor {:p}", self.desc);
        // Safety: the handle is live and never used after this point.
        if let Err(e) = unsafe { self.api.destroy_pooling_descriptor(self.desc) } {
            tracing::error!("failed to destroy pooling descriptor {:p}: {}", self.desc, e);
        }
    }
}

impl<A: DescriptorApi + ?Sized> fmt::Debug for ScopedPoolingDescriptor<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedPoolingDescriptor")
            .field("desc", &self.desc)
            .field("config", &self.config)
            .finish()
    }
}

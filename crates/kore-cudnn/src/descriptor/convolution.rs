use std::fmt;

use crate::api::DescriptorApi;
use crate::context::CudnnError;
use crate::ffi::{
    require_cudnn, CudnnApi, CudnnConvolutionDescriptor, CUDNN_DILATION_MIN_VERSION, CUDNN_DIM_MAX,
};
use crate::types::{ConvolutionMode, CudnnDataType, DataType};

use super::{check_min, check_rank, check_same_len};

/// Validated arguments for `cudnnSetConvolutionNdDescriptor`.
///
/// Always cross-correlation. cuDNN before 6.0 reads the dilation array as
/// "upscale" and only accepts 1, so dilations are checked against the
/// version of the library that will receive them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvolutionConfig {
    compute_type: DataType,
    pads: Vec<i32>,
    strides: Vec<i32>,
    dilations: Vec<i32>,
    mode: ConvolutionMode,
}

impl ConvolutionConfig {
    pub fn new(
        compute_type: DataType,
        pads: &[i32],
        strides: &[i32],
        dilations: &[i32],
        version: usize,
    ) -> Result<Self, CudnnError> {
        check_same_len("convolution strides", pads.len(), strides)?;
        check_same_len("convolution dilations", pads.len(), dilations)?;
        check_rank("convolution pads", pads, CUDNN_DIM_MAX - 2)?;
        check_min("convolution pads", pads, 0)?;
        check_min("convolution strides", strides, 1)?;
        check_min("convolution dilations", dilations, 1)?;

        let config = Self {
            compute_type,
            pads: pads.to_vec(),
            strides: strides.to_vec(),
            dilations: dilations.to_vec(),
            mode: ConvolutionMode::CrossCorrelation,
        };
        config.check_version(version)?;
        Ok(config)
    }

    /// Dilations other than 1 need cuDNN 6.0 or newer.
    pub fn check_version(&self, version: usize) -> Result<(), CudnnError> {
        if version < CUDNN_DILATION_MIN_VERSION && self.dilations.iter().any(|&d| d != 1) {
            return Err(CudnnError::DilationUnsupported {
                version,
                dilations: self.dilations.clone(),
            });
        }
        Ok(())
    }

    pub fn compute_type(&self) -> DataType {
        self.compute_type
    }

    pub fn pads(&self) -> &[i32] {
        &self.pads
    }

    pub fn strides(&self) -> &[i32] {
        &self.strides
    }

    pub fn dilations(&self) -> &[i32] {
        &self.dilations
    }

    pub fn mode(&self) -> ConvolutionMode {
        self.mode
    }
}

/// Owns one `cudnnConvolutionDescriptor_t` for its lifetime.
pub struct ScopedConvolutionDescriptor<'a, A: DescriptorApi + ?Sized = CudnnApi> {
    api: &'a A,
    desc: CudnnConvolutionDescriptor,
    config: Option<ConvolutionConfig>,
}

impl ScopedConvolutionDescriptor<'static> {
    pub fn create() -> Result<Self, CudnnError> {
        Self::new(require_cudnn()?)
    }
}

impl<'a, A: DescriptorApi + ?Sized> ScopedConvolutionDescriptor<'a, A> {
    pub fn new(api: &'a A) -> Result<Self, CudnnError> {
        let desc = api.create_convolution_descriptor()?;
        tracing::trace!("created convolution descriptor {:p}", desc);
        Ok(Self { api, desc, config: None })
    }

    pub fn descriptor(
        &mut self,
        compute_type: DataType,
        pads: &[i32],
        strides: &[i32],
        dilations: &[i32],
    ) -> Result<CudnnConvolutionDescriptor, CudnnError> {
        let config =
            ConvolutionConfig::new(compute_type, pads, strides, dilations, self.api.version())?;
        self.apply(config)
    }

    pub fn descriptor_for<T: CudnnDataType>(
        &mut self,
        pads: &[i32],
        strides: &[i32],
        dilations: &[i32],
    ) -> Result<CudnnConvolutionDescriptor, CudnnError> {
        self.descriptor(T::DATA_TYPE, pads, strides, dilations)
    }

    /// Push a validated configuration to cuDNN.
    ///
    /// The dilation gate is re-checked against this descriptor's library,
    /// which may differ from the version the config was built for.
    pub fn apply(
        &mut self,
        config: ConvolutionConfig,
    ) -> Result<CudnnConvolutionDescriptor, CudnnError> {
        config.check_version(self.api.version())?;
        // Safety: `self.desc` came from `create_convolution_descriptor` in `new`
        // and is destroyed only in `Drop`; `ConvolutionConfig` keeps the three
        // arrays the same length.
        let set = unsafe {
            self.api.set_convolution_nd_descriptor(
                self.desc,
                &config.pads,
                &config.strides,
                &config.dilations,
                config.mode,
                config.compute_type,
            )
        };
        if let Err(e) = set {
            self.config = None;
            return Err(e);
        }
        tracing::debug!(
            "convolution descriptor {:p}: {} pads={:?} strides={:?} dilations={:?}",
            self.desc,
            config.compute_type,
            config.pads,
            config.strides,
            config.dilations
        );
        self.config = Some(config);
        Ok(self.desc)
    }

    pub fn as_raw(&self) -> CudnnConvolutionDescriptor {
        self.desc
    }

    pub fn config(&self) -> Option<&ConvolutionConfig> {
        self.config.as_ref()
    }
}

// cuDNN descriptors are host-side parameter blocks with no thread affinity.
unsafe impl<A: DescriptorApi + Sync + ?Sized> Send for ScopedConvolutionDescriptor<'_, A> {}
unsafe impl<A: DescriptorApi + Sync + ?Sized> Sync for ScopedConvolutionDescriptor<'_, A> {}

impl<A: DescriptorApi + ?Sized> Drop for ScopedConvolutionDescriptor<'_, A> {
    fn drop(&mut self) {
        tracing::trace!("destroying convolution descriptor {:p}", self.desc);
        // Safety: the handle is live and never used after this point.
        if let Err(e) = unsafe { self.api.destroy_convolution_descriptor(self.desc) } {
            tracing::error!("failed to destroy convolution descriptor {:p}: {}", self.desc, e);
        }
    }
}

impl<A: DescriptorApi + ?Sized> fmt::Debug for ScopedConvolutionDescriptor<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedConvolutionDescriptor")
            .field("desc", &self.desc)
            .field("config", &self.config)
            .finish()
    }
}

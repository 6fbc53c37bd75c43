use std::fmt;

use crate::api::DescriptorApi;
use crate::context::CudnnError;
use crate::ffi::{require_cudnn, CudnnApi, CudnnTensorDescriptor};
use crate::types::{tensor_format, CudnnDataType, DataLayout, DataType, TensorFormat};

use super::{check_dims, packed_strides, split_groups};

/// Validated arguments for `cudnnSetTensorNdDescriptor`.
///
/// Strides are packed over the full shape. With `groups > 1` the channel
/// axis (index 1, NCHW order) is reduced to `C / groups` while the strides
/// stay those of the full tensor, so the descriptor covers one group's slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorConfig {
    format: TensorFormat,
    dtype: DataType,
    dims: Vec<i32>,
    strides: Vec<i32>,
    groups: i32,
}

impl TensorConfig {
    pub fn new(
        format: TensorFormat,
        dtype: DataType,
        dims: &[i32],
        groups: i32,
    ) -> Result<Self, CudnnError> {
        check_dims("tensor dims", dims)?;
        let strides = packed_strides(dims)?;
        let dims = split_groups("tensor channel", dims, 1, groups)?;
        Ok(Self { format, dtype, dims, strides, groups })
    }

    /// Recorded only: the Nd setter takes explicit strides instead.
    pub fn format(&self) -> TensorFormat {
        self.format
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Dims as handed to cuDNN (channel axis already divided by `groups`).
    pub fn dims(&self) -> &[i32] {
        &self.dims
    }

    pub fn strides(&self) -> &[i32] {
        &self.strides
    }

    pub fn groups(&self) -> i32 {
        self.groups
    }
}

/// Owns one `cudnnTensorDescriptor_t` for its lifetime.
pub struct ScopedTensorDescriptor<'a, A: DescriptorApi + ?Sized = CudnnApi> {
    api: &'a A,
    desc: CudnnTensorDescriptor,
    config: Option<TensorConfig>,
}

impl ScopedTensorDescriptor<'static> {
    /// Create against the process-wide cuDNN library.
    pub fn create() -> Result<Self, CudnnError> {
        Self::new(require_cudnn()?)
    }
}

impl<'a, A: DescriptorApi + ?Sized> ScopedTensorDescriptor<'a, A> {
    pub fn new(api: &'a A) -> Result<Self, CudnnError> {
        let desc = api.create_tensor_descriptor()?;
        tracing::trace!("created tensor descriptor {:p}", desc);
        Ok(Self { api, desc, config: None })
    }

    /// Configure the descriptor and return the raw handle (still owned here).
    pub fn descriptor(
        &mut self,
        format: TensorFormat,
        dtype: DataType,
        dims: &[i32],
        groups: i32,
    ) -> Result<CudnnTensorDescriptor, CudnnError> {
        let config = TensorConfig::new(format, dtype, dims, groups)?;
        self.apply(config)
    }

    /// Typed variant: layout is translated, data type comes from `T`.
    pub fn descriptor_for<T: CudnnDataType>(
        &mut self,
        layout: DataLayout,
        dims: &[i32],
        groups: i32,
    ) -> Result<CudnnTensorDescriptor, CudnnError> {
        self.descriptor(tensor_format(layout)?, T::DATA_TYPE, dims, groups)
    }

    /// Push an already validated configuration to cuDNN.
    pub fn apply(&mut self, config: TensorConfig) -> Result<CudnnTensorDescriptor, CudnnError> {
        // Safety: `self.desc` came from `create_tensor_descriptor` in `new` and
        // is destroyed only in `Drop`; `TensorConfig` builds one stride per dim.
        let set = unsafe {
            self.api.set_tensor_nd_descriptor(
                self.desc,
                config.dtype,
                &config.dims,
                &config.strides,
            )
        };
        if let Err(e) = set {
            self.config = None;
            return Err(e);
        }
        tracing::debug!(
            "tensor descriptor {:p}: {} dims={:?} strides={:?} groups={}",
            self.desc,
            config.dtype,
            config.dims,
            config.strides,
            config.groups
        );
        self.config = Some(config);
        Ok(self.desc)
    }

    pub fn as_raw(&self) -> CudnnTensorDescriptor {
        self.desc
    }

    /// Last configuration cuDNN accepted.
    pub fn config(&self) -> Option<&TensorConfig> {
        self.config.as_ref()
    }
}

// cuDNN descriptors are host-side parameter blocks with no thread affinity.
unsafe impl<A: DescriptorApi + Sync + ?Sized> Send for ScopedTensorDescriptor<'_, A> {}
unsafe impl<A: DescriptorApi + Sync + ?Sized> Sync for ScopedTensorDescriptor<'_, A> {}

impl<A: DescriptorApi + ?Sized> Drop for ScopedTensorDescriptor<'_, A> {
    fn drop(&mut self) {
        tracing::trace!("destroying tensor descriptor {:p}", self.desc);
        // Safety: the handle is live and never used after this point.
        if let Err(e) = unsafe { self.api.destroy_tensor_descriptor(self.desc) } {
            tracing::error!("failed to destroy tensor descriptor {:p}: {}", self.desc, e);
        }
    }
}

impl<A: DescriptorApi + ?Sized> fmt::Debug for ScopedTensorDescriptor<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedTensorDescriptor")
            .field("desc", &self.desc)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::mock::{Call, RecordingApi};

    #[test]
    fn test_config_packed() {
        let c = TensorConfig::new(TensorFormat::Nchw, DataType::Float, &[2, 3, 4, 5], 1);
        let c = c.unwrap();
        assert_eq!(c.dims(), &[2, 3, 4, 5]);
        assert_eq!(c.strides(), &[60, 20, 5, 1]);
        assert_eq!(c.groups(), 1);
    }

    #[test]
    fn test_config_grouped_keeps_full_strides() {
        let c = TensorConfig::new(TensorFormat::Nchw, DataType::Float, &[8, 64, 7, 7], 4);
        let c = c.unwrap();
        assert_eq!(c.dims(), &[8, 16, 7, 7]);
        assert_eq!(c.strides(), &[64 * 49, 49, 7, 1]);
    }

    #[test]
    fn test_config_rejects() {
        let f = TensorFormat::Nchw;
        let t = DataType::Float;
        assert!(matches!(TensorConfig::new(f, t, &[], 1), Err(CudnnError::InvalidShape(_))));
        assert!(matches!(
            TensorConfig::new(f, t, &[2, 0, 4], 1),
            Err(CudnnError::InvalidShape(_))
        ));
        assert!(matches!(
            TensorConfig::new(f, t, &[2, 3, 4], 0),
            Err(CudnnError::InvalidShape(_))
        ));
        assert!(matches!(
            TensorConfig::new(f, t, &[2, 6, 4, 4], 4),
            Err(CudnnError::InvalidGroups { groups: 4, extent: 6, .. })
        ));
    }

    #[test]
    fn test_lifecycle() {
        let api = RecordingApi::new(8902);
        {
            let desc = ScopedTensorDescriptor::new(&api).unwrap();
            assert_eq!(api.live(), 1);
            assert!(desc.config().is_none());
        }
        assert_eq!(api.live(), 0);
        assert_eq!(api.created(), 1);
        assert_eq!(api.destroyed(), 1);
    }

    #[test]
    fn test_descriptor_forwards() {
        let api = RecordingApi::new(8902);
        let mut desc = ScopedTensorDescriptor::new(&api).unwrap();
        let raw = desc.descriptor_for::<f64>(DataLayout::Nchw, &[4, 6, 3, 3], 2).unwrap();
        assert_eq!(raw, desc.as_raw());
        assert_eq!(
            api.calls(),
            vec![Call::SetTensor {
                dtype: DataType::Double,
                dims: vec![4, 3, 3, 3],
                strides: vec![54, 9, 3, 1],
            }]
        );
        assert_eq!(desc.config().unwrap().format(), TensorFormat::Nchw);
    }

    #[test]
    fn test_invalid_args_make_no_vendor_call() {
        let api = RecordingApi::new(8902);
        let mut desc = ScopedTensorDescriptor::new(&api).unwrap();
        desc.descriptor_for::<f32>(DataLayout::Nhwc, &[1, 2, 3, 4], 1).unwrap();
        let before = desc.config().cloned();

        assert!(desc.descriptor_for::<f32>(DataLayout::NchwVectC, &[1, 4, 3, 3], 1).is_err());
        assert!(desc.descriptor_for::<f32>(DataLayout::Nchw, &[1, 3, 3, 3], 2).is_err());

        assert_eq!(api.calls().len(), 1);
        assert_eq!(desc.config().cloned(), before);
    }

    #[test]
    fn test_vendor_failure_clears_config() {
        let api = RecordingApi::new(8902);
        let mut desc = ScopedTensorDescriptor::new(&api).unwrap();
        desc.descriptor(TensorFormat::Nchw, DataType::Float, &[1, 1, 2, 2], 1).unwrap();

        api.fail_set(Some(9));
        let err = desc
            .descriptor(TensorFormat::Nchw, DataType::Half, &[1, 1, 2, 2], 1)
            .unwrap_err();
        assert!(matches!(err, CudnnError::Status { code: 9, .. }));
        assert!(desc.config().is_none());
        drop(desc);
        assert_eq!(api.live(), 0);
    }

    #[test]
    fn test_create_failure_leaks_nothing() {
        let api = RecordingApi::new(8902);
        api.fail_create(true);
        let err = ScopedTensorDescriptor::new(&api).unwrap_err();
        assert!(matches!(err, CudnnError::Status { code: 2, .. }));
        assert_eq!(api.created(), 0);
        assert_eq!(api.destroyed(), 0);
    }

    #[test]
    fn test_destroy_failure_is_swallowed() {
        let api = RecordingApi::new(8902);
        api.fail_destroy(true);
        let desc = ScopedTensorDescriptor::new(&api).unwrap();
        drop(desc);
        assert_eq!(api.destroyed(), 1);
    }

    #[test]
    fn test_many_descriptors_released_on_early_return() {
        fn build(api: &RecordingApi) -> Result<(), CudnnError> {
            let mut a = ScopedTensorDescriptor::new(api)?;
            let mut b = ScopedTensorDescriptor::new(api)?;
            a.descriptor(TensorFormat::Nchw, DataType::Float, &[1, 2, 3, 4], 1)?;
            b.descriptor(TensorFormat::Nchw, DataType::Float, &[1, 3, 3, 4], 2)?;
            Ok(())
        }
        let api = RecordingApi::new(8902);
        assert!(build(&api).is_err());
        assert_eq!(api.created(), 2);
        assert_eq!(api.live(), 0);
    }

    #[test]
    fn test_descriptor_moves_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ScopedTensorDescriptor<'static>>();
        assert_send_sync::<ScopedTensorDescriptor<'static, RecordingApi>>();

        let api = RecordingApi::new(8902);
        let mut desc = ScopedTensorDescriptor::new(&api).unwrap();
        desc.descriptor(TensorFormat::Nchw, DataType::Float, &[1, 2, 3, 4], 1).unwrap();
        std::thread::scope(|s| {
            s.spawn(|| assert_eq!(desc.config().unwrap().dims(), &[1, 2, 3, 4]));
        });
        std::thread::scope(|s| {
            s.spawn(move || drop(desc));
        });
        assert_eq!(api.live(), 0);
        assert_eq!(api.destroyed(), 1);
    }
}

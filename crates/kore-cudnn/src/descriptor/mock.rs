//! Recording stand-in for the cuDNN entry points, used by descriptor tests.

use std::ffi::{c_int, c_void};

use parking_lot::Mutex;

use crate::api::DescriptorApi;
use crate::context::CudnnError;
use crate::ffi::{
    check_cudnn, CudnnConvolutionDescriptor, CudnnFilterDescriptor, CudnnPoolingDescriptor,
    CudnnTensorDescriptor,
};
use crate::types::{ConvolutionMode, DataType, NanPropagation, PoolingMode, TensorFormat};

const BAD_PARAM: c_int = 3;
const ALLOC_FAILED: c_int = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Tensor,
    Filter,
    Convolution,
    Pooling,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    SetTensor {
        dtype: DataType,
        dims: Vec<i32>,
        strides: Vec<i32>,
    },
    SetFilter {
        dtype: DataType,
        format: TensorFormat,
        dims: Vec<i32>,
    },
    SetConvolution {
        pads: Vec<i32>,
        strides: Vec<i32>,
        dilations: Vec<i32>,
        mode: ConvolutionMode,
        compute_type: DataType,
    },
    SetPooling {
        mode: PoolingMode,
        nan: NanPropagation,
        window: Vec<i32>,
        pads: Vec<i32>,
        strides: Vec<i32>,
    },
}

#[derive(Default)]
struct State {
    next_handle: usize,
    live: Vec<(Kind, usize)>,
    created: usize,
    destroyed: usize,
    calls: Vec<Call>,
    fail_create: bool,
    fail_set: Option<c_int>,
    fail_destroy: bool,
}

pub(crate) struct RecordingApi {
    version: usize,
    state: Mutex<State>,
}

impl RecordingApi {
    pub(crate) fn new(version: usize) -> Self {
        Self { version, state: Mutex::new(State::default()) }
    }

    pub(crate) fn live(&self) -> usize {
        self.state.lock().live.len()
    }

    pub(crate) fn created(&self) -> usize {
        self.state.lock().created
    }

    pub(crate) fn destroyed(&self) -> usize {
        self.state.lock().destroyed
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub(crate) fn fail_create(&self, fail: bool) {
        self.state.lock().fail_create = fail;
    }

    /// Make every following set call return `code`.
    pub(crate) fn fail_set(&self, code: Option<c_int>) {
        self.state.lock().fail_set = code;
    }

    pub(crate) fn fail_destroy(&self, fail: bool) {
        self.state.lock().fail_destroy = fail;
    }

    fn create(&self, kind: Kind, context: &str) -> Result<*mut c_void, CudnnError> {
        let mut s = self.state.lock();
        if s.fail_create {
            check_cudnn(ALLOC_FAILED, context)?;
        }
        s.next_handle += 1;
        let handle = s.next_handle;
        s.live.push((kind, handle));
        s.created += 1;
        Ok(handle as *mut c_void)
    }

    fn set(
        &self,
        kind: Kind,
        desc: *mut c_void,
        call: Call,
        context: &str,
    ) -> Result<(), CudnnError> {
        let mut s = self.state.lock();
        if !s.live.contains(&(kind, desc as usize)) {
            return check_cudnn(BAD_PARAM, context);
        }
        if let Some(code) = s.fail_set {
            return check_cudnn(code, context);
        }
        s.calls.push(call);
        Ok(())
    }

    fn destroy(&self, kind: Kind, desc: *mut c_void, context: &str) -> Result<(), CudnnError> {
        let mut s = self.state.lock();
        let pos = s.live.iter().position(|&entry| entry == (kind, desc as usize));
        let Some(pos) = pos else {
            return check_cudnn(BAD_PARAM, context);
        };
        // The handle is released even when the status reports a failure.
        s.live.remove(pos);
        s.destroyed += 1;
        if s.fail_destroy {
            return check_cudnn(BAD_PARAM, context);
        }
        Ok(())
    }
}

impl DescriptorApi for RecordingApi {
    fn version(&self) -> usize {
        self.version
    }

    fn create_tensor_descriptor(&self) -> Result<CudnnTensorDescriptor, CudnnError> {
        self.create(Kind::Tensor, "cudnnCreateTensorDescriptor")
    }

    unsafe fn set_tensor_nd_descriptor(
        &self,
        desc: CudnnTensorDescriptor,
        dtype: DataType,
        dims: &[c_int],
        strides: &[c_int],
    ) -> Result<(), CudnnError> {
        let call = Call::SetTensor { dtype, dims: dims.to_vec(), strides: strides.to_vec() };
        self.set(Kind::Tensor, desc, call, "cudnnSetTensorNdDescriptor")
    }

    unsafe fn destroy_tensor_descriptor(
        &self,
        desc: CudnnTensorDescriptor,
    ) -> Result<(), CudnnError> {
        self.destroy(Kind::Tensor, desc, "cudnnDestroyTensorDescriptor")
    }

    fn create_filter_descriptor(&self) -> Result<CudnnFilterDescriptor, CudnnError> {
        self.create(Kind::Filter, "cudnnCreateFilterDescriptor")
    }

    unsafe fn set_filter_nd_descriptor(
        &self,
        desc: CudnnFilterDescriptor,
        dtype: DataType,
        format: TensorFormat,
        dims: &[c_int],
    ) -> Result<(), CudnnError> {
        let call = Call::SetFilter { dtype, format, dims: dims.to_vec() };
        self.set(Kind::Filter, desc, call, "cudnnSetFilterNdDescriptor")
    }

    unsafe fn destroy_filter_descriptor(
        &self,
        desc: CudnnFilterDescriptor,
    ) -> Result<(), CudnnError> {
        self.destroy(Kind::Filter, desc, "cudnnDestroyFilterDescriptor")
    }

    fn create_convolution_descriptor(&self) -> Result<CudnnConvolutionDescriptor, CudnnError> {
        self.create(Kind::Convolution, "cudnnCreateConvolutionDescriptor")
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
        let call = Call::SetConvolution {
            pads: pads.to_vec(),
            strides: strides.to_vec(),
            dilations: dilations.to_vec(),
            mode,
            compute_type,
        };
        self.set(Kind::Convolution, desc, call, "cudnnSetConvolutionNdDescriptor")
    }

    unsafe fn destroy_convolution_descriptor(
        &self,
        desc: CudnnConvolutionDescriptor,
    ) -> Result<(), CudnnError> {
        self.destroy(Kind::Convolution, desc, "cudnnDestroyConvolutionDescriptor")
    }

    fn create_pooling_descriptor(&self) -> Result<CudnnPoolingDescriptor, CudnnError> {
        self.create(Kind::Pooling, "cudnnCreatePoolingDescriptor")
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
        let call = Call::SetPooling {
            mode,
            nan,
            window: window.to_vec(),
            pads: pads.to_vec(),
            strides: strides.to_vec(),
        };
        self.set(Kind::Pooling, desc, call, "cudnnSetPoolingNdDescriptor")
    }

    unsafe fn destroy_pooling_descriptor(
        &self,
        desc: CudnnPoolingDescriptor,
    ) -> Result<(), CudnnError> {
        self.destroy(Kind::Pooling, desc, "cudnnDestroyPoolingDescriptor")
    }
}

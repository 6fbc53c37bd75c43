//! Runtime-loaded cuDNN function pointers via dlopen.
//!
//! Nothing links against cuDNN at build time: the library is opened on first
//! use, so the same binary runs on hosts with cuDNN 7, 8 or 9 (or none).

use std::ffi::{c_int, c_void};
use std::path::PathBuf;
use std::sync::OnceLock;

use libloading::Library;

use crate::config::LoaderConfig;
use crate::context::CudnnError;

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

pub type CudnnStatus = c_int;
pub const CUDNN_STATUS_SUCCESS: CudnnStatus = 0;

/// Maximum tensor rank accepted by the Nd descriptor setters.
pub const CUDNN_DIM_MAX: usize = 8;

/// Version from which dilated convolution is supported.
pub const CUDNN_DILATION_MIN_VERSION: usize = 6000;

/// Symbolic name of a cuDNN status code (as in `cudnn.h`).
///
/// cuDNN 9 renumbered the codes into families of a thousand; earlier
/// releases use 0..=14. Unlisted codes inside a family map to the family name.
pub fn status_name(code: CudnnStatus) -> &'static str {
    match code {
        0 => "CUDNN_STATUS_SUCCESS",
        1 => "CUDNN_STATUS_NOT_INITIALIZED",
        2 => "CUDNN_STATUS_ALLOC_FAILED",
        3 => "CUDNN_STATUS_BAD_PARAM",
        4 => "CUDNN_STATUS_INTERNAL_ERROR",
        5 => "CUDNN_STATUS_INVALID_VALUE",
        6 => "CUDNN_STATUS_ARCH_MISMATCH",
        7 => "CUDNN_STATUS_MAPPING_ERROR",
        8 => "CUDNN_STATUS_EXECUTION_FAILED",
        9 => "CUDNN_STATUS_NOT_SUPPORTED",
        10 => "CUDNN_STATUS_LICENSE_ERROR",
        11 => "CUDNN_STATUS_RUNTIME_PREREQUISITE_MISSING",
        12 => "CUDNN_STATUS_RUNTIME_IN_PROGRESS",
        13 => "CUDNN_STATUS_RUNTIME_FP_OVERFLOW",
        14 => "CUDNN_STATUS_VERSION_MISMATCH",

        // cuDNN 9
        1001 => "CUDNN_STATUS_NOT_INITIALIZED",
        1002 => "CUDNN_STATUS_SUBLIBRARY_VERSION_MISMATCH",
        1003 => "CUDNN_STATUS_SERIALIZATION_VERSION_MISMATCH",
        1004 => "CUDNN_STATUS_DEPRECATED",
        1005 => "CUDNN_STATUS_LICENSE_ERROR",
        1006 => "CUDNN_STATUS_RUNTIME_IN_PROGRESS",
        1007 => "CUDNN_STATUS_RUNTIME_FP_OVERFLOW",
        1008 => "CUDNN_STATUS_SUBLIBRARY_LOADING_FAILED",

        2002 => "CUDNN_STATUS_BAD_PARAM_NULL_POINTER",
        2003 => "CUDNN_STATUS_BAD_PARAM_MISALIGNED_POINTER",
        2004 => "CUDNN_STATUS_BAD_PARAM_NOT_FINALIZED",
        2005 => "CUDNN_STATUS_BAD_PARAM_OUT_OF_BOUND",
        2006 => "CUDNN_STATUS_BAD_PARAM_SIZE_INSUFFICIENT",
        2007 => "CUDNN_STATUS_BAD_PARAM_STREAM_MISMATCH",
        2008 => "CUDNN_STATUS_BAD_PARAM_SHAPE_MISMATCH",
        2009 => "CUDNN_STATUS_BAD_PARAM_DUPLICATED_ENTRIES",
        2010 => "CUDNN_STATUS_BAD_PARAM_ATTRIBUTE_TYPE",
        2011 => "CUDNN_STATUS_BAD_PARAM_CUDA_GRAPH_MISMATCH",
        2012 => "CUDNN_STATUS_BAD_PARAM_DESCRIPTOR_TYPE",

        3001 => "CUDNN_STATUS_NOT_SUPPORTED_GRAPH_PATTERN",
        3002 => "CUDNN_STATUS_NOT_SUPPORTED_SHAPE",
        3003 => "CUDNN_STATUS_NOT_SUPPORTED_DATA_TYPE",
        3004 => "CUDNN_STATUS_NOT_SUPPORTED_LAYOUT",
        3005 => "CUDNN_STATUS_NOT_SUPPORTED_INCOMPATIBLE_CUDA_DRIVER",
        3006 => "CUDNN_STATUS_NOT_SUPPORTED_INCOMPATIBLE_CUDART",
        3007 => "CUDNN_STATUS_NOT_SUPPORTED_ARCH_MISMATCH",
        3008 => "CUDNN_STATUS_NOT_SUPPORTED_RUNTIME_PREREQUISITE_MISSING",
        3009 => "CUDNN_STATUS_NOT_SUPPORTED_SUBLIBRARY_UNAVAILABLE",
        3010 => "CUDNN_STATUS_NOT_SUPPORTED_SHARED_MEMORY_INSUFFICIENT",
        3011 => "CUDNN_STATUS_NOT_SUPPORTED_PADDING",
        3012 => "CUDNN_STATUS_NOT_SUPPORTED_BAD_LAUNCH_PARAM",
        3013 => "CUDNN_STATUS_NOT_SUPPORTED_CUDA_GRAPH_NATIVE_API",

        4001 => "CUDNN_STATUS_INTERNAL_ERROR_COMPILATION_FAILED",
        4002 => "CUDNN_STATUS_INTERNAL_ERROR_UNEXPECTED_VALUE",
        4003 => "CUDNN_STATUS_INTERNAL_ERROR_HOST_ALLOCATION_FAILED",
        4004 => "CUDNN_STATUS_INTERNAL_ERROR_DEVICE_ALLOCATION_FAILED",
        4005 => "CUDNN_STATUS_INTERNAL_ERROR_BAD_LAUNCH_PARAM",
        4006 => "CUDNN_STATUS_INTERNAL_ERROR_TEXTURE_CREATION_FAILED",

        5001 => "CUDNN_STATUS_EXECUTION_FAILED_CUDA_DRIVER",
        5002 => "CUDNN_STATUS_EXECUTION_FAILED_CUBLAS",
        5003 => "CUDNN_STATUS_EXECUTION_FAILED_CUDART",
        5004 => "CUDNN_STATUS_EXECUTION_FAILED_CURAND",

        2000..=2999 => "CUDNN_STATUS_BAD_PARAM",
        3000..=3999 => "CUDNN_STATUS_NOT_SUPPORTED",
        4000..=4999 => "CUDNN_STATUS_INTERNAL_ERROR",
        5000..=5999 => "CUDNN_STATUS_EXECUTION_FAILED",
        _ => "CUDNN_STATUS_UNKNOWN",
    }
}

// Enum discriminants
pub type CudnnDataTypeT = c_int;
pub type CudnnTensorFormatT = c_int;
pub type CudnnPoolingModeT = c_int;
pub type CudnnNanPropagationT = c_int;
pub type CudnnConvolutionModeT = c_int;

// Opaque handles
pub type CudnnTensorDescriptor = *mut c_void;
pub type CudnnFilterDescriptor = *mut c_void;
pub type CudnnConvolutionDescriptor = *mut c_void;
pub type CudnnPoolingDescriptor = *mut c_void;

// ---------------------------------------------------------------------------
// cuDNN API function signatures
// ---------------------------------------------------------------------------

type FnCudnnGetVersion = unsafe extern "C" fn() -> usize;

type FnCudnnCreateTensorDescriptor =
    unsafe extern "C" fn(*mut CudnnTensorDescriptor) -> CudnnStatus;
type FnCudnnSetTensorNdDescriptor = unsafe extern "C" fn(
    CudnnTensorDescriptor,
    CudnnDataTypeT,
    c_int,        // nbDims
    *const c_int, // dimA
    *const c_int, // strideA
) -> CudnnStatus;
type FnCudnnDestroyTensorDescriptor =
    unsafe extern "C" fn(CudnnTensorDescriptor) -> CudnnStatus;

type FnCudnnCreateFilterDescriptor =
    unsafe extern "C" fn(*mut CudnnFilterDescriptor) -> CudnnStatus;
type FnCudnnSetFilterNdDescriptor = unsafe extern "C" fn(
    CudnnFilterDescriptor,
    CudnnDataTypeT,
    CudnnTensorFormatT,
    c_int,        // nbDims
    *const c_int, // filterDimA
) -> CudnnStatus;
type FnCudnnDestroyFilterDescriptor =
    unsafe extern "C" fn(CudnnFilterDescriptor) -> CudnnStatus;

type FnCudnnCreateConvolutionDescriptor =
    unsafe extern "C" fn(*mut CudnnConvolutionDescriptor) -> CudnnStatus;
type FnCudnnSetConvolutionNdDescriptor = unsafe extern "C" fn(
    CudnnConvolutionDescriptor,
    c_int,        // arrayLength
    *const c_int, // padA
    *const c_int, // filterStrideA
    *const c_int, // dilationA
    CudnnConvolutionModeT,
    CudnnDataTypeT, // computeType
) -> CudnnStatus;
type FnCudnnDestroyConvolutionDescriptor =
    unsafe extern "C" fn(CudnnConvolutionDescriptor) -> CudnnStatus;

type FnCudnnCreatePoolingDescriptor =
    unsafe extern "C" fn(*mut CudnnPoolingDescriptor) -> CudnnStatus;
type FnCudnnSetPoolingNdDescriptor = unsafe extern "C" fn(
    CudnnPoolingDescriptor,
    CudnnPoolingModeT,
    CudnnNanPropagationT,
    c_int,        // nbDims
    *const c_int, // windowDimA
    *const c_int, // paddingA
    *const c_int, // strideA
) -> CudnnStatus;
type FnCudnnDestroyPoolingDescriptor =
    unsafe extern "C" fn(CudnnPoolingDescriptor) -> CudnnStatus;

// ---------------------------------------------------------------------------
// Loaded API struct
// ---------------------------------------------------------------------------

pub struct CudnnApi {
    _lib: Library,
    path: PathBuf,
    pub cudnn_get_version: FnCudnnGetVersion,
    pub cudnn_create_tensor_descriptor: FnCudnnCreateTensorDescriptor,
    pub cudnn_set_tensor_nd_descriptor: FnCudnnSetTensorNdDescriptor,
    pub cudnn_destroy_tensor_descriptor: FnCudnnDestroyTensorDescriptor,
    pub cudnn_create_filter_descriptor: FnCudnnCreateFilterDescriptor,
    pub cudnn_set_filter_nd_descriptor: FnCudnnSetFilterNdDescriptor,
    pub cudnn_destroy_filter_descriptor: FnCudnnDestroyFilterDescriptor,
    pub cudnn_create_convolution_descriptor: FnCudnnCreateConvolutionDescriptor,
    pub cudnn_set_convolution_nd_descriptor: FnCudnnSetConvolutionNdDescriptor,
    pub cudnn_destroy_convolution_descriptor: FnCudnnDestroyConvolutionDescriptor,
    pub cudnn_create_pooling_descriptor: FnCudnnCreatePoolingDescriptor,
    pub cudnn_set_pooling_nd_descriptor: FnCudnnSetPoolingNdDescriptor,
    pub cudnn_destroy_pooling_descriptor: FnCudnnDestroyPoolingDescriptor,
}

impl std::fmt::Debug for CudnnApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudnnApi")
            .field("path", &self.path)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

/// Resolve one exported function from an opened library.
///
/// # Safety
/// `T` must be the exact function-pointer type of the exported symbol.
unsafe fn symbol<T: Copy>(
    lib: &Library,
    path: &std::path::Path,
    name: &'static str,
) -> Result<T, CudnnError> {
    lib.get::<T>(name.as_bytes())
        .map(|sym| *sym)
        .map_err(|e| CudnnError::MissingSymbol {
            symbol: name,
            path: path.display().to_string(),
            msg: e.to_string(),
        })
}

impl CudnnApi {
    /// Open the first loadable cuDNN library among the configured candidates.
    pub fn load(config: &LoaderConfig) -> Result<Self, CudnnError> {
        let candidates = config.candidates();
        let mut last_err = None;
        for path in &candidates {
            match Self::load_from(path) {
                Ok(api) => {
                    tracing::info!(
                        "loaded cuDNN {} from {}",
                        api.version(),
                        api.path.display()
                    );
                    return Ok(api);
                }
                Err(e) => {
                    tracing::debug!("cuDNN candidate {} rejected: {}", path.display(), e);
                    last_err = Some(e);
                }
            }
        }
        let searched = candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(CudnnError::NotAvailable {
            reason: match last_err {
                Some(e) => format!("searched [{searched}], last error: {e}"),
                None => "no candidate library names configured".to_string(),
            },
        })
    }

    /// Open a specific library file and resolve every entry point.
    pub fn load_from(path: &std::path::Path) -> Result<Self, CudnnError> {
        let lib = unsafe { Library::new(path) }.map_err(|e| CudnnError::Load {
            path: path.display().to_string(),
            msg: e.to_string(),
        })?;
        unsafe {
            Ok(CudnnApi {
                cudnn_get_version: symbol(&lib, path, "cudnnGetVersion")?,
                cudnn_create_tensor_descriptor: symbol(&lib, path, "cudnnCreateTensorDescriptor")?,
                cudnn_set_tensor_nd_descriptor: symbol(&lib, path, "cudnnSetTensorNdDescriptor")?,
                cudnn_destroy_tensor_descriptor: symbol(
                    &lib,
                    path,
                    "cudnnDestroyTensorDescriptor",
                )?,
                cudnn_create_filter_descriptor: symbol(&lib, path, "cudnnCreateFilterDescriptor")?,
                cudnn_set_filter_nd_descriptor: symbol(&lib, path, "cudnnSetFilterNdDescriptor")?,
                cudnn_destroy_filter_descriptor: symbol(
                    &lib,
                    path,
                    "cudnnDestroyFilterDescriptor",
                )?,
                cudnn_create_convolution_descriptor: symbol(
                    &lib,
                    path,
                    "cudnnCreateConvolutionDescriptor",
                )?,
                cudnn_set_convolution_nd_descriptor: symbol(
                    &lib,
                    path,
                    "cudnnSetConvolutionNdDescriptor",
                )?,
                cudnn_destroy_convolution_descriptor: symbol(
                    &lib,
                    path,
                    "cudnnDestroyConvolutionDescriptor",
                )?,
                cudnn_create_pooling_descriptor: symbol(
                    &lib,
                    path,
                    "cudnnCreatePoolingDescriptor",
                )?,
                cudnn_set_pooling_nd_descriptor: symbol(&lib, path, "cudnnSetPoolingNdDescriptor")?,
                cudnn_destroy_pooling_descriptor: symbol(
                    &lib,
                    path,
                    "cudnnDestroyPoolingDescriptor",
                )?,
                path: path.to_path_buf(),
                _lib: lib,
            })
        }
    }

    /// Path the library was opened from.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// `cudnnGetVersion()`, e.g. 8902 for 8.9.2.
    pub fn version(&self) -> usize {
        unsafe { (self.cudnn_get_version)() }
    }
}

// ---------------------------------------------------------------------------
// Process-wide library
// ---------------------------------------------------------------------------

static CUDNN_API: OnceLock<Result<CudnnApi, String>> = OnceLock::new();

fn loaded() -> &'static Result<CudnnApi, String> {
    CUDNN_API.get_or_init(|| {
        CudnnApi::load(&LoaderConfig::from_env()).map_err(|e| e.to_string())
    })
}

/// Get the runtime-loaded cuDNN API. Returns None if no library could be opened.
pub fn cudnn_api() -> Option<&'static CudnnApi> {
    loaded().as_ref().ok()
}

/// Like [`cudnn_api`], but reports why loading failed.
pub fn require_cudnn() -> Result<&'static CudnnApi, CudnnError> {
    loaded().as_ref().map_err(|reason| CudnnError::NotAvailable {
        reason: reason.clone(),
    })
}

// ---------------------------------------------------------------------------
// Error checking helpers
// ---------------------------------------------------------------------------

/// Check a cuDNN API return code.
pub fn check_cudnn(code: CudnnStatus, context: &str) -> Result<(), CudnnError> {
    if code == CUDNN_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(CudnnError::Status {
            code,
            name: status_name(code),
            context: context.to_string(),
        })
    }
}

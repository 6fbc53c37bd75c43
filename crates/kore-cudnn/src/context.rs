//! cuDNN availability and error types.
//!
//! All vendor calls go through the runtime-loaded function table in `ffi.rs`;
//! this module answers "is cuDNN here, and which version".

use crate::ffi;
use crate::types::DataLayout;

/// Check if cuDNN is available (a library could be opened and resolved).
pub fn is_cudnn_available() -> bool {
    ffi::cudnn_api().is_some()
}

/// Version of the loaded cuDNN library, e.g. 8902. None if not available.
pub fn version() -> Option<usize> {
    ffi::cudnn_api().map(|api| api.version())
}

/// Split a `cudnnGetVersion()` value into (major, minor, patch).
///
/// cuDNN 9 switched from `major*1000` to `major*10000`.
pub fn version_triple(version: usize) -> (usize, usize, usize) {
    if version >= 90000 {
        (version / 10000, (version % 10000) / 100, version % 100)
    } else {
        (version / 1000, (version % 1000) / 100, version % 100)
    }
}

/// cuDNN-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum CudnnError {
    #[error("cuDNN not available: {reason}")]
    NotAvailable { reason: String },

    #[error("failed to open {path}: {msg}")]
    Load { path: String, msg: String },

    #[error("symbol '{symbol}' not found in {path}: {msg}")]
    MissingSymbol {
        symbol: &'static str,
        path: String,
        msg: String,
    },

    #[error("cuDNN error {code} ({name}) in {context}")]
    Status {
        code: i32,
        name: &'static str,
        context: String,
    },

    #[error("no cuDNN tensor format for layout {0}")]
    UnsupportedLayout(DataLayout),

    #[error("{what}: expected {expected} entries, got {got}")]
    RankMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("groups={groups} does not divide {what} extent {extent}")]
    InvalidGroups {
        what: &'static str,
        groups: i32,
        extent: i32,
    },

    #[error("dilated convolution is not supported in cuDNN {version} (dilations {dilations:?})")]
    DilationUnsupported { version: usize, dilations: Vec<i32> },

    #[error("cannot parse {what} from '{input}'")]
    Parse { what: &'static str, input: String },
}

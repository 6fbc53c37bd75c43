//! Scoped cuDNN descriptors.
//!
//! Each wrapper creates its vendor handle on construction and destroys it on
//! drop. Configuration goes through a validated `*Config` value first, so no
//! vendor call is made with arguments that were rejected locally.

mod convolution;
mod filter;
mod pooling;
mod tensor;

pub use convolution::{ConvolutionConfig, ScopedConvolutionDescriptor};
pub use filter::{FilterConfig, ScopedFilterDescriptor};
pub use pooling::{PoolingConfig, ScopedPoolingDescriptor};
pub use tensor::{ScopedTensorDescriptor, TensorConfig};

use crate::context::CudnnError;
use crate::ffi::CUDNN_DIM_MAX;

/// Fully packed row-major strides: the last axis is contiguous.
pub fn packed_strides(dims: &[i32]) -> Result<Vec<i32>, CudnnError> {
    let mut strides = vec![1i32; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = dims[i + 1].checked_mul(strides[i + 1]).ok_or_else(|| {
            CudnnError::InvalidShape(format!("strides of {dims:?} overflow i32"))
        })?;
    }
    Ok(strides)
}

/// Rank must be in `1..=max`.
fn check_rank(what: &str, values: &[i32], max: usize) -> Result<(), CudnnError> {
    if values.is_empty() {
        return Err(CudnnError::InvalidShape(format!("{what} must not be empty")));
    }
    if values.len() > max {
        return Err(CudnnError::InvalidShape(format!(
            "{what} has rank {}, at most {max} supported",
            values.len()
        )));
    }
    Ok(())
}

fn check_min(what: &str, values: &[i32], min: i32) -> Result<(), CudnnError> {
    if let Some(v) = values.iter().find(|&&v| v < min) {
        return Err(CudnnError::InvalidShape(format!(
            "{what} {values:?}: entry {v} is below {min}"
        )));
    }
    Ok(())
}

fn check_same_len(what: &'static str, expected: usize, values: &[i32]) -> Result<(), CudnnError> {
    if values.len() != expected {
        return Err(CudnnError::RankMismatch {
            what,
            expected,
            got: values.len(),
        });
    }
    Ok(())
}

/// Shape checks shared by tensor and filter descriptors.
fn check_dims(what: &str, dims: &[i32]) -> Result<(), CudnnError> {
    check_rank(what, dims, CUDNN_DIM_MAX)?;
    check_min(what, dims, 1)
}

/// Per-group extent of axis `axis`; `groups` must divide it.
fn split_groups(
    what: &'static str,
    dims: &[i32],
    axis: usize,
    groups: i32,
) -> Result<Vec<i32>, CudnnError> {
    if groups < 1 {
        return Err(CudnnError::InvalidShape(format!("groups must be >= 1, got {groups}")));
    }
    let mut out = dims.to_vec();
    if groups > 1 {
        let extent = *dims.get(axis).ok_or_else(|| {
            CudnnError::InvalidShape(format!(
                "grouped {what} needs axis {axis}, rank is {}",
                dims.len()
            ))
        })?;
        if extent % groups != 0 {
            return Err(CudnnError::InvalidGroups { what, groups, extent });
        }
        out[axis] = extent / groups;
    }
    Ok(out)
}


#[cfg(test)]
pub(crate) mod mock;

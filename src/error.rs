// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-19

//! Error taxonomy shared by the multiplexer, the context-switch engine and
//! the collaborator traits.

use thiserror::Error;

use crate::fbns_types::{FbOp, FileHandle};

/// Positive errno value reported by a driver or host collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error)]
#[error("errno {0}")]
pub struct Errno(pub i32);

impl Errno {
    pub const EPERM: Errno = Errno(1);
    pub const EIO: Errno = Errno(5);
    pub const ENXIO: Errno = Errno(6);
    pub const EAGAIN: Errno = Errno(11);
    pub const ENOMEM: Errno = Errno(12);
    pub const EFAULT: Errno = Errno(14);
    pub const EBUSY: Errno = Errno(16);
    pub const ENODEV: Errno = Errno(19);
    pub const EINVAL: Errno = Errno(22);
    pub const ENOTTY: Errno = Errno(25);
    pub const ENOSYS: Errno = Errno(38);
}

/// Errors returned by framebuffer namespace operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FbNsError {
    #[error("out of memory allocating {what}")]
    OutOfMemory { what: &'static str },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("{op} failed on hardware: {errno}")]
    DeviceOperationFailed { op: FbOp, errno: Errno },
    #[error("remap of {file} failed: {errno}")]
    RemapFailed { file: FileHandle, errno: Errno },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{0} not provided by the underlying device")]
    NotSupported(FbOp),
    #[error("framebuffer namespace lock poisoned")]
    LockPoisoned,
}

/// Result alias used throughout the crate.
pub type FbResult<T> = Result<T, FbNsError>;

impl FbNsError {
    /// Negative errno for host boundaries that speak integers.
    pub fn errno(&self) -> i32 {
        let code = match self {
            FbNsError::OutOfMemory { .. } => Errno::ENOMEM,
            FbNsError::InvalidState(_) => Errno::ENODEV,
            FbNsError::DeviceOperationFailed { errno, .. } => *errno,
            FbNsError::RemapFailed { errno, .. } => *errno,
            FbNsError::InvalidArgument(_) => Errno::EINVAL,
            FbNsError::NotSupported(_) => Errno::ENOSYS,
            FbNsError::LockPoisoned => Errno::EIO,
        };
        -code.0
    }

    pub(crate) fn device(op: FbOp, errno: Errno) -> Self {
        FbNsError::DeviceOperationFailed { op, errno }
    }
}

/// Keeps the first error seen while letting later steps run.
#[derive(Debug, Default)]
pub(crate) struct FirstError(Option<FbNsError>);

impl FirstError {
    pub(crate) fn note<T>(&mut self, result: FbResult<T>) {
        if let Err(err) = result {
            if self.0.is_none() {
                self.0 = Some(err);
            }
        }
    }

    pub(crate) fn into_result(self) -> FbResult<()> {
        match self.0 {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_is_negative() {
        assert_eq!(FbNsError::OutOfMemory { what: "buffer" }.errno(), -12);
        assert_eq!(FbNsError::NotSupported(FbOp::Cursor).errno(), -38);
        let err = FbNsError::device(FbOp::SetColreg, Errno::EINVAL);
        assert_eq!(err.errno(), -22);
    }

    #[test]
    fn first_error_wins() {
        let mut first = FirstError::default();
        first.note::<()>(Ok(()));
        first.note::<()>(Err(FbNsError::device(FbOp::SetColreg, Errno::EIO)));
        first.note::<()>(Err(FbNsError::device(FbOp::SetPar, Errno::EINVAL)));
        assert_eq!(
            first.into_result(),
            Err(FbNsError::device(FbOp::SetColreg, Errno::EIO))
        );
    }

    #[test]
    fn messages_name_the_operation() {
        let err = FbNsError::device(FbOp::SetPar, Errno::EBUSY);
        assert_eq!(err.to_string(), "fb_set_par failed on hardware: errno 16");
    }
}

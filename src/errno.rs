//! Error numbers carried back to user space as negative syscall results.

use num_enum::{IntoPrimitive, TryFromPrimitive};

#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, thiserror::Error)]
#[repr(isize)]
pub enum Errno {
    #[error("Operation not permitted")]
    EPERM = 1,
    #[error("No such file or directory")]
    ENOENT = 2,
    #[error("No such process")]
    ESRCH = 3,
    #[error("Input/output error")]
    EIO = 5,
    #[error("No child processes")]
    ECHILD = 10,
    #[error("Resource temporarily unavailable")]
    EAGAIN = 11,
    #[error("Cannot allocate memory")]
    ENOMEM = 12,
    #[error("Bad address")]
    EFAULT = 14,
    #[error("Invalid argument")]
    EINVAL = 22,
    #[error("Function not implemented")]
    ENOSYS = 38,
}

impl Errno {
    /// The value a syscall handler hands back in `a0`.
    #[inline]
    pub fn as_ret(self) -> isize {
        -isize::from(self)
    }

    /// Decode a negative syscall result; `None` for success values or unknown codes.
    pub fn from_ret(ret: isize) -> Option<Self> {
        if ret >= 0 {
            return None;
        }
        Self::try_from(-ret).ok()
    }
}

/// Fold a `Result` into the signed return convention of the syscall table.
pub fn into_ret(result: Result<isize, Errno>) -> isize {
    match result {
        Ok(v) => v,
        Err(e) => e.as_ret(),
    }
}

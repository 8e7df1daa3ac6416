use allocators::AllocError;
use thiserror_no_std::Error;

/// The errors reported by virtual memory operations
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum VmError {
    /// Either the kernel heap or the frame allocator is exhausted.
    ///
    /// The caller may fail the current operation (e.g. `fork`) and continue.
    #[error("insufficient memory to complete the operation")]
    OutOfMemory,
    /// A malformed region was requested or an unknown fault type was reported
    #[error("invalid argument")]
    InvalidArgument,
    /// The faulting access is not backed by any region or there is no address space to handle it in.
    ///
    /// This is fatal for the faulting process.
    #[error("bad memory access")]
    BadAccess,
}

impl VmError {
    /// The kernel errno value corresponding to this error
    pub const fn errno(&self) -> i32 {
        match self {
            VmError::OutOfMemory => 3,
            VmError::BadAccess => 6,
            VmError::InvalidArgument => 8,
        }
    }
}

impl From<AllocError> for VmError {
    fn from(value: AllocError) -> Self {
        log::debug!("frame allocation failed: {value}");
        VmError::OutOfMemory
    }
}

impl From<alloc::collections::TryReserveError> for VmError {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        log::debug!("kernel heap exhausted");
        VmError::OutOfMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_values() {
        assert_eq!(VmError::OutOfMemory.errno(), 3);
        assert_eq!(VmError::BadAccess.errno(), 6);
        assert_eq!(VmError::InvalidArgument.errno(), 8);
    }

    #[test]
    fn frame_exhaustion_is_out_of_memory() {
        assert_eq!(VmError::from(AllocError::InsufficientMemory), VmError::OutOfMemory);
    }
}

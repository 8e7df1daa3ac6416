use thiserror_no_std::Error;

/// Type alias for the physical addresses handed out by a [`FrameAllocator`].
///
/// The supported machines address physical memory with 32 bits.
pub type PhysAddr = u32;

/// The error returned when an allocation fails
#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum AllocError {
    #[error("the allocator has insufficient free frames to allocate the requested amount")]
    InsufficientMemory,
    #[error("the address {0:#x} does not refer to a frame of this allocator")]
    InvalidAddress(PhysAddr),
}

/// An implementation of `FrameAllocator` hands out fixed-size frames of physical memory.
///
/// Frames are identified by their physical address.
/// Because the kernel cannot simply dereference a physical address, the allocator also provides access to the
/// content of a frame through its kernel mapping.
pub trait FrameAllocator {
    /// The type describing the content of one frame
    type Frame;

    /// Attempt to allocate `count` physically contiguous frames.
    ///
    /// On success, return the physical address of the first frame.
    /// The content of newly allocated frames is unspecified and may contain data of previous users.
    ///
    /// # Panics
    /// Implementations may panic when zero frames are requested.
    fn allocate(&mut self, count: usize) -> Result<PhysAddr, AllocError>;

    /// Return `count` frames starting at `paddr` to the allocator.
    ///
    /// # Panics
    /// This function may panic if the given frames do not lie within the bounds of the allocators backing memory.
    ///
    /// # Safety
    /// The given frames must be *currently allocated* from this allocator.
    ///
    /// This means that:
    /// - they were previously returned by [`allocate`](FrameAllocator::allocate)
    /// - they have not yet been deallocated
    /// - nothing refers to their content anymore
    unsafe fn deallocate(&mut self, paddr: PhysAddr, count: usize);

    /// Access the content of the frame at `paddr`.
    ///
    /// # Panics
    /// Panics if `paddr` does not refer to a frame of this allocator.
    ///
    /// # Safety
    /// The frame must be *currently allocated* from this allocator.
    /// Free frames may be used by the allocator for its own bookkeeping.
    unsafe fn frame(&self, paddr: PhysAddr) -> &Self::Frame;

    /// Mutably access the content of the frame at `paddr`.
    ///
    /// # Panics
    /// Panics if `paddr` does not refer to a frame of this allocator.
    ///
    /// # Safety
    /// The same rules as for [`frame`](FrameAllocator::frame) apply.
    unsafe fn frame_mut(&mut self, paddr: PhysAddr) -> &mut Self::Frame;

    /// Copy the complete content of frame `src` into frame `dst`.
    ///
    /// # Panics
    /// Panics if either address does not refer to a frame of this allocator.
    ///
    /// # Safety
    /// Both frames must be *currently allocated* from this allocator.
    unsafe fn copy_frame(&mut self, src: PhysAddr, dst: PhysAddr);

    /// Allocate exactly one frame
    fn allocate_one(&mut self) -> Result<PhysAddr, AllocError> {
        self.allocate(1)
    }

    /// Return exactly one frame to the allocator.
    ///
    /// # Safety
    /// The same rules as for [`deallocate`](FrameAllocator::deallocate) apply.
    unsafe fn deallocate_one(&mut self, paddr: PhysAddr) {
        self.deallocate(paddr, 1)
    }
}

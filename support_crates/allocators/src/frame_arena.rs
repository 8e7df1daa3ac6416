use crate::traits::{AllocError, FrameAllocator, PhysAddr};
use core::marker::PhantomData;
use core::mem;

/// A free and unallocated frame that points to the next free and unallocated frame.
#[derive(Copy, Clone, Debug)]
struct FreeBlock {
    next: Option<*mut FreeBlock>,
}

/// An arena of physical frames.
///
/// This allocator hands out same size frames from a continuous slice of memory.
/// The frames are defined by the `Frame` type parameter and the slice is assumed to be the kernel mapping of the
/// physical memory starting at `base`.
/// The frame at index `i` of the slice therefore has the physical address `base + i * size_of::<Frame>()`.
///
/// Free frames are tracked with an intrusive list that is stored inside the free frames themselves so that no
/// additional memory is needed for bookkeeping.
#[derive(Debug)]
pub struct FrameArena<'a, Frame> {
    /// Pointer to the start of the backing memory
    start_ptr: *mut Frame,
    /// Number of frames available to allocate from
    items: usize,
    /// Physical address of the first frame
    base: PhysAddr,
    /// First free, unallocated frame in the backing memory
    head: Option<*mut FreeBlock>,
    /// Number of frames that are currently handed out
    allocated: usize,
    /// Lifetime hack
    _phantom_data: PhantomData<&'a mut [Frame]>,
}

impl<'a, Frame: Copy> FrameArena<'a, Frame> {
    /// Create a new frame arena from the given slice of memory whose first frame has the physical address `base`.
    ///
    /// # Panics
    /// Panics if `base` is zero or not aligned to the frame size, or if the frames would extend past the end of the
    /// physical address space.
    pub fn new(slice: &'a mut [Frame], base: PhysAddr) -> Self {
        let frame_size = mem::size_of::<Frame>();
        assert!(mem::size_of::<Frame>() >= mem::size_of::<FreeBlock>());
        assert!(mem::align_of::<Frame>() >= mem::align_of::<FreeBlock>());
        assert_ne!(base, 0, "physical address 0 cannot be handed out as a frame");
        assert_eq!(
            base as usize % frame_size,
            0,
            "frame arena base {base:#x} is not aligned to the frame size"
        );
        assert!(
            (base as u64) + (slice.len() as u64) * (frame_size as u64) <= 1 << 32,
            "frame arena exceeds the physical address space"
        );

        let mut arena = Self {
            start_ptr: slice.as_mut_ptr(),
            items: slice.len(),
            base,
            head: None,
            allocated: 0,
            _phantom_data: PhantomData,
        };
        unsafe { arena.init_freelist() };
        log::debug!(
            "frame arena with {} frames at {:#x}..{:#x}",
            arena.items,
            base,
            base as u64 + (arena.items * frame_size) as u64
        );
        arena
    }

    /// Number of frames managed by this arena
    pub fn capacity(&self) -> usize {
        self.items
    }

    /// Number of frames that are currently allocated
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Number of frames that are currently free
    pub fn free(&self) -> usize {
        self.items - self.allocated
    }

    /// Initialize the internal *free-list* to mark the whole memory area as unused.
    ///
    /// # Safety
    /// Should only ever be called if no frames are allocated from the backing memory.
    unsafe fn init_freelist(&mut self) {
        for i in 0..self.items {
            let block = self.start_ptr.add(i).cast::<FreeBlock>();
            if i == self.items - 1 {
                *block = FreeBlock { next: None };
            } else {
                *block = FreeBlock {
                    next: Some(block.cast::<Frame>().add(1).cast::<FreeBlock>()),
                };
            }
        }
        self.head = match self.items {
            0 => None,
            _ => Some(self.start_ptr.cast::<FreeBlock>()),
        };
        self.allocated = 0;
    }

    /// Translate a physical address into the index of the frame it refers to
    fn index_of(&self, paddr: PhysAddr) -> Result<usize, AllocError> {
        let frame_size = mem::size_of::<Frame>();
        let offset = paddr
            .checked_sub(self.base)
            .ok_or(AllocError::InvalidAddress(paddr))? as usize;
        if offset % frame_size != 0 || offset / frame_size >= self.items {
            return Err(AllocError::InvalidAddress(paddr));
        }
        Ok(offset / frame_size)
    }

    /// Translate a pointer into the backing memory into the physical address of its frame
    fn paddr_of(&self, ptr: *mut Frame) -> PhysAddr {
        let index = unsafe { ptr.offset_from(self.start_ptr) } as usize;
        self.base + (index * mem::size_of::<Frame>()) as PhysAddr
    }

    /// Pointer to the frame at `paddr` or a panic if it is not part of this arena
    fn frame_ptr(&self, paddr: PhysAddr) -> *mut Frame {
        match self.index_of(paddr) {
            Ok(index) => unsafe { self.start_ptr.add(index) },
            Err(e) => panic!("{e}"),
        }
    }

    /// Whether the frame at `ptr` is currently on the free-list
    fn is_free(&self, ptr: *mut Frame) -> bool {
        let mut cur = self.head;
        while let Some(block) = cur {
            if block.cast::<Frame>() == ptr {
                return true;
            }
            cur = unsafe { (*block).next };
        }
        false
    }

    /// Pointer to the allocated frame at `paddr`.
    ///
    /// Debug builds walk the free-list to catch accesses to frames that are not allocated.
    fn allocated_frame_ptr(&self, paddr: PhysAddr) -> *mut Frame {
        let ptr = self.frame_ptr(paddr);
        debug_assert!(!self.is_free(ptr), "frame {paddr:#x} is not allocated");
        ptr
    }

    /// Allocate one frame from the arena and return a pointer to it.
    unsafe fn alloc_one_impl(&mut self) -> Option<*mut Frame> {
        let block_ptr = self.head?;
        self.head = (*block_ptr).next;
        *block_ptr = FreeBlock { next: None };
        Some(block_ptr.cast())
    }

    /// Allocate `items` number of frames from the arena and return a pointer to the first one.
    ///
    /// The frames are guaranteed to be continuously placed.
    /// Only runs of frames which are also neighbours in the free-list are found.
    unsafe fn alloc_many_impl(&mut self, items: usize) -> Option<*mut Frame> {
        let mut before_run: Option<*mut FreeBlock> = None;
        let mut run_head = self.head?;
        let mut cur = run_head;
        let mut count = 1;
        while count < items {
            let next = (*cur).next?;
            if next == cur.cast::<Frame>().add(1).cast::<FreeBlock>() {
                count += 1;
            } else {
                before_run = Some(cur);
                run_head = next;
                count = 1;
            }
            cur = next;
        }

        // unlink the run from the free-list
        match before_run {
            None => self.head = (*cur).next,
            Some(block) => (*block).next = (*cur).next,
        }
        Some(run_head.cast())
    }

    /// Put the given frame back onto the free-list
    ///
    /// # Safety
    /// The frame must no longer be used and must have been allocated from this arena.
    unsafe fn free_one_impl(&mut self, ptr: *mut Frame) {
        assert!(ptr >= self.start_ptr);
        assert!(ptr < self.start_ptr.add(self.items));
        let block_ptr = ptr.cast::<FreeBlock>();
        (*block_ptr).next = self.head;
        self.head = Some(block_ptr);
    }
}

impl<'a, Frame: Copy> FrameAllocator for FrameArena<'a, Frame> {
    type Frame = Frame;

    fn allocate(&mut self, count: usize) -> Result<PhysAddr, AllocError> {
        assert!(count > 0, "cannot allocate zero frames");
        let ptr = unsafe {
            match count {
                1 => self.alloc_one_impl(),
                _ => self.alloc_many_impl(count),
            }
        }
        .ok_or(AllocError::InsufficientMemory)?;
        self.allocated += count;

        let paddr = self.paddr_of(ptr);
        log::trace!("allocated {count} frame(s) at {paddr:#x}");
        Ok(paddr)
    }

    unsafe fn deallocate(&mut self, paddr: PhysAddr, count: usize) {
        log::trace!("freeing {count} frame(s) at {paddr:#x}");
        let index = match self.index_of(paddr) {
            Ok(index) => index,
            Err(e) => panic!("{e}"),
        };
        assert!(
            count <= self.items - index,
            "cannot free {count} frame(s) at {paddr:#x}, the arena ends before that"
        );
        let first = self.start_ptr.add(index);
        // push in reverse so that the run is found again as neighbours in the free-list
        for i in (0..count).rev() {
            let ptr = first.add(i);
            debug_assert!(!self.is_free(ptr), "double free of frame {:#x}", self.paddr_of(ptr));
            self.free_one_impl(ptr);
        }
        self.allocated -= count;
    }

    unsafe fn frame(&self, paddr: PhysAddr) -> &Frame {
        &*self.allocated_frame_ptr(paddr)
    }

    unsafe fn frame_mut(&mut self, paddr: PhysAddr) -> &mut Frame {
        &mut *self.allocated_frame_ptr(paddr)
    }

    unsafe fn copy_frame(&mut self, src: PhysAddr, dst: PhysAddr) {
        let src = self.allocated_frame_ptr(src);
        let dst = self.allocated_frame_ptr(dst);
        core::ptr::copy(src, dst, 1);
    }
}

//! Address spaces of user processes
//!
//! An [`AddressSpace`] is created empty when a program is loaded, filled with regions by the loader and then
//! populated lazily by [`vm_fault`](crate::vm_fault) while the process runs.
//! On `fork` it is deep-copied and on `exit` it is destroyed, returning all frames.

use crate::errors::VmError;
use crate::page_table::PageTable;
use crate::region::{Permissions, RegionList};
use crate::tlb::LocalTlb;
use allocators::FrameAllocator;
use ksync::InterruptControl;
use mips::mem::{MemoryPage, VAddr, PAGE_SIZE, USERSTACK};
use mips::tlb::Tlb;
use static_assertions::const_assert;

/// The number of pages reserved for the user stack below [`USERSTACK`]
pub const USER_STACK_PAGES: usize = 16;

const_assert!(USER_STACK_PAGES * PAGE_SIZE <= USERSTACK as usize);

/// The virtual memory of one process
#[derive(Debug)]
pub struct AddressSpace {
    regions: RegionList,
    page_table: PageTable,
}

impl AddressSpace {
    /// Create an address space without any regions or mapped pages
    pub fn new() -> Result<Self, VmError> {
        Ok(Self {
            regions: RegionList::new(),
            page_table: PageTable::new()?,
        })
    }

    /// Create a deep copy of this address space.
    ///
    /// The copy has the same regions and every mapped page is duplicated into a new frame.
    /// If the copy cannot be completed, everything allocated for it is released again and this address space is
    /// left untouched.
    pub fn try_copy<F>(&self, frames: &mut F) -> Result<Self, VmError>
    where
        F: FrameAllocator<Frame = MemoryPage>,
    {
        let regions = self.regions.try_clone()?;
        let page_table = self.page_table.try_copy(frames)?;
        log::debug!(
            "copied address space with {} regions and {} mapped pages",
            regions.len(),
            page_table.mapped_pages()
        );
        Ok(Self { regions, page_table })
    }

    /// Destroy this address space and return all of its frames to `frames`
    pub fn destroy<F: FrameAllocator>(self, frames: &mut F) {
        log::debug!("destroying address space with {} regions", self.regions.len());
        self.page_table.destroy(frames);
    }

    /// Define a region covering at least `[vaddr, vaddr + memsize)` with the given permissions.
    ///
    /// Fails with [`VmError::InvalidArgument`] if the region overlaps an already defined one or does not fit into
    /// the address space.
    pub fn define_region(
        &mut self,
        vaddr: VAddr,
        memsize: usize,
        readable: bool,
        writeable: bool,
        executable: bool,
    ) -> Result<(), VmError> {
        self.regions.define(
            vaddr,
            memsize,
            Permissions::from_flags(readable, writeable, executable),
        )
    }

    /// Temporarily make all regions readable and writeable so that the loader can copy segments into them
    pub fn prepare_load(&mut self) {
        self.regions.prepare_load();
    }

    /// Restore the defined permissions of all regions after loading.
    ///
    /// The TLB of the local processor is flushed because it may still hold writeable translations for pages of
    /// read-only regions.
    /// Note that the page table entries of pages faulted in during loading keep their `Dirty` bit.
    pub fn complete_load<T: Tlb, I: InterruptControl>(&mut self, tlb: &mut LocalTlb<T, I>) {
        self.regions.complete_load();
        tlb.flush();
    }

    /// Define the user stack region and return the initial stack pointer
    pub fn define_stack(&mut self) -> Result<VAddr, VmError> {
        let size = USER_STACK_PAGES * PAGE_SIZE;
        self.define_region(USERSTACK - size as VAddr, size, true, true, false)?;
        Ok(USERSTACK)
    }

    pub fn regions(&self) -> &RegionList {
        &self.regions
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub(crate) fn page_table_mut(&mut self) -> &mut PageTable {
        &mut self.page_table
    }
}

/// Make `addrspace` the address space used by the local processor.
///
/// Since TLB entries are not tagged with an address space id, this simply flushes the TLB.
/// Kernel threads have no address space in which case nothing is done.
pub fn activate<T: Tlb, I: InterruptControl>(addrspace: Option<&AddressSpace>, tlb: &mut LocalTlb<T, I>) {
    if addrspace.is_some() {
        tlb.flush();
    }
}

/// Stop using `addrspace` on the local processor
pub fn deactivate<T: Tlb, I: InterruptControl>(addrspace: Option<&AddressSpace>, tlb: &mut LocalTlb<T, I>) {
    activate(addrspace, tlb)
}

//! Per-process virtual memory management
//!
//! This crate implements the virtual memory of user processes on a MIPS machine with a software refilled TLB:
//!
//! - [`AddressSpace`] describes the memory of one process as a list of [`Region`]s with access permissions and a
//!   [`PageTable`] holding the translations that have already been established.
//! - [`vm_fault`] is called by the trap handler on every TLB miss.
//!   It either reloads an existing translation or allocates a zero-filled frame for an address inside a region.
//! - [`LocalTlb`] bundles the TLB of the current processor with the interrupt control that must be used while
//!   modifying it.
//!
//! Physical frames come from an [`allocators::FrameAllocator`] and every frame is owned by exactly one page table.
#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

mod addrspace;
mod errors;
mod fault;
mod page_table;
mod region;
mod tlb;

#[cfg(test)]
mod test_utils;

pub use addrspace::{activate, deactivate, AddressSpace, USER_STACK_PAGES};
pub use errors::VmError;
pub use fault::vm_fault;
pub use page_table::PageTable;
pub use region::{Permissions, Region, RegionList};
pub use tlb::{tlb_shootdown, LocalTlb, TlbShootdown};

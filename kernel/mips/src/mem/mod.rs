//! Data-Structures and Definitions for MIPS R3000 Virtual-Addressing
//!
//! # Virtual Addressing Basics
//!
//! The R3000 has a 32-bit virtual address space divided into 4 KiB pages.
//! There is no hardware page table walker. Every translation used by the CPU lives in the TLB and the kernel
//! refills it in software whenever the CPU raises a TLB miss.
//!
//! The kernel keeps its own translations in a three-level page table.
//! For that, a virtual address is partitioned as shown in the below figure.
//!
//! ```text
//! 31          24 23      18 17      12 11            0
//! ┌─────────────┬──────────┬──────────┬───────────────┐
//! │   index 1   │ index 2  │ index 3  │  page offset  │
//! └─────────────┴──────────┴──────────┴───────────────┘
//!      8bits       6bits      6bits         12bits
//!                   Virtual Address
//! ```
//!
//! The page offset is untranslated and carried over into the physical address by the hardware.
//!
//! ## Virtual Address Segments
//!
//! The segments are fixed by the architecture:
//!
//! | VAddr Start | VAddr End | Size | Usage |
//! | :---------- | :-------- | :--: | ----- |
//! | `0x00000000` | `0x7fffffff` | 2 GB | **kuseg**: per process user memory, translated through the TLB
//! | `0x80000000` | `0x9fffffff` | 512 MB | **kseg0**: direct mapping of physical memory, cached
//! | `0xa0000000` | `0xbfffffff` | 512 MB | **kseg1**: direct mapping of physical memory, uncached
//! | `0xc0000000` | `0xffffffff` | 1 GB | **kseg2**: kernel memory, translated through the TLB
//!
//! Only kuseg is managed by the per-process virtual memory subsystem.
//! The user stack grows downwards from the very top of kuseg.

mod entry_lo;
mod paddr;
mod vaddr;

use core::ops::{Deref, DerefMut};
pub use entry_lo::*;
pub use paddr::*;
use static_assertions::assert_eq_size;
pub use vaddr::*;

/// How large each page is.
///
/// This is also the granularity at which the TLB translates addresses and the size of physical frames.
pub const PAGE_SIZE: usize = 4096;

/// Mask which selects the page base of an address and removes its page offset
pub const PAGE_FRAME: u32 = !(PAGE_SIZE as u32 - 1);

/// Start of the TLB mapped user segment
pub const MIPS_KUSEG: u32 = 0x0000_0000;

/// Start of the cached, directly mapped kernel segment
pub const MIPS_KSEG0: u32 = 0x8000_0000;

/// Start of the uncached, directly mapped kernel segment
pub const MIPS_KSEG1: u32 = 0xa000_0000;

/// Start of the TLB mapped kernel segment
pub const MIPS_KSEG2: u32 = 0xc000_0000;

/// The first address that is no longer accessible from user mode
pub const USERSPACE_TOP: u32 = MIPS_KSEG0;

/// The initial user stack pointer.
///
/// The stack grows downwards, so this is the (exclusive) top of the stack region.
pub const USERSTACK: u32 = USERSPACE_TOP;

/// Type definition for a slice of bytes that is exactly one page large and aligned to it as well
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(C, align(4096))]
pub struct MemoryPage([u8; PAGE_SIZE]);

assert_eq_size!(MemoryPage, [u8; PAGE_SIZE]);

impl MemoryPage {
    /// A page filled with the given byte
    pub const fn filled(byte: u8) -> Self {
        Self([byte; PAGE_SIZE])
    }
}

impl Deref for MemoryPage {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for MemoryPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self([0u8; PAGE_SIZE])
    }
}

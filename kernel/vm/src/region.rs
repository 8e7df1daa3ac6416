//! Regions of an address space
//!
//! A region is a page-aligned extent of user address space together with the access permissions a program has for
//! it.
//! Regions are defined by the program loader (one per segment plus the stack) and only go away together with their
//! address space.

use crate::errors::VmError;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::fmt::{Debug, Formatter};
use mips::mem::{self, EntryLoFlags, VAddr, PAGE_FRAME, PAGE_SIZE};

bitflags! {
    /// The accesses a program may perform on a region
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
    pub struct Permissions: u8 {
        /// The region may be read from
        const READ = 0b001;
        /// The region may be written to
        const WRITE = 0b010;
        /// Code stored in the region may be executed
        const EXECUTE = 0b100;
    }
}

impl Permissions {
    /// Assemble permissions from individual flags as they are passed by the program loader
    pub fn from_flags(readable: bool, writeable: bool, executable: bool) -> Self {
        let mut permissions = Permissions::empty();
        permissions.set(Permissions::READ, readable);
        permissions.set(Permissions::WRITE, writeable);
        permissions.set(Permissions::EXECUTE, executable);
        permissions
    }
}

/// A contiguous extent `[vbase, vbase + npages * PAGE_SIZE)` of user address space with uniform permissions
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Region {
    vbase: VAddr,
    npages: usize,
    permissions: Permissions,
    /// The permissions the region was defined with while the loader overrides `permissions`
    saved: Permissions,
}

impl Region {
    /// Create a region covering at least `[vaddr, vaddr + memsize)`.
    ///
    /// The start is rounded down and the end is rounded up to page boundaries.
    /// Returns [`VmError::InvalidArgument`] if the rounded end does not fit into the address space.
    pub fn new(vaddr: VAddr, memsize: usize, permissions: Permissions) -> Result<Self, VmError> {
        let vbase = mem::vaddr_page_base(vaddr);
        let end = u32::try_from(memsize)
            .ok()
            .and_then(|memsize| vaddr.checked_add(memsize))
            .and_then(|end| end.checked_add(PAGE_SIZE as u32 - 1))
            .ok_or_else(|| {
                log::debug!("region at {vaddr:#x} with size {memsize:#x} exceeds the address space");
                VmError::InvalidArgument
            })?
            & PAGE_FRAME;

        Ok(Self {
            vbase,
            npages: (end - vbase) as usize / PAGE_SIZE,
            permissions,
            saved: permissions,
        })
    }

    pub fn vbase(&self) -> VAddr {
        self.vbase
    }

    pub fn npages(&self) -> usize {
        self.npages
    }

    /// The first address after the region
    pub fn end(&self) -> VAddr {
        self.vbase + (self.npages * PAGE_SIZE) as VAddr
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions
    }

    /// The permissions the region was defined with, independent of loader overrides
    pub fn saved_permissions(&self) -> Permissions {
        self.saved
    }

    pub fn readable(&self) -> bool {
        self.permissions.contains(Permissions::READ)
    }

    pub fn writeable(&self) -> bool {
        self.permissions.contains(Permissions::WRITE)
    }

    pub fn executable(&self) -> bool {
        self.permissions.contains(Permissions::EXECUTE)
    }

    /// Whether `vaddr` lies inside this region
    pub fn contains(&self, vaddr: VAddr) -> bool {
        self.vbase <= vaddr && vaddr < self.end()
    }

    /// Whether the two regions share at least one address.
    ///
    /// A region without pages contains no address and therefore never overlaps anything.
    pub fn overlaps(&self, other: &Region) -> bool {
        self.npages != 0 && other.npages != 0 && self.vbase < other.end() && other.vbase < self.end()
    }

    /// The status bits of a page table entry backing a page of this region.
    ///
    /// Pages are only writeable (`Dirty`) if the region is and are not `Valid` at all if the region grants no
    /// permission.
    pub fn entry_flags(&self) -> EntryLoFlags {
        let mut flags = EntryLoFlags::empty();
        flags.set(EntryLoFlags::Dirty, self.writeable());
        flags.set(EntryLoFlags::Valid, !self.permissions.is_empty());
        flags
    }
}

impl Debug for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "Region({:#010x}..{:#010x} {}{}{}",
            self.vbase,
            self.end(),
            if self.readable() { 'r' } else { '-' },
            if self.writeable() { 'w' } else { '-' },
            if self.executable() { 'x' } else { '-' },
        )?;
        if self.saved != self.permissions {
            write!(f, " saved {:?}", self.saved)?;
        }
        write!(f, ")")
    }
}

/// The regions of one address space in the order they were defined
#[derive(Debug, Default)]
pub struct RegionList {
    regions: Vec<Region>,
}

impl RegionList {
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Define a new region covering at least `[vaddr, vaddr + memsize)` and append it to the list.
    ///
    /// The region is rejected with [`VmError::InvalidArgument`] if it overlaps any existing region or exceeds the
    /// address space, in which case the list is left unchanged.
    pub fn define(&mut self, vaddr: VAddr, memsize: usize, permissions: Permissions) -> Result<(), VmError> {
        let region = Region::new(vaddr, memsize, permissions)?;
        if let Some(existing) = self.regions.iter().find(|existing| existing.overlaps(&region)) {
            log::debug!("{region:?} overlaps existing {existing:?}");
            return Err(VmError::InvalidArgument);
        }

        self.regions.try_reserve(1)?;
        self.regions.push(region);
        log::debug!("defined {region:?}");
        Ok(())
    }

    /// The first region in definition order that contains `vaddr`
    pub fn find(&self, vaddr: VAddr) -> Option<&Region> {
        self.regions.iter().find(|region| region.contains(vaddr))
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Copy all regions into a new list that shares nothing with this one
    pub fn try_clone(&self) -> Result<Self, VmError> {
        let mut regions = Vec::new();
        regions.try_reserve_exact(self.regions.len())?;
        regions.extend_from_slice(&self.regions);
        Ok(Self { regions })
    }

    /// Make every region readable and writeable so that the loader can fill in segment contents
    pub fn prepare_load(&mut self) {
        for region in self.regions.iter_mut() {
            region.permissions |= Permissions::READ | Permissions::WRITE;
        }
    }

    /// Undo [`prepare_load()`](RegionList::prepare_load) by restoring the defined read and write permissions
    pub fn complete_load(&mut self) {
        let rw = Permissions::READ | Permissions::WRITE;
        for region in self.regions.iter_mut() {
            region.permissions = (region.permissions - rw) | (region.saved & rw);
        }
    }
}

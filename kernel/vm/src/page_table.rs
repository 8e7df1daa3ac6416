//! The software page table
//!
//! Translations are stored in a sparse three-level trie that is indexed by the fields of a virtual address as
//! described in [`mips::mem`].
//! The leaves are [`EntryLo`] words in exactly the format the TLB expects so that a translation can be loaded into
//! the TLB without re-encoding it.
//!
//! Intermediate tables are only allocated once a page below them is mapped and are never freed before the whole
//! table is destroyed.
//! A missing table therefore means that everything below it is unmapped.

use crate::errors::VmError;
use alloc::boxed::Box;
use alloc::vec::Vec;
use allocators::FrameAllocator;
use core::fmt::{Debug, Formatter};
use mips::mem::{self, EntryLo, MemoryPage, VAddr, PT1_SIZE, PT2_SIZE, PT3_SIZE};

/// Allocate a table with `len` entries from the kernel heap.
///
/// Heap exhaustion is reported as [`VmError::OutOfMemory`] instead of aborting.
fn try_alloc_table<T>(len: usize, mut init: impl FnMut() -> T) -> Result<Box<[T]>, VmError> {
    let mut table = Vec::new();
    table.try_reserve_exact(len)?;
    table.extend((0..len).map(|_| init()));
    Ok(table.into_boxed_slice())
}

/// A third level table holding the actual translations
struct LeafTable {
    entries: Box<[EntryLo]>,
}

impl LeafTable {
    fn new() -> Result<Self, VmError> {
        Ok(Self {
            entries: try_alloc_table(PT3_SIZE, EntryLo::empty)?,
        })
    }
}

/// A second level table pointing to [`LeafTable`]s
struct MidTable {
    leaves: Box<[Option<LeafTable>]>,
}

impl MidTable {
    fn new() -> Result<Self, VmError> {
        Ok(Self {
            leaves: try_alloc_table(PT2_SIZE, || None)?,
        })
    }
}

/// The page table of one address space.
///
/// Every mapped leaf entry owns the frame it points to.
/// Frames are only returned to the frame allocator by [`destroy()`](PageTable::destroy), so a page table must always
/// be destroyed explicitly instead of simply being dropped.
pub struct PageTable {
    root: Box<[Option<MidTable>]>,
}

impl PageTable {
    /// Create a new page table in which nothing is mapped
    pub fn new() -> Result<Self, VmError> {
        Ok(Self {
            root: try_alloc_table(PT1_SIZE, || None)?,
        })
    }

    /// Return the translation of the page containing `vaddr` if one has been established
    pub fn lookup(&self, vaddr: VAddr) -> Option<EntryLo> {
        let [i1, i2, i3] = mem::vaddr_pt_indices(vaddr);
        let mid = self.root[i1].as_ref()?;
        let leaf = mid.leaves[i2].as_ref()?;
        let entry = leaf.entries[i3];
        entry.is_mapped().then_some(entry)
    }

    /// Establish a translation for the page containing `vaddr`.
    ///
    /// All intermediate tables on the way to the leaf entry are allocated if they don't exist yet.
    /// Afterwards `make_entry` is called to produce the leaf entry which is then stored and returned.
    ///
    /// If a table allocation or `make_entry` fails, the tables that were created by this call are removed again and
    /// the page table is left unchanged.
    ///
    /// # Panics
    /// Panics if the page is already mapped because overriding the entry would leak its frame.
    pub fn map_with(
        &mut self,
        vaddr: VAddr,
        make_entry: impl FnOnce() -> Result<EntryLo, VmError>,
    ) -> Result<EntryLo, VmError> {
        let [i1, i2, i3] = mem::vaddr_pt_indices(vaddr);

        let created = self.root[i1].is_none();
        if created {
            log::trace!("mapping {vaddr:#x} requires new second level table {i1}");
        }
        let mid = match &mut self.root[i1] {
            Some(mid) => mid,
            slot => slot.insert(MidTable::new()?),
        };

        let result = Self::map_in_mid(mid, i2, i3, vaddr, make_entry);
        if result.is_err() && created {
            self.root[i1] = None;
        }
        result
    }

    fn map_in_mid(
        mid: &mut MidTable,
        i2: usize,
        i3: usize,
        vaddr: VAddr,
        make_entry: impl FnOnce() -> Result<EntryLo, VmError>,
    ) -> Result<EntryLo, VmError> {
        let created = mid.leaves[i2].is_none();
        if created {
            log::trace!("mapping {vaddr:#x} requires new third level table {i2}");
        }
        let leaf = match &mut mid.leaves[i2] {
            Some(leaf) => leaf,
            slot => slot.insert(LeafTable::new()?),
        };
        assert!(
            !leaf.entries[i3].is_mapped(),
            "refusing to override existing mapping of {vaddr:#x}"
        );

        match make_entry() {
            Ok(entry) => {
                log::trace!("setting page table entry for {vaddr:#x} to {entry:?}");
                leaf.entries[i3] = entry;
                Ok(entry)
            }
            Err(e) => {
                if created {
                    mid.leaves[i2] = None;
                }
                Err(e)
            }
        }
    }

    /// Create a deep copy of this page table.
    ///
    /// Every mapped page is backed by a freshly allocated frame in the copy and the content of the original frame is
    /// copied over, so that no frame is ever shared between two page tables.
    /// The `Dirty` and `Valid` bits of each entry are preserved.
    ///
    /// If any allocation fails, everything that has already been copied is released again before returning
    /// [`VmError::OutOfMemory`].
    pub fn try_copy<F>(&self, frames: &mut F) -> Result<Self, VmError>
    where
        F: FrameAllocator<Frame = MemoryPage>,
    {
        let mut copy = PageTable::new()?;
        match copy.copy_from(self, frames) {
            Ok(()) => Ok(copy),
            Err(e) => {
                log::debug!("page table copy failed ({e}), releasing partial copy");
                copy.destroy(frames);
                Err(e)
            }
        }
    }

    fn copy_from<F>(&mut self, orig: &PageTable, frames: &mut F) -> Result<(), VmError>
    where
        F: FrameAllocator<Frame = MemoryPage>,
    {
        for (i1, orig_mid) in orig.root.iter().enumerate() {
            let Some(orig_mid) = orig_mid else { continue };
            let mid = self.root[i1].insert(MidTable::new()?);

            for (i2, orig_leaf) in orig_mid.leaves.iter().enumerate() {
                let Some(orig_leaf) = orig_leaf else { continue };
                let leaf = mid.leaves[i2].insert(LeafTable::new()?);

                for (entry, orig_entry) in leaf.entries.iter_mut().zip(orig_leaf.entries.iter()) {
                    if !orig_entry.is_mapped() {
                        continue;
                    }
                    let frame = frames.allocate_one()?;
                    // Safety: the original entry owns its frame and the new frame was just allocated
                    unsafe { frames.copy_frame(orig_entry.get_addr(), frame) };
                    *entry = orig_entry.with_frame(frame);
                }
            }
        }
        Ok(())
    }

    /// Destroy this page table and return every mapped frame to `frames`
    pub fn destroy<F: FrameAllocator>(mut self, frames: &mut F) {
        let tables = self.table_count();
        let freed = self.release_frames(frames);
        log::debug!("destroyed page table with {freed} mapped frames and {tables} tables");
    }

    fn release_frames<F: FrameAllocator>(&mut self, frames: &mut F) -> usize {
        let mut freed = 0;
        for mid in self.root.iter_mut().flatten() {
            for leaf in mid.leaves.iter_mut().flatten() {
                for entry in leaf.entries.iter_mut().filter(|entry| entry.is_mapped()) {
                    // Safety: every mapped entry exclusively owns its frame and the entry is cleared right after
                    unsafe { frames.deallocate_one(entry.get_addr()) };
                    *entry = EntryLo::empty();
                    freed += 1;
                }
            }
        }
        freed
    }

    /// Iterate over all established translations as `(page base, entry)` pairs in ascending address order
    pub fn entries(&self) -> impl Iterator<Item = (VAddr, EntryLo)> + '_ {
        self.root
            .iter()
            .enumerate()
            .filter_map(|(i1, mid)| Some((i1, mid.as_ref()?)))
            .flat_map(|(i1, mid)| {
                mid.leaves
                    .iter()
                    .enumerate()
                    .filter_map(|(i2, leaf)| Some((i2, leaf.as_ref()?)))
                    .flat_map(move |(i2, leaf)| {
                        leaf.entries
                            .iter()
                            .enumerate()
                            .filter(|(_, entry)| entry.is_mapped())
                            .map(move |(i3, entry)| (mem::vaddr_from_pt_indices([i1, i2, i3]), *entry))
                    })
            })
    }

    /// The number of pages which are currently mapped
    pub fn mapped_pages(&self) -> usize {
        self.entries().count()
    }

    /// The number of second and third level tables which are currently allocated
    pub fn table_count(&self) -> usize {
        self.root
            .iter()
            .flatten()
            .map(|mid| 1 + mid.leaves.iter().flatten().count())
            .sum()
    }
}

impl Drop for PageTable {
    fn drop(&mut self) {
        let leaked = self.mapped_pages();
        if leaked > 0 {
            log::warn!("page table dropped without being destroyed, leaking {leaked} frames");
        }
    }
}

impl Debug for PageTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageTable")
            .field("mapped_pages", &self.mapped_pages())
            .field("tables", &self.table_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::frame_arena;
    use allocators::{FrameArena, PhysAddr};
    use mips::mem::{EntryLoFlags, PAGE_SIZE};

    fn map_frame(
        pt: &mut PageTable,
        frames: &mut FrameArena<'static, MemoryPage>,
        vaddr: VAddr,
        flags: EntryLoFlags,
    ) -> PhysAddr {
        pt.map_with(vaddr, || Ok(EntryLo::new(frames.allocate_one()?, flags)))
            .unwrap()
            .get_addr()
    }

    #[test]
    fn new_table_maps_nothing() {
        let pt = PageTable::new().unwrap();
        assert_eq!(pt.lookup(0x0000_0000), None);
        assert_eq!(pt.lookup(0x7fff_f000), None);
        assert_eq!(pt.mapped_pages(), 0);
        assert_eq!(pt.table_count(), 0);
    }

    #[test]
    fn tables_are_allocated_lazily() {
        let mut frames = frame_arena(8);
        let mut pt = PageTable::new().unwrap();

        let a = map_frame(&mut pt, &mut frames, 0x1000, EntryLoFlags::Valid);
        assert_eq!(pt.table_count(), 2);

        // same third level table
        map_frame(&mut pt, &mut frames, 0x2000, EntryLoFlags::Valid);
        assert_eq!(pt.table_count(), 2);

        // same second level table, new third level table
        map_frame(&mut pt, &mut frames, 0x0004_0000, EntryLoFlags::Valid);
        assert_eq!(pt.table_count(), 3);

        // new second level table
        map_frame(&mut pt, &mut frames, 0x0100_0000, EntryLoFlags::Valid);
        assert_eq!(pt.table_count(), 5);

        assert_eq!(pt.lookup(0x1abc).map(|e| e.get_addr()), Some(a));
        assert_eq!(pt.lookup(0x3000), None);
        assert_eq!(
            pt.entries().map(|(vaddr, _)| vaddr).collect::<std::vec::Vec<_>>(),
            [0x1000, 0x2000, 0x0004_0000, 0x0100_0000]
        );

        pt.destroy(&mut frames);
    }

    #[test]
    fn failed_mapping_removes_new_tables() {
        let mut frames = frame_arena(1);
        let mut pt = PageTable::new().unwrap();

        let result = pt.map_with(0x0040_0000, || Err(VmError::OutOfMemory));
        assert_eq!(result, Err(VmError::OutOfMemory));
        assert_eq!(pt.table_count(), 0);

        // tables that existed before the failed mapping are kept
        map_frame(&mut pt, &mut frames, 0x0040_0000, EntryLoFlags::Valid);
        let result = pt.map_with(0x0040_1000, || Err(VmError::OutOfMemory));
        assert_eq!(result, Err(VmError::OutOfMemory));
        assert_eq!(pt.table_count(), 2);
        assert_eq!(pt.mapped_pages(), 1);

        pt.destroy(&mut frames);
    }

    #[test]
    #[should_panic]
    fn mapping_twice_is_rejected() {
        let mut frames = frame_arena(2);
        let mut pt = PageTable::new().unwrap();
        map_frame(&mut pt, &mut frames, 0x1000, EntryLoFlags::Valid);
        map_frame(&mut pt, &mut frames, 0x1000, EntryLoFlags::Valid);
    }

    #[test]
    fn copy_does_not_alias_frames() {
        let mut frames = frame_arena(8);
        let mut pt = PageTable::new().unwrap();
        let rw = map_frame(
            &mut pt,
            &mut frames,
            0x1000,
            EntryLoFlags::Dirty | EntryLoFlags::Valid,
        );
        let ro = map_frame(&mut pt, &mut frames, 0x0100_0000, EntryLoFlags::Valid);
        unsafe { frames.frame_mut(rw) }.fill(0x11);
        unsafe { frames.frame_mut(ro) }.fill(0x22);

        let copy = pt.try_copy(&mut frames).unwrap();
        assert_eq!(frames.allocated(), 4);
        assert_eq!(copy.table_count(), pt.table_count());

        let copy_rw = copy.lookup(0x1000).unwrap();
        let copy_ro = copy.lookup(0x0100_0000).unwrap();
        assert_ne!(copy_rw.get_addr(), rw);
        assert_ne!(copy_ro.get_addr(), ro);
        assert_eq!(copy_rw.get_flags(), EntryLoFlags::Dirty | EntryLoFlags::Valid);
        assert_eq!(copy_ro.get_flags(), EntryLoFlags::Valid);
        assert!(unsafe { frames.frame(copy_rw.get_addr()) }.iter().all(|&b| b == 0x11));
        assert!(unsafe { frames.frame(copy_ro.get_addr()) }.iter().all(|&b| b == 0x22));

        // writes to the copy are invisible to the original
        unsafe { frames.frame_mut(copy_rw.get_addr()) }.fill(0x33);
        assert!(unsafe { frames.frame(rw) }.iter().all(|&b| b == 0x11));

        // destroying the original leaves the copy intact
        pt.destroy(&mut frames);
        assert_eq!(frames.allocated(), 2);
        assert!(unsafe { frames.frame(copy_ro.get_addr()) }.iter().all(|&b| b == 0x22));

        copy.destroy(&mut frames);
        assert_eq!(frames.allocated(), 0);
    }

    #[test]
    fn failed_copy_returns_all_frames() {
        let mut frames = frame_arena(5);
        let mut pt = PageTable::new().unwrap();
        for vaddr in [0x1000, 0x2000, 0x0100_0000] {
            map_frame(&mut pt, &mut frames, vaddr, EntryLoFlags::Valid);
        }
        assert_eq!(frames.allocated(), 3);

        assert_eq!(pt.try_copy(&mut frames).unwrap_err(), VmError::OutOfMemory);
        assert_eq!(frames.allocated(), 3);
        assert_eq!(pt.mapped_pages(), 3);

        pt.destroy(&mut frames);
    }

    #[test]
    fn destroy_returns_every_frame() {
        let mut frames = frame_arena(16);
        let mut pt = PageTable::new().unwrap();
        for page in 0..10u32 {
            map_frame(
                &mut pt,
                &mut frames,
                page * 7 * PAGE_SIZE as u32,
                EntryLoFlags::Valid,
            );
        }
        assert_eq!(frames.allocated(), 10);
        pt.destroy(&mut frames);
        assert_eq!(frames.allocated(), 0);

        // the empty table can be destroyed as well
        PageTable::new().unwrap().destroy(&mut frames);
    }
}

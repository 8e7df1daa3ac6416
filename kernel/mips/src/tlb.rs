//! Interface to the translation lookaside buffer
//!
//! The R3000 TLB is fully associative and holds [`NUM_TLB`] entries.
//! Each entry consists of an [`EntryHi`] word that is matched against the virtual page of an access and an
//! [`EntryLo`] word that supplies the physical frame and permission bits.
//!
//! The first [`TLB_WIRED`] slots are never selected by [`Tlb::write_random`]; the *Random* register only cycles
//! through the remaining ones.

use crate::mem::{EntryHi, EntryLo, PAddr, VAddr};
use core::fmt::{Debug, Formatter};

/// The number of slots in the TLB
pub const NUM_TLB: usize = 64;

/// The number of low slots that are skipped by random replacement
pub const TLB_WIRED: usize = 8;

/// Write access to the TLB of the local processor.
///
/// Implementations are expected to be called with interrupts disabled on the local processor.
pub trait Tlb {
    /// Write the given entry into slot `index`
    fn write(&mut self, hi: EntryHi, lo: EntryLo, index: usize);

    /// Write the given entry into the slot currently selected by the *Random* register
    fn write_random(&mut self, hi: EntryHi, lo: EntryLo);
}

/// A software model of the R3000 TLB.
///
/// It behaves like the hardware regarding slot selection and translation and is used where no real TLB is
/// available, e.g. when running tests on the host.
pub struct SoftTlb {
    slots: [(EntryHi, EntryLo); NUM_TLB],
    random: usize,
}

impl SoftTlb {
    /// Create a new TLB in which every slot is disabled
    pub fn new() -> Self {
        let mut slots = [(EntryHi::invalid(0), EntryLo::invalid()); NUM_TLB];
        for (i, slot) in slots.iter_mut().enumerate() {
            slot.0 = EntryHi::invalid(i);
        }
        Self {
            slots,
            random: NUM_TLB - 1,
        }
    }

    /// Read the content of slot `index`
    pub fn read(&self, index: usize) -> (EntryHi, EntryLo) {
        self.slots[index]
    }

    /// Find the slot whose [`EntryHi`] matches the page containing `vaddr`
    pub fn probe(&self, vaddr: VAddr) -> Option<usize> {
        let hi = EntryHi::for_vaddr(vaddr);
        self.slots.iter().position(|(slot_hi, _)| *slot_hi == hi)
    }

    /// Translate `vaddr` the way the hardware would.
    ///
    /// Returns `None` if the access would raise a TLB miss, i.e. when no slot matches or the matching slot is not
    /// [`Valid`](crate::mem::EntryLoFlags::Valid).
    pub fn translate(&self, vaddr: VAddr) -> Option<PAddr> {
        let (_, lo) = self.slots[self.probe(vaddr)?];
        lo.is_valid()
            .then(|| lo.get_addr() | crate::mem::vaddr_page_offset(vaddr))
    }

    /// The number of slots that currently hold a valid translation
    pub fn valid_entries(&self) -> usize {
        self.slots.iter().filter(|(_, lo)| lo.is_valid()).count()
    }

    /// Advance the *Random* register, which counts down through the non-wired slots
    fn next_random(&mut self) -> usize {
        let current = self.random;
        self.random = match self.random {
            TLB_WIRED => NUM_TLB - 1,
            i => i - 1,
        };
        current
    }
}

impl Default for SoftTlb {
    fn default() -> Self {
        Self::new()
    }
}

impl Tlb for SoftTlb {
    fn write(&mut self, hi: EntryHi, lo: EntryLo, index: usize) {
        log::trace!("tlb write slot {index}: {hi:?} -> {lo:?}");
        self.slots[index] = (hi, lo);
    }

    fn write_random(&mut self, hi: EntryHi, lo: EntryLo) {
        let index = self.next_random();
        self.write(hi, lo, index);
    }
}

impl Debug for SoftTlb {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SoftTlb")
            .field("valid_entries", &self.valid_entries())
            .field("random", &self.random)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mem::EntryLoFlags;

    #[test]
    fn test_new_tlb_translates_nothing() {
        let tlb = SoftTlb::new();
        assert_eq!(tlb.valid_entries(), 0);
        assert_eq!(tlb.translate(0x0040_0000), None);
        assert_eq!(tlb.translate(0x0000_0000), None);
    }

    #[test]
    fn test_random_writes_skip_wired_slots() {
        let mut tlb = SoftTlb::new();
        for i in 0..(NUM_TLB - TLB_WIRED) as u32 {
            tlb.write_random(
                EntryHi::for_vaddr(i << 12),
                EntryLo::new(0x0010_0000, EntryLoFlags::Valid),
            );
        }
        assert_eq!(tlb.valid_entries(), NUM_TLB - TLB_WIRED);
        for slot in 0..TLB_WIRED {
            assert!(!tlb.read(slot).1.is_valid());
        }
        // the register wraps around to the top slot again
        assert_eq!(tlb.next_random(), NUM_TLB - 1);
    }

    #[test]
    fn test_translation_requires_valid_bit() {
        let mut tlb = SoftTlb::new();
        tlb.write(
            EntryHi::for_vaddr(0x0040_0000),
            EntryLo::new(0x0012_3000, EntryLoFlags::Valid),
            10,
        );
        tlb.write(
            EntryHi::for_vaddr(0x0050_0000),
            EntryLo::new(0x0045_6000, EntryLoFlags::Dirty),
            11,
        );
        assert_eq!(tlb.translate(0x0040_0abc), Some(0x0012_3abc));
        assert_eq!(tlb.probe(0x0050_0000), Some(11));
        assert_eq!(tlb.translate(0x0050_0000), None);
    }
}

use ksync::{InterruptControl, InterruptGuard};
use mips::mem::{EntryHi, EntryLo, VAddr};
use mips::tlb::{Tlb, NUM_TLB};

/// The TLB of the local processor together with the interrupt control of that processor.
///
/// Every modification of the TLB happens with interrupts disabled so that an interrupt handler can never observe or
/// cause a partially updated TLB.
#[derive(Debug)]
pub struct LocalTlb<T: Tlb, I: InterruptControl> {
    tlb: T,
    interrupts: I,
}

impl<T: Tlb, I: InterruptControl> LocalTlb<T, I> {
    pub fn new(tlb: T, interrupts: I) -> Self {
        Self { tlb, interrupts }
    }

    /// Invalidate every slot of the TLB
    pub fn flush(&mut self) {
        let _guard = InterruptGuard::new(&self.interrupts);
        for i in 0..NUM_TLB {
            self.tlb.write(EntryHi::invalid(i), EntryLo::invalid(), i);
        }
        log::trace!("flushed all {NUM_TLB} tlb slots");
    }

    /// Load the translation `entry` for the page containing `vaddr` into a random TLB slot
    pub fn load(&mut self, vaddr: VAddr, entry: EntryLo) {
        let _guard = InterruptGuard::new(&self.interrupts);
        self.tlb.write_random(EntryHi::for_vaddr(vaddr), entry);
    }

    pub fn tlb(&self) -> &T {
        &self.tlb
    }

    pub fn interrupts(&self) -> &I {
        &self.interrupts
    }
}

/// A request to remove the translation of a page from the TLB of another processor
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TlbShootdown {
    pub vaddr: VAddr,
}

/// Handle a TLB shootdown request from another processor.
///
/// Address spaces are never shared between processors, so a shootdown request means that the kernel is in a state
/// it cannot recover from.
pub fn tlb_shootdown(request: &TlbShootdown) -> ! {
    panic!(
        "tlb shootdown for {:#x} requested but multiprocessor tlb management is not supported",
        request.vaddr
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::local_tlb;
    use mips::mem::EntryLoFlags;
    use mips::tlb::TLB_WIRED;

    #[test]
    fn load_installs_translation() {
        let mut tlb = local_tlb();
        tlb.load(0x0040_0abc, EntryLo::new(0x0012_3000, EntryLoFlags::Valid));
        assert_eq!(tlb.tlb().translate(0x0040_0123), Some(0x0012_3123));
        assert!(tlb.tlb().probe(0x0040_0000).unwrap() >= TLB_WIRED);
        assert!(tlb.interrupts().is_enabled());
        assert_eq!(tlb.interrupts().times_raised(), 1);
    }

    #[test]
    fn flush_invalidates_every_slot() {
        let mut tlb = local_tlb();
        for page in 0..10u32 {
            tlb.load(page << 12, EntryLo::new(0x0010_0000, EntryLoFlags::Valid));
        }
        assert_eq!(tlb.tlb().valid_entries(), 10);

        tlb.flush();
        assert_eq!(tlb.tlb().valid_entries(), 0);
        for page in 0..10u32 {
            assert_eq!(tlb.tlb().translate(page << 12), None);
        }
        for slot in 0..NUM_TLB {
            assert_eq!(tlb.tlb().read(slot).0, EntryHi::invalid(slot));
        }

        // one critical section for the whole sweep
        assert_eq!(tlb.interrupts().times_raised(), 11);
        assert!(tlb.interrupts().is_enabled());
    }

    #[test]
    fn every_write_happens_with_interrupts_disabled() {
        let mut tlb = local_tlb();
        tlb.load(0x1000, EntryLo::new(0x0010_0000, EntryLoFlags::Valid));
        assert_eq!(tlb.tlb().writes(), 1);
        tlb.flush();
        assert_eq!(tlb.tlb().writes(), 1 + NUM_TLB);
        assert!(tlb.interrupts().is_enabled());
    }

    #[test]
    #[should_panic(expected = "interrupts are enabled")]
    fn unguarded_writes_are_detected() {
        let mut checked = local_tlb().tlb;
        checked.write(EntryHi::invalid(0), EntryLo::invalid(), 0);
    }

    #[test]
    #[should_panic]
    fn shootdown_is_fatal() {
        tlb_shootdown(&TlbShootdown { vaddr: 0x1000 });
    }
}

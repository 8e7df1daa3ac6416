use crate::tlb::LocalTlb;
use allocators::{FrameArena, PhysAddr};
use core::ops::Deref;
use ksync::InterruptFlag;
use mips::mem::{EntryHi, EntryLo, MemoryPage};
use mips::tlb::{SoftTlb, Tlb};
use std::boxed::Box;
use std::vec;

/// The byte that unused frames are filled with, so that stale content is detectable
pub const GARBAGE: u8 = 0xaa;

/// Physical address of the first frame handed out by [`frame_arena`]
pub const FRAMES_BASE: PhysAddr = 0x0010_0000;

/// A frame arena with `frames` frames of host memory that are all filled with [`GARBAGE`]
pub fn frame_arena(frames: usize) -> FrameArena<'static, MemoryPage> {
    let backing = Box::leak(vec![MemoryPage::filled(GARBAGE); frames].into_boxed_slice());
    FrameArena::new(backing, FRAMES_BASE)
}

/// A [`SoftTlb`] that asserts that interrupts are disabled whenever it is written to
#[derive(Debug)]
pub struct InterruptCheckedTlb {
    tlb: SoftTlb,
    interrupts: &'static InterruptFlag,
    writes: usize,
}

impl InterruptCheckedTlb {
    /// The number of slot writes that were performed
    pub fn writes(&self) -> usize {
        self.writes
    }

    fn check_interrupts(&mut self) {
        assert!(
            !self.interrupts.is_enabled(),
            "tlb written while interrupts are enabled"
        );
        self.writes += 1;
    }
}

impl Deref for InterruptCheckedTlb {
    type Target = SoftTlb;

    fn deref(&self) -> &Self::Target {
        &self.tlb
    }
}

impl Tlb for InterruptCheckedTlb {
    fn write(&mut self, hi: EntryHi, lo: EntryLo, index: usize) {
        self.check_interrupts();
        self.tlb.write(hi, lo, index);
    }

    fn write_random(&mut self, hi: EntryHi, lo: EntryLo) {
        self.check_interrupts();
        self.tlb.write_random(hi, lo);
    }
}

pub type TestTlb = LocalTlb<InterruptCheckedTlb, &'static InterruptFlag>;

/// A local tlb whose slots may only be written while its interrupt flag is lowered
pub fn local_tlb() -> TestTlb {
    let interrupts: &'static InterruptFlag = Box::leak(Box::new(InterruptFlag::new()));
    let tlb = InterruptCheckedTlb {
        tlb: SoftTlb::new(),
        interrupts,
        writes: 0,
    };
    LocalTlb::new(tlb, interrupts)
}

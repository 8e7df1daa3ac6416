use super::paddr::{self, PAddr};
use super::vaddr::VAddr;
use super::{MIPS_KSEG0, PAGE_FRAME};
use bitflags::bitflags;
use core::fmt::{Binary, Debug, Formatter, LowerHex, UpperHex, Write};
use static_assertions::assert_eq_size;

/// The low word of a TLB entry which describes the physical side of a translation.
///
/// The same word is used as the leaf entry of the software page table so that it can be loaded into the TLB
/// verbatim.
///
/// # Format
/// - Bits 31–12 hold the physical frame the page is mapped to.
/// - Bits 11–8 have the meaning as described by [`EntryLoFlags`].
/// - Bits 7–0 are ignored by the hardware and always zero.
///
/// ```text
/// 31                    12  11   10   9    8   7         0
/// ┌───────────────────────┬────┬────┬────┬────┬───────────┐
/// │     physical frame    │ N  │ D  │ V  │ G  │     0     │
/// └───────────────────────┴────┴────┴────┴────┴───────────┘
///          20bits                                 8bit
///                         EntryLo
/// ```
///
/// An entry whose word is `0` is considered *unmapped*.
#[derive(Copy, Clone, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct EntryLo {
    entry: u32,
}

assert_eq_size!(EntryLo, u32);

impl EntryLo {
    /// Create a new unmapped entry
    pub const fn empty() -> Self {
        Self { entry: 0 }
    }

    /// The entry which is written into TLB slots to disable them
    pub const fn invalid() -> Self {
        Self::empty()
    }

    /// Create a new entry that maps to the given physical frame
    pub fn new(paddr: PAddr, flags: EntryLoFlags) -> Self {
        assert_eq!(
            paddr::paddr_page_offset(paddr),
            0,
            "cannot point a tlb entry to unaligned PAddr {:#x}",
            paddr
        );
        Self {
            entry: paddr::paddr_frame(paddr) | flags.bits(),
        }
    }

    /// Reinterpret a raw word as an entry
    pub const fn from_bits(entry: u32) -> Self {
        Self { entry }
    }

    /// The raw word as it is understood by the hardware
    pub const fn bits(&self) -> u32 {
        self.entry
    }

    /// Whether this entry maps anything at all
    pub fn is_mapped(&self) -> bool {
        self.entry != 0
    }

    /// Whether the hardware considers this entry usable for translation
    pub fn is_valid(&self) -> bool {
        self.get_flags().contains(EntryLoFlags::Valid)
    }

    /// Whether writing through this entry is allowed
    pub fn is_dirty(&self) -> bool {
        self.get_flags().contains(EntryLoFlags::Dirty)
    }

    /// Return the flags which are encoded in this entry
    pub fn get_flags(&self) -> EntryLoFlags {
        EntryLoFlags::from_bits_truncate(self.entry)
    }

    /// Return the physical frame this entry points to
    pub fn get_addr(&self) -> PAddr {
        paddr::paddr_frame(self.entry)
    }

    /// A copy of this entry pointing to another frame while keeping the `Dirty` and `Valid` status bits
    pub fn with_frame(&self, paddr: PAddr) -> Self {
        Self::new(
            paddr,
            self.get_flags()
                .intersection(EntryLoFlags::Dirty | EntryLoFlags::Valid),
        )
    }
}

impl Debug for EntryLo {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self.is_mapped() {
            false => f.write_str("EntryLo (unmapped) { .. }"),
            true => f.write_fmt(format_args!(
                "EntryLo {{ addr: {:08x}, flags: {:?} }}",
                self.get_addr(),
                self.get_flags()
            )),
        }
    }
}

impl Binary for EntryLo {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        Binary::fmt(&self.entry, f)
    }
}

impl LowerHex for EntryLo {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        LowerHex::fmt(&self.entry, f)
    }
}

impl UpperHex for EntryLo {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        UpperHex::fmt(&self.entry, f)
    }
}

bitflags! {
    /// The flags that can be set on an [`EntryLo`]
    #[derive(Copy, Clone, Eq, PartialEq)]
    pub struct EntryLoFlags: u32 {
        /// Accesses through this entry bypass the cache
        const NoCache = 1 << 11;
        /// Allows writing to the mapped page. Writes through an entry without this bit raise a read-only fault.
        const Dirty = 1 << 10;
        /// If set, the TLB uses this entry for translation. Accesses through an invalid entry raise a TLB miss.
        const Valid = 1 << 9;
        /// If set, the entry matches regardless of the ASID in [`EntryHi`]
        const Global = 1 << 8;
    }
}

impl Debug for EntryLoFlags {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        fn write_bit(
            flags: EntryLoFlags,
            bit: EntryLoFlags,
            c: char,
            f: &mut Formatter<'_>,
        ) -> core::fmt::Result {
            if flags.contains(bit) {
                f.write_char(c)
            } else {
                f.write_char(' ')
            }
        }
        write_bit(*self, EntryLoFlags::NoCache, 'N', f)?;
        write_bit(*self, EntryLoFlags::Dirty, 'D', f)?;
        write_bit(*self, EntryLoFlags::Valid, 'V', f)?;
        write_bit(*self, EntryLoFlags::Global, 'G', f)?;
        Ok(())
    }
}

/// The high word of a TLB entry which describes the virtual side of a translation.
///
/// ```text
/// 31                    12 11        6 5         0
/// ┌───────────────────────┬───────────┬───────────┐
/// │      virtual page     │   ASID    │     0     │
/// └───────────────────────┴───────────┴───────────┘
///          20bits             6bits
///                      EntryHi
/// ```
///
/// ASIDs are not used so that field is always zero.
#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(transparent)]
pub struct EntryHi {
    entry: u32,
}

assert_eq_size!(EntryHi, u32);

impl EntryHi {
    /// The entry matching the page that contains `vaddr`
    pub fn for_vaddr(vaddr: VAddr) -> Self {
        Self {
            entry: vaddr & PAGE_FRAME,
        }
    }

    /// The entry which is written into TLB slot `slot` to disable it.
    ///
    /// Each slot gets a distinct page inside kseg0.
    /// Since kseg0 is never translated through the TLB, these entries cannot match any access and two disabled slots
    /// never match the same page.
    pub fn invalid(slot: usize) -> Self {
        Self {
            entry: MIPS_KSEG0 + ((slot as u32) << 12),
        }
    }

    /// The raw word as it is understood by the hardware
    pub const fn bits(&self) -> u32 {
        self.entry
    }

    /// The base address of the virtual page this entry matches
    pub fn vpage(&self) -> VAddr {
        self.entry & PAGE_FRAME
    }
}

impl Debug for EntryHi {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("EntryHi {{ vpage: {:08x} }}", self.vpage()))
    }
}

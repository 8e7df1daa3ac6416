use super::PAGE_FRAME;
use static_assertions::const_assert_eq;

/// Type alias for virtual addresses.
///
/// This is used by functions that explicitly interpret addresses as virtual ones.
pub type VAddr = u32;

const PAGE_OFFSET_BITS: u32 = 12;
const PAGE_OFFSET_MASK: u32 = (1 << PAGE_OFFSET_BITS) - 1;

const PT3_BITS: u32 = 6;
const PT2_BITS: u32 = 6;
const PT1_BITS: u32 = 8;

const PT3_OFFSET: u32 = PAGE_OFFSET_BITS;
const PT2_OFFSET: u32 = PT3_OFFSET + PT3_BITS;
const PT1_OFFSET: u32 = PT2_OFFSET + PT2_BITS;

const PT3_MASK: u32 = ((1 << PT3_BITS) - 1) << PT3_OFFSET;
const PT2_MASK: u32 = ((1 << PT2_BITS) - 1) << PT2_OFFSET;
const PT1_MASK: u32 = ((1 << PT1_BITS) - 1) << PT1_OFFSET;

/// Number of entries in the first (root) level of the page table
pub const PT1_SIZE: usize = 1 << PT1_BITS;
/// Number of entries in the second level of the page table
pub const PT2_SIZE: usize = 1 << PT2_BITS;
/// Number of entries in the third (leaf) level of the page table
pub const PT3_SIZE: usize = 1 << PT3_BITS;

// the three indices and the page offset must cover the whole address
const_assert_eq!(PT1_OFFSET + PT1_BITS, 32);
const_assert_eq!(PT1_MASK | PT2_MASK | PT3_MASK, PAGE_FRAME);

/// Get the page table indices of a virtual address.
///
/// The indices are ordered from the root level down to the leaf level.
#[inline]
pub fn vaddr_pt_indices(vaddr: VAddr) -> [usize; 3] {
    [
        ((vaddr & PT1_MASK) >> PT1_OFFSET) as usize,
        ((vaddr & PT2_MASK) >> PT2_OFFSET) as usize,
        ((vaddr & PT3_MASK) >> PT3_OFFSET) as usize,
    ]
}

/// Construct the page aligned virtual address which is described by the given page table indices
#[inline]
pub fn vaddr_from_pt_indices(indices: [usize; 3]) -> VAddr {
    ((indices[0] as u32) << PT1_OFFSET & PT1_MASK)
        | ((indices[1] as u32) << PT2_OFFSET & PT2_MASK)
        | ((indices[2] as u32) << PT3_OFFSET & PT3_MASK)
}

/// Get the base address of the page that contains `vaddr`
#[inline]
pub fn vaddr_page_base(vaddr: VAddr) -> VAddr {
    vaddr & PAGE_FRAME
}

/// Get the page offset from a virtual address
#[inline]
pub fn vaddr_page_offset(vaddr: VAddr) -> u32 {
    vaddr & PAGE_OFFSET_MASK
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_indices_are_split_correctly() {
        assert_eq!(vaddr_pt_indices(0x0000_0000), [0, 0, 0]);
        assert_eq!(vaddr_pt_indices(0x0000_1fff), [0, 0, 1]);
        assert_eq!(vaddr_pt_indices(0x0004_0000), [0, 1, 0]);
        assert_eq!(vaddr_pt_indices(0x7fff_f000), [0x7f, 63, 63]);
        assert_eq!(vaddr_pt_indices(0xffff_ffff), [0xff, 63, 63]);
    }

    #[test]
    fn test_indices_round_trip_to_page_base() {
        let vaddr = 0x1234_5678;
        assert_eq!(
            vaddr_from_pt_indices(vaddr_pt_indices(vaddr)),
            vaddr_page_base(vaddr)
        );
        assert_eq!(vaddr_page_offset(vaddr), 0x678);
    }
}

use super::PAGE_FRAME;

/// Type alias for physical addresses.
///
/// This is used by functions that explicitly interpret addresses as physical ones.
pub type PAddr = u32;

/// Get the physical frame number encoded in a physical address
///
/// The frame number is the same as the paddr but has all page offset bits set to zero.
#[inline]
pub fn paddr_frame(paddr: PAddr) -> u32 {
    paddr & PAGE_FRAME
}

/// Get the page offset from a physical address
#[inline]
pub fn paddr_page_offset(paddr: PAddr) -> u32 {
    paddr & !PAGE_FRAME
}

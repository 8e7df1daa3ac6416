use crate::addrspace::AddressSpace;
use crate::errors::VmError;
use crate::tlb::LocalTlb;
use allocators::FrameAllocator;
use ksync::InterruptControl;
use mips::mem::{EntryLo, MemoryPage, VAddr};
use mips::tlb::Tlb;
use mips::trap::VmFaultType;

/// Handle a TLB miss at `fault_address`.
///
/// `fault_type` is the raw [`VmFaultType`] reported by the trap dispatcher and `addrspace` is the address space of
/// the current process, if there is one.
///
/// If the page table already holds a translation for the page it is simply loaded into the TLB.
/// Otherwise the address must lie inside a region of the address space in which case a zero-filled frame is
/// allocated, mapped with the permissions of the region and loaded into the TLB.
///
/// Writes to read-only pages as well as accesses outside of every region are reported as
/// [`VmError::BadAccess`].
pub fn vm_fault<F, T, I>(
    fault_type: usize,
    fault_address: VAddr,
    addrspace: Option<&mut AddressSpace>,
    frames: &mut F,
    tlb: &mut LocalTlb<T, I>,
) -> Result<(), VmError>
where
    F: FrameAllocator<Frame = MemoryPage>,
    T: Tlb,
    I: InterruptControl,
{
    match VmFaultType::try_from(fault_type) {
        Ok(VmFaultType::Read | VmFaultType::Write) => {}
        Ok(VmFaultType::ReadOnly) => {
            log::debug!("write to read-only page at {fault_address:#x}");
            return Err(VmError::BadAccess);
        }
        Err(()) => {
            log::debug!("unknown vm fault type {fault_type}");
            return Err(VmError::InvalidArgument);
        }
    }

    let Some(addrspace) = addrspace else {
        log::debug!("vm fault at {fault_address:#x} without an address space");
        return Err(VmError::BadAccess);
    };

    if let Some(entry) = addrspace.page_table().lookup(fault_address) {
        log::trace!("reloading {entry:?} for {fault_address:#x}");
        tlb.load(fault_address, entry);
        return Ok(());
    }

    let Some(region) = addrspace.regions().find(fault_address) else {
        log::debug!("vm fault at {fault_address:#x} outside of every region");
        return Err(VmError::BadAccess);
    };
    let flags = region.entry_flags();

    let entry = addrspace.page_table_mut().map_with(fault_address, || {
        let frame = frames.allocate_one()?;
        // Safety: the frame was allocated right above and is not referenced by anything yet
        unsafe { frames.frame_mut(frame) }.fill(0);
        Ok(EntryLo::new(frame, flags))
    })?;
    log::debug!("mapped {fault_address:#x} to {entry:?}");
    tlb.load(fault_address, entry);
    Ok(())
}

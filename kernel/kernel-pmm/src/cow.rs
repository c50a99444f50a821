//! Copy-on-write fault resolution.
//!
//! Fork shares frames instead of copying them: the child's leaf entries are
//! cloned write-trapped with the `cow_shared` marker set, and the shared
//! frame gains one reference per sharing address space. The first write
//! through any of those entries faults, and the fault handler lands here.
//!
//! Resolution has two shapes:
//!
//! - **Sole owner** (count 1): every other owner has already resolved or
//!   exited, so the faulting space may simply take the frame — the entry is
//!   flipped writable in place and nothing is allocated or copied.
//! - **Shared** (count > 1): allocate a private frame, copy the page, point
//!   the faulting entry at the copy, and release one reference on the
//!   original. Owners that still map the original are untouched.
//!
//! The external fault handler routes faults that are *not* candidates
//! (true permission violations, unmapped pages) to process termination;
//! nothing here kills anything.

use crate::error::{FatalMisuse, OutOfMemory};
use crate::frame_alloc::FrameAllocator;
use kernel_info::memory::USER_SPACE_END;
use kernel_memory_addresses::{PhysicalAddress, Size4K, VirtualAddress, VirtualPage};
use kernel_vmem::{AddressSpace, PageEntryBits, PhysMapper, copy_page};
use log::{debug, warn};

/// Write-fault resolution over one frame pool.
///
/// Borrowed by the external page-fault handler; the pool reference is the
/// one handed out at boot.
pub struct CowFault<'a, M: PhysMapper> {
    frames: &'a FrameAllocator<'a, M>,
}

impl<'a, M: PhysMapper> CowFault<'a, M> {
    pub const fn new(frames: &'a FrameAllocator<'a, M>) -> Self {
        Self { frames }
    }

    /// Whether the write fault at `va` is a copy-on-write fault this
    /// module can resolve.
    ///
    /// # Errors
    /// - [`FaultError::AddressOutOfRange`] above the user VA limit.
    /// - [`FaultError::NotMapped`] if no leaf entry exists or the entry is
    ///   not present.
    pub fn is_cow_candidate(
        &self,
        aspace: &AddressSpace<'_, M>,
        va: VirtualAddress,
    ) -> Result<bool, FaultError> {
        if va.as_u64() >= USER_SPACE_END {
            return Err(FaultError::AddressOutOfRange(va));
        }
        let entry = aspace.leaf_entry(va).ok_or(FaultError::NotMapped(va))?;
        if !entry.present() {
            return Err(FaultError::NotMapped(va));
        }
        Ok(entry.cow_shared())
    }

    /// Resolve a copy-on-write fault at page-aligned `va`, returning the
    /// physical address the retried instruction will write to.
    ///
    /// # Errors
    /// - [`FaultError::Misaligned`] / [`FaultError::NotMapped`] for bad
    ///   input.
    /// - [`FaultError::OutOfMemory`] if no frame is available for the
    ///   private copy; the old mapping is left intact.
    /// - [`FaultError::Fatal`] if an installed entry references a frame the
    ///   pool does not manage — a kernel bug, not a fault condition.
    pub fn resolve(
        &self,
        aspace: &AddressSpace<'_, M>,
        va: VirtualAddress,
    ) -> Result<PhysicalAddress, FaultError> {
        let vp = VirtualPage::<Size4K>::from_aligned(va).ok_or(FaultError::Misaligned(va))?;
        let entry = aspace.leaf_entry(va).ok_or(FaultError::NotMapped(va))?;
        let old = entry.page().ok_or(FaultError::NotMapped(va))?;
        let old_pa = old.base();

        if self.frames.ref_count(old_pa)? == 1 {
            // Sole owner: take the frame, no copy.
            aspace
                .set_leaf_entry(va, entry.make_cow_private())
                .map_err(|_| FaultError::NotMapped(va))?;
            debug!("cow: {va} keeps sole frame {old_pa}");
            return Ok(old_pa);
        }

        let new = self.frames.allocate()?;
        unsafe { copy_page(self.frames.mapper(), old, new) };

        // Drop the present bit so the installer does not see a remap.
        aspace
            .set_leaf_entry(va, entry.with_present(false))
            .map_err(|_| FaultError::NotMapped(va))?;

        let leaf = entry.make_cow_private();
        if let Err(e) = aspace.map_one(
            self.frames,
            vp,
            new,
            PageEntryBits::new_table_flags(),
            leaf,
        ) {
            // Roll back: the faulting space keeps its shared mapping.
            self.frames.free(new.base())?;
            aspace
                .set_leaf_entry(va, entry)
                .map_err(|_| FaultError::NotMapped(va))?;
            warn!("cow: no frame for a private copy of {va}: {e}");
            return Err(FaultError::OutOfMemory);
        }

        // This space's ownership record moves from the old frame to the new.
        self.frames.free(old_pa)?;
        debug!("cow: {va} copied {old_pa} -> {}", new.base());
        Ok(new.base())
    }
}

/// Failure of a copy-on-write check or resolution.
///
/// Everything except [`Fatal`](Self::Fatal) is recoverable; the caller's
/// appropriate response is to terminate the faulting process only.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FaultError {
    #[error("virtual address beyond the user range: {0}")]
    AddressOutOfRange(VirtualAddress),
    #[error("fault address is not page-aligned: {0}")]
    Misaligned(VirtualAddress),
    #[error("no mapping at {0}")]
    NotMapped(VirtualAddress),
    #[error("out of physical frames")]
    OutOfMemory,
    #[error(transparent)]
    Fatal(#[from] FatalMisuse),
}

impl From<OutOfMemory> for FaultError {
    fn from(_: OutOfMemory) -> Self {
        Self::OutOfMemory
    }
}

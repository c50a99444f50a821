//! Hardware accessed-bit sampling.
//!
//! Answers "which of these pages were touched since the last scan?" for up
//! to one output word's worth of pages. Each scan is destructive: a set
//! accessed flag is recorded and cleared, resetting the sampling window.
//!
//! The scan shares only the page-table walker with the fault path; it
//! holds no pool locks and touches no reference counts.

use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::VirtualAddress;
use kernel_vmem::{AddressSpace, PhysMapper};
use log::trace;

/// Upper bound on pages per scan, fixed by the `u64` result mask.
pub const MAX_SCAN_PAGES: usize = u64::BITS as usize;

/// Copies kernel bytes into a user-supplied buffer.
///
/// The embedding kernel implements this against its user-memory access
/// rules (address-space checks, SMAP toggling, and so on).
pub trait UserCopy {
    /// Copy `src` to the user address `dst`.
    ///
    /// # Errors
    /// [`UserCopyFailed`] if the destination is not writable user memory.
    fn copy_to_user(&self, dst: VirtualAddress, src: &[u8]) -> Result<(), UserCopyFailed>;
}

/// The user-copy collaborator rejected the destination buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("copy to user buffer at {0} failed")]
pub struct UserCopyFailed(pub VirtualAddress);

/// Failure of an accessed-bit scan.
///
/// Callers only scan ranges they know to be mapped, so every variant is
/// treated as fatal by the syscall layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("scan of {requested} pages exceeds the {max}-page result mask")]
    TooManyPages { requested: usize, max: usize },
    #[error("no present mapping at {0} inside the scanned range")]
    MissingMapping(VirtualAddress),
    #[error(transparent)]
    CopyFailed(#[from] UserCopyFailed),
}

/// Sample the hardware accessed flags of `page_count` pages starting at
/// `start`, clear them, and write the resulting bitmask (bit *i* = page
/// *i*, little-endian `u64`) to the user buffer at `out_buffer`.
///
/// The page-count bound is checked before any page-table entry is
/// consulted; a failed scan never half-clears a window.
///
/// # Errors
/// - [`ScanError::TooManyPages`] if `page_count` exceeds
///   [`MAX_SCAN_PAGES`].
/// - [`ScanError::MissingMapping`] if any page in the range has no present
///   leaf entry.
/// - [`ScanError::CopyFailed`] if the user buffer cannot be written.
pub fn scan<M: PhysMapper, U: UserCopy>(
    aspace: &AddressSpace<'_, M>,
    start: VirtualAddress,
    page_count: usize,
    out_buffer: VirtualAddress,
    user: &U,
) -> Result<(), ScanError> {
    if page_count > MAX_SCAN_PAGES {
        return Err(ScanError::TooManyPages {
            requested: page_count,
            max: MAX_SCAN_PAGES,
        });
    }

    let mut mask = 0u64;
    for i in 0..page_count {
        let va = VirtualAddress::new(start.as_u64() + i as u64 * PAGE_SIZE);
        let entry = aspace
            .leaf_entry(va)
            .filter(|e| e.present())
            .ok_or(ScanError::MissingMapping(va))?;
        if entry.accessed() {
            mask |= 1 << i;
            // reset the sampling window
            aspace
                .set_leaf_entry(va, entry.with_accessed(false))
                .map_err(|_| ScanError::MissingMapping(va))?;
        }
    }

    trace!("access scan: {page_count} pages at {start}, mask {mask:#x}");
    user.copy_to_user(out_buffer, &mask.to_le_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ManagedRange;
    use crate::frame_alloc::FrameAllocator;
    use crate::sim::{FailingUserCopy, SimPhys, SimUserCopy};
    use kernel_memory_addresses::{PhysicalAddress, Size4K, VirtualPage};
    use kernel_vmem::PageEntryBits;

    const BASE: u64 = 0x0080_0000;
    const POOL_PAGES: u64 = 32;
    const VA: u64 = 0x4000_0000;
    const OUT: u64 = 0x7000_0000;

    fn pool_over(phys: &SimPhys) -> FrameAllocator<'_, SimPhys> {
        let range = ManagedRange::new(
            PhysicalAddress::new(BASE),
            PhysicalAddress::new(BASE + POOL_PAGES * PAGE_SIZE),
        )
        .unwrap();
        let pool = FrameAllocator::new(phys, range);
        pool.release_range().unwrap();
        pool
    }

    fn map_user_page(
        aspace: &AddressSpace<'_, SimPhys>,
        pool: &FrameAllocator<'_, SimPhys>,
        va: u64,
    ) {
        let page = pool.allocate().unwrap();
        let vp = VirtualPage::<Size4K>::from_aligned(VirtualAddress::new(va)).unwrap();
        aspace
            .map_one(
                pool,
                vp,
                page,
                PageEntryBits::new_table_flags(),
                PageEntryBits::new_user_rw(),
            )
            .unwrap();
    }

    /// Pretend the MMU touched the page.
    fn set_accessed(aspace: &AddressSpace<'_, SimPhys>, va: u64) {
        let va = VirtualAddress::new(va);
        let entry = aspace.leaf_entry(va).unwrap();
        aspace.set_leaf_entry(va, entry.with_accessed(true)).unwrap();
    }

    #[test]
    fn reports_and_clears_touched_pages() {
        let phys = SimPhys::new(BASE, POOL_PAGES);
        let pool = pool_over(&phys);
        let aspace = AddressSpace::new(&phys, &pool).unwrap();
        for i in 0..3 {
            map_user_page(&aspace, &pool, VA + i * PAGE_SIZE);
        }
        set_accessed(&aspace, VA);
        set_accessed(&aspace, VA + 2 * PAGE_SIZE);

        let user = SimUserCopy::new();
        scan(&aspace, VirtualAddress::new(VA), 3, VirtualAddress::new(OUT), &user).unwrap();

        let (dst, bytes) = user.single_write();
        assert_eq!(dst, VirtualAddress::new(OUT));
        assert_eq!(bytes, 0b101u64.to_le_bytes().to_vec());

        // the scan consumed the window
        for i in 0..3 {
            let e = aspace
                .leaf_entry(VirtualAddress::new(VA + i * PAGE_SIZE))
                .unwrap();
            assert!(!e.accessed());
        }
    }

    #[test]
    fn second_scan_reports_nothing() {
        let phys = SimPhys::new(BASE, POOL_PAGES);
        let pool = pool_over(&phys);
        let aspace = AddressSpace::new(&phys, &pool).unwrap();
        map_user_page(&aspace, &pool, VA);
        set_accessed(&aspace, VA);

        let user = SimUserCopy::new();
        let start = VirtualAddress::new(VA);
        let out = VirtualAddress::new(OUT);
        scan(&aspace, start, 1, out, &user).unwrap();
        scan(&aspace, start, 1, out, &user).unwrap();

        assert_eq!(user.write_count(), 2);
        // first scan saw the touch, second saw a clean window
        let (_, first) = user.write_at(0);
        assert_eq!(first, 1u64.to_le_bytes().to_vec());
        let (_, second) = user.write_at(1);
        assert_eq!(second, 0u64.to_le_bytes().to_vec());
    }

    #[test]
    fn oversized_scan_fails_before_touching_any_entry() {
        let phys = SimPhys::new(BASE, POOL_PAGES);
        let pool = pool_over(&phys);
        let aspace = AddressSpace::new(&phys, &pool).unwrap();
        map_user_page(&aspace, &pool, VA);
        set_accessed(&aspace, VA);

        let user = SimUserCopy::new();
        let err = scan(
            &aspace,
            VirtualAddress::new(VA),
            MAX_SCAN_PAGES + 1,
            VirtualAddress::new(OUT),
            &user,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ScanError::TooManyPages {
                requested: 65,
                max: 64
            }
        );
        assert_eq!(user.write_count(), 0);
        // the window was not consumed
        assert!(aspace.leaf_entry(VirtualAddress::new(VA)).unwrap().accessed());
    }

    #[test]
    fn hole_in_the_range_is_a_missing_mapping() {
        let phys = SimPhys::new(BASE, POOL_PAGES);
        let pool = pool_over(&phys);
        let aspace = AddressSpace::new(&phys, &pool).unwrap();
        map_user_page(&aspace, &pool, VA);
        // VA + PAGE_SIZE intentionally unmapped

        let user = SimUserCopy::new();
        let err = scan(
            &aspace,
            VirtualAddress::new(VA),
            2,
            VirtualAddress::new(OUT),
            &user,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ScanError::MissingMapping(VirtualAddress::new(VA + PAGE_SIZE))
        );
        assert_eq!(user.write_count(), 0);
    }

    #[test]
    fn copy_failure_propagates() {
        let phys = SimPhys::new(BASE, POOL_PAGES);
        let pool = pool_over(&phys);
        let aspace = AddressSpace::new(&phys, &pool).unwrap();
        map_user_page(&aspace, &pool, VA);

        let err = scan(
            &aspace,
            VirtualAddress::new(VA),
            1,
            VirtualAddress::new(OUT),
            &FailingUserCopy,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ScanError::CopyFailed(UserCopyFailed(VirtualAddress::new(OUT)))
        );
    }
}

//! Simulated physical memory for tests.
//!
//! A small "RAM" made of 4 KiB-aligned frames plus an offset-based mapper,
//! so the pool, the fault paths, and the sampler run unmodified against
//! host memory.

use core::cell::RefCell;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::PhysMapper;

use crate::access::{UserCopy, UserCopyFailed};

/// A 4 KiB-aligned raw frame backing one page of simulated RAM.
#[repr(align(4096))]
struct Aligned4K([u8; 4096]);

/// Simulated physical memory covering `[base, base + frames * 4096)`.
///
/// Physical addresses are byte offsets from `base`; the mapper picks the
/// frame `(pa - base) / 4096` and casts that block to `&mut T`.
pub(crate) struct SimPhys {
    base: u64,
    frames: Vec<Aligned4K>,
}

impl SimPhys {
    pub(crate) fn new(base: u64, frames: u64) -> Self {
        assert_eq!(base & 0xfff, 0);
        let mut v = Vec::with_capacity(frames as usize);
        for _ in 0..frames {
            v.push(Aligned4K([0u8; 4096]));
        }
        Self { base, frames: v }
    }

    fn frame_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let off = pa.as_u64().checked_sub(self.base).expect("pa below sim RAM");
        let idx = (off >> 12) as usize;
        assert!(idx < self.frames.len(), "pa beyond sim RAM");
        core::ptr::from_ref(&self.frames[idx]).cast_mut().cast::<u8>()
    }

    /// Snapshot of one frame's bytes.
    pub(crate) fn page_bytes(&self, page: PhysicalPage<Size4K>) -> [u8; 4096] {
        let mut out = [0u8; 4096];
        unsafe {
            core::ptr::copy_nonoverlapping(self.frame_ptr(page.base()), out.as_mut_ptr(), 4096);
        }
        out
    }

    /// Overwrite one frame's bytes.
    pub(crate) fn write_page(&self, page: PhysicalPage<Size4K>, byte: u8) {
        unsafe {
            core::ptr::write_bytes(self.frame_ptr(page.base()), byte, 4096);
        }
    }
}

impl PhysMapper for SimPhys {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let ptr = self.frame_ptr(pa);
        debug_assert_eq!(pa.as_u64() & 0xfff, 0);
        unsafe { &mut *ptr.cast::<T>() }
    }
}

/// Records what the kernel copied out to "user space".
#[derive(Default)]
pub(crate) struct SimUserCopy {
    writes: RefCell<Vec<(VirtualAddress, Vec<u8>)>>,
}

impl SimUserCopy {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The single recorded write, as (destination, bytes).
    pub(crate) fn single_write(&self) -> (VirtualAddress, Vec<u8>) {
        let writes = self.writes.borrow();
        assert_eq!(writes.len(), 1, "expected exactly one copy-out");
        writes[0].clone()
    }

    /// The `i`-th recorded write.
    pub(crate) fn write_at(&self, i: usize) -> (VirtualAddress, Vec<u8>) {
        self.writes.borrow()[i].clone()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.borrow().len()
    }
}

impl UserCopy for SimUserCopy {
    fn copy_to_user(&self, dst: VirtualAddress, src: &[u8]) -> Result<(), UserCopyFailed> {
        self.writes.borrow_mut().push((dst, src.to_vec()));
        Ok(())
    }
}

/// A user-copy collaborator that always fails, for error-path tests.
pub(crate) struct FailingUserCopy;

impl UserCopy for FailingUserCopy {
    fn copy_to_user(&self, dst: VirtualAddress, _src: &[u8]) -> Result<(), UserCopyFailed> {
        Err(UserCopyFailed(dst))
    }
}

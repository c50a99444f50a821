//! The physical frame pool.
//!
//! Allocates whole 4096-byte frames for user pages, page-table pages, and
//! private copy-on-write copies, and reclaims them when their last owner
//! releases them.
//!
//! Frame contents are scrubbed with [`FREE_FILL`] before a frame enters the
//! pool (a stale read of a freed frame shows the pattern) and overwritten
//! with [`ALLOC_FILL`] when it leaves (an uninitialized read of a fresh
//! frame shows a different pattern).

use crate::error::{FatalMisuse, OutOfMemory};
use crate::frame::{FrameIndex, ManagedRange};
use crate::free_list::FreeList;
use crate::ref_count::RefCountTable;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_sync::SpinLock;
use kernel_vmem::{FrameSource, PhysMapper, fill_page};
use log::{error, info};

/// Junk pattern written into a frame when it is handed out.
pub const ALLOC_FILL: u8 = 0x05;

/// Junk pattern written into a frame when it returns to the pool.
pub const FREE_FILL: u8 = 0x01;

/// The frame pool: free list plus per-frame reference counts.
///
/// Constructed once at boot over the free physical range and handed by
/// reference to every collaborator. The two inner locks are never held at
/// the same time; each operation releases one before taking the other.
pub struct FrameAllocator<'m, M: PhysMapper> {
    mapper: &'m M,
    range: ManagedRange,
    refs: SpinLock<RefCountTable>,
    free: SpinLock<FreeList>,
}

impl<'m, M: PhysMapper> FrameAllocator<'m, M> {
    /// An empty pool over `range`. No frames are available until
    /// [`release_range`](Self::release_range) runs.
    pub fn new(mapper: &'m M, range: ManagedRange) -> Self {
        Self {
            mapper,
            range,
            refs: SpinLock::new(RefCountTable::new()),
            free: SpinLock::new(FreeList::new()),
        }
    }

    /// Boot-path construction: build the pool and release the whole range,
    /// aborting on any misuse — a broken range at boot is unrecoverable.
    ///
    /// # Panics
    /// On any [`FatalMisuse`] from range validation or pool population.
    pub fn bootstrap(mapper: &'m M, start: PhysicalAddress, end: PhysicalAddress) -> Self {
        let range = match ManagedRange::new(start, end) {
            Ok(range) => range,
            Err(e) => panic!("frame pool bootstrap: {e}"),
        };
        let pool = Self::new(mapper, range);
        if let Err(e) = pool.release_range() {
            panic!("frame pool bootstrap: {e}");
        }
        pool
    }

    /// Release every frame of the managed range into the pool.
    ///
    /// Each frame's count is pre-seeded to 1 so that routing it through
    /// [`free`](Self::free) lands on exactly 0 — the release path and the
    /// reclaim path are the same code.
    ///
    /// # Errors
    /// [`FatalMisuse`] if a frame is released twice.
    pub fn release_range(&self) -> Result<(), FatalMisuse> {
        for page in self.range.frames() {
            let idx = self.frame_index(page.base())?;
            self.refs.lock().seed(idx)?;
            self.free(page.base())?;
        }
        info!(
            "frame pool: {} frames available in {}..{}",
            self.range.frame_count(),
            self.range.start(),
            self.range.end(),
        );
        Ok(())
    }

    /// The range this pool manages.
    #[must_use]
    pub const fn range(&self) -> &ManagedRange {
        &self.range
    }

    /// Validate `pa` against the managed range.
    ///
    /// # Errors
    /// [`FatalMisuse`] for misaligned or out-of-range addresses; the error
    /// is logged here because every caller treats it as a kernel bug.
    pub fn frame_index(&self, pa: PhysicalAddress) -> Result<FrameIndex, FatalMisuse> {
        FrameIndex::new(pa, &self.range).inspect_err(|e| error!("frame pool: {e}"))
    }

    /// Allocate one frame.
    ///
    /// The returned frame has a reference count of exactly 1 and its
    /// contents set to [`ALLOC_FILL`].
    ///
    /// # Errors
    /// [`OutOfMemory`] if the free list is empty.
    pub fn allocate(&self) -> Result<PhysicalPage<Size4K>, OutOfMemory> {
        let Some(idx) = self.free.lock().pop() else {
            return Err(OutOfMemory);
        };
        // Not visible to anyone else between the two critical sections.
        self.refs.lock().set_allocated(idx);

        let page = idx.page();
        unsafe { fill_page(self.mapper, page, ALLOC_FILL) };
        Ok(page)
    }

    /// Drop one owner of the frame at `pa`; reclaim it if that was the
    /// last one.
    ///
    /// Only a decrement that lands on exactly 0 scrubs and reinserts the
    /// frame. Once the count is 0 no other holder exists to race an
    /// increment, so the reference-table lock may be dropped before the
    /// free-list lock is taken.
    ///
    /// # Errors
    /// [`FatalMisuse`] for an invalid free target, a double free, or a
    /// frame already sitting in the pool.
    pub fn free(&self, pa: PhysicalAddress) -> Result<(), FatalMisuse> {
        let idx = self.frame_index(pa)?;
        let remaining = self
            .refs
            .lock()
            .decrement(idx)
            .inspect_err(|e| error!("frame pool: {e}"))?;
        if remaining == 0 {
            unsafe { fill_page(self.mapper, idx.page(), FREE_FILL) };
            self.free
                .lock()
                .push(idx)
                .inspect_err(|e| error!("frame pool: {e}"))?;
        }
        Ok(())
    }

    /// Record one more owner for the frame at `pa`.
    ///
    /// Called once per frame the duplication path decides to share instead
    /// of copy. Only the count changes here; the caller owns the child's
    /// page-table entry.
    ///
    /// # Errors
    /// [`FatalMisuse`] for invalid addresses, free frames, or a saturated
    /// count.
    pub fn share_on_fork(&self, pa: PhysicalAddress) -> Result<(), FatalMisuse> {
        let idx = self.frame_index(pa)?;
        self.refs
            .lock()
            .increment(idx)
            .inspect_err(|e| error!("frame pool: {e}"))?;
        Ok(())
    }

    /// Current owner count of the frame at `pa`.
    ///
    /// # Errors
    /// [`FatalMisuse`] for misaligned or out-of-range addresses.
    pub fn ref_count(&self, pa: PhysicalAddress) -> Result<u16, FatalMisuse> {
        let idx = self.frame_index(pa)?;
        Ok(self.refs.lock().get(idx))
    }

    /// Number of frames currently in the pool. A snapshot.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.free.lock().len()
    }

    /// Whether `pa` currently sits in the free list. A snapshot; for
    /// assertions and tests.
    #[must_use]
    pub fn is_free(&self, pa: PhysicalAddress) -> bool {
        self.frame_index(pa)
            .is_ok_and(|idx| self.free.lock().contains(idx))
    }

    pub(crate) const fn mapper(&self) -> &'m M {
        self.mapper
    }
}

impl<M: PhysMapper> FrameSource for FrameAllocator<'_, M> {
    fn alloc_frame(&self) -> Option<PhysicalPage<Size4K>> {
        self.allocate().ok()
    }
}

//! # Address Space (x86-64, PML4-rooted)
//!
//! Strongly-typed helpers to inspect and manipulate a **single** virtual
//! address space (tree rooted at a PML4).
//!
//! ## Highlights
//!
//! - [`AddressSpace::leaf_entry`] / [`AddressSpace::set_leaf_entry`] for the
//!   fault paths that read and rewrite individual PTEs.
//! - [`AddressSpace::map_one`] to install one 4 KiB mapping, allocating and
//!   linking missing intermediate tables. A present leaf is **rejected** as
//!   a remap; callers that intend to replace a mapping must clear the old
//!   entry's present bit first.
//! - [`AddressSpace::translate`] to resolve a VA to a PA.
//!
//! ## Design
//!
//! - Non-leaf entries are created with caller-provided **non-leaf flags**
//!   (typically present + writable). Leaf flags come from the mapping call.
//!   We never silently set US/GLOBAL/NX; the caller decides.
//! - Keeps `unsafe` confined to mapping a physical frame to a typed table
//!   through the [`PhysMapper`].
//!
//! ## Safety
//!
//! - Mutating active mappings requires appropriate **TLB maintenance**
//!   (e.g., `invlpg` per page or CR3 reload) by the embedding kernel.
//! - The provided [`PhysMapper`] must yield **writable** references to
//!   table frames.

use crate::entry::PageEntryBits;
use crate::table::{PageTable, split_indices, table_index};
use crate::{FrameSource, PhysMapper};
use kernel_memory_addresses::{
    PhysicalAddress, PhysicalPage, Size4K, VirtualAddress, VirtualPage,
};

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    root: PhysicalPage<Size4K>, // PML4 frame
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Allocate and zero a fresh root table.
    ///
    /// # Errors
    /// [`MapError::OutOfMemory`] if no frame is available for the root.
    pub fn new<A: FrameSource>(mapper: &'m M, frames: &A) -> Result<Self, MapError> {
        let root = frames.alloc_frame().ok_or(MapError::OutOfMemory)?;
        unsafe { mapper.phys_to_mut::<PageTable>(root.base()) }.zero();
        Ok(Self { root, mapper })
    }

    /// Wrap an existing root frame (e.g., read from CR3 by the embedder).
    #[inline]
    pub const fn from_root(mapper: &'m M, root: PhysicalPage<Size4K>) -> Self {
        Self { root, mapper }
    }

    /// Physical page of the PML4.
    #[inline]
    #[must_use]
    pub const fn root_page(&self) -> PhysicalPage<Size4K> {
        self.root
    }

    /// Borrow the table stored in `page` through the mapper.
    #[inline]
    fn table_mut(&self, page: PhysicalPage<Size4K>) -> &'m mut PageTable {
        unsafe { self.mapper.phys_to_mut::<PageTable>(page.base()) }
    }

    /// Walk the non-leaf levels for `va` and return the PT holding its leaf
    /// slot, or `None` if any intermediate entry is missing.
    fn leaf_table(&self, va: VirtualAddress) -> Option<&'m mut PageTable> {
        let mut table = self.table_mut(self.root);
        for level in [4u32, 3, 2] {
            let entry = table.get(table_index(va, level));
            if !entry.present() {
                return None;
            }
            debug_assert!(!entry.large_page(), "large pages are never installed");
            table = self.table_mut(entry.physical_address().page::<Size4K>());
        }
        Some(table)
    }

    /// The leaf page-table entry for `va`, if the walk reaches the PT level.
    ///
    /// The returned entry may itself be non-present; `None` means no PT
    /// exists for this address at all.
    #[must_use]
    pub fn leaf_entry(&self, va: VirtualAddress) -> Option<PageEntryBits> {
        let table = self.leaf_table(va)?;
        Some(table.get(table_index(va, 1)))
    }

    /// Overwrite the leaf page-table entry for `va`.
    ///
    /// # Errors
    /// [`NoLeafEntry`] if the walk does not reach the PT level.
    pub fn set_leaf_entry(&self, va: VirtualAddress, e: PageEntryBits) -> Result<(), NoLeafEntry> {
        let table = self.leaf_table(va).ok_or(NoLeafEntry(va))?;
        table.set(table_index(va, 1), e);
        Ok(())
    }

    /// Translate a `VirtualAddress` to a `PhysicalAddress` if mapped.
    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let entry = self.leaf_entry(va)?;
        let page = entry.page()?;
        let (_, off) = va.split::<Size4K>();
        Some(page.join(off))
    }

    /// Map **one** 4 KiB page at `vp → pp` with `leaf_flags`, creating
    /// missing intermediate tables with `nonleaf_flags`.
    ///
    /// The leaf entry is written with `present` forced on and the frame
    /// address taken from `pp`; everything else comes from `leaf_flags`.
    ///
    /// # Errors
    /// - [`MapError::OutOfMemory`] if an intermediate table frame cannot be
    ///   allocated.
    /// - [`MapError::AlreadyMapped`] if a present leaf already exists —
    ///   installing over a live mapping is always a caller bug here.
    pub fn map_one<A: FrameSource>(
        &self,
        frames: &A,
        vp: VirtualPage<Size4K>,
        pp: PhysicalPage<Size4K>,
        nonleaf_flags: PageEntryBits,
        leaf_flags: PageEntryBits,
    ) -> Result<(), MapError> {
        let va = vp.base();
        let (i4, i3, i2, i1) = split_indices(va);

        let mut table = self.table_mut(self.root);
        for index in [i4, i3, i2] {
            let entry = table.get(index);
            let next = if entry.present() {
                entry.physical_address().page::<Size4K>()
            } else {
                let frame = frames.alloc_frame().ok_or(MapError::OutOfMemory)?;
                self.table_mut(frame).zero();
                table.set(index, PageEntryBits::make_next_table(frame, nonleaf_flags));
                frame
            };
            table = self.table_mut(next);
        }

        if table.get(i1).present() {
            return Err(MapError::AlreadyMapped(va));
        }
        table.set(i1, PageEntryBits::make_page(pp, leaf_flags));
        Ok(())
    }
}

/// Error returned by [`AddressSpace::map_one`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("out of memory while linking page tables")]
    OutOfMemory,
    #[error("mapping already present at {0}")]
    AlreadyMapped(VirtualAddress),
}

/// No PT-level entry exists for the given virtual address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no leaf page-table entry for {0}")]
pub struct NoLeafEntry(pub VirtualAddress);

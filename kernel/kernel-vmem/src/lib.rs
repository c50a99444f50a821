//! # Virtual Memory Support
//!
//! Minimal x86-64 paging helpers shared by the physical-memory core.
//!
//! ## What you get
//! - An [`AddressSpace`] describing a PML4-rooted page-table tree, with the
//!   entry lookup, translation, and single-page mapping operations the fault
//!   paths need.
//! - x86-64 page-table [`PageEntryBits`], including the software
//!   copy-on-write marker carved out of the OS-available bits.
//! - A 4 KiB-aligned [`PageTable`] wrapper and index helpers.
//! - A tiny allocator/mapper interface ([`FrameSource`], [`PhysMapper`]).
//!
//! ## x86-64 Virtual Address → Physical Address Walk
//!
//! Each 48-bit virtual address is divided into five fields:
//!
//! ```text
//! | 47‒39 | 38‒30 | 29‒21 | 20‒12 | 11‒0   |
//! |  PML4 |  PDPT |   PD  |   PT  | Offset |
//! ```
//!
//! The CPU uses these fields as **indices** into four levels of page tables,
//! each level containing 512 (2⁹) entries of 8 bytes each. The kernel only
//! ever installs 4 KiB leaves, so every present walk terminates at the PT
//! level and the large-page (PS) bit stays clear throughout.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

mod address_space;
mod entry;
mod table;

pub use crate::address_space::{AddressSpace, MapError, NoLeafEntry};
pub use crate::entry::PageEntryBits;
pub use crate::table::{ENTRY_COUNT, PageTable, split_indices};

use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Minimal frame allocator used to obtain **physical** 4 KiB frames
/// for page tables and private page copies.
///
/// The implementation decides where frames come from (the frame pool, a
/// bump allocator in tests). Frames may carry arbitrary junk content; the
/// caller scrubs or overwrites as needed.
///
/// Returns `None` on out-of-memory.
pub trait FrameSource {
    /// Allocate one 4 KiB *physical* frame.
    fn alloc_frame(&self) -> Option<PhysicalPage<Size4K>>;
}

/// Converts physical addresses to *temporarily* usable pointers in the
/// current virtual address space (e.g., via identity map or a higher-half
/// direct map, HHDM).
///
/// Typical patterns:
/// - **Loader**: often identity-maps low memory; returns direct pointers.
/// - **Kernel**: uses HHDM; adds a constant offset before returning a pointer.
///
/// # Safety
/// - You must ensure `pa` is mapped as writable in the current page tables
///   for `&mut T`.
/// - Lifetime `'a` is purely borrow-checked; the mapping must remain valid
///   for `'a`.
/// - Type `T` must match the bytes at `pa` (no aliasing UB).
pub trait PhysMapper {
    /// Convert a *physical* address to a usable mutable pointer in the
    /// current address space.
    ///
    /// # Safety
    /// See the trait-level contract; `pa` must be mapped, writable, and
    /// correctly aligned for `T`.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;
}

/// Fill one whole frame with `byte`.
///
/// # Safety
/// - `page` must be mapped writable through `mapper` and not concurrently
///   accessed through any other reference.
pub unsafe fn fill_page<M: PhysMapper>(mapper: &M, page: PhysicalPage<Size4K>, byte: u8) {
    let bytes = unsafe { mapper.phys_to_mut::<[u8; PAGE_SIZE as usize]>(page.base()) };
    bytes.fill(byte);
}

/// Copy the full contents of frame `from` into frame `to`.
///
/// # Safety
/// - Both frames must be mapped through `mapper`, `to` writable, and the
///   two must be distinct frames.
pub unsafe fn copy_page<M: PhysMapper>(
    mapper: &M,
    from: PhysicalPage<Size4K>,
    to: PhysicalPage<Size4K>,
) {
    debug_assert_ne!(from.base().as_u64(), to.base().as_u64());
    let src = unsafe { mapper.phys_to_mut::<[u8; PAGE_SIZE as usize]>(from.base()) };
    let dst = unsafe { mapper.phys_to_mut::<[u8; PAGE_SIZE as usize]>(to.base()) };
    dst.copy_from_slice(src);
}

//! # Physical Memory Core
//!
//! The physical frame pool and copy-on-write machinery of the kernel:
//! whole-frame allocation with per-frame reference counts, fork-time frame
//! sharing, write-fault resolution, and hardware accessed-bit sampling.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │         COW Fault Resolution ([`cow`])              │
//! │    • write-fault candidate test                     │
//! │    • sole-owner fast path / private-copy slow path  │
//! └───────────────┬─────────────────────────────────────┘
//!                 │
//! ┌───────────────▼─────────────────────────────────────┐
//! │      Frame Pool ([`frame_alloc`])                   │
//! │    • index-linked free list                         │
//! │    • per-frame reference counts                     │
//! │    • scrub sentinels on free and allocate           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The independent accessed-bit sampler ([`access`]) sits beside the pool;
//! it shares only the page-table walker with the fault path.
//!
//! ## Ownership Model
//!
//! One [`FrameAllocator`](frame_alloc::FrameAllocator) is constructed at
//! boot over the free physical range and handed **by reference** to every
//! collaborator — the fault handler, the duplication path, the sampling
//! syscall. There is no global singleton.
//!
//! A *free* frame is owned exclusively by the pool. An *allocated* frame is
//! owned jointly by however many address spaces map it, tracked solely by
//! its reference count; frame contents may only be mutated while the count
//! is exactly 1, which the copy-on-write fault path enforces.
//!
//! ## Locking
//!
//! Two spin locks exist — one for the free list, one for the reference
//! table — and are **never held simultaneously**. All critical sections are
//! O(1); the full-page copy during fault resolution runs with no pool lock
//! held.
//!
//! ## Failure Taxonomy
//!
//! - [`FatalMisuse`] — a caller-side kernel bug (invalid free target,
//!   count underflow/overflow). The boot path aborts on it; it is never
//!   logged-and-ignored.
//! - [`OutOfMemory`] — the pool is exhausted. Recoverable: fail only the
//!   requesting operation.
//! - [`cow::FaultError`] / [`access::ScanError`] — per-operation failures
//!   of the fault and sampling paths.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod access;
pub mod cow;
mod error;
pub mod frame;
pub mod frame_alloc;
mod free_list;
mod ref_count;

pub use error::{FatalMisuse, OutOfMemory};
pub use frame::{FrameIndex, ManagedRange};
pub use frame_alloc::FrameAllocator;

#[cfg(test)]
pub(crate) mod sim;

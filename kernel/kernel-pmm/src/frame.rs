//! Validated frame identities.
//!
//! Raw address-to-index arithmetic happens in exactly one place:
//! [`FrameIndex::new`]. Everything downstream works with an index that is
//! known to be page-aligned and inside the managed range, so the pool never
//! re-checks addresses ad hoc.

use crate::error::FatalMisuse;
use kernel_info::memory::{MAX_PHYS_BYTES, PAGE_SIZE};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// The physical range the pool manages: `[start, end)`, both page-aligned.
///
/// Frames below `start` belong to the reserved kernel region; frames at or
/// above `end` do not exist as far as the pool is concerned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ManagedRange {
    start: PhysicalPage<Size4K>,
    end: PhysicalPage<Size4K>,
}

impl ManagedRange {
    /// Validate and build a managed range.
    ///
    /// # Errors
    /// [`FatalMisuse`] if either bound is misaligned, the range is empty or
    /// inverted, or the end exceeds [`MAX_PHYS_BYTES`].
    pub fn new(start: PhysicalAddress, end: PhysicalAddress) -> Result<Self, FatalMisuse> {
        let start_page =
            PhysicalPage::from_aligned(start).ok_or(FatalMisuse::Misaligned(start))?;
        let end_page = PhysicalPage::from_aligned(end).ok_or(FatalMisuse::Misaligned(end))?;
        if start.as_u64() >= end.as_u64() {
            return Err(FatalMisuse::EmptyRange(start));
        }
        if end.as_u64() > MAX_PHYS_BYTES {
            return Err(FatalMisuse::BeyondPhysicalLimit(end));
        }
        Ok(Self {
            start: start_page,
            end: end_page,
        })
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> PhysicalAddress {
        self.start.base()
    }

    /// Exclusive end of the range.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        self.end.base()
    }

    /// Number of page frames inside the range.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn frame_count(&self) -> usize {
        ((self.end().as_u64() - self.start().as_u64()) / PAGE_SIZE) as usize
    }

    /// All frames of the range, ascending by address.
    pub fn frames(&self) -> impl Iterator<Item = PhysicalPage<Size4K>> {
        let start = self.start().as_u64();
        (0..self.frame_count()).map(move |i| {
            PhysicalAddress::new(start + i as u64 * PAGE_SIZE).page::<Size4K>()
        })
    }
}

/// Index of a frame inside the compile-time physical bound
/// (`address / PAGE_SIZE`).
///
/// A value of this type is proof that the originating address was
/// page-aligned and inside the managed range.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FrameIndex(u32);

impl FrameIndex {
    /// The single validated conversion point from address to index.
    ///
    /// # Errors
    /// - [`FatalMisuse::Misaligned`] if `pa` is not page-aligned.
    /// - [`FatalMisuse::BelowManagedRange`] if `pa` lies in the reserved
    ///   kernel region below the managed range.
    /// - [`FatalMisuse::BeyondManagedRange`] if `pa` lies at or above the
    ///   managed range's end.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(pa: PhysicalAddress, range: &ManagedRange) -> Result<Self, FatalMisuse> {
        if !pa.is_aligned::<Size4K>() {
            return Err(FatalMisuse::Misaligned(pa));
        }
        if pa.as_u64() < range.start().as_u64() {
            return Err(FatalMisuse::BelowManagedRange(pa));
        }
        if pa.as_u64() >= range.end().as_u64() {
            return Err(FatalMisuse::BeyondManagedRange(pa));
        }
        Ok(Self((pa.as_u64() / PAGE_SIZE) as u32))
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The frame's base address.
    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 as u64 * PAGE_SIZE)
    }

    /// The frame as a typed physical page.
    #[inline]
    #[must_use]
    pub const fn page(self) -> PhysicalPage<Size4K> {
        // base() is aligned by construction, so containing() never truncates
        PhysicalPage::containing(self.base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> ManagedRange {
        ManagedRange::new(PhysicalAddress::new(0x0080_0000), PhysicalAddress::new(0x0090_0000))
            .unwrap()
    }

    #[test]
    fn range_validation() {
        assert_eq!(
            ManagedRange::new(PhysicalAddress::new(0x0080_0001), PhysicalAddress::new(0x0090_0000)),
            Err(FatalMisuse::Misaligned(PhysicalAddress::new(0x0080_0001)))
        );
        assert_eq!(
            ManagedRange::new(PhysicalAddress::new(0x0090_0000), PhysicalAddress::new(0x0080_0000)),
            Err(FatalMisuse::EmptyRange(PhysicalAddress::new(0x0090_0000)))
        );
        assert_eq!(
            ManagedRange::new(PhysicalAddress::new(0x0080_0000), PhysicalAddress::new(0x1000_0000)),
            Err(FatalMisuse::BeyondPhysicalLimit(PhysicalAddress::new(0x1000_0000)))
        );
        assert_eq!(range().frame_count(), 256);
    }

    #[test]
    fn index_construction_validates_once() {
        let r = range();
        let pa = PhysicalAddress::new(0x0080_3000);
        let idx = FrameIndex::new(pa, &r).unwrap();
        assert_eq!(idx.base(), pa);
        assert_eq!(idx.page().base(), pa);
        assert_eq!(idx.as_usize(), 0x0080_3000 / 4096);
    }

    #[test]
    fn index_rejects_invalid_addresses() {
        let r = range();
        assert_eq!(
            FrameIndex::new(PhysicalAddress::new(0x0080_3001), &r),
            Err(FatalMisuse::Misaligned(PhysicalAddress::new(0x0080_3001)))
        );
        assert_eq!(
            FrameIndex::new(PhysicalAddress::new(0x0070_0000), &r),
            Err(FatalMisuse::BelowManagedRange(PhysicalAddress::new(0x0070_0000)))
        );
        assert_eq!(
            FrameIndex::new(PhysicalAddress::new(0x0090_0000), &r),
            Err(FatalMisuse::BeyondManagedRange(PhysicalAddress::new(0x0090_0000)))
        );
    }

    #[test]
    fn range_frames_iterates_in_order() {
        let r = ManagedRange::new(
            PhysicalAddress::new(0x0080_0000),
            PhysicalAddress::new(0x0080_3000),
        )
        .unwrap();
        let bases: Vec<u64> = r.frames().map(|p| p.base().as_u64()).collect();
        assert_eq!(bases, vec![0x0080_0000, 0x0080_1000, 0x0080_2000]);
    }
}

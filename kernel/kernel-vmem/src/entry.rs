use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};

/// Represents a single 64-bit x86-64 page table entry in its raw bitfield
/// form.
///
/// This structure models the **common superset** of fields found in all
/// four paging levels (PML4E, PDPTE, PDE, PTE). Since the kernel only
/// installs 4 KiB leaves, the large-page (PS) bit is always clear and the
/// same entry type serves every level: a present entry either points to the
/// next-level table or, at the PT level, maps one 4 KiB frame.
///
/// ### Bit layout (canonical)
///
/// | Bits      | Name / Mnemonic   | Meaning |
/// |-----------|-------------------|----------|
/// | 0         | `P` (present)     | Valid entry if set |
/// | 1         | `RW`              | Writable if set |
/// | 2         | `US`              | User-mode accessible if set |
/// | 3         | `PWT`             | Write-through caching |
/// | 4         | `PCD`             | Disable caching |
/// | 5         | `A`               | Accessed |
/// | 6         | `D`               | Dirty (leaf only) |
/// | 7         | `PS`              | Large page flag (always 0 here) |
/// | 8         | `G`               | Global (leaf only) |
/// | 9         | OS avail          | **Software copy-on-write marker** |
/// | 10–11     | OS avail low      | Reserved for OS use |
/// | 12–51     | `addr`            | Physical frame bits [51:12] |
/// | 52–58     | OS avail high     | Reserved for OS use |
/// | 59–62     | `PKU` / OS use    | Protection key or OS use |
/// | 63        | `NX`              | Execute disable |
///
/// ### The copy-on-write marker
///
/// Bit 9 is ignored by hardware and reserved for the OS. A leaf entry with
/// [`cow_shared`](Self::cow_shared) set maps a frame whose contents are
/// shared across address spaces: the entry is deliberately **not writable**,
/// and a write fault on it means "make a private copy first", not "kill the
/// process". [`make_cow_child`](Self::make_cow_child) and
/// [`make_cow_private`](Self::make_cow_private) are the only two transitions
/// the kernel applies to the marker.
#[bitfield(u64)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Set if the entry points to a valid next-level table or a valid leaf
    /// mapping. Clear implies a not-present entry.
    pub present: bool,

    /// Writable (RW, bit 1).
    ///
    /// Set to allow writes; clear for read-only. A copy-on-write leaf keeps
    /// this clear until the fault path installs a private copy.
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    ///
    /// Set to allow user-mode access; clear restricts to supervisor only.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5).
    ///
    /// Set by the CPU on first access through this entry. Software may
    /// clear it to track usage; the access-sampling scan does exactly that.
    pub accessed: bool,

    /// Dirty (D, bit 6) — **leaf only**.
    ///
    /// Set by the CPU on first write to a leaf mapping.
    pub dirty: bool,

    /// Large Page / Page Size (PS, bit 7).
    ///
    /// Must stay clear: the kernel maps 4 KiB pages only.
    pub large_page: bool,

    /// Global (G, bit 8) — **leaf only**.
    pub global_translation: bool,

    /// Software copy-on-write marker (OS-available bit 9).
    ///
    /// "Writable only after a private copy." Never interpreted by hardware.
    pub cow_shared: bool,

    /// OS-available (bits 10..=11).
    #[bits(2)]
    pub os_available_low: u8,

    /// Physical address bits [51:12] (bits 12..=51).
    ///
    /// Stores the page-aligned physical frame address without the low 12
    /// bits. Reconstruct the full physical address as `(bits << 12)`.
    #[bits(40)]
    phys_addr_bits_51_12: u64,

    /// OS-available (bits 52..=58).
    #[bits(7)]
    pub os_available_high: u8,

    /// Protection Key (PKU, bits 59..=62) if supported; otherwise OS use.
    #[bits(4)]
    pub protection_key: u8,

    /// No-Execute (NX, bit 63) — Execute Disable.
    pub no_execute: bool,
}

impl PageEntryBits {
    #[inline]
    pub const fn set_physical_address(&mut self, phys: PhysicalAddress) {
        // store bits [51:12]
        self.set_phys_addr_bits_51_12(phys.as_u64() >> 12);
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.phys_addr_bits_51_12() << 12)
    }

    /// The mapped frame, if the entry is present.
    #[inline]
    #[must_use]
    pub fn page(&self) -> Option<PhysicalPage<Size4K>> {
        if !self.present() {
            return None;
        }
        debug_assert!(!self.large_page(), "large pages are never installed");
        Some(self.physical_address().page::<Size4K>())
    }

    /// Entry pointing at the next-level table frame.
    ///
    /// Sets `present=1`, forces `PS=0`, and writes the table base address.
    #[inline]
    #[must_use]
    pub const fn make_next_table(page: PhysicalPage<Size4K>, flags: Self) -> Self {
        let mut e = flags.with_large_page(false).with_present(true);
        e.set_physical_address(page.base());
        e
    }

    /// 4 KiB leaf entry (`PS=0`). The base must be 4 KiB-aligned.
    #[inline]
    #[must_use]
    pub const fn make_page(page: PhysicalPage<Size4K>, flags: Self) -> Self {
        // identical encoding; named separately for intent at call sites
        Self::make_next_table(page, flags)
    }

    /// Flags for a freshly linked intermediate table (present + writable).
    #[inline]
    #[must_use]
    pub const fn new_table_flags() -> Self {
        Self::new().with_present(true).with_writable(true)
    }

    /// Leaf flags for an ordinary user read/write mapping.
    #[inline]
    #[must_use]
    pub const fn new_user_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(true)
    }

    /// The child-side entry a duplication path installs when it shares this
    /// frame instead of copying it: write-trapped and marked copy-on-write.
    #[inline]
    #[must_use]
    pub const fn make_cow_child(self) -> Self {
        self.with_writable(false).with_cow_shared(true)
    }

    /// The resolved entry after a fault granted private ownership: writable
    /// again, marker cleared.
    #[inline]
    #[must_use]
    pub const fn make_cow_private(self) -> Self {
        self.with_writable(true).with_cow_shared(false)
    }
}

//! # Memory Layout

/// Size of one page frame in bytes. The only translation granularity the
/// kernel uses.
pub const PAGE_SIZE: u64 = 4096;

/// Highest physical address the kernel will ever manage (exclusive).
///
/// Sizes the per-frame reference-count table; frame indices are validated
/// against this bound at construction.
pub const MAX_PHYS_BYTES: u64 = 0x0800_0000; // 128 MiB

/// Number of page frames covered by [`MAX_PHYS_BYTES`].
#[allow(clippy::cast_possible_truncation)]
pub const PHYS_PAGE_COUNT: usize = (MAX_PHYS_BYTES / PAGE_SIZE) as usize;

/// First physical address past the kernel image. Frames below this line are
/// permanently reserved and must never reach the frame pool.
///
/// # Kernel Build
/// Must match the end of the kernel's load region in the linker script.
pub const KERNEL_IMAGE_END: u64 = 0x0080_0000; // 8 MiB

/// End of the userspace VA range (exclusive). Fault resolution rejects any
/// virtual address at or above this line.
pub const USER_SPACE_END: u64 = 0x0000_8000_0000_0000;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(MAX_PHYS_BYTES.is_multiple_of(PAGE_SIZE));
    assert!(KERNEL_IMAGE_END.is_multiple_of(PAGE_SIZE));
    assert!(KERNEL_IMAGE_END < MAX_PHYS_BYTES);
    assert!(USER_SPACE_END.is_multiple_of(PAGE_SIZE));
};

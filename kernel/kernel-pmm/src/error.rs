use kernel_memory_addresses::PhysicalAddress;

/// Unrecoverable misuse of the frame pool.
///
/// Every variant indicates a bug in the *calling* kernel code, not a
/// runtime condition: the address handed to a pool operation was never a
/// valid frame, or the per-frame accounting was driven into a state it can
/// never legally reach. The boot/initialization path must treat this as an
/// abort; library callers forward it, they never swallow it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalMisuse {
    #[error("frame address is not page-aligned: {0}")]
    Misaligned(PhysicalAddress),
    #[error("frame address lies inside the reserved kernel region: {0}")]
    BelowManagedRange(PhysicalAddress),
    #[error("frame address lies at or beyond the managed range: {0}")]
    BeyondManagedRange(PhysicalAddress),
    #[error("managed range is empty or inverted at {0}")]
    EmptyRange(PhysicalAddress),
    #[error("managed range end exceeds the physical limit: {0}")]
    BeyondPhysicalLimit(PhysicalAddress),
    #[error("frame released into the pool twice: {0}")]
    DoubleRegistration(PhysicalAddress),
    #[error("reference count underflow for frame {0}")]
    RefCountUnderflow(PhysicalAddress),
    #[error("reference count overflow for frame {0}")]
    RefCountOverflow(PhysicalAddress),
    #[error("shared a frame that is not allocated: {0}")]
    ShareOfFreeFrame(PhysicalAddress),
}

/// The frame pool is exhausted.
///
/// Recoverable: the caller fails the single requesting operation (e.g.,
/// terminates the faulting process), never the whole system.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("out of physical frames")]
pub struct OutOfMemory;

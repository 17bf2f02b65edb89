/// Bits 36..48 set on kernelcache segment addresses whose upper bits were
/// reused for chained-fixup metadata.
pub const KERNEL_TAG_MASK: u64 = 0x0000_fff0_0000_0000;

pub const KERNEL_HIGH_BITS: u64 = 0xffff_0000_0000_0000;

/// Restores the canonical kernel-space form of a tagged virtual address.
///
/// Untagged addresses pass through unchanged, and a canonical result still
/// carries the tag, so applying this twice is the same as applying it once.
#[must_use]
pub fn canonicalize(raw: u64) -> u64 {
    if raw & KERNEL_TAG_MASK == KERNEL_TAG_MASK {
        raw | KERNEL_HIGH_BITS
    } else {
        raw
    }
}

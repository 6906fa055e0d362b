use std::fmt;

/// A contiguous span of heap address space, `[start, start + size)`.
///
/// Sizes are in bytes. The empty region is the identity for every marking
/// operation: dirtying it is a no-op and an empty deferred slot means "idle".
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MemRegion {
    start: usize,
    size: usize,
}

impl MemRegion {
    pub const fn empty() -> Self {
        Self { start: 0, size: 0 }
    }

    pub fn new(start: usize, size: usize) -> Self {
        debug_assert!(start.checked_add(size).is_some());
        Self { start, size }
    }

    /// Region covering `[start, end)`.
    pub fn from_range(start: usize, end: usize) -> Self {
        assert!(start <= end, "invalid region [{:#x}, {:#x})", start, end);
        Self {
            start,
            size: end - start,
        }
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end()
    }
}

impl fmt::Debug for MemRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemRegion[{:#x}, {:#x})", self.start, self.end())
    }
}

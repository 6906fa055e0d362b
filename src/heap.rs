/// Generation geometry supplied by the heap that owns the barrier.
///
/// The barrier treats the heap as a black box: it only needs to classify an
/// address as young or old and to recover the declared size of an object from
/// its address (used for the flush-time consistency check on deferred marks).
pub trait HeapLayout: Send + Sync {
    /// Does `addr` fall inside the young generation?
    fn is_in_young(&self, addr: usize) -> bool;

    /// Declared size in bytes of the object starting at `addr`.
    ///
    /// Only called on addresses the allocator previously reported through the
    /// slow-path allocation hook, while the object is fully constructed.
    fn object_size(&self, addr: usize) -> usize;
}

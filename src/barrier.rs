//! Card-table write barrier.
//!
//! This kind of barrier lets a generational heap detect and enumerate the
//! reference fields that were modified since the last collection: every
//! reference mutation dirties the card covering the written slots, and the
//! collector rescans only dirty cards.
//!
//! For performance, compiled code may elide card marks for the initializing
//! stores to a newly allocated object along the fast path. We compensate for
//! the elided marks at slow-path allocation exit: collectors that do not scan
//! cards concurrently only need the mark completed before the next scavenge,
//! so it can be performed right there; collectors that do scan concurrently
//! require the mark to strictly follow the initializing stores, so the region
//! is parked in the thread's deferred slot and marked at the next slow-path
//! allocation by that thread, the next collection coordination point, or
//! thread detach, whichever comes first.

use std::mem::size_of;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::card_table::CardTable;
use crate::heap::HeapLayout;
use crate::mem_region::MemRegion;
use crate::mutator::Mutator;
use crate::policy::{BarrierOptions, BarrierPolicy};
use crate::statistics::BarrierStatistics;
use crate::utils::{align_down, align_up};

/// Identity tag for the closed set of barrier strategies. Allocation fast
/// paths branch on this instead of making a virtual call. Only
/// [`CardTableModRef`](BarrierKind::CardTableModRef) is implemented here;
/// the sibling strategies belong to other collector families.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BarrierKind {
    CardTableModRef,
    RegionRemember,
    PreWriteLog,
}

/// The active barrier strategy, as a sealed set of variants so dispatch is a
/// branch on the tag rather than a vtable lookup.
pub enum BarrierSet {
    CardTableModRef(CardTableBarrier),
}

impl BarrierSet {
    pub fn new_card_table(
        heap_begin: usize,
        heap_size: usize,
        heap: Arc<dyn HeapLayout>,
        options: BarrierOptions,
    ) -> Arc<BarrierSet> {
        Arc::new(BarrierSet::CardTableModRef(CardTableBarrier::new(
            heap_begin, heap_size, heap, options,
        )))
    }

    #[inline(always)]
    pub fn kind(&self) -> BarrierKind {
        match self {
            BarrierSet::CardTableModRef(_) => BarrierKind::CardTableModRef,
        }
    }

    #[inline(always)]
    pub fn as_card_table(&self) -> Option<&CardTableBarrier> {
        match self {
            BarrierSet::CardTableModRef(barrier) => Some(barrier),
        }
    }

    #[inline(always)]
    pub fn record_field_write(&self, addr: usize) {
        match self {
            BarrierSet::CardTableModRef(barrier) => barrier.record_field_write(addr),
        }
    }

    #[inline(always)]
    pub fn record_array_write(&self, start: usize, element_count: usize) {
        match self {
            BarrierSet::CardTableModRef(barrier) => {
                barrier.record_array_write(start, element_count)
            }
        }
    }

    #[inline(always)]
    pub fn record_bulk_overwrite(&self, mr: MemRegion) {
        match self {
            BarrierSet::CardTableModRef(barrier) => barrier.record_bulk_overwrite(mr),
        }
    }

    pub fn on_slowpath_allocation_exit(
        &self,
        thread: &mut Mutator,
        new_obj: usize,
        is_primitive_array: bool,
    ) {
        match self {
            BarrierSet::CardTableModRef(barrier) => {
                barrier.on_slowpath_allocation_exit(thread, new_obj, is_primitive_array)
            }
        }
    }

    pub fn flush_deferred_card_mark(&self, thread: &mut Mutator) {
        match self {
            BarrierSet::CardTableModRef(barrier) => barrier.flush_deferred_card_mark(thread),
        }
    }

    pub fn on_thread_detach(&self, thread: &mut Mutator) {
        match self {
            BarrierSet::CardTableModRef(barrier) => barrier.on_thread_detach(thread),
        }
    }

    pub(crate) fn attach_mutator(&self, mutator: *mut Mutator) {
        match self {
            BarrierSet::CardTableModRef(barrier) => barrier.attach_mutator(mutator),
        }
    }

    pub(crate) fn detach_mutator(&self, mutator: *mut Mutator) {
        match self {
            BarrierSet::CardTableModRef(barrier) => barrier.detach_mutator(mutator),
        }
    }

    /// Asserts that no attached mutator still carries a deferred card mark.
    ///
    /// The collector runs this before processing the card table.
    ///
    /// # Safety
    ///
    /// All attached mutator threads must be quiesced at a safepoint; the walk
    /// reads their thread-local deferred slots.
    pub unsafe fn verify_no_deferred_marks(&self) {
        match self {
            BarrierSet::CardTableModRef(barrier) => barrier.verify_no_deferred_marks(),
        }
    }
}

/// Card-table based implementation of the reference-mutation barrier.
///
/// Shared by all mutator threads; read-mostly after construction. The card
/// table is exclusively owned and dropped with the barrier.
pub struct CardTableBarrier {
    card_table: CardTable,
    policy: BarrierPolicy,
    heap: Arc<dyn HeapLayout>,
    statistics: BarrierStatistics,
    mutators: Mutex<Vec<*mut Mutator>>,
}

unsafe impl Send for CardTableBarrier {}
unsafe impl Sync for CardTableBarrier {}

impl CardTableBarrier {
    /// Upper bound on `element_count` for
    /// [`record_array_write`](Self::record_array_write); keeps the covering
    /// byte range from overflowing an address computation. A larger count is
    /// a corrupted caller, not a real array.
    pub const MAX_ARRAY_WRITE_ELEMENTS: usize = (isize::MAX as usize) >> 3;

    pub fn new(
        heap_begin: usize,
        heap_size: usize,
        heap: Arc<dyn HeapLayout>,
        options: BarrierOptions,
    ) -> Self {
        let policy = BarrierPolicy::resolve(&options);
        let card_table = CardTable::new(heap_begin, heap_size);
        if policy.verbose {
            eprintln!(
                "[gc] card barrier: {} cards over [{:#x}, {:#x}), elide={} defer={}",
                card_table.num_cards(),
                heap_begin,
                heap_begin + heap_size,
                policy.elide_initializing_store_barriers,
                policy.defer_initial_card_mark,
            );
        }
        Self {
            card_table,
            policy,
            heap,
            statistics: BarrierStatistics::default(),
            mutators: Mutex::new(Vec::new()),
        }
    }

    pub fn card_table(&self) -> &CardTable {
        &self.card_table
    }

    pub fn policy(&self) -> &BarrierPolicy {
        &self.policy
    }

    pub fn statistics(&self) -> &BarrierStatistics {
        &self.statistics
    }

    /// Records a single reference-field store at `addr`. Called from
    /// interpreter stubs and runtime helpers on every reference store that is
    /// not covered by an elided initialization sequence.
    #[inline(always)]
    pub fn record_field_write(&self, addr: usize) {
        self.card_table
            .dirty_region(MemRegion::new(addr, self.policy.reference_size));
        BarrierStatistics::count(&self.statistics.field_writes);
    }

    /// Records a store of `element_count` consecutive reference slots
    /// starting at `start`.
    ///
    /// The covering byte range is rounded outward (start down, end up) to the
    /// native word: with narrow reference encodings the raw range can start
    /// or end mid-word, and rounding inward could miss a touched card.
    /// Over-marking an adjacent card is only a performance cost; under-marking
    /// loses a mutation.
    #[inline]
    pub fn record_array_write(&self, start: usize, element_count: usize) {
        assert!(
            element_count <= Self::MAX_ARRAY_WRITE_ELEMENTS,
            "array write of {} elements: corrupted caller",
            element_count
        );
        if element_count == 0 {
            return;
        }
        let end = start + element_count * self.policy.reference_size;
        let covering = MemRegion::from_range(
            align_down(start, size_of::<usize>()),
            align_up(end, size_of::<usize>()),
        );
        self.card_table.dirty_region(covering);
        BarrierStatistics::count(&self.statistics.array_writes);
    }

    /// Records that `mr` was overwritten without per-element barriers, e.g.
    /// by a structural copy.
    #[inline]
    pub fn record_bulk_overwrite(&self, mr: MemRegion) {
        self.card_table.invalidate(mr);
        BarrierStatistics::count(&self.statistics.bulk_overwrites);
    }

    /// Compensates for elided initializing-store barriers. Invoked once per
    /// slow-path allocation, after the object's memory is reserved; the
    /// caller's initializing stores may still be pending.
    pub fn on_slowpath_allocation_exit(
        &self,
        thread: &mut Mutator,
        new_obj: usize,
        is_primitive_array: bool,
    ) {
        if !self.policy.elide_initializing_store_barriers {
            return;
        }
        // If a previous card mark was deferred, flush it now.
        self.flush_deferred_card_mark(thread);
        if is_primitive_array || self.heap.is_in_young(new_obj) {
            // Arrays of non-references don't need a post-barrier, and young
            // objects are scanned wholesale at the next scavenge. The
            // deferred slot must be empty following the flush above.
            assert!(
                thread.deferred_card_mark().is_empty(),
                "deferred card mark survived a flush"
            );
            return;
        }
        let mr = MemRegion::new(new_obj, self.heap.object_size(new_obj));
        assert!(!mr.is_empty(), "zero-sized object at {:#x}", new_obj);
        if self.policy.defer_initial_card_mark {
            thread.set_deferred_card_mark(mr);
            BarrierStatistics::count(&self.statistics.deferred_marks);
        } else {
            // The collector tolerates marks preceding the stores they cover,
            // so mark right here instead of deferring.
            self.card_table.invalidate(mr);
            BarrierStatistics::count(&self.statistics.eager_initial_marks);
        }
    }

    /// Performs the card mark for the thread's deferred region, if any, and
    /// empties the slot. A thread's own initializing stores are program-order
    /// visible to its own flush, so no extra fence is needed here.
    pub fn flush_deferred_card_mark(&self, thread: &mut Mutator) {
        let deferred = thread.deferred_card_mark();
        if deferred.is_empty() {
            return;
        }
        assert!(
            self.policy.defer_initial_card_mark,
            "deferred slot armed while deferral is disabled"
        );
        // The slot must still describe exactly one fully constructed object
        // in the old generation; anything else means the allocator or code
        // generator broke the protocol.
        assert!(
            !self.heap.is_in_young(deferred.start()),
            "deferred card mark for young object {:?}: should have been \
             filtered at allocation exit",
            deferred
        );
        assert_eq!(
            deferred.size(),
            self.heap.object_size(deferred.start()),
            "deferred card mark does not span a single object: {:?}",
            deferred
        );
        self.card_table.invalidate(deferred);
        thread.clear_deferred_card_mark();
        BarrierStatistics::count(&self.statistics.deferred_flushes);
    }

    /// Deferred marks must all have reached the card table before a thread
    /// becomes unobservable to collection. Invoked at every mutator exit and
    /// detach point.
    pub fn on_thread_detach(&self, thread: &mut Mutator) {
        self.flush_deferred_card_mark(thread);
    }

    pub(crate) fn attach_mutator(&self, mutator: *mut Mutator) {
        self.mutators.lock().push(mutator);
    }

    pub(crate) fn detach_mutator(&self, mutator: *mut Mutator) {
        let mut mutators = self.mutators.lock();
        let mut detached = false;
        mutators.retain(|&m| {
            if m == mutator {
                detached = true;
                false
            } else {
                true
            }
        });
        assert!(detached, "mutator must be attached");
    }

    pub(crate) unsafe fn verify_no_deferred_marks(&self) {
        let mutators = self.mutators.lock();
        for &mutator in mutators.iter() {
            assert!(
                (*mutator).deferred_card_mark().is_empty(),
                "mutator reached a collection point with an unflushed \
                 deferred card mark"
            );
        }
    }
}

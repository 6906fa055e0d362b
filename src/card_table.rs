//! Byte-per-card dirty table covering the managed heap range.
//!
//! All writes of references to heap addresses go through an entry in the
//! barrier, and from there to here. Card bytes are written with relaxed
//! atomic stores: the mutator-side transition is monotonic clean -> dirty,
//! so two threads dirtying the same card concurrently is harmless.

use std::sync::atomic::{AtomicU8, Ordering};

use memmap2::MmapMut;

use crate::mem_region::MemRegion;
use crate::oom_abort;

pub struct CardTable {
    /// Mmapped pages backing the table, one byte per card.
    mem_map: MmapMut,
    cards: *mut u8,
    heap_begin: usize,
    heap_size: usize,
    num_cards: usize,
}

unsafe impl Send for CardTable {}
unsafe impl Sync for CardTable {}

impl CardTable {
    pub const CARD_SHIFT: usize = 9;
    pub const CARD_SIZE: usize = 1 << Self::CARD_SHIFT;
    pub const CARD_CLEAN: u8 = 0x0;
    pub const CARD_DIRTY: u8 = 0x70;

    /// Allocates a table sized to cover `[heap_begin, heap_begin + heap_size)`.
    /// The table lives as long as the barrier that owns it.
    pub fn new(heap_begin: usize, heap_size: usize) -> Self {
        assert!(heap_size > 0, "card table over an empty heap");
        assert!(
            heap_begin.checked_add(heap_size).is_some(),
            "heap range wraps the address space"
        );
        let num_cards = (heap_size + Self::CARD_SIZE - 1) >> Self::CARD_SHIFT;
        let mut mem_map = match MmapMut::map_anon(num_cards) {
            Ok(map) => map,
            Err(_) => oom_abort(),
        };
        let cards = mem_map.as_mut_ptr();
        Self {
            mem_map,
            cards,
            heap_begin,
            heap_size,
            num_cards,
        }
    }

    pub fn heap_begin(&self) -> usize {
        self.heap_begin
    }

    pub fn heap_size(&self) -> usize {
        self.heap_size
    }

    pub fn num_cards(&self) -> usize {
        self.num_cards
    }

    pub fn mem_map_size(&self) -> usize {
        self.mem_map.len()
    }

    /// Index of the card covering `addr`. Every covered heap address maps to
    /// exactly one card; an address outside the range is a caller bug.
    #[inline]
    pub fn card_index(&self, addr: usize) -> usize {
        assert!(
            addr >= self.heap_begin && addr < self.heap_begin + self.heap_size,
            "address {:#x} outside the heap range covered by the card table",
            addr
        );
        (addr - self.heap_begin) >> Self::CARD_SHIFT
    }

    /// First heap address covered by card `index`.
    #[inline]
    pub fn card_begin(&self, index: usize) -> usize {
        debug_assert!(index < self.num_cards);
        self.heap_begin + (index << Self::CARD_SHIFT)
    }

    #[inline]
    fn card(&self, index: usize) -> &AtomicU8 {
        debug_assert!(index < self.num_cards);
        unsafe { &*self.cards.add(index).cast::<AtomicU8>() }
    }

    #[inline]
    pub fn is_dirty(&self, index: usize) -> bool {
        self.card(index).load(Ordering::Relaxed) == Self::CARD_DIRTY
    }

    /// Marks every card overlapping `mr` dirty. Idempotent; never blocks.
    pub fn dirty_region(&self, mr: MemRegion) {
        if mr.is_empty() {
            return;
        }
        let first = self.card_index(mr.start());
        let last = self.card_index(mr.end() - 1);
        for index in first..=last {
            self.card(index).store(Self::CARD_DIRTY, Ordering::Relaxed);
        }
    }

    /// Same effect as [`dirty_region`](Self::dirty_region); separate entry
    /// point for bulk/structural overwrites (array copies and the like).
    pub fn invalidate(&self, mr: MemRegion) {
        self.dirty_region(mr);
    }

    /// Resets every card overlapping `mr` to clean. Collector-only: mutators
    /// never transition a card dirty -> clean.
    pub fn clear_region(&self, mr: MemRegion) {
        if mr.is_empty() {
            return;
        }
        let first = self.card_index(mr.start());
        let last = self.card_index(mr.end() - 1);
        for index in first..=last {
            self.card(index).store(Self::CARD_CLEAN, Ordering::Relaxed);
        }
    }

    /// Invokes `visitor` with the begin address of every dirty card
    /// overlapping `mr`. Used by the collector during its scan phase; the
    /// caller is responsible for having quiesced mutators first.
    pub fn scan_dirty(&self, mr: MemRegion, mut visitor: impl FnMut(usize)) {
        if mr.is_empty() {
            return;
        }
        let first = self.card_index(mr.start());
        let last = self.card_index(mr.end() - 1);
        for index in first..=last {
            if self.is_dirty(index) {
                visitor(self.card_begin(index));
            }
        }
    }
}

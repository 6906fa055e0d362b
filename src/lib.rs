//! Card-marking write barrier for generational garbage collectors.
//!
//! A generational collector wants to avoid rescanning the whole heap on every
//! cycle; this crate records, cheaply and precisely, which cards (fixed-size
//! slices of heap address space) were mutated since the last collection.
//! It covers the card table itself, the barrier entry points called by
//! interpreted and compiled code on reference stores, and the deferred
//! initial-mark protocol that lets compiled code skip barriers on the
//! initializing stores of freshly allocated objects.
//!
//! The heap, the collector and the code generator are collaborators behind
//! narrow seams: generation geometry comes in through
//! [`HeapLayout`](heap::HeapLayout), the collector reads cards through
//! [`CardTable`](card_table::CardTable), and allocation/thread lifecycle
//! hooks live on [`BarrierSet`](barrier::BarrierSet) and
//! [`MutatorRef`](mutator::MutatorRef).
//!
//! Contract violations (double-armed deferred slots, oversized array writes,
//! flush-time consistency failures) indicate a defect in a collaborating
//! component and panic; embedders are expected to build runtimes with
//! `panic = "abort"` so a breach halts rather than unwinding past the heap.

pub mod barrier;
pub mod card_table;
pub mod heap;
pub mod mem_region;
pub mod mutator;
pub mod policy;
pub mod statistics;
pub mod utils;


#[cold]
pub fn oom_abort() -> ! {
    eprintln!("OutOfMemory");
    std::process::abort();
}

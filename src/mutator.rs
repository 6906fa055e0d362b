//! Per-thread mutator context.
//!
//! The deferred card mark slot is strictly thread-local: no other thread
//! reads or writes it while the owner runs. The barrier only walks attached
//! contexts at collection coordination points, when mutators are quiesced.

use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::barrier::BarrierSet;
use crate::mem_region::MemRegion;

/// State a mutator thread carries on behalf of the barrier: at most one
/// pending region, "the most recent freshly allocated object whose barrier
/// was elided, not yet confirmed marked".
pub struct Mutator {
    barrier: Arc<BarrierSet>,
    deferred_card_mark: MemRegion,
}

impl Mutator {
    pub fn barrier(&self) -> &Arc<BarrierSet> {
        &self.barrier
    }

    #[inline]
    pub fn deferred_card_mark(&self) -> MemRegion {
        self.deferred_card_mark
    }

    /// Arms the deferred slot. The slot holds at most one region: arming on
    /// top of an existing one means two allocations raced into the slot
    /// without an intervening flush, which is fatal.
    pub(crate) fn set_deferred_card_mark(&mut self, mr: MemRegion) {
        assert!(
            self.deferred_card_mark.is_empty(),
            "deferred card mark already armed: {:?}",
            self.deferred_card_mark
        );
        debug_assert!(!mr.is_empty());
        self.deferred_card_mark = mr;
    }

    pub(crate) fn clear_deferred_card_mark(&mut self) {
        self.deferred_card_mark = MemRegion::empty();
    }
}

/// Owning handle to a [`Mutator`] attached to a barrier. Dropping the handle
/// runs the detach guard, so a thread can never become unobservable to the
/// collector while its deferred slot is armed.
pub struct MutatorRef {
    mutator: NonNull<Mutator>,
}

unsafe impl Send for MutatorRef {}

impl MutatorRef {
    /// Attaches the current thread to `barrier`.
    pub fn attach(barrier: Arc<BarrierSet>) -> MutatorRef {
        let mutator = Box::into_raw(Box::new(Mutator {
            barrier: barrier.clone(),
            deferred_card_mark: MemRegion::empty(),
        }));
        barrier.attach_mutator(mutator);
        MutatorRef {
            mutator: unsafe { NonNull::new_unchecked(mutator) },
        }
    }

    /// Slow-path allocation hook; see
    /// [`CardTableBarrier::on_slowpath_allocation_exit`](crate::barrier::CardTableBarrier::on_slowpath_allocation_exit).
    pub fn on_slowpath_allocation_exit(&mut self, new_obj: usize, is_primitive_array: bool) {
        let barrier = self.barrier.clone();
        barrier.on_slowpath_allocation_exit(&mut *self, new_obj, is_primitive_array);
    }

    pub fn flush_deferred_card_mark(&mut self) {
        let barrier = self.barrier.clone();
        barrier.flush_deferred_card_mark(&mut *self);
    }
}

impl Deref for MutatorRef {
    type Target = Mutator;
    fn deref(&self) -> &Self::Target {
        unsafe { &*self.mutator.as_ptr() }
    }
}

impl DerefMut for MutatorRef {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.mutator.as_ptr() }
    }
}

impl Drop for MutatorRef {
    fn drop(&mut self) {
        unsafe {
            let mutator = self.mutator.as_ptr();
            let barrier = (*mutator).barrier.clone();
            barrier.on_thread_detach(&mut *mutator);
            barrier.detach_mutator(mutator);
            drop(Box::from_raw(mutator));
        }
    }
}

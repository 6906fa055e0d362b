//! Barrier policy, resolved once at construction.
//!
//! The decision whether compiled code may elide initializing-store barriers,
//! and whether the compensating card mark must be deferred past those stores,
//! depends on the compiler tier and on collector behaviour. All inputs are
//! collapsed into one immutable value object here so nothing on a hot path
//! ever re-reads scattered configuration.

use std::mem::size_of;

/// Tier of the code generator feeding this barrier.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CompilerTier {
    Interpreter,
    Baseline,
    Optimizing,
}

pub struct BarrierOptions {
    pub tier: CompilerTier,
    /// Administrative switch: may compiled code elide card marks on the
    /// initializing stores of freshly allocated objects at all?
    pub reduce_initial_card_marks: bool,
    /// Prefer deferring the compensating mark even when the collector does
    /// not require it.
    pub prefer_deferred_card_mark: bool,
    /// True for collectors that scan cards concurrently with mutators and
    /// therefore require the mark to strictly follow the initializing stores.
    pub card_mark_must_follow_store: bool,
    /// Width in bytes of an encoded reference slot. Narrow (compressed)
    /// encodings use 4 on 64-bit targets.
    pub reference_size: usize,
    pub verbose: bool,
}

impl Default for BarrierOptions {
    fn default() -> Self {
        Self {
            tier: CompilerTier::Optimizing,
            reduce_initial_card_marks: true,
            prefer_deferred_card_mark: false,
            card_mark_must_follow_store: false,
            reference_size: size_of::<usize>(),
            verbose: false,
        }
    }
}

/// The resolved, immutable policy. Computed once by
/// [`resolve`](BarrierPolicy::resolve) and never re-evaluated per call.
#[derive(Clone, Copy, Debug)]
pub struct BarrierPolicy {
    /// Compiled code skips per-store barriers on object initialization; the
    /// slow-path allocation hook compensates.
    pub elide_initializing_store_barriers: bool,
    /// The compensating mark is parked in the thread's deferred slot instead
    /// of being performed at allocation time.
    pub defer_initial_card_mark: bool,
    pub reference_size: usize,
    pub verbose: bool,
}

impl BarrierPolicy {
    pub fn resolve(options: &BarrierOptions) -> Self {
        assert!(
            options.reference_size.is_power_of_two()
                && options.reference_size <= size_of::<usize>(),
            "unsupported reference encoding width: {}",
            options.reference_size
        );
        // Only the optimizing tier emits initialization sequences without
        // per-store barriers; lower tiers always barrier their stores.
        let elide = options.reduce_initial_card_marks && options.tier == CompilerTier::Optimizing;
        let defer =
            elide && (options.prefer_deferred_card_mark || options.card_mark_must_follow_store);
        Self {
            elide_initializing_store_barriers: elide,
            defer_initial_card_mark: defer,
            reference_size: options.reference_size,
            verbose: options.verbose,
        }
    }
}

use atomic::{Atomic, Ordering};

/// Event counters for one barrier instance. Updated with relaxed adds from
/// the recording fast paths; read for diagnostics only.
pub struct BarrierStatistics {
    pub(crate) field_writes: Atomic<usize>,
    pub(crate) array_writes: Atomic<usize>,
    pub(crate) bulk_overwrites: Atomic<usize>,
    pub(crate) deferred_marks: Atomic<usize>,
    pub(crate) deferred_flushes: Atomic<usize>,
    pub(crate) eager_initial_marks: Atomic<usize>,
}

impl Default for BarrierStatistics {
    fn default() -> Self {
        Self {
            field_writes: Atomic::new(0),
            array_writes: Atomic::new(0),
            bulk_overwrites: Atomic::new(0),
            deferred_marks: Atomic::new(0),
            deferred_flushes: Atomic::new(0),
            eager_initial_marks: Atomic::new(0),
        }
    }
}

impl BarrierStatistics {
    #[inline(always)]
    pub(crate) fn count(counter: &Atomic<usize>) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BarrierStatisticsSnapshot {
        BarrierStatisticsSnapshot {
            field_writes: self.field_writes.load(Ordering::Relaxed),
            array_writes: self.array_writes.load(Ordering::Relaxed),
            bulk_overwrites: self.bulk_overwrites.load(Ordering::Relaxed),
            deferred_marks: self.deferred_marks.load(Ordering::Relaxed),
            deferred_flushes: self.deferred_flushes.load(Ordering::Relaxed),
            eager_initial_marks: self.eager_initial_marks.load(Ordering::Relaxed),
        }
    }
}

pub struct BarrierStatisticsSnapshot {
    pub field_writes: usize,
    pub array_writes: usize,
    pub bulk_overwrites: usize,
    pub deferred_marks: usize,
    pub deferred_flushes: usize,
    pub eager_initial_marks: usize,
}

impl std::fmt::Display for BarrierStatisticsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Barrier statistics:")?;
        writeln!(f, "\tfield writes recorded: {}", self.field_writes)?;
        writeln!(f, "\tarray writes recorded: {}", self.array_writes)?;
        writeln!(f, "\tbulk overwrites recorded: {}", self.bulk_overwrites)?;
        writeln!(f, "\tcard marks deferred: {}", self.deferred_marks)?;
        writeln!(f, "\tdeferred marks flushed: {}", self.deferred_flushes)?;
        writeln!(f, "\teager initial marks: {}", self.eager_initial_marks)
    }
}

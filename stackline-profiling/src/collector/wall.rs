// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wall-mode engine and the background sampler loop.

use super::{Engine, EngineCore, EngineSlot, Inner};
use crate::internal::{AllocationStream, Category, SchedulerState, ThreadId, Timestamp};
use crate::runtime::RuntimeEventSource;
use std::num::NonZeroU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

pub(crate) struct WallEngine {
    pub(crate) core: EngineCore,
}

impl WallEngine {
    pub(crate) fn new(started_at: Timestamp) -> Self {
        Self {
            core: EngineCore::new(started_at),
        }
    }

    /// One sampling step for one thread. Suspended threads replay their
    /// stack-on-suspend snapshot as Idle; everything else gets a live walk.
    /// A capture miss yields nothing.
    fn sample_thread(&mut self, source: &dyn RuntimeEventSource, thread: ThreadId, now: Timestamp) {
        let record = self.core.thread_mut(thread, now);
        if !record.alive() {
            return;
        }

        if record.scheduler_state() == Some(SchedulerState::Suspended) {
            if let Some(stack) = record.stack_on_suspend() {
                record.samples.record(stack, now, 1, Category::Idle);
                return;
            }
            // Suspended before we saw the transition: no snapshot, walk it
            // live like any other thread.
        }

        if let Some(stack) = self.core.interner.intern_current_stack(source, thread, 0) {
            self.core
                .thread_mut(thread, now)
                .samples
                .record(stack, now, 1, Category::Default);
        }
    }

    /// Every Nth allocation event gets its stack recorded, weighted by byte
    /// size. No-op unless a rate was configured.
    pub(crate) fn on_allocation(
        &mut self,
        source: &dyn RuntimeEventSource,
        thread: ThreadId,
        size: u64,
        now: Timestamp,
        rate: Option<NonZeroU64>,
    ) {
        let Some(rate) = rate else { return };
        let due = self
            .core
            .thread_mut(thread, now)
            .allocations
            .get_or_insert_with(|| AllocationStream::new(rate))
            .tick();
        if !due {
            return;
        }
        let Some(stack) = self.core.interner.intern_current_stack(source, thread, 0) else {
            return;
        };
        if let Some(stream) = self
            .core
            .threads
            .get_mut(&thread)
            .and_then(|record| record.allocations.as_mut())
        {
            stream.record(stack, now, size);
        }
    }
}

/// Body of the `stackline-sampler` thread. Sleeps on the condvar so stop()
/// can cut a wait short, samples every eligible thread, and reschedules
/// with catch-up: an overrunning tick shifts the next one to completion
/// time plus one interval instead of letting the schedule drift into an
/// unpayable debt.
pub(crate) fn sampler_loop(inner: Arc<Inner>) {
    let sampler_tid = inner.source.current_thread();
    let interval = inner.config.interval;
    let mut next_tick = inner.source.now() + interval;

    loop {
        {
            let mut stopped = inner.sampler.stop.lock();
            loop {
                if *stopped {
                    return;
                }
                let remaining = next_tick.saturating_duration_since(inner.source.now());
                if remaining.is_zero() {
                    break;
                }
                inner.sampler.wake.wait_for(&mut stopped, remaining);
            }
        }

        if !inner.paused.load(Ordering::Relaxed) && !tick(&inner, sampler_tid) {
            return;
        }

        let completed = inner.source.now();
        next_tick += interval;
        if next_tick < completed {
            tracing::warn!(id = %inner.id, "sampler fell behind, rescheduling from completion");
            next_tick = completed + interval;
        }
    }
}

/// One pass over the runtime's live threads. The engine lock is taken per
/// thread so event intake interleaves with a long pass. Returns false once
/// the collector has stopped.
fn tick(inner: &Inner, sampler_tid: ThreadId) -> bool {
    for thread in inner.source.threads() {
        if thread == sampler_tid {
            continue;
        }
        let now = inner.source.now();
        let mut slot = inner.engine.lock();
        let EngineSlot::Running(Engine::Wall(engine)) = &mut *slot else {
            return false;
        };
        engine.sample_thread(&*inner.source, thread, now);
    }
    true
}

// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retained-mode engine: a side table of live allocations, replayed into
//! samples at stop. Weight conservation is exact — every byte still live
//! when the collector stops appears in exactly one sample.

use super::EngineCore;
use crate::collections::identifiable::FxHashMap;
use crate::internal::{Category, StackId, ThreadId, Timestamp};
use crate::runtime::RuntimeEventSource;
use std::mem;

/// Retained collection phases. `Stopped` has no variant here: stopping
/// consumes the engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RetainedPhase {
    /// Allocations are tracked and frees observed.
    Collecting,
    /// New allocations are ignored, frees are still observed. Entered by an
    /// explicit drain or implicitly at stop.
    Draining,
}

struct TrackedAllocation {
    thread: ThreadId,
    stack: StackId,
    size: u64,
    allocated_at: Timestamp,
}

pub(crate) struct RetainedEngine {
    pub(crate) core: EngineCore,
    phase: RetainedPhase,
    /// Object ids in first-allocation order, so replay at stop keeps each
    /// thread's sample stream time-ordered.
    order: Vec<u64>,
    tracked: FxHashMap<u64, TrackedAllocation>,
}

impl RetainedEngine {
    pub(crate) fn new(started_at: Timestamp) -> Self {
        Self {
            core: EngineCore::new(started_at),
            phase: RetainedPhase::Collecting,
            order: Vec::new(),
            tracked: FxHashMap::default(),
        }
    }

    pub(crate) fn phase(&self) -> RetainedPhase {
        self.phase
    }

    pub(crate) fn begin_drain(&mut self) {
        self.phase = RetainedPhase::Draining;
        tracing::debug!(live = self.tracked.len(), "retained collector draining");
    }

    pub(crate) fn on_allocation(
        &mut self,
        source: &dyn RuntimeEventSource,
        thread: ThreadId,
        object_id: u64,
        size: u64,
        now: Timestamp,
    ) {
        if self.phase != RetainedPhase::Collecting {
            return;
        }
        let Some(stack) = self.core.interner.intern_current_stack(source, thread, 0) else {
            return;
        };
        self.core.thread_mut(thread, now);

        let tracked = TrackedAllocation {
            thread,
            stack,
            size,
            allocated_at: now,
        };
        // An id already present means the runtime recycled the identity
        // without reporting a free; the newer allocation wins its slot.
        if self.tracked.insert(object_id, tracked).is_none() {
            self.order.push(object_id);
        }
    }

    pub(crate) fn on_free(&mut self, object_id: u64) {
        self.tracked.remove(&object_id);
    }

    /// Replays every still-live allocation, in allocation order, as a
    /// sample weighted by its byte size.
    pub(crate) fn finish(mut self) -> EngineCore {
        let order = mem::take(&mut self.order);
        for object_id in order {
            let Some(alloc) = self.tracked.remove(&object_id) else {
                continue;
            };
            self.core
                .thread_mut(alloc.thread, alloc.allocated_at)
                .samples
                .record(alloc.stack, alloc.allocated_at, alloc.size, Category::Default);
        }
        self.core
    }
}

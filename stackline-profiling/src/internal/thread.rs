// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;
use std::num::NonZeroU64;

/// Native thread id, as reported by the runtime event source.
pub type ThreadId = u64;

/// The four-state scheduler model the collector contracts on. When a thread
/// reports which state it entered is the event source's decision.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SchedulerState {
    Running,
    Stalled,
    Suspended,
    Exited,
}

impl SchedulerState {
    fn marker_kind(self) -> MarkerKind {
        match self {
            SchedulerState::Running => MarkerKind::ThreadRunning,
            SchedulerState::Stalled => MarkerKind::ThreadStalled,
            SchedulerState::Suspended => MarkerKind::ThreadSuspended,
            SchedulerState::Exited => MarkerKind::ThreadExited,
        }
    }
}

/// Allocation samples recorded on a thread in wall mode, at a configured
/// rate: every Nth allocation observed on the thread is recorded, weighted
/// by its byte size.
pub struct AllocationStream {
    samples: SampleList,
    sample_rate: NonZeroU64,
    seen: u64,
}

impl AllocationStream {
    pub fn new(sample_rate: NonZeroU64) -> Self {
        Self {
            samples: SampleList::new(),
            sample_rate,
            seen: 0,
        }
    }

    /// Returns true when this allocation is due for sampling; the caller
    /// then interns the stack and calls [AllocationStream::record].
    pub fn tick(&mut self) -> bool {
        self.seen += 1;
        self.seen % self.sample_rate.get() == 0
    }

    pub fn record(&mut self, stack: StackId, timestamp: Timestamp, size: u64) {
        self.samples.record(stack, timestamp, size, Category::Default);
    }

    pub fn sample_rate(&self) -> NonZeroU64 {
        self.sample_rate
    }

    pub fn samples(&self) -> &SampleList {
        &self.samples
    }
}

/// Everything the collector accumulates for one runtime thread. Created when
/// the collector first observes the thread.
pub struct ThreadRecord {
    pub tid: ThreadId,
    pub name: Option<String>,
    pub started_at: Timestamp,
    pub stopped_at: Option<Timestamp>,
    pub is_main: bool,
    pub samples: SampleList,
    pub markers: Vec<Marker>,
    pub allocations: Option<AllocationStream>,
    state: Option<SchedulerState>,
    stack_on_suspend: Option<StackId>,
}

impl ThreadRecord {
    pub fn new(tid: ThreadId, started_at: Timestamp) -> Self {
        Self {
            tid,
            name: None,
            started_at,
            stopped_at: None,
            is_main: false,
            samples: SampleList::new(),
            markers: Vec::new(),
            allocations: None,
            state: None,
            stack_on_suspend: None,
        }
    }

    pub fn scheduler_state(&self) -> Option<SchedulerState> {
        self.state
    }

    pub fn alive(&self) -> bool {
        self.state != Some(SchedulerState::Exited)
    }

    /// Records a scheduler transition as an instant marker and updates the
    /// thread's state. Events after Exited are ignored — the runtime may
    /// still flush stale transitions for a thread that already left.
    pub fn set_scheduler_state(&mut self, state: SchedulerState, at: Timestamp) {
        if !self.alive() {
            return;
        }

        self.markers
            .push(Marker::instant(self.tid, state.marker_kind(), at));

        if state == SchedulerState::Exited {
            self.stopped_at = Some(at);
        }
        if state != SchedulerState::Suspended {
            self.stack_on_suspend = None;
        }
        self.state = Some(state);
    }

    pub fn set_stack_on_suspend(&mut self, stack: Option<StackId>) {
        self.stack_on_suspend = stack;
    }

    pub fn stack_on_suspend(&self) -> Option<StackId> {
        self.stack_on_suspend
    }

    /// The name surfaced into the final profile; unnamed threads get a
    /// synthetic placeholder.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("thread obj_id:{}", self.tid),
        }
    }
}

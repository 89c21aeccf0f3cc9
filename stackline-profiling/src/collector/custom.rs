// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Custom-mode engine: the embedder decides when a sample happens.

use super::EngineCore;
use crate::internal::{Category, Timestamp};
use crate::runtime::RuntimeEventSource;

pub(crate) struct CustomEngine {
    pub(crate) core: EngineCore,
}

impl CustomEngine {
    pub(crate) fn new(started_at: Timestamp) -> Self {
        Self {
            core: EngineCore::new(started_at),
        }
    }

    /// Interns the calling thread's stack as one weight-1 sample. Capture
    /// misses and empty stacks yield nothing, same as a wall tick.
    pub(crate) fn sample(&mut self, source: &dyn RuntimeEventSource, now: Timestamp) {
        let thread = source.current_thread();
        let Some(stack) = self.core.interner.intern_current_stack(source, thread, 0) else {
            return;
        };
        self.core
            .thread_mut(thread, now)
            .samples
            .record(stack, now, 1, Category::Default);
    }
}

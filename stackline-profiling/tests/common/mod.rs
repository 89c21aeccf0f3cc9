// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! A programmable in-memory runtime for integration tests: per-thread
//! stacks, a real monotonic clock, and an optional GC callback so frees
//! can be simulated on request.

// Each integration test binary compiles its own copy; not every binary
// touches every helper.
#![allow(dead_code)]

use parking_lot::Mutex;
use stackline_profiling::api::FrameRecord;
use stackline_profiling::internal::{ThreadId, Timestamp};
use stackline_profiling::runtime::{FrameVisitor, RuntimeEventSource};
use std::collections::HashMap;
use std::time::Instant;

/// Thread id the fake reports for the calling thread unless overridden.
/// Never listed in `threads()`, so the sampler's self-skip is exercised
/// without hiding an app thread.
pub const DEFAULT_CURRENT: ThreadId = 0;

#[derive(Clone)]
pub struct FakeFrame {
    pub name: &'static str,
    pub filename: &'static str,
    pub first_line: i32,
    pub line: i32,
}

pub fn frame(name: &'static str, filename: &'static str, line: i32) -> FakeFrame {
    FakeFrame {
        name,
        filename,
        first_line: line,
        line,
    }
}

#[derive(Default)]
struct State {
    threads: Vec<ThreadId>,
    /// Innermost-first stacks; a thread listed in `threads` but absent
    /// here is a capture miss.
    stacks: HashMap<ThreadId, Vec<FakeFrame>>,
    current: ThreadId,
    main: Option<ThreadId>,
    gc_requests: u64,
    gc_callback: Option<Box<dyn FnMut() + Send>>,
}

pub struct FakeRuntime {
    origin: Instant,
    state: Mutex<State>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(State {
                current: DEFAULT_CURRENT,
                ..State::default()
            }),
        }
    }

    pub fn add_thread(&self, tid: ThreadId, stack: Vec<FakeFrame>) {
        let mut state = self.state.lock();
        if !state.threads.contains(&tid) {
            state.threads.push(tid);
        }
        state.stacks.insert(tid, stack);
    }

    /// Lists the thread without a walkable stack: every walk misses.
    pub fn add_unwalkable_thread(&self, tid: ThreadId) {
        let mut state = self.state.lock();
        if !state.threads.contains(&tid) {
            state.threads.push(tid);
        }
        state.stacks.remove(&tid);
    }

    pub fn set_stack(&self, tid: ThreadId, stack: Vec<FakeFrame>) {
        self.state.lock().stacks.insert(tid, stack);
    }

    pub fn set_current(&self, tid: ThreadId) {
        self.state.lock().current = tid;
    }

    pub fn set_main(&self, tid: ThreadId) {
        self.state.lock().main = Some(tid);
    }

    pub fn set_gc_callback(&self, callback: Box<dyn FnMut() + Send>) {
        self.state.lock().gc_callback = Some(callback);
    }

    pub fn gc_requests(&self) -> u64 {
        self.state.lock().gc_requests
    }
}

impl RuntimeEventSource for FakeRuntime {
    fn threads(&self) -> Vec<ThreadId> {
        self.state.lock().threads.clone()
    }

    fn current_thread(&self) -> ThreadId {
        self.state.lock().current
    }

    fn main_thread(&self) -> Option<ThreadId> {
        self.state.lock().main
    }

    fn walk(&self, thread: ThreadId, visitor: &mut dyn FrameVisitor) -> bool {
        let stack = match self.state.lock().stacks.get(&thread) {
            Some(stack) => stack.clone(),
            None => return false,
        };
        for f in &stack {
            visitor.visit_frame(FrameRecord {
                name: f.name,
                filename: f.filename,
                first_line: f.first_line,
                line: f.line,
            });
        }
        true
    }

    fn now(&self) -> Timestamp {
        Timestamp::from_nanos(self.origin.elapsed().as_nanos() as u64)
    }

    fn request_gc(&self) {
        // Run the callback outside our own lock; it usually pushes frees
        // back into the collector.
        let mut callback = {
            let mut state = self.state.lock();
            state.gc_requests += 1;
            state.gc_callback.take()
        };
        if let Some(cb) = &mut callback {
            cb();
        }
        if let Some(cb) = callback {
            self.state.lock().gc_callback.get_or_insert(cb);
        }
    }
}

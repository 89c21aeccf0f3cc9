// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The seam between the profiler core and the runtime being profiled. A
//! target runtime implements [RuntimeEventSource]; the collector and the
//! interning tables stay runtime-agnostic and unit-testable with a fake.

use crate::api::FrameRecord;
use crate::internal::{ThreadId, Timestamp};
use std::time::SystemTime;

/// Receives frames during a stack walk, innermost first.
pub trait FrameVisitor {
    fn visit_frame(&mut self, frame: FrameRecord<'_>);
}

/// Everything the collector consumes from the surrounding runtime: stack
/// walking, thread enumeration, clocks, and GC requests. Thread lifecycle,
/// scheduler, GC and allocation *events* flow in the other direction,
/// pushed into the collector handle by the runtime's glue code.
pub trait RuntimeEventSource: Send + Sync + 'static {
    /// Ids of all currently live runtime threads.
    fn threads(&self) -> Vec<ThreadId>;

    /// The id of the calling thread.
    fn current_thread(&self) -> ThreadId;

    /// The runtime's main thread, if it distinguishes one.
    fn main_thread(&self) -> Option<ThreadId> {
        None
    }

    /// Walks `thread`'s live call stack, innermost frame first. The source
    /// owns whatever brief, bounded coordination is needed so the walked
    /// thread does not concurrently mutate the structures being read (a
    /// global execution lock, a stop-the-thread-for-a-tick primitive, ...).
    ///
    /// Returns false when the thread could not be observed (it exited
    /// between scheduling and capture); the caller skips it for this tick.
    fn walk(&self, thread: ThreadId, visitor: &mut dyn FrameVisitor) -> bool;

    /// Monotonic clock, nanosecond resolution.
    fn now(&self) -> Timestamp;

    /// Wall clock, used only for trace metadata.
    fn wall_now(&self) -> SystemTime {
        SystemTime::now()
    }

    /// Asks the runtime to run a GC cycle. Used by the gc-before-start
    /// option and by retained-mode draining. Best effort; may be a no-op.
    fn request_gc(&self) {}
}

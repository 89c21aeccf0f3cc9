// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::*;
use std::sync::Arc;

/// Matches the marker phase model of the Gecko profile format.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum MarkerPhase {
    Instant,
    Interval,
    IntervalStart,
    IntervalEnd,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum MarkerKind {
    ThreadRunning,
    ThreadStalled,
    ThreadSuspended,
    ThreadExited,
    FiberSwitch,
    /// Produced by stitching a chain of [MarkerKind::FiberSwitch] events.
    FiberRunning,
    GcEnter,
    GcExit,
    /// Produced by stitching a [MarkerKind::GcEnter]/[MarkerKind::GcExit] pair.
    GcPause,
    /// A caller-supplied marker. These bypass stitching entirely.
    User(Arc<str>),
}

impl MarkerKind {
    pub fn name(&self) -> &str {
        match self {
            MarkerKind::ThreadRunning => "thread running",
            MarkerKind::ThreadStalled => "thread stalled",
            MarkerKind::ThreadSuspended => "thread suspended",
            MarkerKind::ThreadExited => "thread exited",
            MarkerKind::FiberSwitch => "fiber switch",
            MarkerKind::FiberRunning => "fiber running",
            MarkerKind::GcEnter => "GC enter",
            MarkerKind::GcExit => "GC exit",
            MarkerKind::GcPause => "GC pause",
            MarkerKind::User(name) => name,
        }
    }
}

/// A timestamped event or interval on one thread's timeline. Interval markers
/// carry an `end`; instant markers don't.
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub thread: ThreadId,
    pub kind: MarkerKind,
    pub phase: MarkerPhase,
    pub start: Timestamp,
    pub end: Option<Timestamp>,
    pub payload: Option<serde_json::Value>,
}

impl Marker {
    pub fn instant(thread: ThreadId, kind: MarkerKind, at: Timestamp) -> Self {
        Self {
            thread,
            kind,
            phase: MarkerPhase::Instant,
            start: at,
            end: None,
            payload: None,
        }
    }

    pub fn interval(
        thread: ThreadId,
        kind: MarkerKind,
        start: Timestamp,
        end: Timestamp,
    ) -> Self {
        Self {
            thread,
            kind,
            phase: MarkerPhase::Interval,
            start,
            end: Some(end),
            payload: None,
        }
    }
}

/// Stitches one thread's raw marker stream at stop time.
///
/// The scan runs in emission order, never timestamp order, so same-timestamp
/// events cannot be mispaired by clock granularity.
///
/// - A `GcEnter` is paired with the nearest following `GcExit` (unrelated
///   markers in between are skipped) and replaced by a single `GcPause`
///   interval; an unmatched trailing `GcEnter` closes at `trace_end`.
/// - `FiberSwitch` events chain: each switch closes the previously open one
///   as a `FiberRunning` interval; the last open switch closes at
///   `trace_end`.
/// - Everything else, user markers included, passes through verbatim.
///
/// The output is stably sorted by start timestamp.
pub fn stitch_markers(raw: Vec<Marker>, trace_end: Timestamp) -> Vec<Marker> {
    let mut out = Vec::with_capacity(raw.len());
    let mut open_gc: Option<Timestamp> = None;
    let mut open_fiber: Option<Timestamp> = None;
    let mut thread = None;

    for marker in raw {
        thread = Some(marker.thread);
        match marker.kind {
            MarkerKind::GcEnter => {
                // A nested enter while one is already open keeps the first:
                // the pause began at the earliest unmatched enter.
                if open_gc.is_none() {
                    open_gc = Some(marker.start);
                }
            }
            MarkerKind::GcExit => {
                if let Some(start) = open_gc.take() {
                    out.push(Marker::interval(
                        marker.thread,
                        MarkerKind::GcPause,
                        start,
                        marker.start,
                    ));
                }
                // An exit with no open enter means the trace started mid-GC;
                // there is nothing to attribute it to.
            }
            MarkerKind::FiberSwitch => {
                if let Some(start) = open_fiber.replace(marker.start) {
                    out.push(Marker::interval(
                        marker.thread,
                        MarkerKind::FiberRunning,
                        start,
                        marker.start,
                    ));
                }
            }
            _ => out.push(marker),
        }
    }

    if let Some(tid) = thread {
        if let Some(start) = open_gc.take() {
            out.push(Marker::interval(tid, MarkerKind::GcPause, start, trace_end));
        }
        if let Some(start) = open_fiber.take() {
            out.push(Marker::interval(
                tid,
                MarkerKind::FiberRunning,
                start,
                trace_end,
            ));
        }
    }

    out.sort_by_key(|m| m.start);
    out
}

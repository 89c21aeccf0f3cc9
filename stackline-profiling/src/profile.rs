// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The immutable result of a collection run. Everything here is plain
//! owned data behind shared references; reading is side-effect free,
//! repeatable, and needs no locks.

use crate::collections::identifiable::FxIndexMap;
use crate::collector::Mode;
use crate::internal::{
    Backtrace, Sample, SampleIter, StackId, StackInterner, ThreadId, ThreadRecord, Timestamp,
};
use std::num::NonZeroU64;
use std::time::{Duration, SystemTime};

/// Run-level metadata stamped at stop.
#[derive(Clone, Debug)]
pub struct Meta {
    pub mode: Mode,
    pub pid: u32,
    /// Wall-mode sampling interval; None in other modes.
    pub interval: Option<Duration>,
    pub allocation_sample_rate: Option<NonZeroU64>,
    pub gc_before_start: bool,
    /// Monotonic start/end, the clock samples are timestamped on.
    pub started_at: Timestamp,
    pub stopped_at: Timestamp,
    /// Wall-clock start/end, metadata only.
    pub start_time: SystemTime,
    pub end_time: SystemTime,
}

/// A frozen profile: per-thread sample streams and stitched markers, plus
/// the interning tables every sample's stack id resolves against.
pub struct Profile {
    threads: FxIndexMap<ThreadId, ThreadRecord>,
    stacks: StackInterner,
    meta: Meta,
}

impl Profile {
    pub(crate) fn new(
        threads: FxIndexMap<ThreadId, ThreadRecord>,
        stacks: StackInterner,
        meta: Meta,
    ) -> Self {
        Self {
            threads,
            stacks,
            meta,
        }
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// The interning tables, for columnar access and id resolution.
    pub fn stack_table(&self) -> &StackInterner {
        &self.stacks
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn thread(&self, tid: ThreadId) -> Option<&ThreadRecord> {
        self.threads.get(&tid)
    }

    /// Threads in first-observation order.
    pub fn threads(&self) -> impl Iterator<Item = &ThreadRecord> {
        self.threads.values()
    }

    pub fn main_thread(&self) -> Option<&ThreadRecord> {
        self.threads.values().find(|record| record.is_main)
    }

    /// Leaf-to-root resolution of one sample's stack.
    ///
    /// # Panics
    /// Panics if `stack` did not come out of this profile.
    pub fn backtrace(&self, stack: StackId) -> Backtrace<'_> {
        self.stacks.backtrace(stack)
    }

    /// Lazy, restartable iterator over every thread's samples, in thread
    /// observation order then per-thread time order. Allocation streams
    /// are not included; see [ThreadRecord::allocations].
    pub fn each_sample(&self) -> EachSample<'_> {
        EachSample {
            profile: self,
            thread_index: 0,
            samples: None,
        }
    }

    /// Total weight across all sample streams: ticks in wall mode, bytes
    /// in retained mode, calls in custom mode.
    pub fn total_weight(&self) -> u64 {
        self.threads
            .values()
            .map(|record| record.samples.total_weight())
            .sum()
    }
}

/// Iterator behind [Profile::each_sample]. Clone to restart.
#[derive(Clone)]
pub struct EachSample<'a> {
    profile: &'a Profile,
    thread_index: usize,
    samples: Option<(ThreadId, SampleIter<'a>)>,
}

impl Iterator for EachSample<'_> {
    type Item = (ThreadId, Sample);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((tid, samples)) = &mut self.samples {
                if let Some(sample) = samples.next() {
                    return Some((*tid, sample));
                }
                self.samples = None;
            }
            let (tid, record) = self.profile.threads.get_index(self.thread_index)?;
            self.thread_index += 1;
            self.samples = Some((*tid, record.samples.iter()));
        }
    }
}

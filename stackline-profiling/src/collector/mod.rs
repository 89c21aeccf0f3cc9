// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The collector: mode configuration, the start/stop lifecycle, and the
//! intake surface the runtime glue pushes events into.
//!
//! One mutex guards the engine (interning tables plus per-thread records).
//! The sampler thread takes it once per observed thread, not once per tick,
//! so event intake interleaves with sampling instead of queueing behind a
//! whole pass over every thread.

pub mod hooks;
pub mod registry;

mod custom;
mod retained;
mod wall;

pub use registry::CollectorId;
pub use retained::RetainedPhase;

use crate::collections::identifiable::FxIndexMap;
use crate::error::CollectorError;
use crate::internal::{
    stitch_markers, Marker, MarkerKind, MarkerPhase, SchedulerState, StackInterner, ThreadId,
    ThreadRecord, Timestamp,
};
use crate::profile::{Meta, Profile};
use crate::runtime::RuntimeEventSource;
use parking_lot::{Condvar, Mutex};
use std::mem;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

/// Default wall-mode sampling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_micros(500);

/// How samples are produced.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Mode {
    /// A background thread samples every live runtime thread on a fixed
    /// interval.
    Wall,
    /// Allocations are tracked in a side table; objects still live at stop
    /// become samples weighted by their byte size.
    Retained,
    /// The embedder calls [CollectorHandle::sample] whenever it wants a
    /// sample of the calling thread.
    Custom,
}

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    pub mode: Mode,
    /// Wall-mode sampling interval.
    pub interval: Duration,
    /// Wall mode only: record the allocating stack for every Nth allocation
    /// event, weighted by byte size.
    pub allocation_sample_rate: Option<NonZeroU64>,
    /// Ask the runtime for GC cycles before collection starts, so objects
    /// that are already garbage are not reported. Defaults to on in
    /// retained mode, off otherwise.
    pub gc_before_start: Option<bool>,
}

impl CollectorConfig {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            interval: DEFAULT_INTERVAL,
            allocation_sample_rate: None,
            gc_before_start: None,
        }
    }

    fn validate(&self) -> Result<(), CollectorError> {
        if self.mode == Mode::Wall && self.interval.is_zero() {
            return Err(CollectorError::Configuration(
                "sampling interval must be non-zero".into(),
            ));
        }
        if self.allocation_sample_rate.is_some() && self.mode != Mode::Wall {
            return Err(CollectorError::Configuration(
                "allocation sample rate only applies to wall mode".into(),
            ));
        }
        Ok(())
    }

    fn run_gc_before_start(&self) -> bool {
        self.gc_before_start.unwrap_or(self.mode == Mode::Retained)
    }
}

/// Interning tables plus per-thread records; every mode accumulates into
/// one of these.
pub(crate) struct EngineCore {
    pub(crate) interner: StackInterner,
    pub(crate) threads: FxIndexMap<ThreadId, ThreadRecord>,
    pub(crate) started_at: Timestamp,
}

impl EngineCore {
    fn new(started_at: Timestamp) -> Self {
        Self {
            interner: StackInterner::new(),
            threads: FxIndexMap::default(),
            started_at,
        }
    }

    pub(crate) fn thread_mut(&mut self, tid: ThreadId, now: Timestamp) -> &mut ThreadRecord {
        self.threads
            .entry(tid)
            .or_insert_with(|| ThreadRecord::new(tid, now))
    }
}

pub(crate) enum Engine {
    Wall(wall::WallEngine),
    Retained(retained::RetainedEngine),
    Custom(custom::CustomEngine),
}

impl Engine {
    fn core_mut(&mut self) -> &mut EngineCore {
        match self {
            Engine::Wall(engine) => &mut engine.core,
            Engine::Retained(engine) => &mut engine.core,
            Engine::Custom(engine) => &mut engine.core,
        }
    }

    fn finish(self) -> EngineCore {
        match self {
            Engine::Wall(engine) => engine.core,
            Engine::Retained(engine) => engine.finish(),
            Engine::Custom(engine) => engine.core,
        }
    }
}

pub(crate) enum EngineSlot {
    Idle,
    Running(Engine),
    Stopped,
}

impl EngineSlot {
    fn state_name(&self) -> &'static str {
        match self {
            EngineSlot::Idle => "idle",
            EngineSlot::Running(_) => "running",
            EngineSlot::Stopped => "stopped",
        }
    }
}

/// Condvar pair the sampler thread sleeps on; stop() flips the flag and
/// notifies so shutdown never waits out a full interval.
pub(crate) struct SamplerControl {
    pub(crate) stop: Mutex<bool>,
    pub(crate) wake: Condvar,
    handle: Mutex<Option<JoinHandle<()>>>,
}

pub(crate) struct Inner {
    pub(crate) id: CollectorId,
    pub(crate) config: CollectorConfig,
    pub(crate) source: Arc<dyn RuntimeEventSource>,
    pub(crate) engine: Mutex<EngineSlot>,
    pub(crate) paused: AtomicBool,
    pub(crate) sampler: SamplerControl,
    start_wall: Mutex<Option<SystemTime>>,
}

impl Inner {
    /// Runs `f` against the live engine, or quietly does nothing. Runtime
    /// events race with stop() by nature, so a late event is not an error;
    /// a paused (forked-child) collector swallows events the same way.
    fn event(&self, f: impl FnOnce(&mut Engine, &dyn RuntimeEventSource, Timestamp)) {
        if self.paused.load(Ordering::Relaxed) {
            return;
        }
        let now = self.source.now();
        let mut slot = self.engine.lock();
        if let EngineSlot::Running(engine) = &mut *slot {
            f(engine, &*self.source, now);
        }
    }
}

/// A configured collector. [Collector::start] hands back the handle all
/// further interaction goes through.
pub struct Collector {
    inner: Arc<Inner>,
}

impl Collector {
    pub fn new(
        config: CollectorConfig,
        source: Arc<dyn RuntimeEventSource>,
    ) -> Result<Self, CollectorError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                id: registry::next_id(),
                config,
                source,
                engine: Mutex::new(EngineSlot::Idle),
                paused: AtomicBool::new(false),
                sampler: SamplerControl {
                    stop: Mutex::new(false),
                    wake: Condvar::new(),
                    handle: Mutex::new(None),
                },
                start_wall: Mutex::new(None),
            }),
        })
    }

    pub fn id(&self) -> CollectorId {
        self.inner.id
    }

    pub fn mode(&self) -> Mode {
        self.inner.config.mode
    }

    /// Starts collection. Fails fast if this collector is already running
    /// or was already stopped; prior state is untouched either way.
    pub fn start(&self) -> Result<CollectorHandle, CollectorError> {
        let inner = &self.inner;

        if inner.config.run_gc_before_start() {
            // Several passes, matching major-GC behavior where one cycle is
            // not enough to release everything that is already unreachable.
            for _ in 0..3 {
                inner.source.request_gc();
            }
        }

        let started_at = inner.source.now();
        let start_wall = inner.source.wall_now();
        {
            let mut slot = inner.engine.lock();
            match &*slot {
                EngineSlot::Idle => {}
                EngineSlot::Running(_) => return Err(CollectorError::AlreadyRunning),
                EngineSlot::Stopped => {
                    return Err(CollectorError::InvalidState {
                        operation: "start",
                        state: "stopped",
                    })
                }
            }
            *slot = EngineSlot::Running(match inner.config.mode {
                Mode::Wall => Engine::Wall(wall::WallEngine::new(started_at)),
                Mode::Retained => Engine::Retained(retained::RetainedEngine::new(started_at)),
                Mode::Custom => Engine::Custom(custom::CustomEngine::new(started_at)),
            });
        }
        *inner.start_wall.lock() = Some(start_wall);
        registry::activate(inner.id, inner.config.mode)?;

        if inner.config.mode == Mode::Wall {
            let sampler = std::thread::Builder::new()
                .name("stackline-sampler".into())
                .spawn({
                    let inner = Arc::clone(inner);
                    move || wall::sampler_loop(inner)
                })?;
            *inner.sampler.handle.lock() = Some(sampler);
        }

        tracing::debug!(id = %inner.id, mode = ?inner.config.mode, "collector started");
        Ok(CollectorHandle {
            inner: Arc::clone(inner),
        })
    }
}

/// Live interface to a started collector. Clones share the collector.
#[derive(Clone)]
pub struct CollectorHandle {
    inner: Arc<Inner>,
}

impl CollectorHandle {
    pub fn id(&self) -> CollectorId {
        self.inner.id
    }

    pub fn mode(&self) -> Mode {
        self.inner.config.mode
    }

    /// Custom mode only: interns the calling thread's stack as one sample.
    pub fn sample(&self) -> Result<(), CollectorError> {
        if self.inner.paused.load(Ordering::Relaxed) {
            return Ok(());
        }
        let now = self.inner.source.now();
        let mut slot = self.inner.engine.lock();
        match &mut *slot {
            EngineSlot::Running(Engine::Custom(engine)) => {
                engine.sample(&*self.inner.source, now);
                Ok(())
            }
            EngineSlot::Running(_) => Err(CollectorError::UnsupportedMode {
                operation: "sample",
                mode: self.inner.config.mode,
            }),
            other => Err(CollectorError::InvalidState {
                operation: "sample",
                state: other.state_name(),
            }),
        }
    }

    /// Retained mode only: stops tracking new allocations, then asks the
    /// runtime for a GC cycle so pending garbage is freed while frees are
    /// still observed. Idempotent while running.
    pub fn drain(&self) -> Result<(), CollectorError> {
        let needs_gc = {
            let mut slot = self.inner.engine.lock();
            match &mut *slot {
                EngineSlot::Running(Engine::Retained(engine)) => {
                    let first = engine.phase() == RetainedPhase::Collecting;
                    if first {
                        engine.begin_drain();
                    }
                    first
                }
                EngineSlot::Running(_) => {
                    return Err(CollectorError::UnsupportedMode {
                        operation: "drain",
                        mode: self.inner.config.mode,
                    })
                }
                other => {
                    return Err(CollectorError::InvalidState {
                        operation: "drain",
                        state: other.state_name(),
                    })
                }
            }
        };
        // GC callbacks re-enter through on_free, so the engine lock must be
        // released first.
        if needs_gc && !self.inner.paused.load(Ordering::Relaxed) {
            self.inner.source.request_gc();
        }
        Ok(())
    }

    /// Appends a caller-supplied marker to `thread`'s timeline. User
    /// markers bypass stitching.
    pub fn add_marker(
        &self,
        thread: ThreadId,
        name: &str,
        phase: MarkerPhase,
        start: Timestamp,
        end: Option<Timestamp>,
        payload: Option<serde_json::Value>,
    ) -> Result<(), CollectorError> {
        if phase == MarkerPhase::Interval && end.is_none() {
            return Err(CollectorError::Configuration(
                "interval markers require an end timestamp".into(),
            ));
        }
        if self.inner.paused.load(Ordering::Relaxed) {
            return Ok(());
        }
        let mut slot = self.inner.engine.lock();
        match &mut *slot {
            EngineSlot::Running(engine) => {
                let end = if phase == MarkerPhase::Instant { None } else { end };
                engine.core_mut().thread_mut(thread, start).markers.push(Marker {
                    thread,
                    kind: MarkerKind::User(Arc::from(name)),
                    phase,
                    start,
                    end,
                    payload,
                });
                Ok(())
            }
            other => Err(CollectorError::InvalidState {
                operation: "add marker",
                state: other.state_name(),
            }),
        }
    }

    /// The runtime observed a new thread.
    pub fn on_thread_started(&self, thread: ThreadId) {
        self.inner.event(|engine, _, now| {
            engine
                .core_mut()
                .thread_mut(thread, now)
                .set_scheduler_state(SchedulerState::Running, now);
        });
    }

    pub fn on_thread_name(&self, thread: ThreadId, name: &str) {
        self.inner.event(|engine, _, now| {
            engine.core_mut().thread_mut(thread, now).name = Some(name.to_string());
        });
    }

    /// A scheduler transition. On Suspended the thread's stack is captured
    /// immediately and replayed as Idle samples until it resumes.
    pub fn on_scheduler_state(&self, thread: ThreadId, state: SchedulerState) {
        self.inner.event(|engine, source, now| {
            let core = engine.core_mut();
            let snapshot = if state == SchedulerState::Suspended {
                core.interner.intern_current_stack(source, thread, 0)
            } else {
                None
            };
            let record = core.thread_mut(thread, now);
            record.set_scheduler_state(state, now);
            if state == SchedulerState::Suspended {
                record.set_stack_on_suspend(snapshot);
            }
        });
    }

    pub fn on_thread_exited(&self, thread: ThreadId) {
        self.inner.event(|engine, _, now| {
            engine
                .core_mut()
                .thread_mut(thread, now)
                .set_scheduler_state(SchedulerState::Exited, now);
        });
    }

    pub fn on_fiber_switch(&self, thread: ThreadId) {
        self.push_instant(thread, MarkerKind::FiberSwitch);
    }

    pub fn on_gc_enter(&self, thread: ThreadId) {
        self.push_instant(thread, MarkerKind::GcEnter);
    }

    pub fn on_gc_exit(&self, thread: ThreadId) {
        self.push_instant(thread, MarkerKind::GcExit);
    }

    fn push_instant(&self, thread: ThreadId, kind: MarkerKind) {
        self.inner.event(|engine, _, now| {
            engine
                .core_mut()
                .thread_mut(thread, now)
                .markers
                .push(Marker::instant(thread, kind, now));
        });
    }

    /// The runtime allocated `object_id` (`size` bytes) on `thread`. Tracked
    /// in retained mode; sampled every Nth event in wall mode when a rate is
    /// configured; ignored otherwise.
    pub fn on_allocation(&self, thread: ThreadId, object_id: u64, size: u64) {
        let rate = self.inner.config.allocation_sample_rate;
        self.inner.event(|engine, source, now| match engine {
            Engine::Retained(engine) => engine.on_allocation(source, thread, object_id, size, now),
            Engine::Wall(engine) => engine.on_allocation(source, thread, size, now, rate),
            Engine::Custom(_) => {}
        });
    }

    /// The runtime freed `object_id`. Untracked ids are no-ops.
    pub fn on_free(&self, object_id: u64) {
        self.inner.event(|engine, _, _| {
            if let Engine::Retained(engine) = engine {
                engine.on_free(object_id);
            }
        });
    }

    /// Called by process glue in a forked child: the child inherits the
    /// collector's tables mid-flight but not the sampler thread, so all
    /// sampling and intake in the child image goes inert. The parent is
    /// unaffected.
    pub fn pause_after_fork(&self) {
        self.inner.paused.store(true, Ordering::Relaxed);
        tracing::debug!(id = %self.inner.id, "collector paused after fork");
    }

    /// Stops collection and freezes everything captured so far into an
    /// immutable [Profile]. Waits out at most one in-flight sampler step.
    pub fn stop(&self) -> Result<Profile, CollectorError> {
        let inner = &self.inner;

        // An undrained retained collector gets a final GC pass first, so
        // garbage created during collection is freed while frees are still
        // observed.
        let needs_gc = {
            let mut slot = inner.engine.lock();
            match &mut *slot {
                EngineSlot::Running(Engine::Retained(engine))
                    if engine.phase() == RetainedPhase::Collecting =>
                {
                    engine.begin_drain();
                    true
                }
                EngineSlot::Running(_) => false,
                other => {
                    return Err(CollectorError::InvalidState {
                        operation: "stop",
                        state: other.state_name(),
                    })
                }
            }
        };
        if needs_gc && !inner.paused.load(Ordering::Relaxed) {
            inner.source.request_gc();
        }

        let engine = {
            let mut slot = inner.engine.lock();
            match mem::replace(&mut *slot, EngineSlot::Stopped) {
                EngineSlot::Running(engine) => engine,
                other => {
                    // A concurrent stop() won the race between our check
                    // and the take.
                    let state = other.state_name();
                    *slot = other;
                    return Err(CollectorError::InvalidState {
                        operation: "stop",
                        state,
                    });
                }
            }
        };

        *inner.sampler.stop.lock() = true;
        inner.sampler.wake.notify_all();
        if let Some(sampler) = inner.sampler.handle.lock().take() {
            let _ = sampler.join();
        }

        registry::deactivate(inner.id);

        let stopped_at = inner.source.now();
        let end_time = inner.source.wall_now();
        let start_time = inner.start_wall.lock().take().unwrap_or(end_time);
        tracing::debug!(id = %inner.id, mode = ?inner.config.mode, "collector stopped");
        Ok(assemble(engine.finish(), inner, stopped_at, start_time, end_time))
    }
}

/// Turns an engine's accumulated state into the immutable snapshot: fill
/// placeholder names, close still-live threads at trace end, stitch raw
/// markers, stamp metadata.
fn assemble(
    mut core: EngineCore,
    inner: &Inner,
    stopped_at: Timestamp,
    start_time: SystemTime,
    end_time: SystemTime,
) -> Profile {
    let main = inner.source.main_thread();
    for (tid, record) in core.threads.iter_mut() {
        record.is_main = main == Some(*tid);
        if record.stopped_at.is_none() {
            record.stopped_at = Some(stopped_at);
        }
        if record.name.is_none() {
            record.name = Some(record.display_name());
        }
        let raw = mem::take(&mut record.markers);
        record.markers = stitch_markers(raw, stopped_at);
    }

    let meta = Meta {
        mode: inner.config.mode,
        pid: std::process::id(),
        interval: (inner.config.mode == Mode::Wall).then_some(inner.config.interval),
        allocation_sample_rate: inner.config.allocation_sample_rate,
        gc_before_start: inner.config.run_gc_before_start(),
        started_at: core.started_at,
        stopped_at,
        start_time,
        end_time,
    };
    Profile::new(core.threads, core.interner, meta)
}

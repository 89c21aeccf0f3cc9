// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::{frame, FakeRuntime};
use stackline_profiling::collector::registry;
use stackline_profiling::internal::{Category, MarkerKind, MarkerPhase, SchedulerState, Timestamp};
use stackline_profiling::{Collector, CollectorConfig, CollectorError, Mode};
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Duration;

fn wall_config(interval: Duration) -> CollectorConfig {
    let mut config = CollectorConfig::new(Mode::Wall);
    config.interval = interval;
    config
}

#[test]
fn two_hot_chains_produce_two_distinct_stacks() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_thread(
        1,
        vec![
            frame("hot_a", "app.rb", 30),
            frame("work_a", "app.rb", 20),
            frame("main", "app.rb", 1),
        ],
    );
    runtime.add_thread(
        2,
        vec![
            frame("hot_b", "app.rb", 60),
            frame("work_b", "app.rb", 50),
            frame("main", "app.rb", 1),
        ],
    );

    let collector = Collector::new(wall_config(Duration::from_millis(1)), runtime).unwrap();
    let handle = collector.start().unwrap();
    std::thread::sleep(Duration::from_millis(60));
    let profile = handle.stop().unwrap();

    assert_eq!(profile.thread_count(), 2);
    // Generous tolerance: 60ms at 1ms should give far more than 5 ticks
    // per thread even on a loaded machine.
    for record in profile.threads() {
        assert!(record.samples.total_weight() >= 5);
        // One hot stack per thread, so coalescing collapses the stream.
        assert_eq!(record.samples.len(), 1);
    }

    let t1 = profile.thread(1).unwrap();
    let t2 = profile.thread(2).unwrap();
    assert_ne!(t1.samples.stacks()[0], t2.samples.stacks()[0]);

    let leaf: Vec<String> = profile
        .backtrace(t1.samples.stacks()[0])
        .map(|f| f.to_string())
        .collect();
    assert_eq!(leaf[0], "app.rb:30:in 'hot_a'");
    assert_eq!(leaf.last().unwrap(), "app.rb:1:in 'main'");

    // Shared root frame: the trie deduplicates "main" across both threads.
    assert_eq!(profile.stack_table().func_count(), 5);
}

#[test]
fn suspended_threads_sample_idle_from_snapshot() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_thread(
        1,
        vec![frame("sleep", "io.rb", 9), frame("main", "io.rb", 1)],
    );

    // First tick at 5ms, long after the suspend below is in place.
    let collector = Collector::new(wall_config(Duration::from_millis(5)), runtime.clone()).unwrap();
    let handle = collector.start().unwrap();
    handle.on_scheduler_state(1, SchedulerState::Suspended);
    // The snapshot was taken at the transition; later stack changes must
    // not show up while the thread stays suspended.
    runtime.set_stack(1, vec![frame("other", "io.rb", 99)]);
    std::thread::sleep(Duration::from_millis(50));
    let profile = handle.stop().unwrap();

    let record = profile.thread(1).unwrap();
    assert!(record.samples.total_weight() >= 3);
    assert!(record
        .samples
        .categories()
        .iter()
        .all(|c| *c == Category::Idle));
    let names: Vec<String> = profile
        .backtrace(record.samples.stacks()[0])
        .map(|f| f.to_string())
        .collect();
    assert_eq!(names[0], "io.rb:9:in 'sleep'");
}

#[test]
fn capture_miss_is_a_silent_skip() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_thread(1, vec![frame("busy", "app.rb", 5)]);
    runtime.add_unwalkable_thread(2);

    let collector = Collector::new(wall_config(Duration::from_millis(1)), runtime).unwrap();
    let handle = collector.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let profile = handle.stop().unwrap();

    assert!(profile.thread(1).unwrap().samples.total_weight() >= 2);
    // The unwalkable thread was observed but never yielded a sample.
    let missed = profile.thread(2).unwrap();
    assert!(missed.samples.is_empty());
}

#[test]
fn allocation_rate_samples_every_nth_event() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_thread(1, vec![frame("alloc_site", "app.rb", 12)]);

    let mut config = wall_config(Duration::from_millis(1));
    config.allocation_sample_rate = NonZeroU64::new(2);
    let collector = Collector::new(config, runtime).unwrap();
    let handle = collector.start().unwrap();
    for size in [10, 20, 30, 40, 50] {
        handle.on_allocation(1, 1000 + size, size);
    }
    let profile = handle.stop().unwrap();

    let stream = profile.thread(1).unwrap().allocations.as_ref().unwrap();
    assert_eq!(stream.sample_rate().get(), 2);
    // 2nd and 4th of five events.
    assert_eq!(stream.samples().total_weight(), 20 + 40);
}

#[test]
fn gc_markers_stitch_into_pauses() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_thread(1, vec![frame("busy", "app.rb", 5)]);

    let collector = Collector::new(wall_config(Duration::from_millis(1)), runtime).unwrap();
    let handle = collector.start().unwrap();
    handle.on_gc_enter(1);
    handle.on_gc_exit(1);
    handle.on_gc_enter(1); // left open: closes at trace end
    let profile = handle.stop().unwrap();

    let markers = &profile.thread(1).unwrap().markers;
    let pauses: Vec<_> = markers
        .iter()
        .filter(|m| m.kind == MarkerKind::GcPause)
        .collect();
    assert_eq!(pauses.len(), 2);
    for pause in &pauses {
        assert_eq!(pause.phase, MarkerPhase::Interval);
        assert!(pause.end.is_some());
    }
    assert_eq!(pauses[1].end, Some(profile.meta().stopped_at));
    assert!(markers
        .iter()
        .all(|m| m.kind != MarkerKind::GcEnter && m.kind != MarkerKind::GcExit));
}

#[test]
fn fiber_switches_stitch_into_running_intervals() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_thread(1, vec![frame("busy", "app.rb", 5)]);

    let collector = Collector::new(wall_config(Duration::from_millis(1)), runtime).unwrap();
    let handle = collector.start().unwrap();
    handle.on_fiber_switch(1);
    handle.on_fiber_switch(1);
    let profile = handle.stop().unwrap();

    let running: Vec<_> = profile
        .thread(1)
        .unwrap()
        .markers
        .iter()
        .filter(|m| m.kind == MarkerKind::FiberRunning)
        .collect();
    assert_eq!(running.len(), 2);
    assert_eq!(running[0].end, Some(running[1].start));
    assert_eq!(running[1].end, Some(profile.meta().stopped_at));
}

#[test]
fn user_markers_pass_through_unstitched() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_thread(1, vec![frame("busy", "app.rb", 5)]);

    let collector = Collector::new(wall_config(Duration::from_millis(1)), runtime).unwrap();
    let handle = collector.start().unwrap();
    handle
        .add_marker(
            1,
            "checkout",
            MarkerPhase::Interval,
            Timestamp::from_micros(10),
            Some(Timestamp::from_micros(90)),
            Some(serde_json::json!({"order": 7})),
        )
        .unwrap();
    let err = handle
        .add_marker(1, "bad", MarkerPhase::Interval, Timestamp::ZERO, None, None)
        .unwrap_err();
    assert!(matches!(err, CollectorError::Configuration(_)));

    let profile = handle.stop().unwrap();
    let marker = profile
        .thread(1)
        .unwrap()
        .markers
        .iter()
        .find(|m| m.kind.name() == "checkout")
        .unwrap();
    assert_eq!(marker.end, Some(Timestamp::from_micros(90)));
    assert_eq!(marker.payload.as_ref().unwrap()["order"], 7);
}

#[test]
fn lifecycle_errors_fail_fast() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_thread(1, vec![frame("busy", "app.rb", 5)]);

    let collector = Collector::new(wall_config(Duration::from_millis(1)), runtime).unwrap();
    let handle = collector.start().unwrap();
    assert!(matches!(
        collector.start(),
        Err(CollectorError::AlreadyRunning)
    ));
    assert!(matches!(
        handle.sample(),
        Err(CollectorError::UnsupportedMode { .. })
    ));
    assert!(matches!(
        handle.drain(),
        Err(CollectorError::UnsupportedMode { .. })
    ));

    handle.stop().unwrap();
    assert!(matches!(
        handle.stop(),
        Err(CollectorError::InvalidState { .. })
    ));
    assert!(matches!(
        collector.start(),
        Err(CollectorError::InvalidState { .. })
    ));
}

#[test]
fn registry_tracks_active_collectors() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_thread(1, vec![frame("busy", "app.rb", 5)]);

    let collector = Collector::new(wall_config(Duration::from_millis(5)), runtime).unwrap();
    let id = collector.id();
    assert!(!registry::is_active(id));

    let handle = collector.start().unwrap();
    assert!(registry::is_active(id));
    assert!(registry::active_collectors()
        .iter()
        .any(|(active, mode)| *active == id && *mode == Mode::Wall));

    handle.stop().unwrap();
    assert!(!registry::is_active(id));
}

#[test]
fn pause_after_fork_makes_the_collector_inert() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_thread(1, vec![frame("busy", "app.rb", 5)]);

    // First tick would land at 200ms; pausing immediately guarantees it
    // never samples.
    let collector = Collector::new(wall_config(Duration::from_millis(200)), runtime).unwrap();
    let handle = collector.start().unwrap();
    handle.pause_after_fork();
    handle.on_allocation(1, 1, 64);
    handle
        .add_marker(1, "ignored", MarkerPhase::Instant, Timestamp::ZERO, None, None)
        .unwrap();
    std::thread::sleep(Duration::from_millis(20));
    let profile = handle.stop().unwrap();

    assert_eq!(profile.total_weight(), 0);
    assert!(profile.thread(1).is_none());
}

#[test]
fn meta_records_the_run() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.add_thread(1, vec![frame("busy", "app.rb", 5)]);
    runtime.set_main(1);

    let collector = Collector::new(wall_config(Duration::from_millis(1)), runtime).unwrap();
    let handle = collector.start().unwrap();
    std::thread::sleep(Duration::from_millis(10));
    let profile = handle.stop().unwrap();

    let meta = profile.meta();
    assert_eq!(meta.mode, Mode::Wall);
    assert_eq!(meta.pid, std::process::id());
    assert_eq!(meta.interval, Some(Duration::from_millis(1)));
    assert!(!meta.gc_before_start);
    assert!(meta.stopped_at > meta.started_at);

    let main = profile.main_thread().unwrap();
    assert_eq!(main.tid, 1);
    assert!(main.is_main);
    assert_eq!(main.stopped_at, Some(meta.stopped_at));
    assert_eq!(main.name.as_deref(), Some("thread obj_id:1"));
}

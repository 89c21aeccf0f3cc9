// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process sampling profiler core for managed-language runtimes.
//!
//! The runtime embeds this crate by implementing
//! [RuntimeEventSource](runtime::RuntimeEventSource) (stack walking,
//! clocks, thread enumeration) and pushing lifecycle/GC/allocation events
//! into a [CollectorHandle](collector::CollectorHandle). Captured stacks
//! are deduplicated into a prefix trie of id-linked tables
//! ([StackInterner](internal::StackInterner)), so memory grows with the
//! number of distinct call chains rather than with the number of samples.
//! Stopping a collector yields an immutable [Profile](profile::Profile).

pub mod api;
pub mod collections;
pub mod collector;
pub mod error;
pub mod internal;
pub mod profile;
pub mod runtime;

pub use collector::{Collector, CollectorConfig, CollectorHandle, Mode};
pub use error::CollectorError;
pub use profile::Profile;

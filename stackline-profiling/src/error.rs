// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::collector::Mode;

/// Errors surfaced by collector construction and lifecycle calls.
///
/// Two kinds of failure deliberately have no variant here: a sampling tick
/// that cannot observe a thread is recovered silently (it just yields no
/// sample), and an index that would violate a table invariant is a fatal
/// assertion, because it means the tables are no longer trustworthy for any
/// consumer.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// Invalid mode or option combination. Surfaced at construction, fatal
    /// to that attempt.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Start was called on a collector that is already running.
    #[error("collector is already running")]
    AlreadyRunning,

    /// A lifecycle call arrived in a state that does not allow it, e.g.
    /// stop after stop. The collector is left in a safe state.
    #[error("cannot {operation} while collector is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    /// The operation exists only in another collection mode.
    #[error("{operation} is not supported in {mode:?} mode")]
    UnsupportedMode {
        operation: &'static str,
        mode: Mode,
    },

    /// A hook kind was registered twice, or an unknown kind was requested.
    #[error("hook error: {0}")]
    Hook(String),

    /// The OS refused to spawn the background sampler thread.
    #[error("failed to spawn sampler thread: {0}")]
    Sampler(#[from] std::io::Error),
}

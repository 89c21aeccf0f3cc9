// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide registry of active collectors. This replaces the classic
//! module-level "currently active collector" variable: callers hold an
//! explicit [CollectorHandle](crate::collector::CollectorHandle) and the
//! registry only answers "what is running right now".

use crate::collections::identifiable::FxIndexMap;
use crate::collector::Mode;
use crate::error::CollectorError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Opaque identity of one collector instance, unique for the process
/// lifetime.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct CollectorId(u64);

impl fmt::Display for CollectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "collector-{}", self.0)
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_id() -> CollectorId {
    CollectorId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

fn active() -> &'static Mutex<FxIndexMap<CollectorId, Mode>> {
    static ACTIVE: OnceLock<Mutex<FxIndexMap<CollectorId, Mode>>> = OnceLock::new();
    ACTIVE.get_or_init(Default::default)
}

pub(crate) fn activate(id: CollectorId, mode: Mode) -> Result<(), CollectorError> {
    let mut map = active().lock();
    if map.contains_key(&id) {
        return Err(CollectorError::AlreadyRunning);
    }
    map.insert(id, mode);
    Ok(())
}

pub(crate) fn deactivate(id: CollectorId) {
    active().lock().shift_remove(&id);
}

/// Whether the given collector is currently running.
pub fn is_active(id: CollectorId) -> bool {
    active().lock().contains_key(&id)
}

/// Snapshot of every active collector, in activation order.
pub fn active_collectors() -> Vec<(CollectorId, Mode)> {
    active().lock().iter().map(|(id, mode)| (*id, *mode)).collect()
}

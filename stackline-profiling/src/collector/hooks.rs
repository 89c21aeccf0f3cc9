// Copyright 2024-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Named marker-hook registry. A hook is an optional capability (GC event
//! taps, scheduler instrumentation, ...) that, once enabled for a running
//! collector, feeds that collector's timeline exclusively through
//! [CollectorHandle::add_marker](crate::collector::CollectorHandle::add_marker).

use crate::collector::CollectorHandle;
use crate::error::CollectorError;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// One marker-producing capability. Implementations arm whatever runtime
/// instrumentation they need in `enable` and tear it down in `disable`.
pub trait MarkerHook: Send + Sync + 'static {
    fn enable(&self, collector: &CollectorHandle) -> anyhow::Result<()>;
    fn disable(&self);
}

fn hooks() -> &'static Mutex<BTreeMap<String, Arc<dyn MarkerHook>>> {
    static HOOKS: OnceLock<Mutex<BTreeMap<String, Arc<dyn MarkerHook>>>> = OnceLock::new();
    HOOKS.get_or_init(Default::default)
}

/// Registers a hook under `kind`. Each kind is registered once for the
/// process lifetime.
pub fn register(kind: &str, hook: Arc<dyn MarkerHook>) -> Result<(), CollectorError> {
    let mut map = hooks().lock();
    if map.contains_key(kind) {
        return Err(CollectorError::Hook(format!(
            "hook kind {kind:?} is already registered"
        )));
    }
    map.insert(kind.to_string(), hook);
    Ok(())
}

/// Known hook kinds, sorted.
pub fn kinds() -> Vec<String> {
    hooks().lock().keys().cloned().collect()
}

fn lookup(kind: &str) -> Result<Arc<dyn MarkerHook>, CollectorError> {
    hooks()
        .lock()
        .get(kind)
        .cloned()
        .ok_or_else(|| CollectorError::Hook(format!("unknown hook kind {kind:?}")))
}

/// Enables `kind` for `collector`.
pub fn enable(kind: &str, collector: &CollectorHandle) -> Result<(), CollectorError> {
    let hook = lookup(kind)?;
    hook.enable(collector)
        .map_err(|e| CollectorError::Hook(format!("enabling {kind:?} failed: {e:#}")))?;
    tracing::debug!(kind, collector = %collector.id(), "marker hook enabled");
    Ok(())
}

/// Disables `kind`. Safe to call for a hook that was never enabled.
pub fn disable(kind: &str) -> Result<(), CollectorError> {
    let hook = lookup(kind)?;
    hook.disable();
    tracing::debug!(kind, "marker hook disabled");
    Ok(())
}

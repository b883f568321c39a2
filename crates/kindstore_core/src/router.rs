//! Kind to store routing.

use crate::error::{CoreError, CoreResult};
use crate::kind::RecordKind;
use kindstore_engine::StoreHandle;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug)]
enum Route {
    Open(StoreHandle),
    Degraded(String),
}

/// Maps each registered kind to its store.
///
/// The map is swapped wholesale only during compaction; lookups take a
/// shared lock and clone the handle out.
#[derive(Debug, Default)]
pub(crate) struct StoreRouter {
    routes: RwLock<HashMap<RecordKind, Route>>,
}

impl StoreRouter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the store for `kind`.
    pub(crate) fn route(&self, kind: &RecordKind) -> CoreResult<StoreHandle> {
        match self.routes.read().get(kind) {
            Some(Route::Open(handle)) => Ok(StoreHandle::clone(handle)),
            Some(Route::Degraded(reason)) => Err(CoreError::KindDegraded {
                kind: kind.clone(),
                reason: reason.clone(),
            }),
            None => Err(CoreError::UnregisteredKind { kind: kind.clone() }),
        }
    }

    pub(crate) fn install(&self, kind: RecordKind, handle: StoreHandle) {
        self.routes.write().insert(kind, Route::Open(handle));
    }

    pub(crate) fn mark_degraded(&self, kind: RecordKind, reason: String) {
        self.routes.write().insert(kind, Route::Degraded(reason));
    }

    /// Healthy kinds with their handles, sorted by kind.
    pub(crate) fn handles(&self) -> Vec<(RecordKind, StoreHandle)> {
        let mut handles: Vec<_> = self
            .routes
            .read()
            .iter()
            .filter_map(|(kind, route)| match route {
                Route::Open(handle) => Some((kind.clone(), StoreHandle::clone(handle))),
                Route::Degraded(_) => None,
            })
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles
    }

    /// Degraded kinds, sorted.
    pub(crate) fn degraded_kinds(&self) -> Vec<RecordKind> {
        let mut kinds: Vec<_> = self
            .routes
            .read()
            .iter()
            .filter(|(_, route)| matches!(route, Route::Degraded(_)))
            .map(|(kind, _)| kind.clone())
            .collect();
        kinds.sort();
        kinds
    }
}

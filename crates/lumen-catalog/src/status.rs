//! In-memory operation status tracking with RAII release.

use crate::error::{CatalogError, CatalogResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `OperationState` values.
pub enum OperationState {
    Idle,
    Installing,
    Uninstalling,
}

/// Tracks which versioned ids have an operation in flight.
///
/// Best-effort in-process guard: it serializes operations per versioned id
/// within one process, never across processes. `Idle` is represented by
/// absence, so the map only holds ids with work in flight.
#[derive(Debug, Clone, Default)]
pub struct OperationTracker {
    inner: Arc<Mutex<HashMap<String, OperationState>>>,
}

impl OperationTracker {
    pub fn state(&self, versioned_id: &str) -> OperationState {
        self.lock()
            .get(versioned_id)
            .copied()
            .unwrap_or(OperationState::Idle)
    }

    /// Claim `versioned_id` for `state`, or fail with `OperationInProgress`.
    ///
    /// The claim is released when the returned guard drops, which covers
    /// every exit path of the surrounding operation.
    pub(crate) fn begin(
        &self,
        versioned_id: &str,
        state: OperationState,
    ) -> CatalogResult<OperationGuard> {
        let mut states = self.lock();
        match states.get(versioned_id) {
            None | Some(OperationState::Idle) => {
                states.insert(versioned_id.to_string(), state);
                Ok(OperationGuard {
                    tracker: self.clone(),
                    versioned_id: versioned_id.to_string(),
                })
            }
            Some(_) => Err(CatalogError::OperationInProgress(versioned_id.to_string())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, OperationState>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// RAII guard that returns a versioned id to `Idle` when dropped.
#[derive(Debug)]
pub(crate) struct OperationGuard {
    tracker: OperationTracker,
    versioned_id: String,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.tracker.lock().remove(&self.versioned_id);
    }
}

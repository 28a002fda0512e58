//! Most recent detection state per camera.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

/// What a camera saw most recently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionState {
    /// Last announced symbol payload; empty until one is decoded.
    pub last_payload: String,
    /// Name of the symbology of `last_payload`.
    pub last_symbology: String,
    /// Id of the last marker seen; `-1` until one is detected.
    pub last_marker_id: i64,
    /// Frames processed so far.
    pub frames: u64,
    /// Wall-clock time of the last update, in milliseconds since the epoch.
    pub updated_at_ms: u64,
}

impl Default for DetectionState {
    fn default() -> Self {
        Self {
            last_payload: String::new(),
            last_symbology: String::new(),
            last_marker_id: -1,
            frames: 0,
            updated_at_ms: 0,
        }
    }
}

/// Shared map from camera id to its latest [`DetectionState`].
///
/// Clones share the same map. Each camera's acquisition loop is the only
/// writer of its own entry; any thread may read. A reader sees either the
/// previous or the new state of an entry, never a mix.
#[derive(Clone, Debug, Default)]
pub struct LatestResultStore {
    inner: Arc<RwLock<HashMap<String, DetectionState>>>,
}

impl LatestResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one camera's state. A camera that never published reads
    /// as [`DetectionState::default`]: empty payload, marker id `-1`.
    pub fn get(&self, camera: &str) -> DetectionState {
        self.try_get(camera).unwrap_or_default()
    }

    /// Like [`get`](Self::get), but `None` if the camera never published.
    pub fn try_get(&self, camera: &str) -> Option<DetectionState> {
        self.read().get(camera).cloned()
    }

    /// Replace a camera's state.
    pub fn set(&self, camera: &str, state: DetectionState) {
        self.write().insert(camera.to_owned(), state);
    }

    /// Modify a camera's state in place (starting from the default) and
    /// return the result.
    pub fn update<F>(&self, camera: &str, f: F) -> DetectionState
    where
        F: FnOnce(&mut DetectionState),
    {
        let mut map = self.write();
        let state = map.entry(camera.to_owned()).or_default();
        f(state);
        state.clone()
    }

    /// Camera ids with a published state, sorted.
    pub fn cameras(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn snapshot(&self) -> HashMap<String, DetectionState> {
        self.read().clone()
    }

    // A panicking writer cannot leave a half-written entry behind, so a
    // poisoned lock still holds consistent data.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, DetectionState>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, DetectionState>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

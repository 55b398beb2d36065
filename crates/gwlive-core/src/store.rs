//! In-memory sensor state store.
//!
//! The store is the single source of truth for "what is each sensor doing
//! right now and over the recent past". It keeps the latest reading per
//! sensor and a bounded history ring of [`HistoryPoint`]s.
//!
//! # Consistency
//!
//! [`SensorStateStore::apply`] takes the write lock once for the whole batch,
//! so readers see either the state before the batch or after it, never a
//! history buffer in the middle of an append.
//!
//! # Ordering
//!
//! History is ordered by the server timestamp carried on each reading, not
//! by arrival. A reading that arrives late (for example across a channel
//! switch) is slotted in behind any newer points. Equal timestamps keep
//! arrival order, and equal consecutive values are never deduplicated.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::debug;

use gwlive_types::{HistoryPoint, SensorReading};

/// Number of history points kept per sensor.
pub const HISTORY_CAPACITY: usize = 50;

/// State tracked for one sensor.
#[derive(Debug, Clone)]
pub struct SensorState {
    /// Sensor identifier.
    pub sensor_id: String,
    /// Most recently applied reading.
    pub latest: SensorReading,
    history: VecDeque<HistoryPoint>,
}

impl SensorState {
    fn new(reading: &SensorReading, capacity: usize) -> Self {
        Self {
            sensor_id: reading.sensor_id.clone(),
            latest: reading.clone(),
            history: VecDeque::with_capacity(capacity),
        }
    }

    fn record(&mut self, reading: &SensorReading, capacity: usize) {
        self.latest = reading.clone();

        let point = HistoryPoint::from(reading);
        let mut idx = self.history.len();
        while idx > 0 && self.history[idx - 1].timestamp > point.timestamp {
            idx -= 1;
        }
        self.history.insert(idx, point);

        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }

    /// History points, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.history.iter()
    }

    /// Number of history points held.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

/// Read-only copy of one sensor's state.
#[derive(Debug, Clone, Serialize)]
pub struct SensorSnapshot {
    /// Latest reading.
    pub latest: SensorReading,
    /// History, oldest first.
    pub history: Vec<HistoryPoint>,
}

/// Thread-safe store of per-sensor state.
///
/// Construct one per dashboard session and share it with `Arc`; there is no
/// global instance.
#[derive(Debug)]
pub struct SensorStateStore {
    sensors: RwLock<HashMap<String, SensorState>>,
    capacity: usize,
}

impl Default for SensorStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorStateStore {
    /// Create an empty store with the default history capacity.
    pub fn new() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }

    /// Create an empty store keeping `capacity` points per sensor.
    ///
    /// A capacity of zero is bumped to one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sensors: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// History capacity per sensor.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SensorState>> {
        self.sensors.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SensorState>> {
        self.sensors.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a batch of readings atomically.
    ///
    /// Unknown sensor ids create new state. Returns the number of readings
    /// applied.
    pub fn apply(&self, readings: &[SensorReading]) -> usize {
        if readings.is_empty() {
            return 0;
        }
        let mut sensors = self.write();
        for reading in readings {
            match sensors.get_mut(&reading.sensor_id) {
                Some(state) => state.record(reading, self.capacity),
                None => {
                    debug!("Tracking new sensor {}", reading.sensor_id);
                    let mut state = SensorState::new(reading, self.capacity);
                    state.record(reading, self.capacity);
                    sensors.insert(reading.sensor_id.clone(), state);
                }
            }
        }
        readings.len()
    }

    /// Latest reading for every tracked sensor.
    pub fn current_all(&self) -> HashMap<String, SensorReading> {
        self.read()
            .iter()
            .map(|(id, state)| (id.clone(), state.latest.clone()))
            .collect()
    }

    /// Latest reading for one sensor.
    pub fn latest(&self, sensor_id: &str) -> Option<SensorReading> {
        self.read().get(sensor_id).map(|s| s.latest.clone())
    }

    /// History for one sensor, oldest first. Empty for unknown sensors.
    pub fn history_of(&self, sensor_id: &str) -> Vec<HistoryPoint> {
        self.read()
            .get(sensor_id)
            .map(|s| s.history.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Latest reading and history taken under a single lock.
    pub fn snapshot(&self, sensor_id: &str) -> Option<SensorSnapshot> {
        self.read().get(sensor_id).map(|s| SensorSnapshot {
            latest: s.latest.clone(),
            history: s.history.iter().copied().collect(),
        })
    }

    /// Run `f` against the full state map under the read lock.
    pub fn with_sensors<R>(&self, f: impl FnOnce(&HashMap<String, SensorState>) -> R) -> R {
        f(&self.read())
    }

    /// Ids of every tracked sensor, sorted.
    pub fn sensor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of tracked sensors.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no sensor has reported yet.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Forget every sensor.
    pub fn clear(&self) {
        self.write().clear();
    }
}

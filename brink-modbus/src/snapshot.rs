//! Point-in-time register snapshots.
//!
//! Each poll cycle produces one [`Snapshot`]; the [`SnapshotStore`] hands out
//! the latest one wholesale, so a reader never observes a cycle half applied.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

/// A register value after read-time scaling.
///
/// Unscaled registers keep their integral reading; scaled registers become
/// floating point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Raw register reading, sign-extended.
    Integer(i64),
    /// Scaled reading.
    Float(f64),
}

impl Value {
    /// Numeric view regardless of representation.
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Integer(v) => *v as f64,
            Value::Float(v) => *v,
        }
    }

    /// The value as a raw register quantity, when it is one.
    ///
    /// Scaled values return `None`; mode comparisons only ever look at
    /// unscaled registers.
    pub fn as_i16(&self) -> Option<i16> {
        match self {
            Value::Integer(v) => i16::try_from(*v).ok(),
            Value::Float(_) => None,
        }
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) if v.fract() == 0.0 => write!(f, "{:.0}", v),
            Value::Float(v) => write!(f, "{}", v),
        }
    }
}

/// The merged result of one poll cycle.
///
/// Keys are catalog keys; registers whose read failed are simply absent.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    values: HashMap<&'static str, Value>,
    taken_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create an empty snapshot stamped with the current time.
    pub fn empty() -> Self {
        Self {
            values: HashMap::new(),
            taken_at: Utc::now(),
        }
    }

    /// Record a value for a catalog key.
    pub fn insert(&mut self, key: &'static str, value: Value) {
        self.values.insert(key, value);
    }

    /// Look up a key; `None` when the most recent cycle did not read it.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).copied()
    }

    /// Whether this cycle read the key.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of registers read in this cycle.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the cycle read nothing (failed cycle, or none run yet).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// When the cycle that produced this snapshot started.
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }
}

/// Shared store handing out the latest snapshot.
///
/// Single writer (the poll loop), many readers. Readers receive the `Arc`,
/// so a reader holding a snapshot keeps a consistent cycle while the next
/// one is published.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Create a store holding an empty snapshot.
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::empty())),
        }
    }

    /// Replace the published snapshot wholesale.
    pub fn publish(&self, snapshot: Snapshot) {
        *self.current.write() = Arc::new(snapshot);
    }

    /// The latest published snapshot.
    pub fn load(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Single-key lookup against the latest snapshot.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.current.read().get(key)
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

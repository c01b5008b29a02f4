//! Recovery store abstraction.
//!
//! The timer and the interruption tracker persist a single small record each
//! through [`RecoveryStore`]. Anything that can load and save a string under a
//! key satisfies it: the SQLite [`Database`](super::Database) kv table in the
//! app, [`MemoryStore`] in tests.
//!
//! Records are JSON. A record that is present but does not decode is reported
//! as [`StoreError::Corrupt`] so the recovery path can discard it.

use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// Key of the persisted task timer record.
pub const TIMER_KEY: &str = "timer.active";
/// Key of the persisted open interruption.
pub const INTERRUPTION_KEY: &str = "interruption.active";

pub trait RecoveryStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save_raw(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

impl<S: RecoveryStore + ?Sized> RecoveryStore for &S {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).load_raw(key)
    }

    fn save_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).save_raw(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

impl<S: RecoveryStore + ?Sized> RecoveryStore for Rc<S> {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).load_raw(key)
    }

    fn save_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).save_raw(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }
}

/// Load and decode a record.
pub fn load_record<T: DeserializeOwned>(
    store: &impl RecoveryStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let Some(raw) = store.load_raw(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })
}

/// Encode and save a record.
pub fn save_record<T: Serialize>(
    store: &impl RecoveryStore,
    key: &str,
    record: &T,
) -> Result<(), StoreError> {
    let json = serde_json::to_string(record).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    store.save_raw(key, &json)
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent save fail. Lets tests check that timing keeps
    /// going when persistence does not.
    pub fn fail_writes(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_writes.lock() {
            *flag = fail;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn writes_failing(&self) -> bool {
        self.fail_writes.lock().map(|f| *f).unwrap_or(true)
    }
}

impl RecoveryStore for MemoryStore {
    fn load_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn save_raw(&self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.writes_failing() {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        value: u32,
    }

    #[test]
    fn record_roundtrip() {
        let store = MemoryStore::new();
        assert!(load_record::<Probe>(&store, "k").unwrap().is_none());
        save_record(&store, "k", &Probe { value: 7 }).unwrap();
        assert_eq!(load_record::<Probe>(&store, "k").unwrap(), Some(Probe { value: 7 }));
        store.remove("k").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn undecodable_record_is_corrupt() {
        let store = MemoryStore::new();
        store.save_raw("k", "{\"value\": \"seven\"}").unwrap();
        let err = load_record::<Probe>(&store, "k").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref key, .. } if key == "k"));
    }

    #[test]
    fn failing_writes_surface_as_errors() {
        let store = MemoryStore::new();
        store.fail_writes(true);
        assert!(save_record(&store, "k", &Probe { value: 1 }).is_err());
        store.fail_writes(false);
        assert!(save_record(&store, "k", &Probe { value: 1 }).is_ok());
    }

    #[test]
    fn shared_through_rc() {
        let store = Rc::new(MemoryStore::new());
        let a = Rc::clone(&store);
        a.save_raw("k", "1").unwrap();
        assert_eq!(store.load_raw("k").unwrap().as_deref(), Some("1"));
    }
}

//! Typed key-value persistence seam.
//!
//! Keys are at most [`MAX_KEY_LEN`] characters to match the constraints of
//! NVS-style stores; longer keys are rejected rather than truncated. String
//! values are bounded at 32 bytes, enough for a 128-bit token in hex.

use heapless::{FnvIndexMap, String};

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 6;

/// Bounded string value type used by [`KvStore`].
pub type StrValue = String<32>;

pub trait KvStore {
    fn get_i32(&self, key: &str) -> Option<i32>;
    fn put_i32(&mut self, key: &str, value: i32) -> bool;

    fn get_str(&self, key: &str) -> Option<StrValue>;
    fn put_str(&mut self, key: &str, value: &str) -> bool;

    fn get_bool(&self, key: &str) -> Option<bool>;
    fn put_bool(&mut self, key: &str, value: bool) -> bool;

    /// Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> bool;

    fn contains(&self, key: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Int(i32),
    Str(StrValue),
    Bool(bool),
}

/// Bounded in-memory [`KvStore`] for host builds and tests.
///
/// Capacity covers the peer directory at its maximum size (six keys per slot
/// plus the global entries) with headroom.
#[derive(Debug, Default)]
pub struct MemKv {
    map: FnvIndexMap<String<MAX_KEY_LEN>, Value, 128>,
}

impl MemKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn put(&mut self, key: &str, value: Value) -> bool {
        let Ok(key) = String::try_from(key) else {
            return false;
        };
        self.map.insert(key, value).is_ok()
    }

    fn get(&self, key: &str) -> Option<&Value> {
        let key = String::<MAX_KEY_LEN>::try_from(key).ok()?;
        self.map.get(&key)
    }
}

impl KvStore for MemKv {
    fn get_i32(&self, key: &str) -> Option<i32> {
        match self.get(key)? {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn put_i32(&mut self, key: &str, value: i32) -> bool {
        self.put(key, Value::Int(value))
    }

    fn get_str(&self, key: &str) -> Option<StrValue> {
        match self.get(key)? {
            Value::Str(v) => Some(v.clone()),
            _ => None,
        }
    }

    fn put_str(&mut self, key: &str, value: &str) -> bool {
        let Ok(value) = StrValue::try_from(value) else {
            return false;
        };
        self.put(key, Value::Str(value))
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn put_bool(&mut self, key: &str, value: bool) -> bool {
        self.put(key, Value::Bool(value))
    }

    fn remove(&mut self, key: &str) -> bool {
        let Ok(key) = String::<MAX_KEY_LEN>::try_from(key) else {
            return false;
        };
        self.map.remove(&key);
        true
    }

    fn contains(&self, key: &str) -> bool {
        String::<MAX_KEY_LEN>::try_from(key)
            .map(|key| self.map.contains_key(&key))
            .unwrap_or(false)
    }
}

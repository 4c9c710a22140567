// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A type-erased key-value contract and its implementation for [`SessionStore`].

use crate::entry::SharedValue;
use crate::error::Result;
use crate::store::SessionStore;

/// A type-erased, string-keyed key-value store.
///
/// This is the contract session-aware components depend on when they should not care
/// which store backs them. It is object safe, so it can be held as `Arc<dyn KeyValue>`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use session_store::{KeyValue, SessionStore, SharedValue};
/// use tick::Clock;
///
/// let sessions: Arc<dyn KeyValue> = Arc::new(SessionStore::new(Clock::new_frozen()));
///
/// let value: SharedValue = Arc::new(String::from("alice"));
/// sessions.set("user", value)?;
///
/// let user = sessions.get("user")?;
/// assert_eq!(user.downcast_ref::<String>().map(String::as_str), Some("alice"));
/// # Ok::<(), session_store::Error>(())
/// ```
pub trait KeyValue: Send + Sync {
    /// Stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Fails if a live value is already stored under `key`.
    fn set(&self, key: &str, value: SharedValue) -> Result<()>;

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Fails if `key` is absent or its value has expired.
    fn get(&self, key: &str) -> Result<SharedValue>;

    /// Removes the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Fails if `key` is absent.
    fn delete(&self, key: &str) -> Result<()>;

    /// Removes every value.
    ///
    /// # Errors
    ///
    /// Implementations backed by external storage may fail; [`SessionStore`] never does.
    fn clear(&self) -> Result<()>;
}

impl KeyValue for SessionStore {
    fn set(&self, key: &str, value: SharedValue) -> Result<()> {
        self.inner.insert(key.as_bytes(), value)
    }

    fn get(&self, key: &str) -> Result<SharedValue> {
        self.inner.access(key.as_bytes(), |_| true)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner.remove(key.as_bytes(), |_| true).map(drop)
    }

    fn clear(&self) -> Result<()> {
        SessionStore::clear(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tick::{Clock, ClockControl};

    use super::*;

    fn erased(store: SessionStore) -> Arc<dyn KeyValue> {
        Arc::new(store)
    }

    #[test]
    fn set_then_get_returns_same_allocation() {
        let kv = erased(SessionStore::new(Clock::new_frozen()));
        let value: SharedValue = Arc::new(5_u64);

        kv.set("a", Arc::clone(&value)).expect("set should succeed");
        let read = kv.get("a").expect("get should succeed");

        assert!(Arc::ptr_eq(&value, &read));
    }

    #[test]
    fn set_does_not_clobber() {
        let kv = erased(SessionStore::new(Clock::new_frozen()));

        kv.set("a", Arc::new(1_u8)).expect("set should succeed");
        let error = kv.set("a", Arc::new("other")).expect_err("second set should fail");

        assert!(error.is_already_exists());
    }

    #[test]
    fn typed_and_erased_views_share_entries() {
        let store = SessionStore::new(Clock::new_frozen());
        let kv = erased(store.clone());

        store.put("typed", 9_i16).expect("put should succeed");
        let read = kv.get("typed").expect("erased get should see typed entry");
        assert_eq!(read.downcast_ref::<i16>(), Some(&9));

        kv.delete("typed").expect("erased delete should succeed");
        assert!(store.get::<i16>("typed").expect_err("entry should be gone").is_not_found());
    }

    #[test]
    fn erased_get_honors_expiration() {
        let control = ClockControl::new();
        let store = SessionStore::builder(control.to_clock()).ttl(Duration::from_secs(1)).build();
        let kv = erased(store);

        kv.set("a", Arc::new(())).expect("set should succeed");
        control.advance(Duration::from_secs(2));

        assert!(kv.get("a").expect_err("entry should have expired").is_expired());
        assert!(kv.get("a").expect_err("entry should be evicted").is_not_found());
    }

    #[test]
    fn delete_missing_and_clear() {
        let kv = erased(SessionStore::new(Clock::new_frozen()));
        assert!(kv.delete("nope").expect_err("nothing to delete").is_not_found());

        kv.set("a", Arc::new(1_u8)).expect("set should succeed");
        kv.set("b", Arc::new(2_u8)).expect("set should succeed");
        kv.clear().expect("clear should succeed");

        assert!(kv.get("a").expect_err("cleared").is_not_found());
        assert!(kv.get("b").expect_err("cleared").is_not_found());
    }
}

//! Profile Repository interface.
//!
//! The controller only ever holds the map it was handed for one cycle; the
//! repository owns durable storage. [`crate::db::Database`] is the SQLite
//! implementation, [`MemoryRepository`] the in-process one.

use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;

use crate::error::AppError;

use super::profile::{Profile, ProfileKey, ProfileMap};

pub trait ProfileRepository: Send + Sync {
    /// All stored profiles in iteration order.
    fn get(&self) -> Result<ProfileMap, AppError>;

    /// Create or overwrite the profile stored under `key`.
    fn put(&self, key: ProfileKey, profile: &Profile) -> Result<(), AppError>;

    /// Remove a profile. Deleting a missing key is not an error.
    fn delete(&self, key: ProfileKey) -> Result<(), AppError>;

    /// Store a new profile under a freshly allocated key.
    fn insert(&self, profile: &Profile) -> Result<ProfileKey, AppError>;

    /// Set only `last_activated_at`. A missing key stays missing.
    fn touch(&self, key: ProfileKey, activated_at: i64) -> Result<(), AppError>;

    fn find(&self, key: ProfileKey) -> Result<Option<Profile>, AppError> {
        Ok(self.get()?.remove(&key))
    }
}

/// Concurrent in-memory repository.
#[derive(Debug)]
pub struct MemoryRepository {
    profiles: DashMap<ProfileKey, Profile>,
    next_key: AtomicI64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self {
            profiles: DashMap::new(),
            next_key: AtomicI64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRepository for MemoryRepository {
    fn get(&self) -> Result<ProfileMap, AppError> {
        Ok(self
            .profiles
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect())
    }

    fn put(&self, key: ProfileKey, profile: &Profile) -> Result<(), AppError> {
        self.profiles.insert(key, profile.clone());
        self.next_key.fetch_max(key + 1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, key: ProfileKey) -> Result<(), AppError> {
        self.profiles.remove(&key);
        Ok(())
    }

    fn insert(&self, profile: &Profile) -> Result<ProfileKey, AppError> {
        let key = self.next_key.fetch_add(1, Ordering::SeqCst);
        self.profiles.insert(key, profile.clone());
        Ok(key)
    }

    fn touch(&self, key: ProfileKey, activated_at: i64) -> Result<(), AppError> {
        if let Some(mut profile) = self.profiles.get_mut(&key) {
            profile.last_activated_at = Some(activated_at);
        }
        Ok(())
    }

    fn find(&self, key: ProfileKey) -> Result<Option<Profile>, AppError> {
        Ok(self.profiles.get(&key).map(|p| p.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::Provider;

    #[test]
    fn test_insert_allocates_increasing_keys() {
        let repo = MemoryRepository::new();
        let a = repo.insert(&Profile::new("a", Provider::WireguardLike, "wg0")).unwrap();
        let b = repo.insert(&Profile::new("b", Provider::WireguardLike, "wg1")).unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn test_get_iterates_in_key_order() {
        let repo = MemoryRepository::new();
        for key in [5, 2, 9] {
            repo.put(key, &Profile::new(format!("p{key}"), Provider::IcsOpenVpn, "t"))
                .unwrap();
        }
        let keys: Vec<_> = repo.get().unwrap().into_keys().collect();
        assert_eq!(keys, vec![2, 5, 9]);
    }

    #[test]
    fn test_put_bumps_next_key_past_explicit_keys() {
        let repo = MemoryRepository::new();
        repo.put(10, &Profile::new("x", Provider::WireguardLike, "wg0")).unwrap();
        let key = repo.insert(&Profile::new("y", Provider::WireguardLike, "wg1")).unwrap();
        assert_eq!(key, 11);
    }

    #[test]
    fn test_delete_missing_key_is_ok() {
        let repo = MemoryRepository::new();
        assert!(repo.delete(42).is_ok());
        assert!(repo.is_empty());
    }

    #[test]
    fn test_touch_updates_only_timestamp() {
        let repo = MemoryRepository::new();
        let key = repo.insert(&Profile::new("a", Provider::WireguardLike, "wg0")).unwrap();
        let mut edited = Profile::new("a (edited)", Provider::WireguardLike, "wg1");
        edited.enabled = false;
        repo.put(key, &edited).unwrap();

        repo.touch(key, 1_700_000_000).unwrap();

        let stored = repo.find(key).unwrap().unwrap();
        assert_eq!(stored.name, "a (edited)");
        assert!(!stored.enabled);
        assert_eq!(stored.last_activated_at, Some(1_700_000_000));
    }

    #[test]
    fn test_touch_missing_key_does_not_create() {
        let repo = MemoryRepository::new();
        repo.touch(3, 1_700_000_000).unwrap();
        assert!(repo.is_empty());
    }

    #[test]
    fn test_find() {
        let repo = MemoryRepository::new();
        let key = repo.insert(&Profile::new("a", Provider::WireguardLike, "wg0")).unwrap();
        assert_eq!(repo.find(key).unwrap().unwrap().name, "a");
        assert!(repo.find(key + 1).unwrap().is_none());
    }
}

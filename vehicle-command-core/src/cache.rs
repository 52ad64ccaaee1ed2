//! Session cache persistence (spec §6.4).
//!
//! Stores each domain's exported session state (see
//! [`crate::session::SessionContext::export`]) as an opaque blob, keyed by
//! VIN and domain, in a sled database. Grounded in the teacher's
//! `storage.rs`/`keystore.rs`: transactional writes followed by
//! `flush_async`. An in-memory LRU index bounds how many entries are kept
//! warm without touching disk.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use vehicle_command_proto::Domain;

use crate::error::Error;

fn cache_key(vin: &str, domain: Domain) -> Vec<u8> {
    format!("{vin}:{}", domain.as_u8()).into_bytes()
}

/// Sled-backed cache of per-domain session blobs.
pub struct SessionCache {
    db: sled::Db,
    /// Tracks recency of access so eviction can drop the least-recently
    /// used entries once `max_entries` is exceeded; sled itself has no
    /// notion of LRU.
    recency: Mutex<LruCache<Vec<u8>, ()>>,
}

impl SessionCache {
    pub fn open(path: &str, max_entries: usize) -> Result<Self, Error> {
        let db = sled::open(path)?;
        let capacity = NonZeroUsize::new(max_entries.max(1)).expect("max(1) is never zero");
        let mut recency = LruCache::new(capacity);
        for key in db.iter().keys().flatten() {
            recency.put(key.to_vec(), ());
        }
        Ok(Self { db, recency: Mutex::new(recency) })
    }

    pub fn put(&self, vin: &str, domain: Domain, blob: &[u8]) -> Result<(), Error> {
        let key = cache_key(vin, domain);
        self.db.insert(&key, blob)?;

        let evicted = {
            let mut recency = self.recency.lock().expect("recency lock poisoned");
            let evicted = recency.push(key, ()).filter(|(k, _)| !recency.contains(k));
            evicted.map(|(k, _)| k)
        };
        if let Some(evicted_key) = evicted {
            self.db.remove(&evicted_key)?;
            tracing::debug!("evicted session cache entry past capacity");
        }

        Ok(())
    }

    pub fn get(&self, vin: &str, domain: Domain) -> Result<Option<Vec<u8>>, Error> {
        let key = cache_key(vin, domain);
        if let Ok(mut recency) = self.recency.lock() {
            recency.get(&key);
        }
        Ok(self.db.get(&key)?.map(|ivec| ivec.to_vec()))
    }

    pub fn remove(&self, vin: &str, domain: Domain) -> Result<(), Error> {
        let key = cache_key(vin, domain);
        self.db.remove(&key)?;
        self.recency.lock().expect("recency lock poisoned").pop(&key);
        Ok(())
    }

    pub async fn flush(&self) -> Result<(), Error> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_cache() -> SessionCache {
        let dir = tempfile_dir();
        SessionCache::open(&dir, 2).unwrap()
    }

    fn tempfile_dir() -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("vehicle-command-cache-test-{}", uuid::Uuid::new_v4()));
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn put_then_get_roundtrips() {
        let cache = tmp_cache();
        cache.put("5YJ30123456789ABC", Domain::Infotainment, b"blob").unwrap();
        assert_eq!(cache.get("5YJ30123456789ABC", Domain::Infotainment).unwrap(), Some(b"blob".to_vec()));
    }

    #[test]
    fn missing_entry_returns_none() {
        let cache = tmp_cache();
        assert_eq!(cache.get("5YJ30123456789ABC", Domain::Vcsec).unwrap(), None);
    }

    #[test]
    fn distinct_domains_do_not_collide() {
        let cache = tmp_cache();
        cache.put("5YJ30123456789ABC", Domain::Infotainment, b"a").unwrap();
        cache.put("5YJ30123456789ABC", Domain::Vcsec, b"b").unwrap();
        assert_eq!(cache.get("5YJ30123456789ABC", Domain::Infotainment).unwrap(), Some(b"a".to_vec()));
        assert_eq!(cache.get("5YJ30123456789ABC", Domain::Vcsec).unwrap(), Some(b"b".to_vec()));
    }

    #[test]
    fn remove_deletes_entry() {
        let cache = tmp_cache();
        cache.put("5YJ30123456789ABC", Domain::Infotainment, b"a").unwrap();
        cache.remove("5YJ30123456789ABC", Domain::Infotainment).unwrap();
        assert_eq!(cache.get("5YJ30123456789ABC", Domain::Infotainment).unwrap(), None);
    }

    #[test]
    fn exceeding_capacity_evicts_the_least_recently_used_entry() {
        // Capacity 2: three distinct VINs means the first one touched, never
        // re-read, must be evicted once the third is inserted.
        let cache = tmp_cache();
        cache.put("5YJ30123456789ABC", Domain::Infotainment, b"a").unwrap();
        cache.put("5YJ30223456789ABC", Domain::Infotainment, b"b").unwrap();
        cache.put("5YJ30323456789ABC", Domain::Infotainment, b"c").unwrap();

        assert_eq!(cache.get("5YJ30123456789ABC", Domain::Infotainment).unwrap(), None);
        assert_eq!(cache.get("5YJ30223456789ABC", Domain::Infotainment).unwrap(), Some(b"b".to_vec()));
        assert_eq!(cache.get("5YJ30323456789ABC", Domain::Infotainment).unwrap(), Some(b"c".to_vec()));
    }

    #[test]
    fn reinserting_the_same_key_does_not_evict_it() {
        let cache = tmp_cache();
        cache.put("5YJ30123456789ABC", Domain::Infotainment, b"a").unwrap();
        cache.put("5YJ30123456789ABC", Domain::Infotainment, b"a2").unwrap();
        cache.put("5YJ30223456789ABC", Domain::Infotainment, b"b").unwrap();

        assert_eq!(cache.get("5YJ30123456789ABC", Domain::Infotainment).unwrap(), Some(b"a2".to_vec()));
        assert_eq!(cache.get("5YJ30223456789ABC", Domain::Infotainment).unwrap(), Some(b"b".to_vec()));
    }
}

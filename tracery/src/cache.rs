//! Cached reads keyed like the front-end's queries, with stale marking.
//!
//! A stale entry is never served; the next read refetches it. Each family
//! also carries an epoch that moves on every invalidation, so a fetch that
//! was already running when its family got invalidated stores its result as
//! stale instead of fresh.
//!
//! Search results are keyed by free text, so their families are bounded:
//! each keeps at most [`SEARCH_ENTRY_LIMIT`] entries, and invalidating one
//! drops its entries instead of marking them.

use crate::credential::CredentialObserver;
use crate::ErrorPayload;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Reads that a successful friend or event mutation makes outdated.
pub const MUTATION_DEPENDENTS: [QueryFamily; 2] = [QueryFamily::ProfileInfo, QueryFamily::UserInfo];

/// Most entries kept per search family; the oldest one goes first.
pub const SEARCH_ENTRY_LIMIT: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    ProfileInfo,
    UserInfo(i64),
    EventInfo(i64),
    PotentialFriends { page: u32, search: String },
    EventsSearch { page: u32, search: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryFamily {
    ProfileInfo,
    UserInfo,
    EventInfo,
    PotentialFriends,
    EventsSearch,
}

impl QueryFamily {
    pub const ALL: [Self; 5] = [
        Self::ProfileInfo,
        Self::UserInfo,
        Self::EventInfo,
        Self::PotentialFriends,
        Self::EventsSearch,
    ];

    #[must_use]
    pub const fn is_search(self) -> bool {
        matches!(self, Self::PotentialFriends | Self::EventsSearch)
    }
}

impl QueryKey {
    #[must_use]
    pub const fn family(&self) -> QueryFamily {
        match self {
            Self::ProfileInfo => QueryFamily::ProfileInfo,
            Self::UserInfo(_) => QueryFamily::UserInfo,
            Self::EventInfo(_) => QueryFamily::EventInfo,
            Self::PotentialFriends { .. } => QueryFamily::PotentialFriends,
            Self::EventsSearch { .. } => QueryFamily::EventsSearch,
        }
    }
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    stale: bool,
    stored: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<QueryKey, Entry>,
    epochs: HashMap<QueryFamily, u64>,
    stores: u64,
}

impl Inner {
    fn epoch(&self, family: QueryFamily) -> u64 {
        self.epochs.get(&family).copied().unwrap_or(0)
    }

    fn bump(&mut self, family: QueryFamily) {
        *self.epochs.entry(family).or_insert(0) += 1;
    }

    fn store(&mut self, key: QueryKey, value: Arc<dyn Any + Send + Sync>, stale: bool) {
        let family = key.family();
        self.stores += 1;
        let stored = self.stores;
        self.entries.insert(
            key,
            Entry {
                value,
                stale,
                stored,
            },
        );
        if family.is_search() {
            self.trim(family);
        }
    }

    fn trim(&mut self, family: QueryFamily) {
        let mut kept: Vec<(u64, QueryKey)> = self
            .entries
            .iter()
            .filter(|(key, _)| key.family() == family)
            .map(|(key, entry)| (entry.stored, key.clone()))
            .collect();
        if kept.len() <= SEARCH_ENTRY_LIMIT {
            return;
        }
        kept.sort_unstable_by_key(|(stored, _)| *stored);
        let excess = kept.len() - SEARCH_ENTRY_LIMIT;
        for (_, key) in kept.into_iter().take(excess) {
            tracing::trace!(?key, "evicted");
            self.entries.remove(&key);
        }
    }
}

#[derive(Default)]
pub struct QueryCache {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("entries", &self.inner.lock().entries.len())
            .finish()
    }
}

impl QueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh value for `key`, if cached with type `T`.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let inner = self.inner.lock();
        let entry = inner.entries.get(key).filter(|entry| !entry.stale)?;
        Arc::clone(&entry.value).downcast::<T>().ok()
    }

    /// Stores a fresh value.
    pub fn insert<T: Any + Send + Sync>(&self, key: QueryKey, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.inner
            .lock()
            .store(key, Arc::clone(&value) as Arc<dyn Any + Send + Sync>, false);
        value
    }

    /// `None` if nothing is cached under `key`.
    #[must_use]
    pub fn is_stale(&self, key: &QueryKey) -> Option<bool> {
        self.inner.lock().entries.get(key).map(|entry| entry.stale)
    }

    /// Marks every entry of `family` stale, or drops them for a search
    /// family. Returns how many entries were hit.
    pub fn invalidate(&self, family: QueryFamily) -> usize {
        let mut inner = self.inner.lock();
        inner.bump(family);
        let before = inner.entries.len();
        let mut marked = 0;
        inner.entries.retain(|key, entry| {
            if key.family() != family {
                return true;
            }
            entry.stale = true;
            marked += 1;
            !family.is_search()
        });
        let dropped = before - inner.entries.len();
        tracing::debug!(?family, marked, dropped, "invalidated");
        marked
    }

    /// Marks the reads that depend on friend and event membership stale.
    ///
    /// Only marks; the refetch happens on the next read.
    pub fn invalidate_mutation_dependents(&self) {
        for family in MUTATION_DEPENDENTS {
            self.invalidate(family);
        }
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for family in QueryFamily::ALL {
            inner.bump(family);
        }
        inner.entries.clear();
    }

    /// Serves `key` from the cache, or runs `fetch` and caches its result.
    ///
    /// Failures are not cached; a stale entry stays stale.
    ///
    /// # Errors
    /// Returns whatever `fetch` fails with.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<Arc<T>, ErrorPayload>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ErrorPayload>>,
    {
        if let Some(hit) = self.get::<T>(&key) {
            return Ok(hit);
        }
        let family = key.family();
        let started = self.inner.lock().epoch(family);
        tracing::debug!(?key, "fetching");
        let value = Arc::new(fetch().await?);

        let mut inner = self.inner.lock();
        let stale = inner.epoch(family) != started;
        if stale {
            tracing::debug!(?key, "invalidated while fetching");
        }
        inner.store(key, Arc::clone(&value) as Arc<dyn Any + Send + Sync>, stale);
        Ok(value)
    }
}

impl CredentialObserver for QueryCache {
    fn credential_changed(&self, _credential: Option<&str>) {
        // reads made under one account must never be served to another
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn counted(calls: &AtomicUsize, value: &str) -> Result<String, ErrorPayload> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(value.to_string())
    }

    #[tokio::test]
    async fn fresh_entries_are_served_from_cache() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);
        let first = cache
            .fetch(QueryKey::ProfileInfo, || counted(&calls, "one"))
            .await
            .unwrap();
        let second = cache
            .fetch(QueryKey::ProfileInfo, || counted(&calls, "two"))
            .await
            .unwrap();
        assert_eq!(*first, "one");
        assert_eq!(*second, "one");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_entries_are_refetched() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);
        cache
            .fetch(QueryKey::ProfileInfo, || counted(&calls, "one"))
            .await
            .unwrap();
        cache.invalidate_mutation_dependents();
        assert_eq!(cache.is_stale(&QueryKey::ProfileInfo), Some(true));

        let refreshed = cache
            .fetch(QueryKey::ProfileInfo, || counted(&calls, "two"))
            .await
            .unwrap();
        assert_eq!(*refreshed, "two");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.is_stale(&QueryKey::ProfileInfo), Some(false));
    }

    #[test]
    fn invalidation_is_per_family() {
        let cache = QueryCache::new();
        cache.insert(QueryKey::UserInfo(1), 1_u8);
        cache.insert(QueryKey::UserInfo(2), 2_u8);
        cache.insert(QueryKey::EventInfo(1), 3_u8);

        assert_eq!(cache.invalidate(QueryFamily::UserInfo), 2);
        assert_eq!(cache.is_stale(&QueryKey::UserInfo(2)), Some(true));
        assert_eq!(cache.is_stale(&QueryKey::EventInfo(1)), Some(false));
        assert_eq!(cache.is_stale(&QueryKey::UserInfo(3)), None);
        assert!(cache.get::<u8>(&QueryKey::UserInfo(1)).is_none());
        assert_eq!(cache.get::<u8>(&QueryKey::EventInfo(1)).as_deref(), Some(&3));
    }

    fn friends_search(page: u32) -> QueryKey {
        QueryKey::PotentialFriends {
            page,
            search: "ali".to_string(),
        }
    }

    #[test]
    fn search_invalidation_drops_entries() {
        let cache = QueryCache::new();
        cache.insert(friends_search(1), 1_u8);
        cache.insert(friends_search(2), 2_u8);
        cache.insert(QueryKey::ProfileInfo, 3_u8);

        assert_eq!(cache.invalidate(QueryFamily::PotentialFriends), 2);
        assert_eq!(cache.is_stale(&friends_search(1)), None);
        assert_eq!(cache.is_stale(&QueryKey::ProfileInfo), Some(false));
    }

    #[tokio::test]
    async fn search_families_keep_only_recent_entries() {
        let cache = QueryCache::new();
        let calls = AtomicUsize::new(0);
        let pages = u32::try_from(SEARCH_ENTRY_LIMIT).unwrap() + 3;
        for page in 1..=pages {
            cache
                .fetch(friends_search(page), || counted(&calls, "hit"))
                .await
                .unwrap();
        }
        cache.insert(QueryKey::UserInfo(1), 1_u8);

        for page in 1..=3 {
            assert_eq!(cache.is_stale(&friends_search(page)), None, "page {page}");
        }
        assert_eq!(cache.is_stale(&friends_search(4)), Some(false));
        assert_eq!(cache.is_stale(&friends_search(pages)), Some(false));
        assert_eq!(cache.is_stale(&QueryKey::UserInfo(1)), Some(false));
        assert_eq!(cache.invalidate(QueryFamily::PotentialFriends), SEARCH_ENTRY_LIMIT);
    }

    #[test]
    fn wrong_type_is_a_miss() {
        let cache = QueryCache::new();
        cache.insert(QueryKey::ProfileInfo, 1_u8);
        assert!(cache.get::<String>(&QueryKey::ProfileInfo).is_none());
    }

    #[tokio::test]
    async fn invalidation_during_fetch_stores_stale() {
        let cache = QueryCache::new();
        let value = cache
            .fetch(QueryKey::ProfileInfo, || async {
                cache.invalidate(QueryFamily::ProfileInfo);
                Ok::<_, ErrorPayload>("racing".to_string())
            })
            .await
            .unwrap();
        assert_eq!(*value, "racing");
        assert_eq!(cache.is_stale(&QueryKey::ProfileInfo), Some(true));
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = QueryCache::new();
        let result = cache
            .fetch(QueryKey::EventInfo(4), || async {
                Err::<String, _>(ErrorPayload::unknown())
            })
            .await;
        assert!(result.is_err());
        assert_eq!(cache.is_stale(&QueryKey::EventInfo(4)), None);
    }

    #[test]
    fn credential_change_clears_everything() {
        let cache = QueryCache::new();
        cache.insert(QueryKey::ProfileInfo, 1_u8);
        cache.credential_changed(None);
        assert_eq!(cache.is_stale(&QueryKey::ProfileInfo), None);
    }
}

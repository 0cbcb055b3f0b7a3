//! Short-lived cache of container listings.
//!
//! Control points page through a container with several Browse calls; the
//! cache keeps the ordering and ids of one listing stable across those calls
//! even if the upstream changes or reorders in between.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::media_source::MediaEntry;

struct CachedListing {
    children: Arc<Vec<MediaEntry>>,
    fetched_at: Instant,
}

/// Sorted child listings keyed by container id, valid for a fixed TTL.
pub struct ChildrenCache {
    listings: DashMap<String, CachedListing>,
    ttl: Duration,
}

impl ChildrenCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            listings: DashMap::new(),
            ttl,
        }
    }

    /// Returns a listing if it is younger than the TTL.
    pub fn get(&self, container_id: &str) -> Option<Arc<Vec<MediaEntry>>> {
        if let Some(entry) = self.listings.get(container_id) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Some(entry.children.clone());
            }
        }
        // Guard released above; removing while holding it would deadlock.
        self.listings.remove(container_id);
        None
    }

    /// Sorts and stores a fresh listing, returning the shared copy.
    pub fn insert(&self, container_id: &str, mut children: Vec<MediaEntry>) -> Arc<Vec<MediaEntry>> {
        sort_entries(&mut children);
        let children = Arc::new(children);
        self.listings.insert(
            container_id.to_string(),
            CachedListing {
                children: children.clone(),
                fetched_at: Instant::now(),
            },
        );
        children
    }

    /// Drops expired listings.
    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.listings.retain(|_, l| l.fetched_at.elapsed() < ttl);
    }

    pub fn clear(&self) {
        self.listings.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

/// Case-insensitive title order, ties broken by id.
pub fn sort_entries(entries: &mut [MediaEntry]) {
    entries.sort_by_cached_key(|e| (e.title.to_lowercase(), e.id.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_source::memory::MemoryMediaSource;

    fn folders(titles: &[&str]) -> Vec<MediaEntry> {
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| MemoryMediaSource::folder(&format!("id{}", i), None, t))
            .collect()
    }

    #[test]
    fn listings_are_sorted_case_insensitively() {
        let cache = ChildrenCache::new(Duration::from_secs(30));
        let sorted = cache.insert("0", folders(&["beta", "Alpha", "alpha", "Gamma"]));
        let titles: Vec<_> = sorted.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "alpha", "beta", "Gamma"]);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ChildrenCache::new(Duration::from_secs(30));
        cache.insert("0", folders(&["a"]));
        assert!(cache.get("0").is_some());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.get("0").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_keeps_fresh_listings() {
        let cache = ChildrenCache::new(Duration::from_secs(30));
        cache.insert("old", folders(&["a"]));
        tokio::time::advance(Duration::from_secs(20)).await;
        cache.insert("new", folders(&["b"]));
        tokio::time::advance(Duration::from_secs(15)).await;

        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("new").is_some());
    }
}

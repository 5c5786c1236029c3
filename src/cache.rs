//! In-memory entity cache and fetch-latch primitives
//!
//! Each entity kind gets one [`Store`], which bundles a [`KeyedCache`] with
//! the [`FetchLatch`] that records which fetch scopes have already been
//! satisfied. Repositories never hold raw locks; every accessor here takes
//! and releases the store lock internally.

use std::collections::HashSet;
use std::sync::Mutex;

/// Anything that can live in a [`KeyedCache`]
pub trait Keyed {
    /// Stable unique key for this item (the entity id)
    fn key(&self) -> &str;
}

/// Insertion-ordered cache keyed by [`Keyed::key`]
///
/// An upsert of an existing key replaces the item in place so iteration
/// order is stable across refreshes.
#[derive(Debug)]
pub struct KeyedCache<T: Keyed> {
    items: Vec<T>,
}

impl<T: Keyed> Default for KeyedCache<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Keyed> KeyedCache<T> {
    pub fn find<F: Fn(&T) -> bool>(&self, pred: F) -> Option<&T> {
        self.items.iter().find(|item| pred(item))
    }

    pub fn find_many<F: Fn(&T) -> bool>(&self, pred: F) -> Vec<&T> {
        self.items.iter().filter(|item| pred(item)).collect()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.key() == id)
    }

    pub fn find_many_by_id(&self, ids: &[&str]) -> Vec<&T> {
        self.items
            .iter()
            .filter(|item| ids.contains(&item.key()))
            .collect()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn set(&mut self, item: T) {
        match self.items.iter().position(|i| i.key() == item.key()) {
            Some(pos) => self.items[pos] = item,
            None => self.items.push(item),
        }
    }

    pub fn set_many(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.set(item);
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        self.items
            .iter()
            .position(|i| i.key() == id)
            .map(|pos| self.items.remove(pos))
    }

    pub fn remove_many(&mut self, ids: &[&str]) {
        self.items.retain(|i| !ids.contains(&i.key()));
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Records which fetch scopes have completed so repeated reads can be
/// served from cache without another network round trip
#[derive(Debug, Default)]
pub struct FetchLatch {
    keys: HashSet<String>,
}

impl FetchLatch {
    pub fn is_set(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn set(&mut self, key: impl Into<String>) {
        self.keys.insert(key.into());
    }

    pub fn clear(&mut self, key: &str) {
        self.keys.remove(key);
    }

    pub fn clear_all(&mut self) {
        self.keys.clear();
    }
}

/// Thread-safe cache-plus-latch pair for one entity tier
///
/// Lock poisoning is recovered by taking the inner state; cached data stays
/// usable even if a panic unwound through a holder of the lock.
#[derive(Debug)]
pub struct Store<T: Keyed> {
    inner: Mutex<StoreInner<T>>,
}

#[derive(Debug)]
struct StoreInner<T: Keyed> {
    cache: KeyedCache<T>,
    latch: FetchLatch,
}

impl<T: Keyed> Default for Store<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                cache: KeyedCache::default(),
                latch: FetchLatch::default(),
            }),
        }
    }
}

impl<T: Keyed + Clone> Store<T> {
    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner<T>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn find_by_id(&self, id: &str) -> Option<T> {
        self.lock().cache.find_by_id(id).cloned()
    }

    pub fn find<F: Fn(&T) -> bool>(&self, pred: F) -> Option<T> {
        self.lock().cache.find(pred).cloned()
    }

    pub fn find_many<F: Fn(&T) -> bool>(&self, pred: F) -> Vec<T> {
        self.lock()
            .cache
            .find_many(pred)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn items(&self) -> Vec<T> {
        self.lock().cache.items().to_vec()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().cache.find_by_id(id).is_some()
    }

    pub fn set(&self, item: T) {
        self.lock().cache.set(item);
    }

    pub fn set_many(&self, items: impl IntoIterator<Item = T>) {
        self.lock().cache.set_many(items);
    }

    pub fn remove(&self, id: &str) {
        self.lock().cache.remove(id);
    }

    pub fn remove_many(&self, ids: &[&str]) {
        self.lock().cache.remove_many(ids);
    }

    pub fn is_latched(&self, key: &str) -> bool {
        self.lock().latch.is_set(key)
    }

    pub fn latch(&self, key: impl Into<String>) {
        self.lock().latch.set(key);
    }

    pub fn unlatch(&self, key: &str) {
        self.lock().latch.clear(key);
    }

    pub fn clear_latches(&self) {
        self.lock().latch.clear_all();
    }

    /// Drop all cached items and all latch keys
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.cache.clear();
        inner.latch.clear_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        id: String,
        value: u32,
    }

    impl Keyed for Item {
        fn key(&self) -> &str {
            &self.id
        }
    }

    fn item(id: &str, value: u32) -> Item {
        Item {
            id: id.to_string(),
            value,
        }
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut cache = KeyedCache::default();
        assert!(cache.is_empty());
        cache.set(item("a", 1));
        cache.set(item("b", 2));
        cache.set(item("a", 10));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.items()[0], item("a", 10));
        assert_eq!(cache.items()[1], item("b", 2));
    }

    #[test]
    fn find_many_by_id_filters() {
        let mut cache = KeyedCache::default();
        cache.set_many(vec![item("a", 1), item("b", 2), item("c", 3)]);

        let found = cache.find_many_by_id(&["a", "c", "missing"]);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "a");
        assert_eq!(found[1].id, "c");
    }

    #[test]
    fn remove_many_keeps_order() {
        let mut cache = KeyedCache::default();
        cache.set_many(vec![item("a", 1), item("b", 2), item("c", 3)]);
        cache.remove_many(&["b"]);

        let ids: Vec<&str> = cache.items().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn latch_tracks_independent_keys() {
        let mut latch = FetchLatch::default();
        assert!(!latch.is_set("all"));

        latch.set("all");
        latch.set("all_lite_t1");
        assert!(latch.is_set("all"));
        assert!(latch.is_set("all_lite_t1"));

        latch.clear("all");
        assert!(!latch.is_set("all"));
        assert!(latch.is_set("all_lite_t1"));

        latch.clear_all();
        assert!(!latch.is_set("all_lite_t1"));
    }

    #[test]
    fn store_clear_drops_items_and_latches() {
        let store: Store<Item> = Store::default();
        store.set(item("a", 1));
        store.latch("all");

        store.clear();
        assert!(store.items().is_empty());
        assert!(!store.is_latched("all"));
    }

    #[test]
    fn store_find_clones_out() {
        let store: Store<Item> = Store::default();
        store.set_many(vec![item("a", 1), item("b", 2)]);

        assert_eq!(store.find_by_id("b"), Some(item("b", 2)));
        assert_eq!(store.find(|i| i.value == 1), Some(item("a", 1)));
        assert!(store.contains("a"));
        assert!(!store.contains("z"));
    }
}

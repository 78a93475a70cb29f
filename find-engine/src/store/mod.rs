//! Normalized item store shared by every engine over one collection.
//!
//! Holds items by id plus the pagination index
//! `qid -> fingerprint -> page -> ids`. Writers take the lock, mutate, and
//! bump the revision; readers always see the latest committed state.

mod index;
mod matcher;

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;

use chrono::Utc;
use indexmap::IndexMap;
use pagesync_utils_fingerprint::QueryFingerprint;
use pagesync_utils_fingerprint::fingerprint;
use serde_json::Value;
use tokio::sync::watch;
use tracing::trace;

use crate::params::PageParams;
use crate::params::Params;
use crate::params::params_without_pagination;
use crate::service::ServiceEvent;

pub use index::PageEntry;
pub use index::QueryCacheEntry;

pub type ItemId = String;

/// Reads the id of `item`. String and numeric ids are accepted.
pub fn item_id(item: &Value, id_field: &str) -> Option<ItemId> {
    match item.get(id_field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Default)]
struct StoreState {
    items: IndexMap<ItemId, Value>,
    pagination: HashMap<String, HashMap<QueryFingerprint, QueryCacheEntry>>,
    is_ssr: bool,
}

pub struct ItemStore {
    id_field: String,
    state: RwLock<StoreState>,
    revision: watch::Sender<u64>,
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new("id")
    }
}

impl ItemStore {
    pub fn new(id_field: impl Into<String>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            id_field: id_field.into(),
            state: RwLock::new(StoreState::default()),
            revision,
        }
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Notified with the new revision after every committed write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn is_ssr(&self) -> bool {
        self.read().is_ssr
    }

    pub fn set_ssr(&self, is_ssr: bool) {
        self.write().is_ssr = is_ssr;
        self.bump();
    }

    /// Inserts or replaces items, returning their ids in input order. Items
    /// without an id are skipped.
    pub fn upsert(&self, items: impl IntoIterator<Item = Value>) -> Vec<ItemId> {
        let ids = {
            let mut state = self.write();
            let mut ids = Vec::new();
            for item in items {
                if let Some(id) = item_id(&item, &self.id_field) {
                    state.items.insert(id.clone(), item);
                    ids.push(id);
                }
            }
            ids
        };
        self.bump();
        ids
    }

    pub fn remove(&self, id: &str) -> Option<Value> {
        let removed = self.write().items.shift_remove(id);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.read().items.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves ids against the store in the given order. Dangling ids are
    /// dropped.
    pub fn items_by_ids(&self, ids: &[ItemId]) -> Vec<Value> {
        let state = self.read();
        ids.iter()
            .filter_map(|id| state.items.get(id).cloned())
            .collect()
    }

    /// Items matching `params.query`, honoring `$sort`, `$skip` and `$limit`.
    pub fn find_in_store(&self, params: &Params) -> Vec<Value> {
        let state = self.read();
        matcher::select(state.items.values(), &params.query)
    }

    /// Number of items matching `params.query`, ignoring pagination.
    pub fn count_in_store(&self, params: &Params) -> u64 {
        let query = params_without_pagination(Some(params)).query;
        let state = self.read();
        state
            .items
            .values()
            .filter(|item| matcher::matches(item, &query))
            .count() as u64
    }

    pub fn has_qid(&self, qid: &str) -> bool {
        self.read().pagination.contains_key(qid)
    }

    pub fn query_entry(&self, qid: &str, fingerprint: &QueryFingerprint) -> Option<QueryCacheEntry> {
        self.read()
            .pagination
            .get(qid)
            .and_then(|by_query| by_query.get(fingerprint))
            .cloned()
    }

    /// Records the ids and total of one fetched page.
    pub fn record_page(&self, params: &Params, page: PageParams, ids: Vec<ItemId>, total: u64, ssr: bool) {
        let query = params_without_pagination(Some(params)).query;
        let key = fingerprint(&query);
        trace!(qid = params.qid(), fingerprint = %key, ?page, total, "recording page");
        {
            let mut state = self.write();
            let entry = state
                .pagination
                .entry(params.qid().to_string())
                .or_default()
                .entry(key.clone())
                .or_insert_with(|| QueryCacheEntry::new(params.qid().to_string(), key, query));
            entry.record(
                page,
                PageEntry {
                    ids,
                    total,
                    fetched_at: Utc::now(),
                    ssr,
                },
            );
        }
        self.bump();
    }

    /// Seeds a page that was rendered on the server, so the first client
    /// render can use it without a pending flash.
    pub fn hydrate_page(&self, params: &Params, page: PageParams, items: Vec<Value>, total: u64) {
        let ids = self.upsert(items);
        self.record_page(params, page, ids, total, true);
    }

    /// Applies a realtime notification to the stored items.
    pub fn apply_event(&self, event: &ServiceEvent) {
        match event {
            ServiceEvent::Created(item) | ServiceEvent::Patched(item) => {
                self.upsert([item.clone()]);
            }
            ServiceEvent::Removed(item) => {
                if let Some(id) = item_id(item, &self.id_field) {
                    self.remove(&id);
                }
            }
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

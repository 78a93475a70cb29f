use std::collections::BTreeMap;
use std::collections::HashSet;

use chrono::DateTime;
use chrono::Utc;
use pagesync_utils_fingerprint::QueryFingerprint;

use crate::params::PageParams;
use crate::params::Query;
use crate::store::ItemId;

/// Ids and total recorded for one fetched page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageEntry {
    pub ids: Vec<ItemId>,
    pub total: u64,
    pub fetched_at: DateTime<Utc>,
    /// Seeded from a server-rendered payload rather than fetched here.
    pub ssr: bool,
}

/// Everything known about one `(qid, fingerprint)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCacheEntry {
    pub qid: String,
    pub fingerprint: QueryFingerprint,
    /// The query without pagination operators.
    pub query: Query,
    /// Total reported by the most recent write.
    pub total: u64,
    pub pages: BTreeMap<PageParams, PageEntry>,
    pub fetched_at: DateTime<Utc>,
}

impl QueryCacheEntry {
    pub(crate) fn new(qid: String, fingerprint: QueryFingerprint, query: Query) -> Self {
        Self {
            qid,
            fingerprint,
            query,
            total: 0,
            pages: BTreeMap::new(),
            fetched_at: Utc::now(),
        }
    }

    pub(crate) fn record(&mut self, page: PageParams, entry: PageEntry) {
        self.total = entry.total;
        self.fetched_at = entry.fetched_at;
        self.pages.insert(page, entry);
    }

    pub fn page(&self, page: &PageParams) -> Option<&PageEntry> {
        self.pages.get(page)
    }

    /// Ids of every cached page, ordered by page offset and then position,
    /// first occurrence wins.
    pub fn unique_ids(&self) -> Vec<ItemId> {
        let mut pages: Vec<_> = self.pages.iter().collect();
        pages.sort_by_key(|(page, _)| (page.skip, page.limit));
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (_, entry) in pages {
            for id in &entry.ids {
                if seen.insert(id.clone()) {
                    out.push(id.clone());
                }
            }
        }
        out
    }
}

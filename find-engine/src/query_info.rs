//! Resolving params against the store's pagination index.

use chrono::DateTime;
use chrono::Utc;
use pagesync_utils_fingerprint::QueryFingerprint;
use pagesync_utils_fingerprint::fingerprint;

use crate::params::PageParams;
use crate::params::Params;
use crate::params::Query;
use crate::params::params_without_pagination;
use crate::store::ItemId;
use crate::store::ItemStore;
use crate::store::QueryCacheEntry;

/// Where a set of params lives in the pagination index.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryInfo {
    pub qid: String,
    pub fingerprint: QueryFingerprint,
    /// The query without pagination operators.
    pub query: Query,
    /// `None` when the params carry no `$limit`/`$skip`.
    pub page: Option<PageParams>,
}

/// A [`QueryInfo`] joined with what the store has cached for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedQueryInfo {
    pub info: QueryInfo,
    /// Ids of the addressed page.
    pub ids: Vec<ItemId>,
    /// Total reported with the addressed page.
    pub total: u64,
    pub fetched_at: DateTime<Utc>,
    /// The page was seeded from a server-rendered payload.
    pub ssr: bool,
    /// Every page cached under the same qid and fingerprint.
    pub entry: QueryCacheEntry,
}

pub fn get_query_info(params: &Params) -> QueryInfo {
    let query = params_without_pagination(Some(params)).query;
    let page = match (params.query_limit(), params.query_skip()) {
        (Some(limit), skip) => Some(PageParams {
            limit,
            skip: skip.unwrap_or(0),
        }),
        (None, _) => None,
    };
    QueryInfo {
        qid: params.qid().to_string(),
        fingerprint: fingerprint(&query),
        query,
        page,
    }
}

/// `None` means a cache miss: the qid, the fingerprint, or the page has never
/// been recorded.
pub fn get_extended_query_info(info: &QueryInfo, store: &ItemStore) -> Option<ExtendedQueryInfo> {
    let entry = store.query_entry(&info.qid, &info.fingerprint)?;
    let page = entry.page(info.page.as_ref()?)?.clone();
    Some(ExtendedQueryInfo {
        info: info.clone(),
        ids: page.ids,
        total: page.total,
        fetched_at: page.fetched_at,
        ssr: page.ssr,
        entry,
    })
}

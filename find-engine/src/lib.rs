/*!
# Find Engine

Keeps a client-side view of a remote, paginated collection consistent with a
shared normalized [`ItemStore`], the server, and a realtime mutation stream.

## Features

- **Query fingerprints**: key-order independent identities that ignore
  `$limit`/`$skip`, so every page of one query shares a cache entry
- **Cached vs. live queries**: `cached_query` is what is on screen,
  `current_query` is what the live params would show; a cache hit is shown
  immediately without waiting for the network
- **Debounced requests**: rapid param or page changes collapse into one fetch
  carrying the newest params
- **Pagination window**: limit/skip with clamped navigation, optionally shared
  between engines
- **Realtime invalidation**: created/patched/removed events re-request the
  active query
- **Infinite scroll**: `all_local_data` merges every fetched page without
  duplicates

## Architecture

```text
set_params / window change / realtime event
  └─> make_request
        ├─> cache hit? show it now (cached params advance)
        └─> Debouncer (trailing edge)
              └─> find ──> Service::find
                    └─> ItemStore: items + qid/fingerprint/page index
                          └─> data / all_local_data / total / page stats
                                └─> FindSnapshot (watch channel)
```

## Example

```rust,no_run
use std::sync::Arc;

use pagesync_find_engine::{FindEngine, FindOptions, ItemStore, Params, Service};

async fn show<S: Service>(service: Arc<S>) -> pagesync_find_engine::Result<()> {
    let store = Arc::new(ItemStore::default());
    let params: Params = serde_json::from_value(serde_json::json!({
        "query": { "done": false, "$limit": 20 }
    }))
    .unwrap_or_default();

    let engine = FindEngine::new(service, store, Some(params), FindOptions::server())?;
    engine.make_request().await?;
    println!("page {}/{}", engine.current_page(), engine.page_count());
    engine.next().await?;
    Ok(())
}
```
*/

mod config;
mod debounce;
mod engine;
mod error;
mod params;
mod projection;
mod query_info;
mod realtime;
mod request;
mod service;
mod store;
mod window;

pub use config::FindOptions;
pub use debounce::BoxFuture;
pub use debounce::Debouncer;
pub use engine::FindEngine;
pub use engine::FindSnapshot;
pub use error::FindError;
pub use error::Result;
pub use pagesync_utils_fingerprint::QueryFingerprint;
pub use pagesync_utils_fingerprint::fingerprint;
pub use params::DEFAULT_QID;
pub use params::PageParams;
pub use params::Params;
pub use params::Query;
pub use params::params_with_pagination;
pub use params::params_without_pagination;
pub use query_info::ExtendedQueryInfo;
pub use query_info::QueryInfo;
pub use query_info::get_extended_query_info;
pub use query_info::get_query_info;
pub use request::QueryHistory;
pub use request::RequestState;
pub use service::FindResponse;
pub use service::Paginated;
pub use service::Service;
pub use service::ServiceEvent;
pub use store::ItemId;
pub use store::ItemStore;
pub use store::PageEntry;
pub use store::QueryCacheEntry;
pub use store::item_id;
pub use window::PageStats;
pub use window::PageTarget;
pub use window::PageWindowState;
pub use window::PaginationHandle;

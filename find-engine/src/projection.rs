//! Item lists derived from the store.

use serde_json::Value;

use crate::params::Params;
use crate::query_info::ExtendedQueryInfo;
use crate::service::Service;
use crate::store::ItemStore;

/// Items of the displayed server page, in server order.
pub(crate) fn server_page<S: Service>(
    store: &ItemStore,
    service: &S,
    cached: Option<&ExtendedQueryInfo>,
) -> Vec<Value> {
    let Some(cached) = cached else {
        return Vec::new();
    };
    convert(service, store.items_by_ids(&cached.ids))
}

/// Items matched locally. Records that vanished from the store are skipped.
pub(crate) fn local_matches<S: Service>(store: &ItemStore, service: &S, params: &Params) -> Vec<Value> {
    let items = store
        .find_in_store(params)
        .into_iter()
        .filter(|item| !item.is_null())
        .collect();
    convert(service, items)
}

/// Every page fetched for the displayed query, merged without duplicates.
pub(crate) fn all_pages<S: Service>(
    store: &ItemStore,
    service: &S,
    cached: Option<&ExtendedQueryInfo>,
) -> Vec<Value> {
    let Some(cached) = cached else {
        return Vec::new();
    };
    convert(service, store.items_by_ids(&cached.entry.unique_ids()))
}

fn convert<S: Service>(service: &S, items: Vec<Value>) -> Vec<Value> {
    items
        .into_iter()
        .map(|item| service.convert_item(item))
        .collect()
}

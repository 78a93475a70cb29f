//! The find engine: keeps a paginated view over a remote collection in sync
//! with the shared item store.
//!
//! Params are the only externally writable input. Everything else is either
//! derived on demand from params, the pagination window, and the store, or
//! mutated by the request path below. Derived fields are republished as a
//! [`FindSnapshot`] whenever one of those inputs changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::Weak;
use std::time::Duration;

use pagesync_utils_fingerprint::QueryFingerprint;
use pagesync_utils_fingerprint::canonical_json;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::config::FindOptions;
use crate::debounce::BoxFuture;
use crate::debounce::Debouncer;
use crate::error::FindError;
use crate::error::Result;
use crate::params::DEFAULT_QID;
use crate::params::PageParams;
use crate::params::Params;
use crate::params::params_with_pagination;
use crate::params::params_without_pagination;
use crate::projection;
use crate::query_info::ExtendedQueryInfo;
use crate::query_info::get_extended_query_info;
use crate::query_info::get_query_info;
use crate::realtime;
use crate::request::QueryHistory;
use crate::request::RequestState;
use crate::service::FindResponse;
use crate::service::Service;
use crate::store::ItemStore;
use crate::window::PageTarget;
use crate::window::PaginationHandle;

type QueryWhen = Arc<dyn Fn() -> bool + Send + Sync>;
type PageKey = (String, QueryFingerprint, PageParams);

/// Every observable field, computed at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSnapshot {
    pub qid: String,
    pub data: Vec<Value>,
    pub all_local_data: Vec<Value>,
    pub total: u64,
    pub limit: u64,
    pub skip: u64,
    pub current_query: Option<ExtendedQueryInfo>,
    pub cached_query: Option<ExtendedQueryInfo>,
    pub latest_query: Option<ExtendedQueryInfo>,
    pub previous_query: Option<ExtendedQueryInfo>,
    pub is_pending: bool,
    pub has_been_requested: bool,
    pub has_loaded: bool,
    pub error: Option<FindError>,
    pub request_count: u64,
    pub page_count: u64,
    pub current_page: u64,
    pub can_prev: bool,
    pub can_next: bool,
    pub is_ssr: bool,
}

struct EngineState {
    params: Option<Params>,
    /// Params whose page is currently displayed.
    cached_params: Params,
    request: RequestState,
    history: QueryHistory,
    query_when: Option<QueryWhen>,
    in_flight: usize,
    next_seq: u64,
    /// Sequence of the request that last wrote each page.
    page_writers: HashMap<PageKey, u64>,
    /// Requests spawned by watchers, aborted on teardown.
    background: Vec<JoinHandle<()>>,
    closed: bool,
}

pub(crate) struct EngineInner<S: Service> {
    service: Arc<S>,
    pub(crate) store: Arc<ItemStore>,
    options: FindOptions,
    pub(crate) window: PaginationHandle,
    external_window: bool,
    state: Mutex<EngineState>,
    debouncer: Debouncer<(), Result<FindResponse>>,
    snapshot: watch::Sender<FindSnapshot>,
}

pub struct FindEngine<S: Service> {
    inner: Arc<EngineInner<S>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<S: Service> FindEngine<S> {
    /// Creates the engine and, in server mode, starts watching params, the
    /// pagination window, and realtime events. Must be called from within a
    /// tokio runtime.
    pub fn new(
        service: Arc<S>,
        store: Arc<ItemStore>,
        params: Option<Params>,
        options: FindOptions,
    ) -> Result<Self> {
        options.validate().map_err(FindError::InvalidOptions)?;

        let external_window = options.pagination.is_some();
        let window = options.pagination.clone().unwrap_or_else(|| {
            let query = params.as_ref();
            PaginationHandle::new(
                query
                    .and_then(Params::query_limit)
                    .filter(|limit| *limit > 0)
                    .unwrap_or(options.default_limit),
                query.and_then(Params::query_skip).unwrap_or(0),
            )
        });
        let delay = Duration::from_millis(options.debounce_ms);

        let inner = Arc::new_cyclic(|weak: &Weak<EngineInner<S>>| {
            let weak = weak.clone();
            let debouncer = Debouncer::new(delay, move |()| {
                let weak = weak.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(inner) => inner.find(None).await,
                        None => Err(FindError::Cancelled),
                    }
                }) as BoxFuture<Result<FindResponse>>
            });
            EngineInner {
                service,
                store,
                options,
                window,
                external_window,
                state: Mutex::new(EngineState {
                    cached_params: params.clone().unwrap_or_default(),
                    params,
                    request: RequestState::default(),
                    history: QueryHistory::default(),
                    query_when: None,
                    in_flight: 0,
                    next_seq: 0,
                    page_writers: HashMap::new(),
                    background: Vec::new(),
                    closed: false,
                }),
                debouncer,
                snapshot: watch::channel(FindSnapshot::default()).0,
            }
        });
        inner.publish();

        let server = inner.options.paginate_on_server;
        let watching = server && inner.options.watch_params;
        let mut tasks = vec![
            realtime::spawn_store_watcher(&inner),
            realtime::spawn_window_watcher(&inner, watching),
        ];
        if watching {
            if let Some(events) = inner.service.subscribe() {
                tasks.push(realtime::spawn_event_listener(&inner, events));
            }
            if inner.options.immediate {
                inner.spawn_request("immediate");
            }
        }

        Ok(Self { inner, tasks })
    }

    /// Replaces the params. With watching enabled in server mode this
    /// schedules a debounced request.
    pub fn set_params(&self, params: Option<Params>) {
        self.inner.lock().params = params;
        self.inner.publish();
        if self.inner.options.paginate_on_server && self.inner.options.watch_params {
            self.inner.spawn_request("params changed");
        }
    }

    pub fn params(&self) -> Option<Params> {
        self.inner.lock().params.clone()
    }

    /// Fetches immediately. In server mode `params` is ignored in favor of
    /// the paginated live params.
    pub async fn find(&self, params: Option<Params>) -> Result<FindResponse> {
        self.inner.find(params).await
    }

    /// Server mode only: debounced fetch of the live params, advancing the
    /// displayed page once it settles.
    pub async fn make_request(&self) -> Result<()> {
        self.inner.make_request().await
    }

    /// Installs the gate consulted before every fetch.
    pub fn query_when<F>(&self, predicate: F)
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.inner.lock().query_when = Some(Arc::new(predicate));
    }

    pub fn clear_error(&self) {
        self.inner.lock().request.error = None;
        self.inner.publish();
    }

    pub async fn next(&self) -> Result<()> {
        self.inner.go_to(PageTarget::Next).await
    }

    pub async fn prev(&self) -> Result<()> {
        self.inner.go_to(PageTarget::Prev).await
    }

    pub async fn to_start(&self) -> Result<()> {
        self.inner.go_to(PageTarget::Start).await
    }

    pub async fn to_end(&self) -> Result<()> {
        self.inner.go_to(PageTarget::End).await
    }

    pub async fn to_page(&self, page: u64) -> Result<()> {
        self.inner.go_to(PageTarget::Page(page)).await
    }

    pub fn subscribe(&self) -> watch::Receiver<FindSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Computes every observable field from the latest state.
    pub fn snapshot(&self) -> FindSnapshot {
        self.inner.compute_snapshot()
    }

    pub fn pagination(&self) -> &PaginationHandle {
        &self.inner.window
    }

    pub fn store(&self) -> &Arc<ItemStore> {
        &self.inner.store
    }

    pub fn params_with_pagination(&self) -> Params {
        self.inner.params_with_pagination()
    }

    pub fn qid(&self) -> String {
        self.inner.lock().params.as_ref().map_or_else(
            || DEFAULT_QID.to_string(),
            |p| p.qid().to_string(),
        )
    }

    pub fn data(&self) -> Vec<Value> {
        self.inner.data()
    }

    pub fn all_local_data(&self) -> Vec<Value> {
        projection::all_pages(
            &self.inner.store,
            self.inner.service.as_ref(),
            self.inner.cached_query().as_ref(),
        )
    }

    pub fn total(&self) -> u64 {
        self.inner.total()
    }

    pub fn limit(&self) -> u64 {
        self.inner.window.limit()
    }

    pub fn skip(&self) -> u64 {
        self.inner.window.skip()
    }

    pub fn current_query(&self) -> Option<ExtendedQueryInfo> {
        self.inner.current_query()
    }

    pub fn cached_query(&self) -> Option<ExtendedQueryInfo> {
        self.inner.cached_query()
    }

    pub fn latest_query(&self) -> Option<ExtendedQueryInfo> {
        self.inner.lock().history.latest().cloned()
    }

    pub fn previous_query(&self) -> Option<ExtendedQueryInfo> {
        self.inner.lock().history.previous().cloned()
    }

    pub fn request_state(&self) -> RequestState {
        self.inner.lock().request.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.inner.lock().request.is_pending
    }

    pub fn has_been_requested(&self) -> bool {
        self.inner.lock().request.has_been_requested
    }

    pub fn has_loaded(&self) -> bool {
        self.inner.lock().request.has_loaded
    }

    pub fn error(&self) -> Option<FindError> {
        self.inner.lock().request.error.clone()
    }

    pub fn request_count(&self) -> u64 {
        self.inner.lock().request.request_count
    }

    pub fn page_count(&self) -> u64 {
        self.inner.window.get().stats(self.total()).page_count
    }

    pub fn current_page(&self) -> u64 {
        self.inner.window.get().stats(self.total()).current_page
    }

    pub fn can_prev(&self) -> bool {
        self.inner.window.get().stats(self.total()).can_prev
    }

    pub fn can_next(&self) -> bool {
        self.inner.window.get().stats(self.total()).can_next
    }

    pub fn is_ssr(&self) -> bool {
        self.inner.store.is_ssr()
    }
}

impl<S: Service> Drop for FindEngine<S> {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.inner.shutdown();
    }
}

impl<S: Service> EngineInner<S> {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn publish(&self) {
        self.snapshot.send_replace(self.compute_snapshot());
    }

    /// Fire-and-forget request used by watchers. Failures are already
    /// recorded in the request state.
    pub(crate) fn spawn_request(self: &Arc<Self>, reason: &'static str) {
        if self.lock().closed {
            return;
        }
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            trace!(reason, "scheduling request");
            match inner.make_request().await {
                Ok(()) => {}
                Err(FindError::Cancelled) => trace!(reason, "background request cancelled"),
                Err(err) => warn!(reason, error = %err, "background request failed"),
            }
        });

        let mut state = self.lock();
        if state.closed {
            task.abort();
            return;
        }
        state.background.retain(|handle| !handle.is_finished());
        state.background.push(task);
    }

    /// Stops background requests and disarms the debounce timer. A fetch that
    /// was already dispatched still runs to completion.
    fn shutdown(&self) {
        let background = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.background)
        };
        for task in background {
            task.abort();
        }
        self.debouncer.cancel();
        debug!("find engine shut down");
    }

    fn params_with_pagination(&self) -> Params {
        let window = self.window.get();
        let state = self.lock();
        params_with_pagination(state.params.as_ref(), window.limit, window.skip)
    }

    fn query_when(&self) -> Option<QueryWhen> {
        self.lock().query_when.clone()
    }

    fn gate_passes(&self) -> bool {
        self.query_when().is_none_or(|predicate| predicate())
    }

    fn current_query(&self) -> Option<ExtendedQueryInfo> {
        get_extended_query_info(&get_query_info(&self.params_with_pagination()), &self.store)
    }

    fn cached_query(&self) -> Option<ExtendedQueryInfo> {
        let cached = self.lock().cached_params.clone();
        get_extended_query_info(&get_query_info(&cached), &self.store)
    }

    fn total(&self) -> u64 {
        if self.options.paginate_on_server {
            let info = get_query_info(&self.params_with_pagination());
            if let Some(current) = get_extended_query_info(&info, &self.store) {
                return current.total;
            }
            return self
                .store
                .query_entry(&info.qid, &info.fingerprint)
                .map_or(0, |entry| entry.total);
        }
        let params = params_without_pagination(self.lock().params.as_ref());
        self.store.count_in_store(&params)
    }

    /// Params matched locally: windowed when a shared window drives the view
    /// or the query itself asked for a page size.
    fn local_params(&self) -> Params {
        let raw = self.lock().params.clone();
        let windowed = self.external_window || raw.as_ref().and_then(Params::query_limit).is_some();
        if windowed {
            self.params_with_pagination()
        } else {
            raw.unwrap_or_default()
        }
    }

    fn data(&self) -> Vec<Value> {
        if self.options.paginate_on_server {
            projection::server_page(&self.store, self.service.as_ref(), self.cached_query().as_ref())
        } else {
            projection::local_matches(&self.store, self.service.as_ref(), &self.local_params())
        }
    }

    fn compute_snapshot(&self) -> FindSnapshot {
        let window = self.window.get();
        let total = self.total();
        let stats = window.stats(total);
        let cached_query = self.cached_query();
        let (qid, request, latest_query, previous_query) = {
            let state = self.lock();
            (
                state
                    .params
                    .as_ref()
                    .map_or(DEFAULT_QID, Params::qid)
                    .to_string(),
                state.request.clone(),
                state.history.latest().cloned(),
                state.history.previous().cloned(),
            )
        };
        FindSnapshot {
            qid,
            data: self.data(),
            all_local_data: projection::all_pages(
                &self.store,
                self.service.as_ref(),
                cached_query.as_ref(),
            ),
            total,
            limit: window.limit,
            skip: window.skip,
            current_query: self.current_query(),
            cached_query,
            latest_query,
            previous_query,
            is_pending: request.is_pending,
            has_been_requested: request.has_been_requested,
            has_loaded: request.has_loaded,
            error: request.error,
            request_count: request.request_count,
            page_count: stats.page_count,
            current_page: stats.current_page,
            can_prev: stats.can_prev,
            can_next: stats.can_next,
            is_ssr: self.store.is_ssr(),
        }
    }

    /// Marks the engine as loading, unless the page about to be shown was
    /// hydrated from a server render.
    fn setup_pending_state(&self) {
        if self.current_query().is_some_and(|current| current.ssr) {
            trace!("pending state suppressed for hydrated page");
            return;
        }
        self.lock().request.enter_pending();
    }

    /// Advances the displayed params to the live paginated params.
    fn update_cached_params(&self) {
        let next = self.params_with_pagination();
        let mut state = self.lock();
        if canonical(&state.cached_params) != canonical(&next) {
            state.cached_params = next;
        }
    }

    pub(crate) async fn find(&self, params: Option<Params>) -> Result<FindResponse> {
        let params = if self.options.paginate_on_server {
            self.params_with_pagination()
        } else {
            params.unwrap_or_else(|| self.local_params())
        };

        if !self.gate_passes() {
            debug!(qid = params.qid(), "find skipped by query_when");
            return Ok(FindResponse::empty());
        }

        self.setup_pending_state();
        let seq = {
            let mut state = self.lock();
            state.request.request_count += 1;
            state.in_flight += 1;
            state.next_seq += 1;
            state.next_seq
        };
        self.publish();

        let _settle = Settle { inner: self };
        let info = get_query_info(&params);
        debug!(qid = %info.qid, fingerprint = %info.fingerprint, seq, "dispatching find");

        match self.service.find(&params).await {
            Ok(response) => {
                self.apply_response(&params, &response, seq);
                self.lock().request.has_loaded = true;
                Ok(response)
            }
            Err(err) => {
                warn!(qid = %info.qid, seq, error = %err, "find failed");
                let err = FindError::service(err);
                self.lock().request.error = Some(err.clone());
                Err(err)
            }
        }
    }

    fn apply_response(&self, params: &Params, response: &FindResponse, seq: u64) {
        let ids = self.store.upsert(response.data().iter().cloned());
        let Some(total) = response.total() else {
            trace!(count = ids.len(), "unpaginated response stored");
            return;
        };

        let info = get_query_info(params);
        if let Some(page) = info.page {
            let key = (info.qid.clone(), info.fingerprint.clone(), page);
            let stale = {
                let mut state = self.lock();
                match state.page_writers.get(&key) {
                    Some(writer) if *writer > seq => true,
                    _ => {
                        state.page_writers.insert(key, seq);
                        false
                    }
                }
            };
            if stale {
                debug!(qid = %info.qid, ?page, seq, "stale page response ignored");
            } else {
                self.store.record_page(params, page, ids, total, false);
            }
        }

        if total == 0 {
            trace!(qid = %info.qid, "empty result kept out of history");
        } else if let Some(extended) = get_extended_query_info(&info, &self.store) {
            self.lock().history.push(extended);
        }
        debug!(qid = %info.qid, total, seq, "find settled");
    }

    pub(crate) async fn make_request(&self) -> Result<()> {
        if !self.options.paginate_on_server || self.lock().params.is_none() {
            return Ok(());
        }

        if self.current_query().is_some() {
            trace!("live params already cached, showing them now");
            self.update_cached_params();
        }

        if self.gate_passes() {
            self.setup_pending_state();
        }
        self.publish();

        let result = self
            .debouncer
            .call(())
            .await
            .unwrap_or(Err(FindError::Cancelled));

        {
            // A gated-off dispatch leaves the early pending flag behind.
            let mut state = self.lock();
            if state.in_flight == 0 {
                state.request.is_pending = false;
            }
        }
        if result.is_ok() {
            self.update_cached_params();
        }
        self.publish();
        result.map(|_| ())
    }

    async fn go_to(&self, target: PageTarget) -> Result<()> {
        let window = self.window.get();
        let total = self.total();
        let page = target.resolve(window.stats(total));
        let skip = window.skip_for_page(page, total);
        if skip == window.skip {
            trace!(page, "already on the requested page");
            return Ok(());
        }
        self.window.set_skip(skip);
        self.publish();
        if self.options.paginate_on_server {
            self.make_request().await
        } else {
            Ok(())
        }
    }
}

/// Clears the pending flag when a dispatched find ends, however it ends.
struct Settle<'a, S: Service> {
    inner: &'a EngineInner<S>,
}

impl<S: Service> Drop for Settle<'_, S> {
    fn drop(&mut self) {
        {
            let mut state = self.inner.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            if state.in_flight == 0 {
                state.request.is_pending = false;
            }
        }
        self.inner.publish();
    }
}

fn canonical(params: &Params) -> String {
    serde_json::to_value(params)
        .map(|value| canonical_json(&value))
        .unwrap_or_default()
}

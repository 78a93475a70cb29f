//! Limit/skip state and the page arithmetic derived from it.

use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindowState {
    pub limit: u64,
    pub skip: u64,
}

/// Page numbers derived from a window and a total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStats {
    pub page_count: u64,
    pub current_page: u64,
    pub can_prev: bool,
    pub can_next: bool,
}

impl PageWindowState {
    pub fn stats(&self, total: u64) -> PageStats {
        let limit = self.limit.max(1);
        let page_count = total.div_ceil(limit).max(1);
        let current_page = (self.skip / limit).saturating_add(1);
        PageStats {
            page_count,
            current_page,
            can_prev: current_page > 1,
            can_next: current_page < page_count,
        }
    }

    /// Skip addressing `page`, clamped into `[1, page_count]`.
    pub fn skip_for_page(&self, page: u64, total: u64) -> u64 {
        let page_count = self.stats(total).page_count;
        (page.clamp(1, page_count) - 1) * self.limit
    }
}

/// Navigation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTarget {
    Start,
    End,
    Prev,
    Next,
    Page(u64),
}

impl PageTarget {
    pub(crate) fn resolve(self, stats: PageStats) -> u64 {
        match self {
            Self::Start => 1,
            Self::End => stats.page_count,
            Self::Prev => stats.current_page.saturating_sub(1),
            Self::Next => stats.current_page.saturating_add(1),
            Self::Page(page) => page,
        }
    }
}

/// A cloneable limit/skip window. Clones observe and mutate the same state,
/// so one window can drive several engines.
#[derive(Debug, Clone)]
pub struct PaginationHandle {
    tx: Arc<watch::Sender<PageWindowState>>,
}

impl PaginationHandle {
    pub fn new(limit: u64, skip: u64) -> Self {
        let (tx, _) = watch::channel(PageWindowState { limit, skip });
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> PageWindowState {
        *self.tx.borrow()
    }

    pub fn limit(&self) -> u64 {
        self.get().limit
    }

    pub fn skip(&self) -> u64 {
        self.get().skip
    }

    /// Subscribers are only woken when the value actually changes.
    pub fn set_limit(&self, limit: u64) {
        self.tx.send_if_modified(|state| replace(&mut state.limit, limit));
    }

    pub fn set_skip(&self, skip: u64) {
        self.tx.send_if_modified(|state| replace(&mut state.skip, skip));
    }

    pub fn subscribe(&self) -> watch::Receiver<PageWindowState> {
        self.tx.subscribe()
    }
}

fn replace(slot: &mut u64, value: u64) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

use std::collections::VecDeque;

use crate::error::FindError;
use crate::query_info::ExtendedQueryInfo;

const HISTORY_LEN: usize = 2;

/// Lifecycle flags of the engine's requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestState {
    pub is_pending: bool,
    /// Becomes true on the first request and never resets.
    pub has_been_requested: bool,
    pub has_loaded: bool,
    pub error: Option<FindError>,
    pub request_count: u64,
}

impl RequestState {
    pub(crate) fn enter_pending(&mut self) {
        self.has_been_requested = true;
        self.error = None;
        self.is_pending = true;
        self.has_loaded = false;
    }
}

/// The two most recent totaled responses, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryHistory {
    entries: VecDeque<ExtendedQueryInfo>,
}

impl QueryHistory {
    pub(crate) fn push(&mut self, info: ExtendedQueryInfo) {
        self.entries.push_back(info);
        while self.entries.len() > HISTORY_LEN {
            self.entries.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&ExtendedQueryInfo> {
        self.entries.back()
    }

    pub fn previous(&self) -> Option<&ExtendedQueryInfo> {
        self.entries.len().checked_sub(2).and_then(|i| self.entries.get(i))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

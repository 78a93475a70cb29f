use serde::Deserialize;
use serde::Serialize;

use crate::window::PaginationHandle;

/// Options accepted by [`crate::FindEngine::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindOptions {
    /// Window shared with other engines. When absent the engine owns one,
    /// seeded from the query's `$limit`/`$skip`.
    #[serde(skip)]
    pub pagination: Option<PaginationHandle>,

    /// Trailing-edge debounce applied to server requests
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Issue a request as soon as the engine is created
    #[serde(default = "default_true")]
    pub immediate: bool,

    /// Re-request whenever params or the pagination window change
    #[serde(default = "default_true")]
    pub watch_params: bool,

    /// Let the server, not local filtering, decide the item set
    #[serde(default)]
    pub paginate_on_server: bool,

    /// Page size used when neither the query nor a shared window sets one
    #[serde(default = "default_limit")]
    pub default_limit: u64,
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

fn default_limit() -> u64 {
    10
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            pagination: None,
            debounce_ms: default_debounce_ms(),
            immediate: true,
            watch_params: true,
            paginate_on_server: false,
            default_limit: default_limit(),
        }
    }
}

impl FindOptions {
    pub fn server() -> Self {
        Self {
            paginate_on_server: true,
            ..Default::default()
        }
    }

    pub fn with_pagination(mut self, pagination: PaginationHandle) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.default_limit == 0 {
            return Err("default_limit must be > 0".to_string());
        }
        if let Some(pagination) = &self.pagination
            && pagination.get().limit == 0
        {
            return Err("shared pagination limit must be > 0".to_string());
        }
        Ok(())
    }
}

//! Query parameters and their pagination variants.

use pagesync_utils_fingerprint::LIMIT_KEY;
use pagesync_utils_fingerprint::SKIP_KEY;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// A query object: field criteria plus `$`-prefixed operators.
pub type Query = Map<String, Value>;

pub const DEFAULT_QID: &str = "default";

/// Parameters handed to the remote `find`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Params {
    /// Namespace separating independent paginated views of one collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qid: Option<String>,

    #[serde(default)]
    pub query: Query,

    /// Transport-specific extras passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Params {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }

    pub fn with_qid(mut self, qid: impl Into<String>) -> Self {
        self.qid = Some(qid.into());
        self
    }

    pub fn qid(&self) -> &str {
        self.qid.as_deref().unwrap_or(DEFAULT_QID)
    }

    /// `$limit` carried by the query, if it is a non-negative integer.
    pub fn query_limit(&self) -> Option<u64> {
        self.query.get(LIMIT_KEY).and_then(Value::as_u64)
    }

    /// `$skip` carried by the query, if it is a non-negative integer.
    pub fn query_skip(&self) -> Option<u64> {
        self.query.get(SKIP_KEY).and_then(Value::as_u64)
    }
}

/// The `$limit`/`$skip` pair addressing one page of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageParams {
    pub limit: u64,
    pub skip: u64,
}

/// Merges the window's `limit`/`skip` into the query. `None` params behave
/// like an empty query.
pub fn params_with_pagination(params: Option<&Params>, limit: u64, skip: u64) -> Params {
    let mut out = params.cloned().unwrap_or_default();
    out.query.insert(LIMIT_KEY.to_string(), Value::from(limit));
    out.query.insert(SKIP_KEY.to_string(), Value::from(skip));
    out
}

/// Strips `$limit`/`$skip` from the query.
pub fn params_without_pagination(params: Option<&Params>) -> Params {
    let mut out = params.cloned().unwrap_or_default();
    out.query.remove(LIMIT_KEY);
    out.query.remove(SKIP_KEY);
    out
}

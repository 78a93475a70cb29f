//! Contract with the remote collection.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::params::Params;

/// One page of a remote result set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paginated {
    pub data: Vec<Value>,
    pub total: u64,
    pub limit: u64,
    pub skip: u64,
}

/// What a remote `find` returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FindResponse {
    Paginated(Paginated),
    Items(Vec<Value>),
}

impl FindResponse {
    /// The response produced when a `find` is gated off.
    pub fn empty() -> Self {
        Self::Paginated(Paginated::default())
    }

    pub fn data(&self) -> &[Value] {
        match self {
            Self::Paginated(page) => &page.data,
            Self::Items(items) => items,
        }
    }

    pub fn total(&self) -> Option<u64> {
        match self {
            Self::Paginated(page) => Some(page.total),
            Self::Items(_) => None,
        }
    }
}

/// Mutation notifications pushed by the remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "item", rename_all = "lowercase")]
pub enum ServiceEvent {
    Created(Value),
    Patched(Value),
    Removed(Value),
}

impl ServiceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Patched(_) => "patched",
            Self::Removed(_) => "removed",
        }
    }

    pub fn item(&self) -> &Value {
        match self {
            Self::Created(item) | Self::Patched(item) | Self::Removed(item) => item,
        }
    }
}

#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Fetches from the server. `params.query` carries `$limit`/`$skip` when
    /// paginating.
    async fn find(&self, params: &Params) -> anyhow::Result<FindResponse>;

    /// Realtime mutation stream. `None` when the transport has no push channel.
    fn subscribe(&self) -> Option<broadcast::Receiver<ServiceEvent>> {
        None
    }

    /// Shapes a stored record into the item handed to consumers.
    fn convert_item(&self, item: Value) -> Value {
        item
    }
}

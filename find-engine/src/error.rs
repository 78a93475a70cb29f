use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum FindError {
    /// The remote `find` failed.
    #[error("remote find failed: {0}")]
    Service(Arc<anyhow::Error>),

    /// A debounced call was dropped before its timer fired.
    #[error("debounced find was cancelled before dispatch")]
    Cancelled,

    #[error("invalid find options: {0}")]
    InvalidOptions(String),
}

impl FindError {
    pub(crate) fn service(error: anyhow::Error) -> Self {
        Self::Service(Arc::new(error))
    }
}

impl PartialEq for FindError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Service(a), Self::Service(b)) => Arc::ptr_eq(a, b),
            (Self::Cancelled, Self::Cancelled) => true,
            (Self::InvalidOptions(a), Self::InvalidOptions(b)) => a == b,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FindError>;

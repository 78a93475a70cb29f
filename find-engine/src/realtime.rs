//! Watchers that turn upstream changes into republished snapshots and, in
//! server mode, into fresh requests.
//!
//! Each watcher holds only a weak reference, so a dropped engine is never
//! kept alive by its own background tasks.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::engine::EngineInner;
use crate::service::Service;
use crate::service::ServiceEvent;
use crate::store::item_id;

/// Any created, patched, or removed event re-requests the active query.
/// Events are not diffed against the displayed page.
pub(crate) fn spawn_event_listener<S: Service>(
    inner: &Arc<EngineInner<S>>,
    mut events: broadcast::Receiver<ServiceEvent>,
) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        loop {
            let received = events.recv().await;
            let Some(inner) = weak.upgrade() else {
                break;
            };
            match received {
                Ok(event) => {
                    let id = item_id(event.item(), inner.store.id_field());
                    debug!(event = event.name(), ?id, "realtime event, re-requesting");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "realtime listener lagged, re-requesting");
                }
                Err(RecvError::Closed) => break,
            }
            inner.spawn_request("realtime event");
        }
    })
}

pub(crate) fn spawn_window_watcher<S: Service>(
    inner: &Arc<EngineInner<S>>,
    request_on_change: bool,
) -> JoinHandle<()> {
    let mut window = inner.window.subscribe();
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        while window.changed().await.is_ok() {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            inner.publish();
            if request_on_change {
                inner.spawn_request("pagination changed");
            }
        }
    })
}

pub(crate) fn spawn_store_watcher<S: Service>(inner: &Arc<EngineInner<S>>) -> JoinHandle<()> {
    let mut revisions = inner.store.subscribe();
    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        while revisions.changed().await.is_ok() {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            inner.publish();
        }
    })
}

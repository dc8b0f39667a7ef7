//! Cache invalidation on route refresh.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::routing::RefreshRoutesEvent;

/// Component holding state derived from the route table.
pub trait RefreshListener: Send + Sync {
    fn name(&self) -> &'static str;

    /// Drop everything derived from the previous route table.
    fn on_refresh(&self);
}

/// Notify every listener on each refresh event until the channel closes or
/// shutdown is signalled.
pub fn spawn_refresh_listener(
    mut events: broadcast::Receiver<RefreshRoutesEvent>,
    listeners: Vec<Arc<dyn RefreshListener>>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(RefreshRoutesEvent) => notify(&listeners),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Refresh listener lagged, clearing caches");
                        notify(&listeners);
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Refresh listener stopped");
    })
}

fn notify(listeners: &[Arc<dyn RefreshListener>]) {
    for listener in listeners {
        listener.on_refresh();
        tracing::debug!(listener = listener.name(), "Caches cleared after route refresh");
    }
}

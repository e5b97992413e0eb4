//! Session registry: at most one live event stream per session, last connect wins.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::session::SessionId;

/// Messages queued per stream before `send` waits.
const STREAM_BUFFER: usize = 64;

struct Entry {
    conn_id: Uuid,
    tx: mpsc::Sender<Value>,
}

/// Registry of session ids to their current delivery channel. Shared across handlers.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stream for `session`. A previous stream is replaced and its
    /// receiver ends once the old sender is dropped here.
    pub async fn connect(&self, session: &SessionId) -> StreamHandle {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let conn_id = Uuid::new_v4();
        let replaced = {
            let mut g = self.inner.write().await;
            g.insert(session.to_string(), Entry { conn_id, tx })
        };
        if replaced.is_some() {
            log::info!("session {}: event stream replaced", session);
        } else {
            log::info!("session {}: event stream connected", session);
        }
        StreamHandle {
            rx,
            guard: StreamGuard {
                registry: self.clone(),
                session: session.clone(),
                conn_id,
            },
        }
    }

    pub async fn is_connected(&self, session: &SessionId) -> bool {
        self.inner.read().await.contains_key(session.as_str())
    }

    /// Deliver to whichever stream is registered now. Returns false if none is.
    pub async fn send(&self, session: &SessionId, msg: Value) -> bool {
        let tx = {
            let g = self.inner.read().await;
            match g.get(session.as_str()) {
                Some(e) => e.tx.clone(),
                None => return false,
            }
        };
        tx.send(msg).await.is_ok()
    }

    /// Remove the entry only if it still belongs to `conn_id` (a newer stream is left alone).
    pub async fn remove_if_current(&self, session: &SessionId, conn_id: Uuid) -> bool {
        let mut g = self.inner.write().await;
        if g.get(session.as_str()).is_some_and(|e| e.conn_id == conn_id) {
            g.remove(session.as_str());
            log::debug!("session {}: event stream removed", session);
            true
        } else {
            false
        }
    }

    /// Drop every registered stream; their receivers end. Used on shutdown.
    pub async fn close_all(&self) -> usize {
        let mut g = self.inner.write().await;
        let n = g.len();
        g.clear();
        n
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Receiving side of one registered stream plus the guard that unregisters it.
pub struct StreamHandle {
    pub rx: mpsc::Receiver<Value>,
    pub guard: StreamGuard,
}

/// Unregisters its stream when dropped (client went away or the stream was replaced).
pub struct StreamGuard {
    registry: SessionRegistry,
    session: SessionId,
    conn_id: Uuid,
}

impl StreamGuard {
    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let registry = self.registry.clone();
        let session = self.session.clone();
        let conn_id = self.conn_id;
        rt.spawn(async move {
            registry.remove_if_current(&session, conn_id).await;
        });
    }
}

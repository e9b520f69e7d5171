//! Session store: the latest snapshot of this process's replica.
//!
//! The surface actor holds the only writer; everything else (web layer,
//! status endpoint) reads snapshots.

use std::sync::{Arc, RwLock};

use climbar::SessionSnapshot;

struct SessionStateInner {
    snapshot: RwLock<Option<SessionSnapshot>>,
}

/// Read-only view of the session replica.
pub struct SessionState {
    inner: Arc<SessionStateInner>,
}

/// Write handle, held by the surface actor.
pub struct SessionStateWriter {
    inner: Arc<SessionStateInner>,
}

impl SessionState {
    pub fn new() -> (Self, SessionStateWriter) {
        let inner = Arc::new(SessionStateInner {
            snapshot: RwLock::new(None),
        });
        (
            Self {
                inner: Arc::clone(&inner),
            },
            SessionStateWriter { inner },
        )
    }

    /// Latest published snapshot. `None` until the surface actor has
    /// rendered once.
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.inner
            .snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl SessionStateWriter {
    pub fn publish(&self, snapshot: SessionSnapshot) {
        *self
            .inner
            .snapshot
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(snapshot);
    }
}

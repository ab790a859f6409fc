//! Minimal observable state container.
//!
//! Stores are explicit values handed to whoever needs them; there are no
//! ambient globals. Mutations are synchronous and atomic from the caller's
//! perspective, and every mutation notifies subscribers.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug)]
pub struct Store<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> Store<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Snapshot of the current state.
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Read through a borrow without cloning the whole state.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Apply a mutation and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Watch for state changes; the receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

/// The persisted last-seen cursor, shared between the query-parameter store
/// (which seeds `after` from it) and the post cache store (which records it).
pub type SharedLastSeen = Arc<Store<Option<String>>>;

pub fn shared_last_seen(initial: Option<String>) -> SharedLastSeen {
    Arc::new(Store::new(initial))
}

//! Post cache store: the ordered working set of posts currently rendered,
//! decoupled from the network response shape.
//!
//! The list is append-only until a filter or sort change resets it. Local
//! mutations patch entries in place by identifier and never change the
//! list's order or length.

use tokio::sync::watch;

use crate::application::store::{SharedLastSeen, Store};
use crate::domain::posts::PostRecord;

#[derive(Debug, Clone, Default)]
pub struct CacheState {
    pub posts: Vec<PostRecord>,
    scroll_to_index: Option<usize>,
}

pub struct PostCacheStore {
    state: Store<CacheState>,
    last_seen: SharedLastSeen,
}

impl PostCacheStore {
    pub fn new(last_seen: SharedLastSeen) -> Self {
        Self {
            state: Store::new(CacheState::default()),
            last_seen,
        }
    }

    pub fn posts(&self) -> Vec<PostRecord> {
        self.state.read(|state| state.posts.clone())
    }

    pub fn len(&self) -> usize {
        self.state.read(|state| state.posts.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<PostRecord> {
        self.state
            .read(|state| state.posts.iter().find(|post| post.id == id).cloned())
    }

    pub fn last(&self) -> Option<PostRecord> {
        self.state.read(|state| state.posts.last().cloned())
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheState> {
        self.state.subscribe()
    }

    /// Discard the cache and install a fresh first page.
    pub fn replace_posts(&self, posts: Vec<PostRecord>) {
        self.state.update(|state| state.posts = posts);
    }

    /// Add a further page to the end.
    pub fn append_posts(&self, posts: Vec<PostRecord>) {
        self.state.update(|state| state.posts.extend(posts));
    }

    pub fn reset_posts(&self) {
        self.state.update(|state| state.posts.clear());
    }

    /// Replace the entry with the given identifier by a patched record.
    /// Order and length are preserved; returns whether a patch happened.
    pub fn patch(&self, id: &str, f: impl FnOnce(&PostRecord) -> PostRecord) -> bool {
        let mut patched = false;
        self.state.update(|state| {
            if let Some(entry) = state.posts.iter_mut().find(|post| post.id == id) {
                *entry = f(entry);
                patched = true;
            }
        });
        patched
    }

    /// Persist the furthest post the user acknowledged.
    pub fn set_last_seen_cursor(&self, cursor: Option<String>) {
        self.last_seen.update(|value| *value = cursor);
    }

    pub fn last_seen_cursor(&self) -> Option<String> {
        self.last_seen.get()
    }

    /// One-shot signal telling the virtualization layer to scroll to a row.
    pub fn set_scroll_to_index(&self, index: usize) {
        self.state.update(|state| state.scroll_to_index = Some(index));
    }

    /// Consume the scroll signal; self-clears so a re-render cannot scroll
    /// twice.
    pub fn take_scroll_to_index(&self) -> Option<usize> {
        let mut taken = None;
        self.state.update(|state| taken = state.scroll_to_index.take());
        taken
    }
}

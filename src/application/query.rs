//! Query-parameter store: the single source of truth for which page of
//! posts should be requested next.
//!
//! Every predicate or order mutation clears the pagination cursors in the
//! same update, so a stale cursor can never survive into a different page
//! sequence. The store performs no I/O.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::application::store::{SharedLastSeen, Store};
use crate::domain::categories::PostCategory;
use crate::domain::query::{
    DEFAULT_PAGE_SIZE, OrderDirection, PostOrder, PostOrderField, PostWhereInput, PostsQueryArgs,
    QuerySignature,
};

/// Named sort options offered by the feed UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOption {
    #[default]
    CreationDate,
    LastSeen,
    MostLiked,
    ApprovedAt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub sort: SortOption,
    pub args: PostsQueryArgs,
}

impl QueryState {
    pub fn initial(page_size: u32) -> Self {
        Self {
            sort: SortOption::default(),
            args: PostsQueryArgs::initial(page_size),
        }
    }
}

pub struct QueryStore {
    state: Store<QueryState>,
    last_seen: SharedLastSeen,
}

impl QueryStore {
    pub fn new(last_seen: SharedLastSeen) -> Self {
        Self::with_page_size(last_seen, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(last_seen: SharedLastSeen, page_size: u32) -> Self {
        Self {
            state: Store::new(QueryState::initial(page_size)),
            last_seen,
        }
    }

    pub fn state(&self) -> QueryState {
        self.state.get()
    }

    pub fn args(&self) -> PostsQueryArgs {
        self.state.read(|state| state.args.clone())
    }

    pub fn sort(&self) -> SortOption {
        self.state.read(|state| state.sort)
    }

    pub fn signature(&self) -> QuerySignature {
        self.state.read(|state| state.args.signature())
    }

    pub fn subscribe(&self) -> watch::Receiver<QueryState> {
        self.state.subscribe()
    }

    /// Set or clear the substring filter on title/link/content.
    pub fn set_text_filter(&self, text: Option<&str>) {
        self.state.update(|state| {
            let predicate = state.args.where_mut();
            predicate.title_contains = match text {
                Some(text) if !text.is_empty() => Some(text.to_owned()),
                _ => None,
            };
            state.args.reset_pagination();
        });
    }

    /// Apply an arbitrary patch to the filter predicate.
    ///
    /// Empty category OR-groups left behind by the patch are pruned so a
    /// predicate matching nothing is never sent to the server.
    pub fn update_where(&self, f: impl FnOnce(&mut PostWhereInput)) {
        self.state.update(|state| {
            let predicate = state.args.where_mut();
            f(predicate);
            predicate.prune_empty_category_groups();
            state.args.reset_pagination();
        });
    }

    /// Add or remove a single category from the OR-group of category
    /// filters, dropping the group entirely when it becomes empty.
    pub fn toggle_category(&self, category: PostCategory) {
        self.state.update(|state| {
            state.args.where_mut().toggle_category(category);
            state.args.reset_pagination();
        });
    }

    /// Patch the sort field or direction.
    pub fn update_order(&self, f: impl FnOnce(&mut PostOrder)) {
        self.state.update(|state| {
            f(state.args.order_mut());
            state.args.reset_pagination();
            if state.sort == SortOption::LastSeen {
                // "from last seen" always starts at the persisted cursor
                state.args.after = self.last_seen.get();
            }
        });
    }

    /// Map a named sort option onto field, direction and coupled predicate.
    pub fn set_sort(&self, sort: SortOption) {
        self.state.update(|state| {
            state.sort = sort;
            state.args.reset_pagination();
            // `approvedAt` forces this predicate below; no other sort may
            // keep it around.
            state.args.where_mut().moderated_at_not_nil = None;
            match sort {
                SortOption::CreationDate => {
                    state.args.order_mut().field = PostOrderField::CreatedAt;
                }
                SortOption::LastSeen => {
                    state.args.order_mut().field = PostOrderField::CreatedAt;
                    state.args.after = self.last_seen.get();
                }
                SortOption::MostLiked => {
                    let order = state.args.order_mut();
                    order.field = PostOrderField::LikedByCount;
                    order.direction = OrderDirection::Desc;
                }
                SortOption::ApprovedAt => {
                    state.args.order_mut().field = PostOrderField::ModeratedAt;
                    state.args.where_mut().moderated_at_not_nil = Some(true);
                }
            }
        });
    }

    /// Advance `after` for "load next page". Does not reset pagination.
    pub fn set_cursor(&self, cursor: Option<String>) {
        self.state.update(|state| {
            state.args.after = cursor;
        });
    }

    pub fn reset_pagination(&self) {
        self.state.update(|state| state.args.reset_pagination());
    }

    /// Replace the predicate wholesale (session restore); cursors and the
    /// ephemeral text filter start fresh.
    pub fn restore_predicate(&self, predicate: Option<PostWhereInput>) {
        self.state.update(|state| {
            state.args.r#where = predicate;
            if let Some(predicate) = &mut state.args.r#where {
                predicate.title_contains = None;
                predicate.prune_empty_category_groups();
            }
            state.args.reset_pagination();
        });
    }
}

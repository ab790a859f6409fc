//! Feed controller: orchestrates the query-parameter store, the post cache
//! and the backend port into one infinite-scroll lifecycle.
//!
//! Every network result is checked against the query signature captured when
//! the request was issued. A response belonging to parameters the user has
//! since changed is discarded wholesale, success or failure, so the cache
//! only ever holds pages from a single predicate/order sequence.

use std::sync::{Arc, Mutex, MutexGuard};

use metrics::counter;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::application::api::{
    ApiError, CreatePostInput, PageInfo, PostsApi, UpdatePostInput, UpdateUserInput,
};
use crate::application::cache::PostCacheStore;
use crate::application::query::QueryStore;
use crate::domain::categories::{self, PostCategory};
use crate::domain::error::DomainError;
use crate::domain::posts::{PostCategoryRecord, PostRecord};
use crate::domain::query::QuerySignature;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("post {id} is not part of the feed")]
    UnknownPost { id: String },
}

/// Coarse lifecycle phase, for spinners and skeletons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Idle,
    Loading,
    LoadingMore,
    Ready,
}

/// Outcome of a category reconciliation pass. Partial failure is normal:
/// each attach/detach mutation succeeds or fails on its own.
#[derive(Debug, Default)]
pub struct CategoryReconciliation {
    pub added: Vec<PostCategoryRecord>,
    pub removed: Vec<String>,
    pub errors: Vec<ApiError>,
}

impl CategoryReconciliation {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Default)]
struct FetchState {
    /// Signature of the request currently on the wire, if any.
    in_flight: Option<QuerySignature>,
    loading_more: bool,
    page_info: Option<PageInfo>,
    total_count: u64,
    /// Signature the cache contents belong to; pagination may only continue
    /// while the live query still matches it.
    loaded_signature: Option<QuerySignature>,
}

pub struct FeedController {
    api: Arc<dyn PostsApi>,
    query: Arc<QueryStore>,
    cache: Arc<PostCacheStore>,
    fetch: Mutex<FetchState>,
}

impl FeedController {
    pub fn new(api: Arc<dyn PostsApi>, query: Arc<QueryStore>, cache: Arc<PostCacheStore>) -> Self {
        Self {
            api,
            query,
            cache,
            fetch: Mutex::new(FetchState::default()),
        }
    }

    pub fn query(&self) -> &QueryStore {
        &self.query
    }

    pub fn cache(&self) -> &PostCacheStore {
        &self.cache
    }

    pub fn phase(&self) -> FeedPhase {
        let fetch = self.fetch_state();
        if fetch.in_flight.is_some() {
            if fetch.loading_more {
                FeedPhase::LoadingMore
            } else {
                FeedPhase::Loading
            }
        } else if fetch.loaded_signature.is_some() {
            FeedPhase::Ready
        } else {
            FeedPhase::Idle
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.fetch_state()
            .page_info
            .as_ref()
            .is_some_and(|info| info.has_next_page)
    }

    pub fn total_count(&self) -> u64 {
        self.fetch_state().total_count
    }

    /// Fetch the first page for the current query parameters, replacing the
    /// cache. A second refresh for the same parameters while one is on the
    /// wire is coalesced into the first.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), FeedError> {
        let signature = self.query.signature();
        {
            let mut fetch = self.fetch_state();
            if fetch.in_flight.as_ref() == Some(&signature) {
                debug!("refresh already in flight, coalescing");
                return Ok(());
            }
            fetch.in_flight = Some(signature.clone());
            fetch.loading_more = false;
        }
        counter!("clipasa_feed_fetch_total", "kind" => "refresh").increment(1);

        let args = self.query.args();
        let result = self.api.posts(&args).await;

        let mut fetch = self.fetch_state();
        if fetch.in_flight.as_ref() == Some(&signature) {
            fetch.in_flight = None;
        }
        if self.query.signature() != signature {
            counter!("clipasa_feed_stale_discard_total").increment(1);
            debug!("query changed mid-flight, discarding refresh response");
            return Ok(());
        }
        let page = result?;
        fetch.page_info = Some(page.page_info.clone());
        fetch.total_count = page.total_count;
        fetch.loaded_signature = Some(signature);
        drop(fetch);

        self.cache.replace_posts(page.posts);
        Ok(())
    }

    /// The virtualized list hit its last rendered row. Loads the next page
    /// when, and only when, nothing is in flight, the cache belongs to the
    /// live query, the server reported another page, and the cache is
    /// non-empty. Returns whether a page load was started.
    #[instrument(skip(self))]
    pub async fn end_reached(&self) -> Result<bool, FeedError> {
        let signature = self.query.signature();
        let cursor = {
            let fetch = self.fetch_state();
            if fetch.in_flight.is_some() {
                return Ok(false);
            }
            if fetch.loaded_signature.as_ref() != Some(&signature) {
                return Ok(false);
            }
            let Some(info) = &fetch.page_info else {
                return Ok(false);
            };
            if !info.has_next_page || self.cache.is_empty() {
                return Ok(false);
            }
            info.end_cursor.clone()
        };

        // advancing the cursor keeps the signature intact
        self.query.set_cursor(cursor);
        self.load_more(signature).await?;
        Ok(true)
    }

    async fn load_more(&self, signature: QuerySignature) -> Result<(), FeedError> {
        {
            let mut fetch = self.fetch_state();
            fetch.in_flight = Some(signature.clone());
            fetch.loading_more = true;
        }
        counter!("clipasa_feed_fetch_total", "kind" => "load_more").increment(1);

        let args = self.query.args();
        let result = self.api.posts(&args).await;

        let mut fetch = self.fetch_state();
        fetch.loading_more = false;
        if fetch.in_flight.as_ref() == Some(&signature) {
            fetch.in_flight = None;
        }
        if self.query.signature() != signature {
            counter!("clipasa_feed_stale_discard_total").increment(1);
            debug!("query changed mid-flight, discarding page response");
            return Ok(());
        }
        let page = result?;
        fetch.page_info = Some(page.page_info.clone());
        fetch.total_count = page.total_count;
        drop(fetch);

        self.cache.append_posts(page.posts);
        Ok(())
    }

    /// Resolve a shared post link: fetch the post, then page forward until
    /// its row is cached and ask the list to scroll to it. Stops quietly at
    /// the end of the sequence if the post never shows up under the current
    /// filters.
    #[instrument(skip(self), fields(post.id = id))]
    pub async fn open_shared(&self, id: &str) -> Result<PostRecord, FeedError> {
        let post = self
            .api
            .post(id)
            .await?
            .ok_or_else(|| FeedError::UnknownPost { id: id.to_owned() })?;

        loop {
            if let Some(index) = self.cache.posts().iter().position(|p| p.id == id) {
                // a shared row at the feed's current tail still needs the
                // next page behind it, or scrolling dead-ends on arrival;
                // the has_next_page guard keeps this from over-fetching
                if index + 1 == self.cache.len() {
                    self.end_reached().await?;
                }
                self.cache.set_scroll_to_index(index);
                return Ok(post);
            }
            if !self.end_reached().await? {
                warn!(post.id = id, "shared post not reachable under current filters");
                return Ok(post);
            }
        }
    }

    /// Flip the viewer's like. The server mutation runs first; the cached
    /// record is patched by one only after it succeeds.
    pub async fn toggle_like(&self, user_id: &str, post_id: &str) -> Result<(), FeedError> {
        let post = self.cached(post_id)?;
        let mut input = UpdateUserInput::default();
        if post.is_liked {
            input.remove_liked_post_ids = vec![post.id.clone()];
        } else {
            input.add_liked_post_ids = vec![post.id.clone()];
        }
        self.api.update_user(user_id, input).await?;
        self.cache.patch(post_id, PostRecord::with_like_toggled);
        Ok(())
    }

    pub async fn toggle_save(&self, user_id: &str, post_id: &str) -> Result<(), FeedError> {
        let post = self.cached(post_id)?;
        let mut input = UpdateUserInput::default();
        if post.is_saved {
            input.remove_saved_post_ids = vec![post.id.clone()];
        } else {
            input.add_saved_post_ids = vec![post.id.clone()];
        }
        self.api.update_user(user_id, input).await?;
        self.cache.patch(post_id, PostRecord::with_save_toggled);
        Ok(())
    }

    /// Record the post as the viewer's reading frontier, both server-side
    /// and as the locally persisted cursor the "last seen" sort resumes
    /// from. The cursor is the record's pagination cursor, not its id.
    pub async fn mark_seen(&self, user_id: &str, post_id: &str) -> Result<(), FeedError> {
        let post = self.cached(post_id)?;
        let input = UpdateUserInput {
            last_seen_post_id: Some(post.id.clone()),
            ..UpdateUserInput::default()
        };
        self.api.update_user(user_id, input).await?;
        self.cache.set_last_seen_cursor(Some(post.node_id));
        Ok(())
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<(), FeedError> {
        self.api.delete_post(post_id).await?;
        self.cache
            .patch(post_id, |post| post.with_deleted(OffsetDateTime::now_utc()));
        Ok(())
    }

    pub async fn restore_post(&self, post_id: &str) -> Result<(), FeedError> {
        self.api.restore_post(post_id).await?;
        self.cache.patch(post_id, PostRecord::with_restored);
        Ok(())
    }

    /// Approve or reject a post, with an optional moderator comment.
    pub async fn moderate(
        &self,
        post_id: &str,
        approved: bool,
        comment: Option<String>,
    ) -> Result<PostRecord, FeedError> {
        let input = UpdatePostInput {
            is_moderated: Some(approved),
            moderation_comment: comment,
            ..UpdatePostInput::default()
        };
        let updated = self.api.update_post(post_id, input).await?;
        self.merge_updated(&updated);
        Ok(updated)
    }

    pub async fn edit_post(
        &self,
        post_id: &str,
        input: UpdatePostInput,
    ) -> Result<PostRecord, FeedError> {
        let updated = self.api.update_post(post_id, input).await?;
        self.merge_updated(&updated);
        Ok(updated)
    }

    pub async fn set_pinned(&self, post_id: &str, pinned: bool) -> Result<(), FeedError> {
        let input = UpdatePostInput {
            pinned: Some(pinned),
            ..UpdatePostInput::default()
        };
        let updated = self.api.update_post(post_id, input).await?;
        self.merge_updated(&updated);
        Ok(())
    }

    /// Submit a new post, then restart the feed from the first page so the
    /// submission shows up in its sorted position.
    pub async fn create_post(&self, input: CreatePostInput) -> Result<PostRecord, FeedError> {
        let created = self.api.create_post(input).await?;
        self.query.reset_pagination();
        self.refresh().await?;
        Ok(created)
    }

    /// Drive a post's attached categories toward the desired set.
    ///
    /// The desired set is validated first; a unique-category conflict fails
    /// the whole edit before any mutation is issued. Past validation, each
    /// attach and detach runs as its own concurrent mutation, the cache is
    /// patched per success, and failures are aggregated rather than undoing
    /// the ones that landed.
    #[instrument(skip(self, desired), fields(post.id = post_id))]
    pub async fn reconcile_categories(
        &self,
        post_id: &str,
        desired: &[PostCategory],
    ) -> Result<CategoryReconciliation, FeedError> {
        categories::validate_unique(desired)?;
        let post = self.cached(post_id)?;
        let changes = categories::diff_categories(&post.categories, desired);
        if changes.is_empty() {
            return Ok(CategoryReconciliation::default());
        }

        let (add_results, remove_results) = futures::future::join(
            futures::future::join_all(changes.additions.iter().map(|&category| async move {
                self.api.create_post_category(post_id, category).await
            })),
            futures::future::join_all(changes.removals.iter().map(|record| async move {
                self.api
                    .delete_post_category(&record.id)
                    .await
                    .map(|()| record.id.clone())
            })),
        )
        .await;

        let mut outcome = CategoryReconciliation::default();
        for result in add_results {
            match result {
                Ok(record) => {
                    self.cache
                        .patch(post_id, |post| post.with_category_added(record.clone()));
                    outcome.added.push(record);
                }
                Err(err) => outcome.errors.push(err),
            }
        }
        for result in remove_results {
            match result {
                Ok(category_id) => {
                    self.cache
                        .patch(post_id, |post| post.with_category_removed(&category_id));
                    outcome.removed.push(category_id);
                }
                Err(err) => outcome.errors.push(err),
            }
        }
        if !outcome.is_clean() {
            warn!(
                failed = outcome.errors.len(),
                "category reconciliation finished with failures"
            );
        }
        Ok(outcome)
    }

    fn cached(&self, post_id: &str) -> Result<PostRecord, FeedError> {
        self.cache.get(post_id).ok_or_else(|| FeedError::UnknownPost {
            id: post_id.to_owned(),
        })
    }

    /// Mutation responses come back without the viewer-relative fields the
    /// cache tracks, so merge them over the cached record instead of
    /// replacing it.
    fn merge_updated(&self, updated: &PostRecord) {
        self.cache.patch(&updated.id, |cached| {
            let mut next = updated.clone();
            next.node_id = cached.node_id.clone();
            next.is_liked = cached.is_liked;
            next.is_saved = cached.is_saved;
            next
        });
    }

    fn fetch_state(&self) -> MutexGuard<'_, FetchState> {
        // the guard is never held across an await, so poisoning means a
        // panic inside a plain field update
        self.fetch.lock().expect("fetch state lock poisoned")
    }
}

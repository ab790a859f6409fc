//! Shared scripted backend for the integration suites.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::macros::datetime;
use tokio::sync::{Notify, Semaphore};

use clipasa::application::api::{
    ApiError, CreatePostInput, PageInfo, PostsApi, PostsPage, UpdatePostInput, UpdateUserInput,
};
use clipasa::application::cache::PostCacheStore;
use clipasa::application::feed::FeedController;
use clipasa::application::query::QueryStore;
use clipasa::application::store::shared_last_seen;
use clipasa::domain::categories::PostCategory;
use clipasa::domain::posts::{PostCategoryRecord, PostOwner, PostRecord};
use clipasa::domain::query::PostsQueryArgs;

pub fn post(id: &str) -> PostRecord {
    PostRecord {
        id: id.to_owned(),
        node_id: format!("cursor-{id}"),
        title: format!("clip {id}"),
        link: "https://clips.twitch.tv/x".to_owned(),
        content: None,
        owner: PostOwner {
            id: "u1".to_owned(),
            display_name: "calie".to_owned(),
        },
        created_at: datetime!(2024-05-01 12:00 UTC),
        is_moderated: true,
        moderated_at: Some(datetime!(2024-05-01 13:00 UTC)),
        moderation_comment: None,
        deleted_at: None,
        pinned: false,
        categories: Vec::new(),
        liked_by_count: 5,
        comments_count: 0,
        is_liked: false,
        is_saved: false,
    }
}

pub fn page(ids: &[&str], has_next_page: bool, total_count: u64) -> PostsPage {
    let posts: Vec<_> = ids.iter().map(|id| post(id)).collect();
    let end_cursor = posts.last().map(|p| p.node_id.clone());
    PostsPage {
        posts,
        page_info: PageInfo {
            has_next_page,
            end_cursor,
        },
        total_count,
    }
}

/// Two-sided handshake holding a `posts` request on the wire until the test
/// releases it.
pub struct Gate {
    entered: Notify,
    release: Semaphore,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            release: Semaphore::new(0),
        })
    }

    /// Wait until a request reached the stub.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held request complete.
    pub fn release(&self) {
        self.release.add_permits(1);
    }

    async fn pass(&self) {
        self.entered.notify_one();
        let permit = self.release.acquire().await.expect("gate never closed");
        permit.forget();
    }
}

#[derive(Default)]
pub struct StubApi {
    pages: Mutex<VecDeque<Result<PostsPage, ApiError>>>,
    shared: Mutex<HashMap<String, PostRecord>>,
    update_results: Mutex<HashMap<String, PostRecord>>,
    failing_category_deletes: Mutex<HashSet<String>>,
    reject_user_updates: Mutex<bool>,
    calls: Mutex<Vec<String>>,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl StubApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_page(&self, page: PostsPage) {
        self.pages.lock().expect("pages lock").push_back(Ok(page));
    }

    pub fn push_posts_error(&self, err: ApiError) {
        self.pages.lock().expect("pages lock").push_back(Err(err));
    }

    pub fn script_shared(&self, record: PostRecord) {
        self.shared
            .lock()
            .expect("shared lock")
            .insert(record.id.clone(), record);
    }

    pub fn script_update(&self, record: PostRecord) {
        self.update_results
            .lock()
            .expect("updates lock")
            .insert(record.id.clone(), record);
    }

    pub fn fail_category_delete(&self, category_id: &str) {
        self.failing_category_deletes
            .lock()
            .expect("failures lock")
            .insert(category_id.to_owned());
    }

    pub fn reject_user_updates(&self) {
        *self.reject_user_updates.lock().expect("flag lock") = true;
    }

    pub fn set_gate(&self, gate: Arc<Gate>) {
        *self.gate.lock().expect("gate lock") = Some(gate);
    }

    pub fn clear_gate(&self) {
        *self.gate.lock().expect("gate lock") = None;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().expect("calls lock").push(call.into());
    }
}

#[async_trait]
impl PostsApi for StubApi {
    async fn posts(&self, args: &PostsQueryArgs) -> Result<PostsPage, ApiError> {
        self.record(format!("posts after={:?}", args.after));
        let gate = self.gate.lock().expect("gate lock").clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        self.pages
            .lock()
            .expect("pages lock")
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Protocol("no scripted page left".to_owned())))
    }

    async fn post(&self, id: &str) -> Result<Option<PostRecord>, ApiError> {
        self.record(format!("post {id}"));
        Ok(self.shared.lock().expect("shared lock").get(id).cloned())
    }

    async fn create_post(&self, input: CreatePostInput) -> Result<PostRecord, ApiError> {
        self.record(format!("create_post {}", input.title));
        let mut created = post("created");
        created.title = input.title;
        created.link = input.link;
        created.content = input.content;
        created.is_moderated = false;
        created.moderated_at = None;
        Ok(created)
    }

    async fn update_post(&self, id: &str, _input: UpdatePostInput) -> Result<PostRecord, ApiError> {
        self.record(format!("update_post {id}"));
        Ok(self
            .update_results
            .lock()
            .expect("updates lock")
            .get(id)
            .cloned()
            .unwrap_or_else(|| post(id)))
    }

    async fn delete_post(&self, id: &str) -> Result<(), ApiError> {
        self.record(format!("delete_post {id}"));
        Ok(())
    }

    async fn restore_post(&self, id: &str) -> Result<(), ApiError> {
        self.record(format!("restore_post {id}"));
        Ok(())
    }

    async fn create_post_category(
        &self,
        post_id: &str,
        category: PostCategory,
    ) -> Result<PostCategoryRecord, ApiError> {
        self.record(format!("create_post_category {post_id} {category:?}"));
        Ok(PostCategoryRecord {
            id: format!("cat-{category:?}"),
            category,
        })
    }

    async fn delete_post_category(&self, id: &str) -> Result<(), ApiError> {
        self.record(format!("delete_post_category {id}"));
        if self
            .failing_category_deletes
            .lock()
            .expect("failures lock")
            .contains(id)
        {
            return Err(ApiError::Validation {
                messages: vec![format!("category {id} cannot be removed")],
            });
        }
        Ok(())
    }

    async fn update_user(&self, id: &str, _input: UpdateUserInput) -> Result<(), ApiError> {
        self.record(format!("update_user {id}"));
        if *self.reject_user_updates.lock().expect("flag lock") {
            return Err(ApiError::Network("connection reset".to_owned()));
        }
        Ok(())
    }
}

pub struct Harness {
    pub api: Arc<StubApi>,
    pub feed: Arc<FeedController>,
}

pub fn harness() -> Harness {
    let api = StubApi::new();
    let last_seen = shared_last_seen(None);
    let feed = Arc::new(FeedController::new(
        api.clone(),
        Arc::new(QueryStore::new(last_seen.clone())),
        Arc::new(PostCacheStore::new(last_seen)),
    ));
    Harness { api, feed }
}

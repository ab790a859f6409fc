//! Port onto the GraphQL backend, and the error taxonomy every feature
//! handler maps onto its local error channel.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::categories::PostCategory;
use crate::domain::posts::{PostCategoryRecord, PostRecord};
use crate::domain::query::PostsQueryArgs;

/// Classified request failure.
///
/// Only transport-level failures are retryable; authorization failures are
/// never retried, and validation failures carry the server's message list
/// for the callout next to the triggering control.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("request rejected: {}", .messages.join("; "))]
    Validation { messages: Vec<String> },
    #[error("malformed server response: {0}")]
    Protocol(String),
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Displayable message list for inline callouts.
    pub fn messages(&self) -> Vec<String> {
        match self {
            ApiError::Validation { messages } => messages.clone(),
            other => vec![other.to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostInput {
    pub title: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<PostCategory>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePostInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_moderated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
}

/// Like, save and last-seen fields all live on the user entity.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateUserInput {
    #[serde(rename = "addLikedPostIDs", skip_serializing_if = "Vec::is_empty")]
    pub add_liked_post_ids: Vec<String>,
    #[serde(rename = "removeLikedPostIDs", skip_serializing_if = "Vec::is_empty")]
    pub remove_liked_post_ids: Vec<String>,
    #[serde(rename = "addSavedPostIDs", skip_serializing_if = "Vec::is_empty")]
    pub add_saved_post_ids: Vec<String>,
    #[serde(rename = "removeSavedPostIDs", skip_serializing_if = "Vec::is_empty")]
    pub remove_saved_post_ids: Vec<String>,
    #[serde(rename = "lastSeenPostID", skip_serializing_if = "Option::is_none")]
    pub last_seen_post_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// One cursor-paginated page of the `posts` query.
#[derive(Debug, Clone, Default)]
pub struct PostsPage {
    pub posts: Vec<PostRecord>,
    pub page_info: PageInfo,
    pub total_count: u64,
}

#[async_trait]
pub trait PostsApi: Send + Sync {
    async fn posts(&self, args: &PostsQueryArgs) -> Result<PostsPage, ApiError>;
    async fn post(&self, id: &str) -> Result<Option<PostRecord>, ApiError>;

    async fn create_post(&self, input: CreatePostInput) -> Result<PostRecord, ApiError>;
    async fn update_post(&self, id: &str, input: UpdatePostInput) -> Result<PostRecord, ApiError>;
    async fn delete_post(&self, id: &str) -> Result<(), ApiError>;
    async fn restore_post(&self, id: &str) -> Result<(), ApiError>;

    async fn create_post_category(
        &self,
        post_id: &str,
        category: PostCategory,
    ) -> Result<PostCategoryRecord, ApiError>;
    async fn delete_post_category(&self, id: &str) -> Result<(), ApiError>;

    async fn update_user(&self, id: &str, input: UpdateUserInput) -> Result<(), ApiError>;
}

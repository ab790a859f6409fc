//! GraphQL transport adapter: request execution with bounded retries,
//! error classification, and the wire-to-domain mapping for posts.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::warn;
use url::Url;

use crate::application::api::{
    ApiError, CreatePostInput, PageInfo, PostsApi, PostsPage, UpdatePostInput, UpdateUserInput,
};
use crate::config::{ApiSettings, RetrySettings};
use crate::domain::categories::PostCategory;
use crate::domain::posts::{PostCategoryRecord, PostOwner, PostRecord};
use crate::domain::query::{PostWhereInput, PostsQueryArgs};

use super::error::InfraError;

/// Source of the viewer's bearer token. Returning `None` issues the request
/// anonymously.
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// A fixed token, for tools and tests.
pub struct StaticTokenProvider(Option<String>);

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

impl AccessTokenProvider for StaticTokenProvider {
    fn access_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Executes GraphQL documents against a single endpoint.
///
/// Transient transport failures are retried with capped exponential backoff
/// up to the configured attempt budget; authorization and validation
/// failures are returned to the caller on the first occurrence.
pub struct GraphqlExecutor {
    http: reqwest::Client,
    endpoint: Url,
    tokens: Arc<dyn AccessTokenProvider>,
    retry: RetrySettings,
}

impl GraphqlExecutor {
    pub fn new(
        settings: &ApiSettings,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, InfraError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self {
            http,
            endpoint: settings.endpoint.clone(),
            tokens,
            retry: settings.retry,
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        query: &str,
        variables: Value,
    ) -> Result<T, ApiError> {
        let mut attempt = 1;
        loop {
            counter!("clipasa_api_request_total", "operation" => operation).increment(1);
            match self.execute_once(query, &variables).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    counter!("clipasa_api_retry_total").increment(1);
                    warn!(operation, attempt, error = %err, "transient request failure, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn execute_once<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: &Value,
    ) -> Result<T, ApiError> {
        let mut request = self
            .http
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "query": query, "variables": variables }));
        if let Some(token) = self.tokens.access_token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized(format!("server returned {status}")));
        }
        if !status.is_success() {
            return Err(ApiError::Network(format!("server returned {status}")));
        }

        let envelope: GraphqlEnvelope<T> = response
            .json()
            .await
            .map_err(|err| ApiError::Protocol(err.to_string()))?;
        if let Some(errors) = envelope.errors.filter(|errors| !errors.is_empty()) {
            return Err(classify_graphql_errors(&errors));
        }
        envelope.data.ok_or_else(|| {
            ApiError::Protocol("response carried neither data nor errors".to_owned())
        })
    }
}

fn classify_transport(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network(err.to_string())
    }
}

fn classify_graphql_errors(errors: &[GraphqlErrorDto]) -> ApiError {
    for err in errors {
        let lowered = err.message.to_lowercase();
        if lowered.contains("unauthenticated")
            || lowered.contains("unauthorized")
            || lowered.contains("forbidden")
        {
            return ApiError::Unauthorized(err.message.clone());
        }
    }
    ApiError::Validation {
        messages: errors.iter().map(describe_error).collect(),
    }
}

/// Prefix a server error with the variable path it points at, so "required"
/// reads as "input.title: required".
fn describe_error(err: &GraphqlErrorDto) -> String {
    let Some(path) = &err.path else {
        return err.message.clone();
    };
    if path.first().and_then(Value::as_str) != Some("variable") {
        return err.message.clone();
    }
    let field = path
        .iter()
        .skip(1)
        .filter_map(Value::as_str)
        .collect::<Vec<_>>()
        .join(".");
    if field.is_empty() {
        err.message.clone()
    } else {
        format!("{field}: {}", err.message)
    }
}

// no `#[serde(default)]` here: it would put a `T: Default` bound on the
// derived impl, and missing `Option` fields already decode as `None`
#[derive(Debug, Deserialize)]
struct GraphqlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphqlErrorDto>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorDto {
    message: String,
    #[serde(default)]
    path: Option<Vec<Value>>,
}

const POST_FRAGMENT: &str = r"
fragment PostParts on Post {
  id
  title
  link
  content
  createdAt
  isModerated
  moderatedAt
  moderationComment
  deletedAt
  pinned
  owner { id displayName }
  categories { id category }
  likedBy { totalCount }
  comments { totalCount }
  isLiked
  isSaved
}";

const POSTS_QUERY: &str = r"
query Posts($where: PostWhereInput, $orderBy: PostOrder, $first: Int, $after: Cursor, $before: Cursor) {
  posts(where: $where, orderBy: $orderBy, first: $first, after: $after, before: $before) {
    totalCount
    pageInfo { hasNextPage endCursor }
    edges { cursor node { ...PostParts } }
  }
}";

const CREATE_POST_MUTATION: &str = r"
mutation CreatePost($input: CreatePostInput!) {
  createPost(input: $input) { ...PostParts }
}";

const UPDATE_POST_MUTATION: &str = r"
mutation UpdatePost($id: ID!, $input: UpdatePostInput!) {
  updatePost(id: $id, input: $input) { ...PostParts }
}";

const DELETE_POST_MUTATION: &str = r"
mutation DeletePost($id: ID!) {
  deletePost(id: $id)
}";

const RESTORE_POST_MUTATION: &str = r"
mutation RestorePost($id: ID!) {
  restorePost(id: $id)
}";

const CREATE_POST_CATEGORY_MUTATION: &str = r"
mutation CreatePostCategory($input: CreatePostCategoryInput!) {
  createPostCategory(input: $input) { id category }
}";

const DELETE_POST_CATEGORY_MUTATION: &str = r"
mutation DeletePostCategory($id: ID!) {
  deletePostCategory(id: $id)
}";

const UPDATE_USER_MUTATION: &str = r"
mutation UpdateUser($id: ID!, $input: UpdateUserInput!) {
  updateUser(id: $id, input: $input) { id }
}";

fn with_fragment(body: &str) -> String {
    format!("{body}\n{POST_FRAGMENT}")
}

/// The production [`PostsApi`] implementation.
pub struct GraphqlPostsApi {
    executor: GraphqlExecutor,
}

impl GraphqlPostsApi {
    pub fn new(
        settings: &ApiSettings,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, InfraError> {
        Ok(Self {
            executor: GraphqlExecutor::new(settings, tokens)?,
        })
    }
}

#[async_trait]
impl PostsApi for GraphqlPostsApi {
    async fn posts(&self, args: &PostsQueryArgs) -> Result<PostsPage, ApiError> {
        let variables =
            serde_json::to_value(args).map_err(|err| ApiError::Protocol(err.to_string()))?;
        let data: PostsData = self
            .executor
            .execute("posts", &with_fragment(POSTS_QUERY), variables)
            .await?;
        Ok(data.posts.into_page())
    }

    async fn post(&self, id: &str) -> Result<Option<PostRecord>, ApiError> {
        // querying through the connection yields a real pagination cursor
        // for the record, which a bare node lookup would not
        let args = PostsQueryArgs {
            r#where: Some(PostWhereInput {
                id: Some(id.to_owned()),
                ..PostWhereInput::default()
            }),
            first: Some(1),
            ..PostsQueryArgs::default()
        };
        let page = self.posts(&args).await?;
        Ok(page.posts.into_iter().next())
    }

    async fn create_post(&self, input: CreatePostInput) -> Result<PostRecord, ApiError> {
        let data: CreatePostData = self
            .executor
            .execute(
                "createPost",
                &with_fragment(CREATE_POST_MUTATION),
                serde_json::json!({ "input": input }),
            )
            .await?;
        Ok(data.create_post.into_record(None))
    }

    async fn update_post(&self, id: &str, input: UpdatePostInput) -> Result<PostRecord, ApiError> {
        let data: UpdatePostData = self
            .executor
            .execute(
                "updatePost",
                &with_fragment(UPDATE_POST_MUTATION),
                serde_json::json!({ "id": id, "input": input }),
            )
            .await?;
        Ok(data.update_post.into_record(None))
    }

    async fn delete_post(&self, id: &str) -> Result<(), ApiError> {
        self.executor
            .execute::<Value>(
                "deletePost",
                DELETE_POST_MUTATION,
                serde_json::json!({ "id": id }),
            )
            .await?;
        Ok(())
    }

    async fn restore_post(&self, id: &str) -> Result<(), ApiError> {
        self.executor
            .execute::<Value>(
                "restorePost",
                RESTORE_POST_MUTATION,
                serde_json::json!({ "id": id }),
            )
            .await?;
        Ok(())
    }

    async fn create_post_category(
        &self,
        post_id: &str,
        category: PostCategory,
    ) -> Result<PostCategoryRecord, ApiError> {
        let data: CreatePostCategoryData = self
            .executor
            .execute(
                "createPostCategory",
                CREATE_POST_CATEGORY_MUTATION,
                serde_json::json!({ "input": { "postID": post_id, "category": category } }),
            )
            .await?;
        Ok(data.create_post_category.into_record())
    }

    async fn delete_post_category(&self, id: &str) -> Result<(), ApiError> {
        self.executor
            .execute::<Value>(
                "deletePostCategory",
                DELETE_POST_CATEGORY_MUTATION,
                serde_json::json!({ "id": id }),
            )
            .await?;
        Ok(())
    }

    async fn update_user(&self, id: &str, input: UpdateUserInput) -> Result<(), ApiError> {
        self.executor
            .execute::<Value>(
                "updateUser",
                UPDATE_USER_MUTATION,
                serde_json::json!({ "id": id, "input": input }),
            )
            .await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PostsData {
    posts: ConnectionDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePostData {
    create_post: PostNodeDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePostData {
    update_post: PostNodeDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePostCategoryData {
    create_post_category: CategoryDto,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionDto {
    #[serde(default)]
    total_count: u64,
    page_info: PageInfoDto,
    #[serde(default)]
    edges: Vec<EdgeDto>,
}

impl ConnectionDto {
    fn into_page(self) -> PostsPage {
        let posts = self
            .edges
            .into_iter()
            .filter_map(|edge| {
                let node = edge.node?;
                Some(node.into_record(Some(edge.cursor)))
            })
            .collect();
        PostsPage {
            posts,
            page_info: PageInfo {
                has_next_page: self.page_info.has_next_page,
                end_cursor: self.page_info.end_cursor,
            },
            total_count: self.total_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfoDto {
    #[serde(default)]
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EdgeDto {
    cursor: String,
    #[serde(default)]
    node: Option<PostNodeDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostNodeDto {
    id: String,
    title: String,
    link: String,
    #[serde(default)]
    content: Option<String>,
    owner: OwnerDto,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    #[serde(default)]
    is_moderated: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    moderated_at: Option<OffsetDateTime>,
    #[serde(default)]
    moderation_comment: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    deleted_at: Option<OffsetDateTime>,
    #[serde(default)]
    pinned: bool,
    #[serde(default)]
    categories: Vec<CategoryDto>,
    #[serde(default)]
    liked_by: Option<CountDto>,
    #[serde(default)]
    comments: Option<CountDto>,
    #[serde(default)]
    is_liked: bool,
    #[serde(default)]
    is_saved: bool,
}

impl PostNodeDto {
    /// Mutation responses have no surrounding edge; they fall back to the
    /// entity id as the cursor, which callers overwrite with the cached one.
    fn into_record(self, cursor: Option<String>) -> PostRecord {
        let node_id = cursor.unwrap_or_else(|| self.id.clone());
        PostRecord {
            node_id,
            id: self.id,
            title: self.title,
            link: self.link,
            content: self.content,
            owner: PostOwner {
                id: self.owner.id,
                display_name: self.owner.display_name,
            },
            created_at: self.created_at,
            is_moderated: self.is_moderated,
            moderated_at: self.moderated_at,
            moderation_comment: self.moderation_comment,
            deleted_at: self.deleted_at,
            pinned: self.pinned,
            categories: self
                .categories
                .into_iter()
                .map(CategoryDto::into_record)
                .collect(),
            liked_by_count: self.liked_by.map(|c| c.total_count).unwrap_or_default(),
            comments_count: self.comments.map(|c| c.total_count).unwrap_or_default(),
            is_liked: self.is_liked,
            is_saved: self.is_saved,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerDto {
    id: String,
    display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountDto {
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct CategoryDto {
    id: String,
    category: PostCategory,
}

impl CategoryDto {
    fn into_record(self) -> PostCategoryRecord {
        PostCategoryRecord {
            id: self.id,
            category: self.category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(message: &str, path: Option<Vec<Value>>) -> GraphqlErrorDto {
        GraphqlErrorDto {
            message: message.to_owned(),
            path,
        }
    }

    #[test]
    fn variable_paths_prefix_the_message() {
        let err = error(
            "value is required",
            Some(vec!["variable".into(), "input".into(), "title".into()]),
        );
        assert_eq!(describe_error(&err), "input.title: value is required");
    }

    #[test]
    fn non_variable_paths_pass_through() {
        let err = error("boom", Some(vec!["posts".into(), 0.into()]));
        assert_eq!(describe_error(&err), "boom");
        let bare = error("boom", None);
        assert_eq!(describe_error(&bare), "boom");
    }

    #[test]
    fn auth_messages_classify_as_unauthorized() {
        let errors = vec![error("token is Unauthenticated", None)];
        assert!(matches!(
            classify_graphql_errors(&errors),
            ApiError::Unauthorized(_)
        ));
    }

    #[test]
    fn other_messages_aggregate_into_validation() {
        let errors = vec![
            error("title too short", None),
            error(
                "must be a URL",
                Some(vec!["variable".into(), "input".into(), "link".into()]),
            ),
        ];
        match classify_graphql_errors(&errors) {
            ApiError::Validation { messages } => {
                assert_eq!(
                    messages,
                    vec![
                        "title too short".to_owned(),
                        "input.link: must be a URL".to_owned()
                    ]
                );
            }
            other => panic!("expected validation, got {other:?}"),
        }
    }

    #[test]
    fn connection_mapping_keeps_edge_cursors_and_skips_null_nodes() {
        let payload = serde_json::json!({
            "totalCount": 2,
            "pageInfo": { "hasNextPage": true, "endCursor": "cur-b" },
            "edges": [
                {
                    "cursor": "cur-a",
                    "node": {
                        "id": "a",
                        "title": "clip",
                        "link": "https://clips.twitch.tv/x",
                        "owner": { "id": "u1", "displayName": "calie" },
                        "createdAt": "2024-05-01T12:00:00Z",
                        "isModerated": true,
                        "likedBy": { "totalCount": 3 },
                        "categories": [ { "id": "c1", "category": "ORO" } ]
                    }
                },
                { "cursor": "cur-b", "node": null }
            ]
        });

        let connection: ConnectionDto = serde_json::from_value(payload).expect("decoded");
        let page = connection.into_page();

        assert_eq!(page.total_count, 2);
        assert!(page.page_info.has_next_page);
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.posts[0].node_id, "cur-a");
        assert_eq!(page.posts[0].liked_by_count, 3);
        assert_eq!(page.posts[0].categories[0].category, PostCategory::Oro);
    }

    #[test]
    fn envelope_with_errors_and_no_data_still_decodes() {
        let payload = serde_json::json!({
            "errors": [ { "message": "boom", "path": ["posts"] } ]
        });
        let envelope: GraphqlEnvelope<PostsData> =
            serde_json::from_value(payload).expect("decoded");
        assert!(envelope.data.is_none());
        assert_eq!(envelope.errors.expect("errors present").len(), 1);
    }

    #[test]
    fn envelope_decodes_payloads_without_a_default_impl() {
        // PostsData has no Default; the envelope must not require one
        let payload = serde_json::json!({
            "data": {
                "posts": {
                    "totalCount": 0,
                    "pageInfo": { "hasNextPage": false },
                    "edges": []
                }
            }
        });
        let envelope: GraphqlEnvelope<PostsData> =
            serde_json::from_value(payload).expect("decoded");
        assert!(envelope.data.is_some());
        assert!(envelope.errors.is_none());
    }
}

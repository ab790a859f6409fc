//! Post records and the pure patch functions applied to the client cache.
//!
//! Every optimistic update is expressed as a function from a record to a new
//! record, so the cache can enforce the patch-by-identifier invariant without
//! callers reaching into nested fields.

use time::OffsetDateTime;

use crate::domain::categories::PostCategory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOwner {
    pub id: String,
    pub display_name: String,
}

/// A category attachment; `id` addresses the attachment itself, not the
/// category value, and is what the delete mutation takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCategoryRecord {
    pub id: String,
    pub category: PostCategory,
}

/// A post as the feed renders it.
///
/// `node_id` is the pagination cursor the record arrived under. It orders
/// records within one page sequence only; it is not stable across sorts.
#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub id: String,
    pub node_id: String,
    pub title: String,
    pub link: String,
    pub content: Option<String>,
    pub owner: PostOwner,
    pub created_at: OffsetDateTime,
    pub is_moderated: bool,
    pub moderated_at: Option<OffsetDateTime>,
    pub moderation_comment: Option<String>,
    pub deleted_at: Option<OffsetDateTime>,
    pub pinned: bool,
    pub categories: Vec<PostCategoryRecord>,
    pub liked_by_count: u64,
    pub comments_count: u64,
    pub is_liked: bool,
    pub is_saved: bool,
}

impl PostRecord {
    /// Flip the viewer's like and adjust the count by one, never refetching.
    pub fn with_like_toggled(&self) -> Self {
        let mut next = self.clone();
        next.is_liked = !self.is_liked;
        next.liked_by_count = if next.is_liked {
            self.liked_by_count + 1
        } else {
            self.liked_by_count.saturating_sub(1)
        };
        next
    }

    pub fn with_save_toggled(&self) -> Self {
        let mut next = self.clone();
        next.is_saved = !self.is_saved;
        next
    }

    pub fn with_deleted(&self, deleted_at: OffsetDateTime) -> Self {
        let mut next = self.clone();
        next.deleted_at = Some(deleted_at);
        next
    }

    pub fn with_restored(&self) -> Self {
        let mut next = self.clone();
        next.deleted_at = None;
        next
    }

    pub fn with_category_added(&self, record: PostCategoryRecord) -> Self {
        let mut next = self.clone();
        next.categories.push(record);
        next
    }

    pub fn with_category_removed(&self, category_id: &str) -> Self {
        let mut next = self.clone();
        next.categories.retain(|rec| rec.id != category_id);
        next
    }
}

/// Fixture shared by the unit suites.
#[cfg(test)]
pub(crate) fn sample_post(id: &str) -> PostRecord {
    use time::macros::datetime;

    PostRecord {
        id: id.to_owned(),
        node_id: format!("cursor-{id}"),
        title: "clip".to_owned(),
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

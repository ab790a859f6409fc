//! The normalized GraphQL request shape driving server-side pagination.
//!
//! These types serialize 1:1 into the `posts` query variables. Optional
//! fields are skipped when unset so the server only ever sees predicates the
//! user actually applied; in particular an empty category OR-group is never
//! serialized (it would ambiguously match zero or all posts).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::categories::PostCategory;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostOrderField {
    #[serde(rename = "CREATED_AT")]
    CreatedAt,
    #[serde(rename = "MODERATED_AT")]
    ModeratedAt,
    #[serde(rename = "LIKED_BY_COUNT")]
    LikedByCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderDirection {
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl OrderDirection {
    pub fn toggled(self) -> Self {
        match self {
            OrderDirection::Asc => OrderDirection::Desc,
            OrderDirection::Desc => OrderDirection::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostOrder {
    pub field: PostOrderField,
    pub direction: OrderDirection,
}

impl Default for PostOrder {
    fn default() -> Self {
        Self {
            field: PostOrderField::CreatedAt,
            direction: OrderDirection::Desc,
        }
    }
}

/// Reference predicate on a related user edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRefInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl UserRefInput {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
        }
    }
}

/// Predicate on attached categories. The client only ever emits a single
/// OR-group of `{ category }` leaves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostCategoryWhereInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub or: Option<Vec<PostCategoryWhereInput>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<PostCategory>,
}

/// The filter predicate half of the query parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostWhereInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_contains: Option<String>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at_gte: Option<OffsetDateTime>,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at_lte: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_moderated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderated_at_not_nil: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at_not_nil: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_owner_with: Option<Vec<UserRefInput>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_liked_by_with: Option<Vec<UserRefInput>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_saved_by_with: Option<Vec<UserRefInput>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_categories_with: Option<Vec<PostCategoryWhereInput>>,
}

impl PostWhereInput {
    /// The category values currently filtered on, in insertion order.
    pub fn filtered_categories(&self) -> Vec<PostCategory> {
        self.has_categories_with
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|group| group.or.as_deref())
            .flatten()
            .filter_map(|leaf| leaf.category)
            .collect()
    }

    /// Add or remove one category from the OR-group.
    pub fn toggle_category(&mut self, category: PostCategory) {
        let mut categories = self.filtered_categories();
        match categories.iter().position(|c| *c == category) {
            Some(index) => {
                categories.remove(index);
            }
            None => categories.push(category),
        }
        self.set_filtered_categories(&categories);
    }

    /// Install the OR-group for the given categories, or remove the key
    /// entirely when the set is empty.
    pub fn set_filtered_categories(&mut self, categories: &[PostCategory]) {
        if categories.is_empty() {
            self.has_categories_with = None;
            return;
        }
        let leaves = categories
            .iter()
            .map(|category| PostCategoryWhereInput {
                or: None,
                category: Some(*category),
            })
            .collect();
        self.has_categories_with = Some(vec![PostCategoryWhereInput {
            or: Some(leaves),
            category: None,
        }]);
    }

    /// Drop OR-groups that lost all their leaves through arbitrary `where`
    /// patches, removing the key entirely when none remain.
    pub fn prune_empty_category_groups(&mut self) {
        if let Some(groups) = &mut self.has_categories_with {
            groups.retain(|group| match (&group.or, group.category) {
                (Some(leaves), _) => !leaves.is_empty(),
                (None, category) => category.is_some(),
            });
            if groups.is_empty() {
                self.has_categories_with = None;
            }
        }
    }
}

/// The full request shape: predicate, order and pagination window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostsQueryArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#where: Option<PostWhereInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<PostOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

impl PostsQueryArgs {
    /// The feed's starting shape: approved posts, newest first.
    pub fn initial(page_size: u32) -> Self {
        Self {
            r#where: Some(PostWhereInput {
                is_moderated: Some(true),
                ..PostWhereInput::default()
            }),
            order_by: Some(PostOrder::default()),
            first: Some(page_size),
            after: None,
            before: None,
        }
    }

    pub fn where_mut(&mut self) -> &mut PostWhereInput {
        self.r#where.get_or_insert_with(PostWhereInput::default)
    }

    pub fn order_mut(&mut self) -> &mut PostOrder {
        self.order_by.get_or_insert_with(PostOrder::default)
    }

    /// Clear both pagination cursors. Called on every predicate or order
    /// change so pages from different predicates never mix.
    pub fn reset_pagination(&mut self) {
        self.after = None;
        self.before = None;
    }

    /// Identity of the page sequence this request belongs to: predicate and
    /// order only, never the cursors.
    pub fn signature(&self) -> QuerySignature {
        let key = serde_json::json!({
            "where": self.r#where,
            "orderBy": self.order_by,
        });
        QuerySignature(key.to_string())
    }
}

/// Serialized filter+order pair identifying one page sequence; used to
/// discard responses that arrive after the parameters changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySignature(String);

impl QuerySignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

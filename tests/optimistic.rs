//! Optimistic mutations and the category reconciliation saga.

mod support;

use clipasa::application::api::{ApiError, UpdatePostInput};
use clipasa::application::feed::FeedError;
use clipasa::domain::categories::PostCategory;
use clipasa::domain::error::DomainError;
use clipasa::domain::posts::PostCategoryRecord;

use support::{harness, page, post};

#[tokio::test]
async fn like_and_unlike_round_trip_through_the_cache() {
    let h = harness();
    h.api.push_page(page(&["a"], false, 1));
    h.feed.refresh().await.expect("page loads");

    h.feed.toggle_like("u1", "a").await.expect("like lands");
    let liked = h.feed.cache().get("a").expect("cached");
    assert!(liked.is_liked);
    assert_eq!(liked.liked_by_count, 6);

    h.feed.toggle_like("u1", "a").await.expect("unlike lands");
    let unliked = h.feed.cache().get("a").expect("cached");
    assert!(!unliked.is_liked);
    assert_eq!(unliked.liked_by_count, 5);
}

#[tokio::test]
async fn a_rejected_mutation_never_patches_the_cache() {
    let h = harness();
    h.api.push_page(page(&["a"], false, 1));
    h.feed.refresh().await.expect("page loads");
    h.api.reject_user_updates();

    let err = h.feed.toggle_save("u1", "a").await.expect_err("save fails");
    assert!(matches!(err, FeedError::Api(ApiError::Network(_))));
    assert!(!h.feed.cache().get("a").expect("cached").is_saved);
}

#[tokio::test]
async fn mark_seen_records_the_pagination_cursor() {
    let h = harness();
    h.api.push_page(page(&["a", "b"], false, 2));
    h.feed.refresh().await.expect("page loads");

    h.feed.mark_seen("u1", "b").await.expect("mark seen lands");

    assert_eq!(
        h.feed.cache().last_seen_cursor().as_deref(),
        Some("cursor-b")
    );
    assert_eq!(h.api.calls().last().map(String::as_str), Some("update_user u1"));
}

#[tokio::test]
async fn delete_and_restore_patch_the_deletion_timestamp() {
    let h = harness();
    h.api.push_page(page(&["a"], false, 1));
    h.feed.refresh().await.expect("page loads");

    h.feed.delete_post("a").await.expect("delete lands");
    assert!(h.feed.cache().get("a").expect("cached").deleted_at.is_some());

    h.feed.restore_post("a").await.expect("restore lands");
    assert!(h.feed.cache().get("a").expect("cached").deleted_at.is_none());
}

#[tokio::test]
async fn moderation_merges_over_the_cached_viewer_state() {
    let h = harness();
    h.api.push_page(page(&["a"], false, 1));
    h.feed.refresh().await.expect("page loads");
    h.feed.toggle_like("u1", "a").await.expect("like lands");

    // the mutation response knows nothing about this viewer
    let mut moderated = post("a");
    moderated.node_id = "a".to_owned();
    moderated.is_moderated = false;
    moderated.moderation_comment = Some("too loud".to_owned());
    moderated.is_liked = false;
    moderated.liked_by_count = 6;
    h.api.script_update(moderated);

    h.feed
        .moderate("a", false, Some("too loud".to_owned()))
        .await
        .expect("moderation lands");

    let cached = h.feed.cache().get("a").expect("cached");
    assert!(!cached.is_moderated);
    assert_eq!(cached.moderation_comment.as_deref(), Some("too loud"));
    // viewer-relative fields and the cursor survive the merge
    assert!(cached.is_liked);
    assert_eq!(cached.node_id, "cursor-a");
}

#[tokio::test]
async fn editing_a_missing_post_updates_nothing_locally() {
    let h = harness();
    h.api.push_page(page(&["a"], false, 1));
    h.feed.refresh().await.expect("page loads");

    let input = UpdatePostInput {
        title: Some("renamed".to_owned()),
        ..UpdatePostInput::default()
    };
    let updated = h.feed.edit_post("zz", input).await.expect("server accepts");

    assert_eq!(updated.id, "zz");
    assert_eq!(h.feed.cache().get("a").expect("cached").title, "clip a");
    assert!(h.feed.cache().get("zz").is_none());
}

#[tokio::test]
async fn conflicting_unique_categories_fail_before_any_mutation() {
    let h = harness();
    h.api.push_page(page(&["a"], false, 1));
    h.feed.refresh().await.expect("page loads");

    let err = h
        .feed
        .reconcile_categories("a", &[PostCategory::Diamante, PostCategory::Rana])
        .await
        .expect_err("conflict rejected");

    assert!(matches!(
        err,
        FeedError::Domain(DomainError::Validation { .. })
    ));
    assert_eq!(h.api.calls().len(), 1, "only the refresh hit the backend");
}

#[tokio::test]
async fn the_category_saga_keeps_partial_successes() {
    let h = harness();
    let mut seeded = page(&["a"], false, 1);
    seeded.posts[0].categories.push(PostCategoryRecord {
        id: "c-meh".to_owned(),
        category: PostCategory::Meh,
    });
    h.api.push_page(seeded);
    h.feed.refresh().await.expect("page loads");
    h.api.fail_category_delete("c-meh");

    let outcome = h
        .feed
        .reconcile_categories("a", &[PostCategory::Diamante])
        .await
        .expect("saga runs");

    // the attach landed, the detach failed, and both facts are visible
    assert_eq!(outcome.added.len(), 1);
    assert_eq!(outcome.added[0].category, PostCategory::Diamante);
    assert!(outcome.removed.is_empty());
    assert_eq!(outcome.errors.len(), 1);
    assert!(matches!(outcome.errors[0], ApiError::Validation { .. }));

    let attached: Vec<_> = h
        .feed
        .cache()
        .get("a")
        .expect("cached")
        .categories
        .iter()
        .map(|rec| rec.category)
        .collect();
    assert_eq!(attached, vec![PostCategory::Meh, PostCategory::Diamante]);
}

#[tokio::test]
async fn an_identical_desired_set_issues_no_mutations() {
    let h = harness();
    let mut seeded = page(&["a"], false, 1);
    seeded.posts[0].categories.push(PostCategoryRecord {
        id: "c-grr".to_owned(),
        category: PostCategory::Grr,
    });
    h.api.push_page(seeded);
    h.feed.refresh().await.expect("page loads");

    let outcome = h
        .feed
        .reconcile_categories("a", &[PostCategory::Grr])
        .await
        .expect("saga runs");

    assert!(outcome.is_clean());
    assert!(outcome.added.is_empty() && outcome.removed.is_empty());
    assert_eq!(h.api.calls().len(), 1);
}

#[tokio::test]
async fn creating_a_post_restarts_the_feed_from_the_first_page() {
    let h = harness();
    h.api.push_page(page(&["a"], true, 3));
    h.feed.refresh().await.expect("page loads");
    h.api.push_page(page(&["b"], true, 3));
    h.feed.end_reached().await.expect("second page loads");

    h.api.push_page(page(&["created", "a", "b"], false, 3));
    let created = h
        .feed
        .create_post(clipasa::application::api::CreatePostInput {
            title: "nuevo clip".to_owned(),
            link: "https://clips.twitch.tv/y".to_owned(),
            ..Default::default()
        })
        .await
        .expect("create lands");

    assert_eq!(created.title, "nuevo clip");
    let ids: Vec<_> = h.feed.cache().posts().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["created", "a", "b"]);
    assert_eq!(
        h.api.calls().last().map(String::as_str),
        Some("posts after=None")
    );
}

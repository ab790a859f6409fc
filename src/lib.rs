//! Headless client core for the La Clipasa community feed.
//!
//! The crate owns the three cooperating pieces any front-end drives: the
//! query-parameter store (which page of posts to request), the post cache
//! store (the ordered working set rendered to the user) and the feed
//! controller (cursor pagination, optimistic mutations and the category
//! reconciliation saga), all wired to a GraphQL backend through the
//! [`application::api::PostsApi`] port.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;

//! Application services layer: stores, ports and feed orchestration.

pub mod api;
pub mod cache;
pub mod feed;
pub mod query;
pub mod store;

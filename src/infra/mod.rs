//! Infrastructure adapters: GraphQL transport, session persistence,
//! telemetry bootstrap.

pub mod error;
pub mod graphql;
pub mod persist;
pub mod telemetry;

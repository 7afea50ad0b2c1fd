//! Thin HTTP surface over the exposed operations.

pub mod routes;

pub use routes::{AppState, router};

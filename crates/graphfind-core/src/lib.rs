//! # graphfind core
//!
//! Runtime-agnostic logic for graphfind: the search request model, the
//! predicate compiler, result recorders, the store abstraction, and the
//! relationship traversal engine.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Applications
//! supply a [`store::Store`] implementation and a [`search::Session`]
//! describing the active layers and tables.

pub mod error;
pub mod expression;
pub mod geometry;
pub mod models;
pub mod recorder;
pub mod search;
pub mod store;

pub use error::SearchError;
pub use models::{SearchRequest, SearchableResponse};

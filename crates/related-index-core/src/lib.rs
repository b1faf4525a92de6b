//! # Related Index Core
//!
//! Runtime-agnostic logic for Related Index: data models, text
//! preprocessing, the capability traits the service is wired from, the
//! live-index client, the related-items query path, and in-process metric
//! aggregation.
//!
//! This crate contains no tokio, sqlx, HTTP clients, or filesystem I/O.
//! Concrete adapters (SQLite index, S3 mirror, OpenAI embeddings, MySQL
//! content source) live in the `related-index` app crate.

pub mod embedding;
pub mod index_client;
pub mod metrics;
pub mod models;
pub mod objects;
pub mod preprocess;
pub mod query;
pub mod schedule;
pub mod source;
pub mod store;

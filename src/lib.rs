//! # Related Index
//!
//! A related-documents similarity service. Published documents from a blog
//! database are normalized, embedded and stored in a local vector index;
//! clients ask "what is related to document X" over HTTP.
//!
//! One replica, the *leader*, rebuilds the index daily and publishes the
//! on-disk snapshot to an object-storage mirror. Every other replica, a
//! *follower*, adopts that snapshot a little later.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐   ┌────────────┐
//! │  Content DB │──▶│ IndexBuilder │──▶│  SQLite  │──▶│   Mirror   │
//! │ MySQL/SQLite│   │ prep + embed │   │  alias   │   │ S3 / dir   │
//! └──────┬──────┘   └──────────────┘   └────┬─────┘   └─────┬──────┘
//!        │                                  │               │
//!        │          ┌──────────────┐        │      ┌────────▼────────┐
//!        └─────────▶│ QueryService │◀───────┘      │IndexSynchronizer│
//!                   └──────┬───────┘               │   (followers)   │
//!                          ▼                       └─────────────────┘
//!                   ┌──────────────┐
//!                   │ HTTP (axum)  │
//!                   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration, env overrides, validation |
//! | [`content`] | SQL content source (`sqlx` Any driver) |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Index schema |
//! | [`sqlite_index`] | SQLite vector index engine with aliases |
//! | [`embedding`] | OpenAI, Ollama and local embedding providers |
//! | [`s3`] | S3 object store (SigV4) |
//! | [`fs_objects`] | Directory object store |
//! | [`mirror`] | Push/pull/purge a snapshot under a key prefix |
//! | [`builder`] | Leader rebuild and publish |
//! | [`sync`] | Follower snapshot adoption |
//! | [`scheduler`] | Daily replica job |
//! | [`telemetry`] | Telemetry sinks and the flush loop |
//! | [`server`] | HTTP API |
//! | [`services`] | Config → adapter wiring |
//! | [`stats`] | `relidx stats` output |
//!
//! Runtime-agnostic pieces (models, preprocessing, traits, the query path,
//! counters, schedule arithmetic) live in `related-index-core`.

pub mod builder;
pub mod config;
pub mod content;
pub mod db;
pub mod embedding;
pub mod fs_objects;
pub mod migrate;
pub mod mirror;
pub mod s3;
pub mod scheduler;
pub mod server;
pub mod services;
pub mod sqlite_index;
pub mod stats;
pub mod sync;
pub mod telemetry;

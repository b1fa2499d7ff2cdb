//! Catalog Search Service Library
//!
//! A small catalog API backed by two data surfaces: an authoritative record store
//! and an external full-text search index. The library holds everything except
//! process startup (`main.rs`).
//!
//! ## Architecture Modules
//! - **`storage`**: The in-memory `RecordStore`, single source of truth for records.
//! - **`search`**: The `IndexClient` capability plus its in-process and Sonic implementations.
//! - **`catalog`**: The synchronization coordinator and the HTTP handlers in front of it.
//! - **`config`**: Layered configuration (defaults, TOML file, environment).
//! - **`error`**: Error taxonomy shared by the index boundary and the coordinator.

pub mod catalog;
pub mod config;
pub mod error;
pub mod search;
pub mod storage;

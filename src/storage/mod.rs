//! Record Storage Module
//!
//! Holds the authoritative copy of every catalog record.
//!
//! ## Core Concepts
//! - **Source of truth**: a record exists if and only if it is in the `RecordStore`.
//!   The search index only ever holds references to store ids.
//! - **Identity**: ids are generated by the store on create. Caller-supplied ids never reach it.
//! - **Concurrency**: the store is shared behind an `Arc` and uses a sharded map, so
//!   concurrent requests only contend on the shard they touch.

pub mod memory;

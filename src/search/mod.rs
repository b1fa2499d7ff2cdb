//! Search Index Module
//!
//! Everything the catalog knows about full-text search lives behind the
//! [`client::IndexClient`] capability: ingest, query, suggest, count and remove,
//! each scoped to a `(collection, bucket, locale)` [`client::Namespace`].
//!
//! ## Submodules
//! - **`client`**: The capability trait and the namespace type.
//! - **`memory`**: In-process engine used when no external engine is configured, and by tests.
//! - **`sonic`**: Adapter for the Sonic search backend with pooled channels.
//! - **`protocol`**: Sonic channel command formatting and reply parsing.
//! - **`tokenizer`**: Word normalization shared by the in-process engine.

pub mod client;
pub mod memory;
pub mod protocol;
pub mod sonic;
pub mod tokenizer;

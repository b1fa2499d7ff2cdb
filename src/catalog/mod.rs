//! Catalog Service Module
//!
//! The behavioral core of the service: keeping the record store and the search
//! index consistent across create, query, suggest, list and delete.
//!
//! ## Workflow
//! 1. **Handlers** translate HTTP requests into coordinator calls and results back into responses.
//! 2. **Coordinator** runs each operation as a store step and an index step in a fixed order.
//! 3. **Store first**: mutations always hit the `RecordStore` before the index, so an index
//!    entry never refers to an id that was never stored.
//! 4. **Tolerance**: reads drop ids the store no longer knows and listing survives failed counts.
//!
//! ## Submodules
//! - **`coordinator`**: Ordering and failure policy for every operation.
//! - **`handlers`**: Axum router and request handlers.
//! - **`types`**: Records, ids, fields and API DTOs.

pub mod coordinator;
pub mod handlers;
pub mod types;

#[cfg(test)]
mod tests;

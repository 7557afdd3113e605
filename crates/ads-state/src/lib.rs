//! ads-state: embedded state store for the classifieds backend.
//!
//! Backed by [redb](https://docs.rs/redb), persists a local control plane
//! (tables, roles, functions, permissions, gateway APIs, route nodes, method
//! bindings, deployments, stages) together with the items written to the
//! data tables.
//!
//! # Architecture
//!
//! All records are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{api_id}:{node_id}`, `{function}:{statement_id}`) enable
//! prefix scans for related records.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;

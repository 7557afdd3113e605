//! redb table definitions for the classifieds state store.
//!
//! Every table uses `&str` keys and `&[u8]` values (JSON-serialized records).
//! Child records use `{parent}:{child}` composite keys so that a prefix scan
//! returns everything below one parent.

use redb::TableDefinition;

/// Data tables keyed by `{name}`.
pub const TABLES: TableDefinition<&str, &[u8]> = TableDefinition::new("tables");

/// Execution roles keyed by `{name}`.
pub const ROLES: TableDefinition<&str, &[u8]> = TableDefinition::new("roles");

/// Function units keyed by `{name}`.
pub const FUNCTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("functions");

/// Invoke permissions keyed by `{function}:{statement_id}`.
pub const PERMISSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("permissions");

/// Gateway APIs keyed by `{api_id}`.
pub const APIS: TableDefinition<&str, &[u8]> = TableDefinition::new("apis");

/// Route nodes keyed by `{api_id}:{node_id}`.
pub const ROUTE_NODES: TableDefinition<&str, &[u8]> = TableDefinition::new("route_nodes");

/// Method bindings keyed by `{api_id}:{node_id}:{verb}`.
pub const METHODS: TableDefinition<&str, &[u8]> = TableDefinition::new("methods");

/// Deployment snapshots keyed by `{api_id}:{deployment_id}`.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

/// Stages keyed by `{api_id}:{stage}`.
pub const STAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("stages");

/// Table items keyed by `{table}\x1f{partition}\x1f{sort}`.
pub const ITEMS: TableDefinition<&str, &[u8]> = TableDefinition::new("items");

//! StateStore: redb-backed persistence for the local control plane.
//!
//! Provides typed CRUD operations over every control-plane record kind and
//! over table items. All values are JSON-serialized into redb's `&[u8]`
//! value columns. The store supports both on-disk and in-memory backends
//! (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(map_err!(Open))?;
        }
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        for def in [
            TABLES,
            ROLES,
            FUNCTIONS,
            PERMISSIONS,
            APIS,
            ROUTE_NODES,
            METHODS,
            DEPLOYMENTS,
            STAGES,
            ITEMS,
        ] {
            txn.open_table(def).map_err(map_err!(Table))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic record access ──────────────────────────────────────

    fn put_record<T: Serialize>(&self, def: JsonTable, key: &str, record: &T) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(def).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_record<T: DeserializeOwned>(&self, def: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let record = serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Every record whose key starts with `prefix`, in key order.
    fn scan_prefix<T: DeserializeOwned>(&self, def: JsonTable, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(def).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let record = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    // ── Tables ─────────────────────────────────────────────────────

    /// Insert or update a table record.
    pub fn put_table(&self, record: &TableRecord) -> StateResult<()> {
        let key = record.table_key();
        self.put_record(TABLES, &key, record)?;
        debug!(%key, status = %record.status, "table stored");
        Ok(())
    }

    pub fn get_table(&self, name: &str) -> StateResult<Option<TableRecord>> {
        self.get_record(TABLES, name)
    }

    pub fn list_tables(&self) -> StateResult<Vec<TableRecord>> {
        self.scan_prefix(TABLES, "")
    }

    // ── Roles ──────────────────────────────────────────────────────

    /// Insert or update a role record.
    pub fn put_role(&self, record: &RoleRecord) -> StateResult<()> {
        let key = record.table_key();
        self.put_record(ROLES, &key, record)?;
        debug!(%key, policies = record.attached_policies.len(), "role stored");
        Ok(())
    }

    pub fn get_role(&self, name: &str) -> StateResult<Option<RoleRecord>> {
        self.get_record(ROLES, name)
    }

    pub fn list_roles(&self) -> StateResult<Vec<RoleRecord>> {
        self.scan_prefix(ROLES, "")
    }

    // ── Functions ──────────────────────────────────────────────────

    /// Insert or update a function record.
    pub fn put_function(&self, record: &FunctionRecord) -> StateResult<()> {
        let key = record.table_key();
        self.put_record(FUNCTIONS, &key, record)?;
        debug!(%key, revision = record.revision, "function stored");
        Ok(())
    }

    pub fn get_function(&self, name: &str) -> StateResult<Option<FunctionRecord>> {
        self.get_record(FUNCTIONS, name)
    }

    pub fn list_functions(&self) -> StateResult<Vec<FunctionRecord>> {
        self.scan_prefix(FUNCTIONS, "")
    }

    pub fn put_permission(&self, record: &PermissionRecord) -> StateResult<()> {
        self.put_record(PERMISSIONS, &record.table_key(), record)
    }

    pub fn get_permission(
        &self,
        function: &str,
        statement_id: &str,
    ) -> StateResult<Option<PermissionRecord>> {
        self.get_record(PERMISSIONS, &format!("{function}:{statement_id}"))
    }

    /// All invoke permissions granted on a function.
    pub fn list_permissions_for_function(&self, function: &str) -> StateResult<Vec<PermissionRecord>> {
        self.scan_prefix(PERMISSIONS, &format!("{function}:"))
    }

    // ── Gateway ────────────────────────────────────────────────────

    pub fn put_api(&self, record: &ApiRecord) -> StateResult<()> {
        let key = record.table_key();
        self.put_record(APIS, &key, record)?;
        debug!(api = %key, name = %record.name, "api stored");
        Ok(())
    }

    pub fn get_api(&self, id: &str) -> StateResult<Option<ApiRecord>> {
        self.get_record(APIS, id)
    }

    pub fn list_apis(&self) -> StateResult<Vec<ApiRecord>> {
        self.scan_prefix(APIS, "")
    }

    pub fn put_route_node(&self, record: &RouteNodeRecord) -> StateResult<()> {
        self.put_record(ROUTE_NODES, &record.table_key(), record)
    }

    pub fn get_route_node(&self, api_id: &str, node_id: &str) -> StateResult<Option<RouteNodeRecord>> {
        self.get_record(ROUTE_NODES, &format!("{api_id}:{node_id}"))
    }

    /// All route nodes of an API, root included.
    pub fn list_route_nodes(&self, api_id: &str) -> StateResult<Vec<RouteNodeRecord>> {
        self.scan_prefix(ROUTE_NODES, &format!("{api_id}:"))
    }

    pub fn put_method(&self, record: &MethodRecord) -> StateResult<()> {
        self.put_record(METHODS, &record.table_key(), record)
    }

    pub fn get_method(
        &self,
        api_id: &str,
        node_id: &str,
        method: ads_core::HttpMethod,
    ) -> StateResult<Option<MethodRecord>> {
        self.get_record(METHODS, &method_key(api_id, node_id, method))
    }

    /// All method bindings of an API.
    pub fn list_methods(&self, api_id: &str) -> StateResult<Vec<MethodRecord>> {
        self.scan_prefix(METHODS, &format!("{api_id}:"))
    }

    pub fn put_deployment(&self, record: &DeploymentRecord) -> StateResult<()> {
        let key = record.table_key();
        self.put_record(DEPLOYMENTS, &key, record)?;
        debug!(%key, routes = record.routes.len(), "deployment stored");
        Ok(())
    }

    pub fn get_deployment(&self, api_id: &str, id: &str) -> StateResult<Option<DeploymentRecord>> {
        self.get_record(DEPLOYMENTS, &format!("{api_id}:{id}"))
    }

    pub fn list_deployments(&self, api_id: &str) -> StateResult<Vec<DeploymentRecord>> {
        self.scan_prefix(DEPLOYMENTS, &format!("{api_id}:"))
    }

    pub fn put_stage(&self, record: &StageRecord) -> StateResult<()> {
        self.put_record(STAGES, &record.table_key(), record)
    }

    pub fn get_stage(&self, api_id: &str, name: &str) -> StateResult<Option<StageRecord>> {
        self.get_record(STAGES, &format!("{api_id}:{name}"))
    }

    // ── Items ──────────────────────────────────────────────────────

    /// Insert or replace an item under its key attributes.
    pub fn put_item(&self, table: &str, partition: &str, sort: &str, item: &Value) -> StateResult<()> {
        let key = item_key(table, partition, sort);
        self.put_record(ITEMS, &key, item)
    }

    pub fn get_item(&self, table: &str, partition: &str, sort: &str) -> StateResult<Option<Value>> {
        self.get_record(ITEMS, &item_key(table, partition, sort))
    }

    /// Every item of a table.
    pub fn scan_items(&self, table: &str) -> StateResult<Vec<Value>> {
        self.scan_prefix(ITEMS, &format!("{table}{ITEM_KEY_SEP}"))
    }

    /// Every item of a table sharing one partition key, in sort-key order.
    pub fn query_items(&self, table: &str, partition: &str) -> StateResult<Vec<Value>> {
        self.scan_prefix(ITEMS, &format!("{table}{ITEM_KEY_SEP}{partition}{ITEM_KEY_SEP}"))
    }
}

fn item_key(table: &str, partition: &str, sort: &str) -> String {
    format!("{table}{ITEM_KEY_SEP}{partition}{ITEM_KEY_SEP}{sort}")
}

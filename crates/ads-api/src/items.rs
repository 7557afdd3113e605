//! Table items kept in the local state store.

use ads_core::manifest::TableSpec;
use ads_handlers::store::item_key;
use ads_handlers::{Item, ItemStore, StoreError, StoreResult};
use ads_state::{StateError, StateStore};
use async_trait::async_trait;
use serde_json::Value;

/// [`ItemStore`] over `ads-state`. Tables must have been provisioned.
#[derive(Clone)]
pub struct LocalItemStore {
    store: StateStore,
}

impl LocalItemStore {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    fn ensure_table(&self, table: &TableSpec) -> StoreResult<()> {
        match self.store.get_table(&table.name).map_err(backend)? {
            Some(_) => Ok(()),
            None => Err(StoreError::TableNotFound(table.name.clone())),
        }
    }
}

fn backend(e: StateError) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn into_item(value: Value) -> StoreResult<Item> {
    match value {
        Value::Object(item) => Ok(item),
        other => Err(StoreError::Backend(format!("stored item is not an object: {other}"))),
    }
}

#[async_trait]
impl ItemStore for LocalItemStore {
    async fn put_item(&self, table: &TableSpec, item: Item) -> StoreResult<()> {
        self.ensure_table(table)?;
        let (partition, sort) = item_key(table, &item)?;
        self.store
            .put_item(&table.name, &partition, &sort, &Value::Object(item))
            .map_err(backend)
    }

    async fn get_item(&self, table: &TableSpec, partition: &str) -> StoreResult<Option<Item>> {
        self.ensure_table(table)?;
        self.store
            .get_item(&table.name, partition, "")
            .map_err(backend)?
            .map(into_item)
            .transpose()
    }

    async fn scan(&self, table: &TableSpec) -> StoreResult<Vec<Item>> {
        self.ensure_table(table)?;
        self.store
            .scan_items(&table.name)
            .map_err(backend)?
            .into_iter()
            .map(into_item)
            .collect()
    }

    async fn query_partition(&self, table: &TableSpec, partition: &str) -> StoreResult<Vec<Item>> {
        self.ensure_table(table)?;
        self.store
            .query_items(&table.name, partition)
            .map_err(backend)?
            .into_iter()
            .map(into_item)
            .collect()
    }
}

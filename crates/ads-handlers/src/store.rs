//! Item storage seam used by the handler units.

use std::collections::{BTreeMap, HashMap};

use ads_core::manifest::TableSpec;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

/// A stored record: attribute name → JSON value.
pub type Item = serde_json::Map<String, Value>;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item is missing key attribute {0}")]
    MissingKey(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Keyed item storage.
///
/// Items are addressed by the key attributes declared in the [`TableSpec`];
/// key values are strings.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert or replace an item.
    async fn put_item(&self, table: &TableSpec, item: Item) -> StoreResult<()>;

    /// Fetch an item by partition key (tables without a sort key).
    async fn get_item(&self, table: &TableSpec, partition: &str) -> StoreResult<Option<Item>>;

    /// Every item in the table.
    async fn scan(&self, table: &TableSpec) -> StoreResult<Vec<Item>>;

    /// Every item whose partition key equals `partition`, in sort-key order.
    async fn query_partition(&self, table: &TableSpec, partition: &str) -> StoreResult<Vec<Item>>;
}

/// Extract the `(partition, sort)` key strings of an item.
pub fn item_key(table: &TableSpec, item: &Item) -> StoreResult<(String, String)> {
    let attr = |name: &str| {
        item.get(name)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::MissingKey(name.to_string()))
    };
    let partition = attr(&table.partition_key.name)?;
    let sort = match &table.sort_key {
        Some(key) => attr(&key.name)?,
        None => String::new(),
    };
    Ok((partition, sort))
}

/// In-memory item store.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    tables: RwLock<HashMap<String, BTreeMap<(String, String), Item>>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn put_item(&self, table: &TableSpec, item: Item) -> StoreResult<()> {
        let key = item_key(table, &item)?;
        let mut tables = self.tables.write().await;
        tables.entry(table.name.clone()).or_default().insert(key, item);
        Ok(())
    }

    async fn get_item(&self, table: &TableSpec, partition: &str) -> StoreResult<Option<Item>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&table.name)
            .and_then(|t| t.get(&(partition.to_string(), String::new())))
            .cloned())
    }

    async fn scan(&self, table: &TableSpec) -> StoreResult<Vec<Item>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&table.name)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn query_partition(&self, table: &TableSpec, partition: &str) -> StoreResult<Vec<Item>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&table.name)
            .map(|t| {
                t.iter()
                    .filter(|((p, _), _)| p == partition)
                    .map(|(_, item)| item.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

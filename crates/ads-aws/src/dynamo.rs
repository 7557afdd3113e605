//! DynamoDB: table administration and the deployed item store.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::Debug;

use ads_core::TableStatus;
use ads_core::manifest::TableSpec;
use ads_handlers::store::item_key;
use ads_handlers::{Item, ItemStore, StoreError, StoreResult};
use ads_provision::{AdminResult, TableAdmin};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::operation::describe_table::DescribeTableError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType, ScalarAttributeType,
};
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, to_item};
use tracing::debug;

use crate::AwsCloud;
use crate::error::{Kind, build_error, classify};

type AttributeMap = HashMap<String, AttributeValue>;

#[async_trait]
impl TableAdmin for AwsCloud {
    async fn create_table(&self, spec: &TableSpec) -> AdminResult<()> {
        const OP: &str = "create_table";
        let mut request = self
            .dynamo
            .create_table()
            .table_name(&spec.name)
            .billing_mode(BillingMode::PayPerRequest);

        for attr in spec.key_attributes() {
            let definition = AttributeDefinition::builder()
                .attribute_name(&attr.name)
                .attribute_type(ScalarAttributeType::from(attr.attr_type.code()))
                .build()
                .map_err(|e| build_error(OP, e))?;
            request = request.attribute_definitions(definition);
        }

        let mut keys = vec![(&spec.partition_key, KeyType::Hash)];
        if let Some(sort) = &spec.sort_key {
            keys.push((sort, KeyType::Range));
        }
        for (attr, key_type) in keys {
            let element = KeySchemaElement::builder()
                .attribute_name(&attr.name)
                .key_type(key_type)
                .build()
                .map_err(|e| build_error(OP, e))?;
            request = request.key_schema(element);
        }

        request.send().await.map_err(|e| {
            classify(OP, e, |e| match e {
                CreateTableError::ResourceInUseException(_) => Some(Kind::AlreadyExists),
                CreateTableError::LimitExceededException(_) => Some(Kind::Throttled),
                _ => None,
            })
        })?;
        debug!(table = %spec.name, "create_table accepted");
        Ok(())
    }

    async fn table_status(&self, name: &str) -> AdminResult<Option<TableStatus>> {
        match self.dynamo.describe_table().table_name(name).send().await {
            Ok(out) => {
                let status = out
                    .table()
                    .and_then(|t| t.table_status())
                    .map(|s| TableStatus::parse(s.as_str()))
                    .unwrap_or_else(|| TableStatus::Other("UNKNOWN".to_string()));
                Ok(Some(status))
            }
            Err(e)
                if matches!(
                    e.as_service_error(),
                    Some(DescribeTableError::ResourceNotFoundException(_))
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(classify("describe_table", e, |_| None)),
        }
    }
}

// ── Item store ─────────────────────────────────────────────────────

/// [`ItemStore`] over DynamoDB tables.
#[derive(Debug, Clone)]
pub struct DynamoItemStore {
    client: aws_sdk_dynamodb::Client,
}

impl DynamoItemStore {
    pub fn new(client: aws_sdk_dynamodb::Client) -> Self {
        Self { client }
    }

    pub fn from_sdk(sdk: &SdkConfig) -> Self {
        Self::new(aws_sdk_dynamodb::Client::new(sdk))
    }
}

fn store_error<E, R>(table: &TableSpec, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    match err.as_service_error().and_then(|e| e.code()) {
        Some("ResourceNotFoundException") => StoreError::TableNotFound(table.name.clone()),
        _ => StoreError::Backend(DisplayErrorContext(&err).to_string()),
    }
}

fn decode(attrs: AttributeMap) -> StoreResult<Item> {
    from_item(attrs).map_err(|e| StoreError::Backend(format!("decoding item: {e}")))
}

#[async_trait]
impl ItemStore for DynamoItemStore {
    async fn put_item(&self, table: &TableSpec, item: Item) -> StoreResult<()> {
        item_key(table, &item)?;
        let attrs: AttributeMap =
            to_item(item).map_err(|e| StoreError::Backend(format!("encoding item: {e}")))?;
        self.client
            .put_item()
            .table_name(&table.name)
            .set_item(Some(attrs))
            .send()
            .await
            .map_err(|e| store_error(table, e))?;
        Ok(())
    }

    async fn get_item(&self, table: &TableSpec, partition: &str) -> StoreResult<Option<Item>> {
        let out = self
            .client
            .get_item()
            .table_name(&table.name)
            .key(&table.partition_key.name, AttributeValue::S(partition.to_string()))
            .send()
            .await
            .map_err(|e| store_error(table, e))?;
        out.item.map(decode).transpose()
    }

    async fn scan(&self, table: &TableSpec) -> StoreResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key = None;
        loop {
            let out = self
                .client
                .scan()
                .table_name(&table.name)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| store_error(table, e))?;
            for attrs in out.items.unwrap_or_default() {
                items.push(decode(attrs)?);
            }
            match out.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }
        Ok(items)
    }

    async fn query_partition(&self, table: &TableSpec, partition: &str) -> StoreResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut start_key = None;
        loop {
            let out = self
                .client
                .query()
                .table_name(&table.name)
                .key_condition_expression("#pk = :pk")
                .expression_attribute_names("#pk", &table.partition_key.name)
                .expression_attribute_values(":pk", AttributeValue::S(partition.to_string()))
                .scan_index_forward(true)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| store_error(table, e))?;
            for attrs in out.items.unwrap_or_default() {
                items.push(decode(attrs)?);
            }
            match out.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn items_convert_to_attribute_maps_and_back() {
        let item = json!({"id": "a1", "titulo": "Bike", "precio": 120})
            .as_object()
            .unwrap()
            .clone();
        let attrs: AttributeMap = to_item(item.clone()).unwrap();
        assert_eq!(attrs["id"], AttributeValue::S("a1".to_string()));
        assert_eq!(attrs["precio"], AttributeValue::N("120".to_string()));
        assert_eq!(decode(attrs).unwrap(), item);
    }
}

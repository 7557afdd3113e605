//! ads-aws: the classifieds control plane on AWS.
//!
//! [`AwsCloud`] implements the four admin capability traits of
//! `ads-provision` over the AWS SDK:
//!
//! - **tables**: DynamoDB (`CreateTable`, `DescribeTable`)
//! - **identity**: IAM (`GetRole`, `CreateRole`, `ListAttachedRolePolicies`,
//!   `AttachRolePolicy`)
//! - **functions**: Lambda (`GetFunction`, `CreateFunction`,
//!   `UpdateFunctionCode`, `GetPolicy`, `AddPermission`)
//! - **routing**: API Gateway REST APIs
//!
//! SDK failures are classified into [`AdminError`](ads_provision::AdminError)
//! kinds from the typed service error variants (or, for API Gateway, the
//! structured error code), so no SDK error type leaks past this crate.
//!
//! [`DynamoItemStore`] is the handler units' item store inside the deployed
//! functions.

mod dynamo;
mod error;
mod gateway;
mod iam;
mod lambda;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::debug;

pub use dynamo::DynamoItemStore;

/// AWS clients for every service the provisioner touches.
#[derive(Debug, Clone)]
pub struct AwsCloud {
    dynamo: aws_sdk_dynamodb::Client,
    iam: aws_sdk_iam::Client,
    lambda: aws_sdk_lambda::Client,
    gateway: aws_sdk_apigateway::Client,
}

impl AwsCloud {
    pub fn new(sdk: &SdkConfig) -> Self {
        Self {
            dynamo: aws_sdk_dynamodb::Client::new(sdk),
            iam: aws_sdk_iam::Client::new(sdk),
            lambda: aws_sdk_lambda::Client::new(sdk),
            gateway: aws_sdk_apigateway::Client::new(sdk),
        }
    }

    /// Load credentials from the environment and build clients for `region`.
    pub async fn connect(region: &str, endpoint_url: Option<&str>) -> Self {
        Self::new(&load_sdk_config(region, endpoint_url).await)
    }
}

/// Shared SDK configuration, optionally pointed at a non-AWS endpoint
/// (e.g. LocalStack).
pub async fn load_sdk_config(region: &str, endpoint_url: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.to_string()));
    if let Some(url) = endpoint_url {
        debug!(%url, "using endpoint override");
        loader = loader.endpoint_url(url);
    }
    loader.load().await
}

//! Desired state of a classifieds deployment.
//!
//! The manifest is declared statically from [`AdsConfig`]: two tables, one
//! execution role, five functions, a three-node route tree and five method
//! bindings. The provisioner reconciles the control plane against it on
//! every run; nothing here reflects what currently exists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::AdsConfig;
use crate::types::{Access, HandlerKind, HttpMethod, KeyAttribute, RequestShape};

pub const BASIC_EXECUTION_POLICY: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";
pub const TABLE_READ_POLICY: &str = "arn:aws:iam::aws:policy/AmazonDynamoDBReadOnlyAccess";
pub const TABLE_WRITE_POLICY: &str = "arn:aws:iam::aws:policy/AmazonDynamoDBFullAccess";

/// Service principal allowed to assume the execution role.
pub const FUNCTION_SERVICE_PRINCIPAL: &str = "lambda.amazonaws.com";
/// Service principal granted invoke permission on each function.
pub const GATEWAY_SERVICE_PRINCIPAL: &str = "apigateway.amazonaws.com";

/// Environment variables through which functions learn their table names.
pub const LISTINGS_TABLE_ENV: &str = "LISTINGS_TABLE";
pub const COMMENTS_TABLE_ENV: &str = "COMMENTS_TABLE";

// ── Tables ─────────────────────────────────────────────────────────

/// Declarative definition of a keyed table. Key schema is immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
}

impl TableSpec {
    /// Listings keyed by `id`.
    pub fn listings(name: &str) -> Self {
        Self {
            name: name.to_string(),
            partition_key: KeyAttribute::string("id"),
            sort_key: None,
        }
    }

    /// Comments partitioned by `listing_id`, sorted by `comment_id`.
    pub fn comments(name: &str) -> Self {
        Self {
            name: name.to_string(),
            partition_key: KeyAttribute::string("listing_id"),
            sort_key: Some(KeyAttribute::string("comment_id")),
        }
    }

    /// Key attributes in declaration order (partition first).
    pub fn key_attributes(&self) -> impl Iterator<Item = &KeyAttribute> {
        std::iter::once(&self.partition_key).chain(self.sort_key.iter())
    }
}

// ── Identity ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub name: String,
    pub trusted_service: String,
    /// Ordered, deduplicated policy identifiers.
    pub policies: Vec<String>,
}

impl RoleSpec {
    /// Derive the role's policies from the functions that run under it.
    pub fn for_functions(name: &str, functions: &[FunctionSpec]) -> Self {
        let mut policies = vec![BASIC_EXECUTION_POLICY.to_string()];
        if functions.iter().any(|f| f.access == Access::ReadOnly) {
            policies.push(TABLE_READ_POLICY.to_string());
        }
        if functions.iter().any(|f| f.access == Access::ReadWrite) {
            policies.push(TABLE_WRITE_POLICY.to_string());
        }
        Self {
            name: name.to_string(),
            trusted_service: FUNCTION_SERVICE_PRINCIPAL.to_string(),
            policies,
        }
    }

    /// Trust policy document allowing `trusted_service` to assume the role.
    pub fn trust_policy(&self) -> String {
        serde_json::json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": self.trusted_service },
                "Action": "sts:AssumeRole",
            }],
        })
        .to_string()
    }
}

// ── Functions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub handler: HandlerKind,
    pub access: Access,
    pub runtime: String,
    pub timeout_secs: u32,
    pub memory_mb: u32,
    pub environment: BTreeMap<String, String>,
}

impl FunctionSpec {
    /// Statement id used when granting the gateway invoke permission.
    pub fn invoke_statement_id(&self) -> String {
        format!("gateway-invoke-{}", self.name)
    }
}

// ── Routes ─────────────────────────────────────────────────────────

/// One node of the route tree, addressed by its full path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteNode {
    /// Full path, e.g. `/listings/{id}`.
    pub path: String,
    /// Path of the parent node (`/` for children of the root).
    pub parent: String,
    /// Last path segment, literal or `{param}` placeholder.
    pub segment: String,
}

impl RouteNode {
    fn child_of(parent: &str, segment: &str) -> Self {
        let path = if parent == "/" {
            format!("/{segment}")
        } else {
            format!("{parent}/{segment}")
        };
        Self {
            path,
            parent: parent.to_string(),
            segment: segment.to_string(),
        }
    }
}

/// Association of a verb at a route node with a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSpec {
    pub path: String,
    pub method: HttpMethod,
    pub function: String,
    pub request: RequestShape,
}

/// Headers returned by CORS pre-flight bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsHeaders {
    pub allow_origin: String,
    pub allow_headers: String,
    pub allow_methods: String,
}

impl CorsHeaders {
    /// `(header name, value)` pairs in a stable order.
    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("Access-Control-Allow-Headers", self.allow_headers.as_str()),
            ("Access-Control-Allow-Methods", self.allow_methods.as_str()),
            ("Access-Control-Allow-Origin", self.allow_origin.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSpec {
    pub name: String,
    pub description: String,
    pub stage: String,
}

// ── Manifest ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub region: String,
    pub tables: Vec<TableSpec>,
    pub role: RoleSpec,
    pub functions: Vec<FunctionSpec>,
    /// Route nodes, parents before children.
    pub routes: Vec<RouteNode>,
    pub methods: Vec<MethodSpec>,
    pub api: ApiSpec,
}

impl Manifest {
    /// The fixed classifieds deployment, named per `config`.
    pub fn classifieds(config: &AdsConfig) -> Self {
        let listings = config.listings_table().to_string();
        let comments = config.comments_table().to_string();

        let tables = vec![TableSpec::listings(&listings), TableSpec::comments(&comments)];

        let environment: BTreeMap<String, String> = [
            (LISTINGS_TABLE_ENV.to_string(), listings),
            (COMMENTS_TABLE_ENV.to_string(), comments),
        ]
        .into_iter()
        .collect();

        let functions: Vec<FunctionSpec> = HandlerKind::ALL
            .into_iter()
            .map(|kind| FunctionSpec {
                name: kind.name().to_string(),
                handler: kind,
                access: kind.access(),
                runtime: config.runtime().to_string(),
                timeout_secs: config.function_timeout_secs(),
                memory_mb: config.function_memory_mb(),
                environment: environment.clone(),
            })
            .collect();

        let role = RoleSpec::for_functions(config.role_name(), &functions);

        let listings_node = RouteNode::child_of("/", "listings");
        let listing_node = RouteNode::child_of(&listings_node.path, "{id}");
        let comments_node = RouteNode::child_of(&listing_node.path, "comments");

        let bind = |node: &RouteNode, method, kind: HandlerKind, request| MethodSpec {
            path: node.path.clone(),
            method,
            function: kind.name().to_string(),
            request,
        };
        let methods = vec![
            bind(&listings_node, HttpMethod::Get, HandlerKind::ListAds, RequestShape::Body),
            bind(&listings_node, HttpMethod::Post, HandlerKind::CreateAd, RequestShape::Body),
            bind(&listing_node, HttpMethod::Get, HandlerKind::GetAd, RequestShape::PathId),
            bind(
                &comments_node,
                HttpMethod::Get,
                HandlerKind::ListComments,
                RequestShape::PathId,
            ),
            bind(
                &comments_node,
                HttpMethod::Post,
                HandlerKind::CreateComment,
                RequestShape::PathIdAndBody,
            ),
        ];

        Self {
            region: config.region().to_string(),
            tables,
            role,
            functions,
            routes: vec![listings_node, listing_node, comments_node],
            methods,
            api: ApiSpec {
                name: config.api_name().to_string(),
                description: config.api_description().to_string(),
                stage: config.stage().to_string(),
            },
        }
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn route(&self, path: &str) -> Option<&RouteNode> {
        self.routes.iter().find(|r| r.path == path)
    }

    /// Method bindings declared on `path`.
    pub fn methods_at<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a MethodSpec> + 'a {
        self.methods.iter().filter(move |m| m.path == path)
    }

    /// CORS pre-flight headers for the node at `path`.
    pub fn cors_headers(&self, path: &str) -> CorsHeaders {
        let mut verbs: Vec<&str> = self.methods_at(path).map(|m| m.method.as_str()).collect();
        verbs.push(HttpMethod::Options.as_str());
        CorsHeaders {
            allow_origin: "*".to_string(),
            allow_headers: "Content-Type,X-Amz-Date,Authorization,X-Api-Key".to_string(),
            allow_methods: verbs.join(","),
        }
    }
}

//! Shared types used across classifieds crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// HTTP verbs that appear on the route surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Options => "OPTIONS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(HttpMethod::Get),
            "POST" => Some(HttpMethod::Post),
            "OPTIONS" => Some(HttpMethod::Options),
            _ => None,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeType {
    #[serde(rename = "S")]
    String,
    #[serde(rename = "N")]
    Number,
    #[serde(rename = "B")]
    Binary,
}

impl AttributeType {
    /// Wire code used by the table service.
    pub fn code(&self) -> &'static str {
        match self {
            AttributeType::String => "S",
            AttributeType::Number => "N",
            AttributeType::Binary => "B",
        }
    }
}

/// A named, typed key attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    pub attr_type: AttributeType,
}

impl KeyAttribute {
    pub fn string(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attr_type: AttributeType::String,
        }
    }
}

/// Data-access pattern of a function against the tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// The five handler units. The name doubles as the function entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerKind {
    #[serde(rename = "listAds")]
    ListAds,
    #[serde(rename = "createAd")]
    CreateAd,
    #[serde(rename = "getAd")]
    GetAd,
    #[serde(rename = "listComments")]
    ListComments,
    #[serde(rename = "createComment")]
    CreateComment,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 5] = [
        HandlerKind::ListAds,
        HandlerKind::CreateAd,
        HandlerKind::GetAd,
        HandlerKind::ListComments,
        HandlerKind::CreateComment,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HandlerKind::ListAds => "listAds",
            HandlerKind::CreateAd => "createAd",
            HandlerKind::GetAd => "getAd",
            HandlerKind::ListComments => "listComments",
            HandlerKind::CreateComment => "createComment",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn access(&self) -> Access {
        match self {
            HandlerKind::ListAds | HandlerKind::GetAd | HandlerKind::ListComments => Access::ReadOnly,
            HandlerKind::CreateAd | HandlerKind::CreateComment => Access::ReadWrite,
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the gateway shapes an incoming request before invoking a function.
///
/// Each shape has a fixed mapping template; the local gateway applies the
/// same semantics natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestShape {
    /// `{ "body": <json> }`
    Body,
    /// `{ "pathParameters": { "id": ... } }`
    PathId,
    /// Both of the above.
    PathIdAndBody,
}

const BODY_TEMPLATE: &str = r#"{ "body": $input.json("$") }"#;
const PATH_ID_TEMPLATE: &str = r#"{ "pathParameters": { "id": "$input.params('id')" } }"#;
const PATH_ID_AND_BODY_TEMPLATE: &str =
    r#"{ "pathParameters": { "id": "$input.params('id')" }, "body": $input.json("$") }"#;

/// Integration response template: unwrap the serialized record from the
/// handler's `{statusCode, body}` envelope.
pub const RESPONSE_TEMPLATE: &str = "$input.path('$.body')";

/// Request template of the mock integration behind CORS pre-flight bindings.
pub const CORS_MOCK_TEMPLATE: &str = r#"{ "statusCode": 200 }"#;

impl RequestShape {
    pub fn template(&self) -> &'static str {
        match self {
            RequestShape::Body => BODY_TEMPLATE,
            RequestShape::PathId => PATH_ID_TEMPLATE,
            RequestShape::PathIdAndBody => PATH_ID_AND_BODY_TEMPLATE,
        }
    }

    pub fn from_template(template: &str) -> Option<Self> {
        [RequestShape::Body, RequestShape::PathId, RequestShape::PathIdAndBody]
            .into_iter()
            .find(|s| s.template() == template)
    }

    pub fn carries_path_id(&self) -> bool {
        matches!(self, RequestShape::PathId | RequestShape::PathIdAndBody)
    }

    pub fn carries_body(&self) -> bool {
        matches!(self, RequestShape::Body | RequestShape::PathIdAndBody)
    }
}

/// Lifecycle status reported for a table by the table store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TableStatus {
    Creating,
    Active,
    Updating,
    Deleting,
    Other(String),
}

impl TableStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "CREATING" => TableStatus::Creating,
            "ACTIVE" => TableStatus::Active,
            "UPDATING" => TableStatus::Updating,
            "DELETING" => TableStatus::Deleting,
            _ => TableStatus::Other(s.to_string()),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TableStatus::Active)
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableStatus::Creating => f.write_str("CREATING"),
            TableStatus::Active => f.write_str("ACTIVE"),
            TableStatus::Updating => f.write_str("UPDATING"),
            TableStatus::Deleting => f.write_str("DELETING"),
            TableStatus::Other(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_names_resolve_back() {
        for kind in HandlerKind::ALL {
            assert_eq!(HandlerKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(HandlerKind::from_name("deleteAd"), None);
    }

    #[test]
    fn request_shape_recognizes_its_template() {
        assert_eq!(
            RequestShape::from_template(RequestShape::PathIdAndBody.template()),
            Some(RequestShape::PathIdAndBody)
        );
        assert_eq!(RequestShape::from_template("{}"), None);
    }

    #[test]
    fn http_method_parse_is_case_insensitive() {
        assert_eq!(HttpMethod::parse("post"), Some(HttpMethod::Post));
        assert_eq!(HttpMethod::parse("PATCH"), None);
    }

    #[test]
    fn write_handlers_need_read_write_access() {
        assert_eq!(HandlerKind::CreateComment.access(), Access::ReadWrite);
        assert_eq!(HandlerKind::ListComments.access(), Access::ReadOnly);
    }

    #[test]
    fn table_status_parses_case_insensitively() {
        assert_eq!(TableStatus::parse("active"), TableStatus::Active);
        assert!(TableStatus::parse("ACTIVE").is_active());
        assert_eq!(TableStatus::parse("ARCHIVED"), TableStatus::Other("ARCHIVED".into()));
        assert_eq!(TableStatus::Creating.to_string(), "CREATING");
    }
}

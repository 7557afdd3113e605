//! Request/response records exchanged between the gateway and handlers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerRequest {
    #[serde(rename = "pathParameters", default, skip_serializing_if = "Option::is_none")]
    pub path_parameters: Option<HashMap<String, String>>,
    /// Raw JSON string or pre-parsed record, depending on content negotiation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl HandlerRequest {
    pub fn with_path_id(id: &str) -> Self {
        Self {
            path_parameters: Some(HashMap::from([("id".to_string(), id.to_string())])),
            body: None,
        }
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Non-empty path parameter by name.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_parameters
            .as_ref()
            .and_then(|p| p.get(name))
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// The body as a JSON object, parsing it first if it arrived as a string.
    ///
    /// A missing or null body is an empty object.
    pub fn body_object(&self) -> Result<serde_json::Map<String, Value>, String> {
        let value = match &self.body {
            None | Some(Value::Null) => return Ok(serde_json::Map::new()),
            Some(Value::String(raw)) if raw.trim().is_empty() => {
                return Ok(serde_json::Map::new());
            }
            Some(Value::String(raw)) => {
                serde_json::from_str::<Value>(raw).map_err(|e| format!("invalid JSON body: {e}"))?
            }
            Some(other) => other.clone(),
        };
        match value {
            Value::Object(map) => Ok(map),
            Value::Null => Ok(serde_json::Map::new()),
            _ => Err("request body must be a JSON object".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Always a serialized record.
    pub body: String,
}

impl HandlerResponse {
    pub fn ok<T: Serialize>(record: &T) -> Self {
        match serde_json::to_string(record) {
            Ok(body) => Self {
                status_code: 200,
                body,
            },
            Err(e) => Self::error(500, &format!("failed to serialize response: {e}")),
        }
    }

    pub fn error(status_code: u16, message: &str) -> Self {
        Self {
            status_code,
            body: serde_json::json!({ "error": message }).to_string(),
        }
    }

    /// The body parsed back into JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

//! classifieds.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_REGION: &str = "eu-west-1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid duration for {field}: {value:?}")]
    InvalidDuration { field: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdsConfig {
    pub project: ProjectConfig,
    pub tables: Option<TablesConfig>,
    pub identity: Option<IdentityConfig>,
    pub functions: Option<FunctionsConfig>,
    pub gateway: Option<GatewayConfig>,
    pub waits: Option<WaitsConfig>,
    pub aws: Option<AwsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TablesConfig {
    pub listings: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub role_name: Option<String>,
    /// Worst-case delay after creating the role before functions may use it.
    pub propagation_delay: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionsConfig {
    pub runtime: Option<String>,
    pub timeout_secs: Option<u32>,
    pub memory_mb: Option<u32>,
    /// Directory holding the built `bootstrap` executable.
    pub artifacts_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub api_name: Option<String>,
    pub description: Option<String>,
    pub stage: Option<String>,
    pub always_redeploy: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitsConfig {
    pub table_active_timeout: Option<String>,
    pub poll_interval: Option<String>,
    pub retry_attempts: Option<u32>,
    pub retry_backoff: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Endpoint override, e.g. a LocalStack URL.
    pub endpoint_url: Option<String>,
}

impl AdsConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AdsConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// A config with only the `[project]` section; every other value defaults.
    pub fn minimal(name: &str) -> Self {
        AdsConfig {
            project: ProjectConfig {
                name: name.to_string(),
                region: None,
            },
            tables: None,
            identity: None,
            functions: None,
            gateway: None,
            waits: None,
            aws: None,
        }
    }

    /// Scaffold a classifieds.toml with every default spelled out.
    pub fn scaffold(name: &str, region: &str) -> Self {
        AdsConfig {
            project: ProjectConfig {
                name: name.to_string(),
                region: Some(region.to_string()),
            },
            tables: Some(TablesConfig {
                listings: Some("Listings".to_string()),
                comments: Some("Comments".to_string()),
            }),
            identity: Some(IdentityConfig {
                role_name: Some("ClassifiedsLambdaRole".to_string()),
                propagation_delay: Some("30s".to_string()),
            }),
            functions: Some(FunctionsConfig {
                runtime: Some("provided.al2023".to_string()),
                timeout_secs: Some(10),
                memory_mb: Some(128),
                artifacts_dir: Some(PathBuf::from("target/lambda/bootstrap")),
            }),
            gateway: Some(GatewayConfig {
                api_name: Some("ClassifiedsAPI".to_string()),
                description: Some("Classified ads with comments".to_string()),
                stage: Some("prod".to_string()),
                always_redeploy: Some(false),
            }),
            waits: Some(WaitsConfig {
                table_active_timeout: Some("2m".to_string()),
                poll_interval: Some("2s".to_string()),
                retry_attempts: Some(5),
                retry_backoff: Some("2s".to_string()),
            }),
            aws: None,
        }
    }

    pub fn region(&self) -> &str {
        self.project.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn listings_table(&self) -> &str {
        self.tables
            .as_ref()
            .and_then(|t| t.listings.as_deref())
            .unwrap_or("Listings")
    }

    pub fn comments_table(&self) -> &str {
        self.tables
            .as_ref()
            .and_then(|t| t.comments.as_deref())
            .unwrap_or("Comments")
    }

    pub fn role_name(&self) -> &str {
        self.identity
            .as_ref()
            .and_then(|i| i.role_name.as_deref())
            .unwrap_or("ClassifiedsLambdaRole")
    }

    pub fn propagation_delay(&self) -> Result<Duration, ConfigError> {
        let raw = self.identity.as_ref().and_then(|i| i.propagation_delay.as_deref());
        duration_or("identity.propagation_delay", raw, Duration::from_secs(30))
    }

    pub fn runtime(&self) -> &str {
        self.functions
            .as_ref()
            .and_then(|f| f.runtime.as_deref())
            .unwrap_or("provided.al2023")
    }

    pub fn function_timeout_secs(&self) -> u32 {
        self.functions.as_ref().and_then(|f| f.timeout_secs).unwrap_or(10)
    }

    pub fn function_memory_mb(&self) -> u32 {
        self.functions.as_ref().and_then(|f| f.memory_mb).unwrap_or(128)
    }

    pub fn artifacts_dir(&self) -> Option<&Path> {
        self.functions.as_ref().and_then(|f| f.artifacts_dir.as_deref())
    }

    pub fn api_name(&self) -> &str {
        self.gateway
            .as_ref()
            .and_then(|g| g.api_name.as_deref())
            .unwrap_or("ClassifiedsAPI")
    }

    pub fn api_description(&self) -> &str {
        self.gateway
            .as_ref()
            .and_then(|g| g.description.as_deref())
            .unwrap_or("Classified ads with comments")
    }

    pub fn stage(&self) -> &str {
        self.gateway
            .as_ref()
            .and_then(|g| g.stage.as_deref())
            .unwrap_or("prod")
    }

    pub fn always_redeploy(&self) -> bool {
        self.gateway.as_ref().and_then(|g| g.always_redeploy).unwrap_or(false)
    }

    pub fn table_active_timeout(&self) -> Result<Duration, ConfigError> {
        let raw = self.waits.as_ref().and_then(|w| w.table_active_timeout.as_deref());
        duration_or("waits.table_active_timeout", raw, Duration::from_secs(120))
    }

    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        let raw = self.waits.as_ref().and_then(|w| w.poll_interval.as_deref());
        duration_or("waits.poll_interval", raw, Duration::from_secs(2))
    }

    pub fn retry_attempts(&self) -> u32 {
        self.waits.as_ref().and_then(|w| w.retry_attempts).unwrap_or(5)
    }

    pub fn retry_backoff(&self) -> Result<Duration, ConfigError> {
        let raw = self.waits.as_ref().and_then(|w| w.retry_backoff.as_deref());
        duration_or("waits.retry_backoff", raw, Duration::from_secs(2))
    }

    pub fn endpoint_url(&self) -> Option<&str> {
        self.aws.as_ref().and_then(|a| a.endpoint_url.as_deref())
    }
}

fn duration_or(
    field: &'static str,
    raw: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
            field,
            value: value.to_string(),
        }),
    }
}

/// Parse `"500ms"`, `"5s"`, `"2m"`, or a bare number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold() {
        let config = AdsConfig::scaffold("classifieds", "eu-west-1");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("classifieds"));
        assert!(toml_str.contains("propagation_delay"));
    }

    #[test]
    fn test_parse_minimal_uses_defaults() {
        let toml_str = r#"
[project]
name = "test"
"#;
        let config: AdsConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.project.name, "test");
        assert_eq!(config.region(), DEFAULT_REGION);
        assert_eq!(config.stage(), "prod");
        assert_eq!(config.propagation_delay().unwrap(), Duration::from_secs(30));
        assert_eq!(config.retry_attempts(), 5);
    }

    #[test]
    fn test_parse_overrides() {
        let toml_str = r#"
[project]
name = "test"
region = "us-east-1"

[identity]
propagation_delay = "500ms"

[gateway]
stage = "dev"
always_redeploy = true
"#;
        let config: AdsConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.region(), "us-east-1");
        assert_eq!(config.propagation_delay().unwrap(), Duration::from_millis(500));
        assert_eq!(config.stage(), "dev");
        assert!(config.always_redeploy());
    }

    #[test]
    fn test_invalid_duration_names_field() {
        let mut config = AdsConfig::minimal("test");
        config.waits = Some(WaitsConfig {
            table_active_timeout: Some("soon".to_string()),
            poll_interval: None,
            retry_attempts: None,
            retry_backoff: None,
        });
        let err = config.table_active_timeout().unwrap_err();
        assert!(err.to_string().contains("waits.table_active_timeout"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classifieds.toml");
        let config = AdsConfig::scaffold("from-disk", "eu-west-3");
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = AdsConfig::from_file(&path).unwrap();
        assert_eq!(loaded.project.name, "from-disk");
        assert_eq!(loaded.region(), "eu-west-3");
    }

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_duration("abc"), None);
    }
}

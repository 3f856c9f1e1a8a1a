use std::path::Path;

use dcr_client::{HttpConfig, RetryPolicy};
use dcr_objects::CacheConfig;
use dcr_txn::TransactionConfig;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

const REDACTED: &str = "********";

/// Settings for a [`Repository`](crate::Repository), usually read from a
/// TOML file.
///
/// ```toml
/// base_uri = "https://repo.example.edu/rest"
/// username = "fedoraAdmin"
/// sparql_endpoint = "https://repo.example.edu/sparql"
///
/// [cache]
/// max_entries = 1024
///
/// [transaction]
/// keep_alive_interval_secs = 30
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Base URI of the repository REST endpoint.
    pub base_uri: String,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Query endpoint used for parent lookups. Without one, only
    /// components can find their parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparql_endpoint: Option<String>,
    pub cache: CacheConfig,
    pub transaction: TransactionConfig,
    pub retry: RetryPolicy,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            base_uri: "http://localhost:8080/rest".into(),
            timeout_secs: 30,
            username: None,
            password: None,
            sparql_endpoint: None,
            cache: CacheConfig::default(),
            transaction: TransactionConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RepositoryConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SdkError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), base_uri = %config.base_uri, "loaded config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> SdkResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> SdkResult<()> {
        check_http_uri("base_uri", &self.base_uri)?;
        if let Some(endpoint) = &self.sparql_endpoint {
            check_http_uri("sparql_endpoint", endpoint)?;
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(SdkError::InvalidConfig("password set without username".into()));
        }
        if self.cache.max_entries == 0 {
            return Err(SdkError::InvalidConfig("cache.max_entries must be positive".into()));
        }
        let tx = &self.transaction;
        if tx.keep_alive_interval_secs == 0 {
            return Err(SdkError::InvalidConfig(
                "transaction.keep_alive_interval_secs must be positive".into(),
            ));
        }
        if tx.keep_alive_interval_secs >= tx.max_ttl_secs {
            return Err(SdkError::InvalidConfig(format!(
                "transaction.keep_alive_interval_secs ({}) must be below max_ttl_secs ({})",
                tx.keep_alive_interval_secs, tx.max_ttl_secs
            )));
        }
        Ok(())
    }

    /// Base URI without a trailing slash.
    pub fn base_uri(&self) -> &str {
        self.base_uri.trim_end_matches('/')
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            timeout_secs: self.timeout_secs,
            username: self.username.clone(),
            password: self.password.clone(),
            retry: self.retry.clone(),
        }
    }

    /// Copy safe to print.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.password.is_some() {
            config.password = Some(REDACTED.into());
        }
        config
    }
}

fn check_http_uri(field: &str, value: &str) -> SdkResult<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| SdkError::InvalidConfig(format!("{field} is not a valid URI ({value}): {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SdkError::InvalidConfig(format!(
            "{field} must use http or https, not {other}"
        ))),
    }
}

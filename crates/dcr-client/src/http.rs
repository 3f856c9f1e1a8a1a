use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dcr_types::{RepositoryError, RepositoryResult};
use serde::{Deserialize, Serialize};

use crate::retry::{retry_send, RetryPolicy};
use crate::transport::{Method, RepoRequest, RepoResponse, Transport};

/// Connection settings for [`HttpTransport`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Basic-auth user, if the repository requires one.
    pub username: Option<String>,
    pub password: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            username: None,
            password: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Transport backed by a `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    config: HttpConfig,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> RepositoryResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RepositoryError::operation("client_init", e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: RepoRequest) -> RepositoryResult<RepoResponse> {
        let url = url::Url::parse(&request.uri)
            .map_err(|e| RepositoryError::operation(&request.uri, format!("invalid URI: {e}")))?;
        let method = to_reqwest(request.method);

        // A write whose request may have reached the server is not re-sent.
        let idempotent = request.method.is_idempotent();
        let retryable = |e: &reqwest::Error| idempotent || e.is_connect();
        let resp = retry_send(&self.config.retry, &request.uri, retryable, || {
            let mut builder = self.http.request(method.clone(), url.clone());
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(user) = &self.config.username {
                builder = builder.basic_auth(user, self.config.password.as_ref());
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }
            builder.send()
        })
        .await
        .map_err(|e| RepositoryError::operation(&request.uri, e.to_string()))?;

        let status = resp.status().as_u16();
        let mut headers = BTreeMap::new();
        for (name, value) in resp.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| RepositoryError::operation(&request.uri, e.to_string()))?;

        tracing::debug!(method = %request.method, uri = %request.uri, status, "repository request");
        Ok(RepoResponse {
            status,
            headers,
            body,
        })
    }
}

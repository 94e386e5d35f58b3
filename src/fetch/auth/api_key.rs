use crate::fetch::client::HttpClient;
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue};

/// An [`HttpClient`] wrapper that injects an API token as an HTTP header.
///
/// Used for authenticated GitHub API access when `GITHUB_TOKEN` is set;
/// unauthenticated requests hit much lower rate limits on versioned runs
/// that replay many reference dates.
pub struct ApiKey<C> {
    pub inner: C,
    pub header_name: String,
    pub key: String,
}

impl<C> ApiKey<C> {
    /// `Authorization: Bearer <key>`, the scheme the GitHub REST API expects.
    pub fn bearer(inner: C, key: String) -> Self {
        Self {
            inner,
            header_name: "Authorization".to_string(),
            key: format!("Bearer {key}"),
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ApiKey<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        // Header names/values are fixed at construction; an invalid one is a
        // programming error, not a runtime condition.
        let name = HeaderName::from_bytes(self.header_name.as_bytes())
            .expect("ApiKey: invalid header name");
        let value = HeaderValue::from_str(&self.key).expect("ApiKey: invalid header value");
        req.headers_mut().insert(name, value);
        self.inner.execute(req).await
    }
}

use async_trait::async_trait;
use reqwest::{Request, Response};

/// Seam between the source loaders and the HTTP layer, so loaders can be
/// exercised against canned responses in tests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

// Borrowed clients are clients too, so a decorator like an auth wrapper can
// be layered onto one request path without taking ownership.
#[async_trait]
impl<C: HttpClient> HttpClient for &C {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}

use async_trait::async_trait;
use reqwest::{Request, Response};

/// A trait abstracting HTTP request execution.
///
/// Implement this trait to layer behavior onto requests, such as the
/// single-host politeness lock in [`ExclusiveClient`](super::ExclusiveClient).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends an HTTP request and returns the response.
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Allows a `Box<dyn HttpClient>` to be passed wherever `HttpClient` is
/// expected, enabling runtime-selected client stacks.
#[async_trait]
impl HttpClient for Box<dyn HttpClient> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}

/// Tasks fanning out concurrent fetches share one client through an `Arc`.
#[async_trait]
impl<C: HttpClient> HttpClient for std::sync::Arc<C> {
    async fn execute(&self, req: Request) -> reqwest::Result<Response> {
        (**self).execute(req).await
    }
}

use super::client::HttpClient;
use async_trait::async_trait;
use std::time::Duration;

/// A plain [`HttpClient`] with a 30-second request timeout and a 10-second
/// connection timeout.
pub struct BasicClient(reqwest::Client);

impl BasicClient {
    /// Creates a new `BasicClient` with default timeout settings.
    pub fn new() -> Self {
        Self::with_request_timeout(Duration::from_secs(30))
    }

    /// Creates a `BasicClient` with a custom whole-request timeout.
    ///
    /// The static GTFS archive can take a while to stream down; callers
    /// fetching it use a much longer budget than the API polls.
    pub fn with_request_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");
        Self(client)
    }
}

impl Default for BasicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.0.execute(req).await
    }
}

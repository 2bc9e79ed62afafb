use super::client::HttpClient;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// An [`HttpClient`] wrapper that serializes requests through the wrapped
/// client: the lock is held for the whole request, so a rate-limited host
/// sees at most one in-flight request at a time no matter how many tasks
/// share this client.
///
/// Used for wtp.waw.pl, which serves both the RSS feeds and every alert
/// detail page.
pub struct ExclusiveClient<C> {
    inner: C,
    lock: Mutex<()>,
}

impl<C> ExclusiveClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for ExclusiveClient<C> {
    async fn execute(&self, req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let _guard = self.lock.lock().await;
        self.inner.execute(req).await
    }
}

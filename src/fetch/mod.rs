mod basic;
mod client;
mod exclusive;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use exclusive::ExclusiveClient;

use crate::error::{Error, Result};
use reqwest::{Method, Request, Response};

/// Issues a GET and fails on any non-2xx status, carrying the URL and the
/// status line in the error.
pub async fn get_checked<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Response> {
    let req = Request::new(Method::GET, url.parse()?);
    let resp = client.execute(req).await?;
    check_status(url, resp)
}

/// Issues a HEAD with the same status policy as [`get_checked`].
pub async fn head_checked<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<Response> {
    let req = Request::new(Method::HEAD, url.parse()?);
    let resp = client.execute(req).await?;
    check_status(url, resp)
}

pub async fn fetch_text<C: HttpClient + ?Sized>(client: &C, url: &str) -> Result<String> {
    let resp = get_checked(client, url).await?;
    Ok(resp.text().await?)
}

fn check_status(url: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Request {
            url: url.to_string(),
            status: status.to_string(),
            code: status.as_u16(),
        });
    }
    Ok(resp)
}

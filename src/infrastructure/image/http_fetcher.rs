//! HTTP adapter for [`FetchPort`].

use std::time::Duration;

use futures_util::{StreamExt, TryStreamExt};
use reqwest::{Client, Url};
use tracing::{debug, trace};

use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{ByteStream, FetchPort};

const USER_AGENT: &str = concat!("imgcache/", env!("CARGO_PKG_VERSION"));

/// Fetches image bodies over HTTP(S), one attempt per call.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the given total and connect timeouts.
    ///
    /// # Errors
    /// Returns error if HTTP client creation fails.
    pub fn new(timeout: Duration, connect_timeout: Duration) -> CacheResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| CacheError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Parses `url`, accepting only http and https.
    fn parse_url(url: &str) -> CacheResult<Url> {
        let parsed = Url::parse(url).map_err(|e| CacheError::InvalidUrl(format!("{url}: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            other => Err(CacheError::InvalidUrl(format!(
                "{url}: unsupported scheme {other}"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl FetchPort for HttpFetcher {
    async fn fetch(&self, url: &str) -> CacheResult<ByteStream> {
        let parsed = Self::parse_url(url)?;
        trace!(url = %parsed, "Opening connection");

        let response = self.client.get(parsed).send().await.map_err(|e| {
            if e.is_timeout() {
                CacheError::Network(format!("request timed out: {e}"))
            } else {
                CacheError::Network(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Network(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }
        debug!(url, length = ?response.content_length(), "Streaming image body");

        Ok(response
            .bytes_stream()
            .map_err(|e| CacheError::Network(format!("failed to read body: {e}")))
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response and returns the base URL.
    async fn serve_once(status_line: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 2048];
            let _ = socket.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 {status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.expect("write head");
            socket.write_all(body).await.expect("write body");
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5), Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn test_fetch_streams_body() {
        let base = serve_once("200 OK", b"jpeg bytes").await;
        let stream = fetcher()
            .fetch(&format!("{base}/a.jpg"))
            .await
            .expect("fetch");

        let chunks: Vec<_> = stream.try_collect().await.expect("body");
        assert_eq!(chunks.concat(), b"jpeg bytes");
    }

    #[tokio::test]
    async fn test_non_success_status_is_network_error() {
        let base = serve_once("404 Not Found", b"").await;
        let err = fetcher()
            .fetch(&format!("{base}/missing.jpg"))
            .await
            .err()
            .expect("error");
        assert_eq!(err, CacheError::Network("HTTP 404: Not Found".into()));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let err = fetcher().fetch("not a url").await.err().expect("error");
        assert!(matches!(err, CacheError::InvalidUrl(_)));

        let err = fetcher()
            .fetch("ftp://example.com/a.jpg")
            .await
            .err()
            .expect("error");
        assert!(matches!(err, CacheError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let err = fetcher()
            .fetch(&format!("http://{addr}/a.jpg"))
            .await
            .err()
            .expect("error");
        assert!(err.is_network_error());
    }
}

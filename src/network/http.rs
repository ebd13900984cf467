//! reqwest-backed network
//!
//! Forwards intercepted requests to the real network and snapshots the full
//! body so it can be both returned and persisted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use super::{Network, NetworkError, Request, Response, ResponseKind};

/// Network implementation over a shared reqwest client
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    client: Client,
    origin: Url,
}

impl HttpNetwork {
    /// Creates a client that gives up after `timeout`
    ///
    /// # Arguments
    /// * `origin` - The application's origin, used to tag responses as basic or cors
    /// * `timeout` - Total time allowed per request, body included
    pub fn new(origin: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, origin })
    }

    fn classify(&self, url: &Url, err: reqwest::Error) -> NetworkError {
        if err.is_timeout() {
            NetworkError::Timeout(url.to_string())
        } else {
            NetworkError::RequestFailed {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(|e| self.classify(&request.url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
            .collect();

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                NetworkError::Timeout(request.url.to_string())
            } else {
                NetworkError::Body {
                    url: request.url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let kind = if request.is_same_origin(&self.origin) {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        };

        debug!(%request, status, bytes = body.len(), "network response");

        Ok(Response {
            status,
            headers,
            body,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `raw` verbatim to the first connection and returns its origin
    async fn serve_once(raw: &'static [u8]) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(raw).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    #[tokio::test]
    async fn test_response_headers_are_kept_verbatim() {
        let origin = serve_once(
            b"HTTP/1.1 200 OK\r\nx-name: caf\xE9\r\ncontent-type: text/plain\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
        )
        .await;
        let network = HttpNetwork::new(origin.clone(), Duration::from_secs(5)).unwrap();

        let response = network.fetch(&Request::get(origin)).await.expect("Should respond");

        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"ok");
        assert_eq!(response.kind, ResponseKind::Basic);
        assert_eq!(response.header_bytes("x-name"), Some(&b"caf\xE9"[..]));
        assert_eq!(response.header("content-type"), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_network_error() {
        let origin = Url::parse("http://127.0.0.1:9").unwrap();
        let network = HttpNetwork::new(origin.clone(), Duration::from_secs(2))
            .expect("Client should build");

        // Port 9 (discard) is closed on test machines; connection is refused
        let result = network.fetch(&Request::get(origin)).await;
        assert!(result.is_err(), "Closed port should not yield a response");
    }
}

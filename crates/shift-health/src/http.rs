//! HTTP health source.
//!
//! GETs a JSON health sample from the configured endpoint. Connection
//! failures and non-2xx responses count as unreachable polls.

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use tracing::debug;

use shift_core::{ConfigError, ConfigResult};

use crate::source::{BoxFuture, HealthError, HealthResult, HealthSample, HealthSource};

#[derive(Debug, Clone)]
pub struct HttpHealthSource {
    /// `host:port`.
    address: String,
    path: String,
}

impl HttpHealthSource {
    /// Parse `http://host:port/path`. The target name is appended as a
    /// `target` query parameter on every poll.
    pub fn from_url(url: &str) -> ConfigResult<Self> {
        let bad = |reason: &str| ConfigError::invalid("monitoring.health_url", format!("{url}: {reason}"));

        let uri: http::Uri = url.parse().map_err(|_| bad("not a valid URL"))?;
        if uri.scheme_str() != Some("http") {
            return Err(bad("only http:// endpoints are supported"));
        }
        let authority = uri.authority().ok_or_else(|| bad("missing host"))?;
        let address = match authority.port_u16() {
            Some(_) => authority.as_str().to_string(),
            None => format!("{}:80", authority.host()),
        };
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Ok(Self { address, path })
    }

    fn uri_for(&self, target: &str) -> String {
        let sep = if self.path.contains('?') { '&' } else { '?' };
        format!("http://{}{}{}target={}", self.address, self.path, sep, target)
    }

    async fn probe(&self, target: &str) -> HealthResult<HealthSample> {
        let uri = self.uri_for(target);

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| HealthError::Unreachable(format!("connect {uri}: {e}")))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| HealthError::Unreachable(format!("handshake {uri}: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", &self.address)
            .header("user-agent", "promptshift-health/0.1")
            .body(Empty::<Bytes>::new())
            .map_err(|e| HealthError::Malformed(format!("build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| HealthError::Unreachable(format!("request {uri}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            debug!(%status, %uri, "health endpoint non-2xx");
            return Err(HealthError::Unreachable(format!("{uri} returned {status}")));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| HealthError::Unreachable(format!("read body {uri}: {e}")))?
            .to_bytes();

        serde_json::from_slice(&body).map_err(|e| HealthError::Malformed(e.to_string()))
    }
}

impl HealthSource for HttpHealthSource {
    fn sample<'a>(&'a self, target: &'a str) -> BoxFuture<'a, HealthResult<HealthSample>> {
        Box::pin(self.probe(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urls() {
        let s = HttpHealthSource::from_url("http://127.0.0.1:9100/health").unwrap();
        assert_eq!(s.address, "127.0.0.1:9100");
        assert_eq!(s.uri_for("support"), "http://127.0.0.1:9100/health?target=support");

        let s = HttpHealthSource::from_url("http://metrics.internal/v1/health?window=1m").unwrap();
        assert_eq!(s.address, "metrics.internal:80");
        assert_eq!(
            s.uri_for("support"),
            "http://metrics.internal:80/v1/health?window=1m&target=support"
        );
    }

    #[test]
    fn rejects_unsupported_urls() {
        assert!(HttpHealthSource::from_url("https://example.com/health").is_err());
        assert!(HttpHealthSource::from_url("not a url").is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint() {
        let s = HttpHealthSource::from_url("http://127.0.0.1:1/health").unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), s.sample("t")).await;
        if let Ok(result) = result {
            assert!(matches!(result, Err(HealthError::Unreachable(_))));
        }
    }

    #[tokio::test]
    async fn reads_sample_from_local_server() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
            let _ = socket.read(&mut buf).await.unwrap();
            let body = r#"{"error_rate":0.02,"p99_latency_ms":900}"#;
            let resp = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(resp.as_bytes()).await.unwrap();
        });

        let s = HttpHealthSource::from_url(&format!("http://{addr}/health")).unwrap();
        let sample = s.sample("support").await.unwrap();
        assert_eq!(sample.error_rate, Some(0.02));
        assert_eq!(sample.p99_latency_ms, Some(900));
    }
}

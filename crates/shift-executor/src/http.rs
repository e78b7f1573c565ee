//! JSON-over-HTTP inference adapter.
//!
//! Opens one HTTP/1 connection per call, POSTs the rendered prompt and
//! parameters, and pulls the completion out of the common response
//! shapes. Throttling, server errors and connection failures are
//! transient; any other non-2xx status is fatal.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use serde_json::{json, Value};
use tracing::debug;

use crate::backend::{BoxFuture, InvocationRequest, InvocationResponse, ModelBackend};
use crate::error::InvocationError;

#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// `host:port` of the endpoint.
    address: String,
    path: String,
}

impl HttpBackend {
    pub fn new(address: &str, path: &str) -> Self {
        Self {
            address: address.to_string(),
            path: path.to_string(),
        }
    }

    async fn call(&self, request: &InvocationRequest) -> Result<InvocationResponse, InvocationError> {
        let uri = format!("http://{}{}", self.address, self.path);

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| InvocationError::Transient(format!("connect {uri}: {e}")))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| InvocationError::Transient(format!("handshake {uri}: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let body = request_body(request);
        let req = http::Request::builder()
            .method("POST")
            .uri(&uri)
            .header("host", &self.address)
            .header("content-type", "application/json")
            .header("user-agent", "promptshift/0.1")
            .body(Full::new(Bytes::from(body.to_string())))
            .map_err(|e| InvocationError::Fatal(format!("build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| InvocationError::Transient(format!("request {uri}: {e}")))?;

        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| InvocationError::Transient(format!("read body {uri}: {e}")))?
            .to_bytes();

        if !status.is_success() {
            let snippet = String::from_utf8_lossy(&bytes[..bytes.len().min(200)]).to_string();
            debug!(%status, %uri, "inference endpoint returned non-2xx");
            return Err(classify_status(status.as_u16(), &snippet));
        }

        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| InvocationError::Fatal(format!("malformed response body: {e}")))?;
        parse_response(&value)
    }
}

impl ModelBackend for HttpBackend {
    fn invoke<'a>(
        &'a self,
        request: &'a InvocationRequest,
    ) -> BoxFuture<'a, Result<InvocationResponse, InvocationError>> {
        Box::pin(self.call(request))
    }
}

fn request_body(request: &InvocationRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "prompt": request.prompt,
        "max_tokens": request.params.max_tokens,
        "temperature": request.params.temperature,
    });
    if let Some(top_p) = request.params.top_p {
        body["top_p"] = json!(top_p);
    }
    for (key, value) in &request.params.extra {
        body[key] = value.clone();
    }
    body
}

/// 429 and 5xx are worth retrying; everything else is the caller's fault.
fn classify_status(status: u16, body: &str) -> InvocationError {
    let message = format!("HTTP {status}: {body}");
    if status == 429 || status >= 500 {
        InvocationError::Transient(message)
    } else {
        InvocationError::Fatal(message)
    }
}

/// Extract completion text and token usage from a backend response.
fn parse_response(value: &Value) -> Result<InvocationResponse, InvocationError> {
    let first_result = value.get("results").and_then(|r| r.get(0));

    let text = value
        .get("completion")
        .or_else(|| value.get("outputText"))
        .or_else(|| first_result.and_then(|r| r.get("outputText")))
        .or_else(|| value.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| InvocationError::Fatal("response has no completion text".into()))?;

    let tokens = value
        .pointer("/usage/total_tokens")
        .or_else(|| first_result.and_then(|r| r.get("tokenCount")))
        .and_then(Value::as_u64)
        .map(|t| t.min(u64::from(u32::MAX)) as u32);

    Ok(InvocationResponse {
        text: text.trim().to_string(),
        tokens,
    })
}

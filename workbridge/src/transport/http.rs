//! HTTP transport backed by `reqwest`.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::collections::HashMap;
use std::error::Error as _;
use std::time::Duration;
use tracing::{debug, trace};

use super::{
    AuthPlacement, AuthScheme, Credential, Method, RawOutcome, ResponseEnvelope, Transport,
    TransportFailure, TransportFailureKind, TransportRequest,
};
use crate::errors::WorkbridgeError;

/// Settings for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// Base URL that request paths are appended to.
    pub base_url: String,
    /// How the credential is attached.
    pub auth: AuthScheme,
    /// Per-attempt timeout covering connect, send and body read.
    pub timeout: Duration,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl HttpTransportConfig {
    /// Creates a config with a 30 second timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>, auth: AuthScheme) -> Self {
        Self {
            base_url: base_url.into(),
            auth,
            timeout: Duration::from_secs(30),
            user_agent: format!("workbridge/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Sends requests over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// Builds the underlying HTTP client.
    pub fn new(config: HttpTransportConfig) -> Result<Self, WorkbridgeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| WorkbridgeError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn build(&self, request: &TransportRequest, credential: &Credential) -> reqwest::RequestBuilder {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Put => reqwest::Method::PUT,
        };

        let mut builder = self
            .client
            .request(method, self.url(&request.path))
            .header(ACCEPT, "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        builder = match self.config.auth.placement(credential) {
            AuthPlacement::Header(name, value) => builder.header(name, value),
            AuthPlacement::Query(param, value) => builder.query(&[(param, value)]),
        };

        if let Some(body) = &request.body {
            let content_type = request.content_type.as_deref().unwrap_or("application/json");
            builder = builder
                .header(CONTENT_TYPE, content_type)
                .body(body.to_string());
        }

        builder
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &TransportRequest, credential: &Credential) -> RawOutcome {
        let builder = self.build(request, credential);
        trace!(method = %request.method, path = %request.path, "Sending request");

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let headers: HashMap<String, String> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, headers, bytes))
        };

        match tokio::time::timeout(self.config.timeout, exchange).await {
            Err(_) => TransportFailure::new(
                TransportFailureKind::Timeout,
                format!("no response within {} ms", self.config.timeout.as_millis()),
            )
            .into(),
            Ok(Err(error)) => {
                debug!(path = %request.path, error = %error, "Request failed");
                failure_from(&error).into()
            }
            Ok(Ok((status, headers, bytes))) => {
                debug!(method = %request.method, path = %request.path, status, "Response received");
                ResponseEnvelope {
                    status,
                    headers,
                    body: parse_body(&bytes),
                }
                .into()
            }
        }
    }
}

fn parse_body(bytes: &[u8]) -> serde_json::Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return serde_json::Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

fn failure_from(error: &reqwest::Error) -> TransportFailure {
    let mut chain = String::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(&cause.to_string().to_ascii_lowercase());
        chain.push(' ');
        source = cause.source();
    }

    let kind = if error.is_timeout() {
        TransportFailureKind::Timeout
    } else if chain.contains("dns") || chain.contains("resolve") {
        TransportFailureKind::Dns
    } else if chain.contains("certificate") || chain.contains("tls") || chain.contains("ssl") {
        TransportFailureKind::Tls
    } else if error.is_connect() {
        TransportFailureKind::Connect
    } else {
        TransportFailureKind::Io
    };

    TransportFailure::new(kind, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(auth: AuthScheme) -> HttpTransport {
        HttpTransport::new(HttpTransportConfig::new("https://api.example.test/", auth)).unwrap()
    }

    #[test]
    fn test_build_injects_auth_and_body() {
        let transport = transport(AuthScheme::Bearer);
        let request = TransportRequest::new(Method::Patch, "/issues/1")
            .with_query("page", "2")
            .with_header("If-Match", "v1")
            .with_body(serde_json::json!({"title": "x"}))
            .with_content_type("application/json-patch+json");

        let built = transport
            .build(&request, &Credential::new("tok"))
            .build()
            .unwrap();

        assert_eq!(*built.method(), reqwest::Method::PATCH);
        assert_eq!(built.url().as_str(), "https://api.example.test/issues/1?page=2");
        assert_eq!(built.headers()["authorization"], "Bearer tok");
        assert_eq!(built.headers()["if-match"], "v1");
        assert_eq!(built.headers()["content-type"], "application/json-patch+json");
        assert_eq!(built.headers()["accept"], "application/json");
    }

    #[test]
    fn test_build_query_auth() {
        let transport = transport(AuthScheme::Query { param: "key".into() });
        let built = transport
            .build(&TransportRequest::get("/search"), &Credential::new("s3"))
            .build()
            .unwrap();
        assert_eq!(built.url().query(), Some("key=s3"));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b""), serde_json::Value::Null);
        assert_eq!(parse_body(b"{\"a\":1}"), serde_json::json!({"a": 1}));
        assert_eq!(
            parse_body(b"<html>Bad Gateway</html>"),
            serde_json::Value::String("<html>Bad Gateway</html>".into())
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_failure() {
        let transport = HttpTransport::new(
            HttpTransportConfig::new("http://127.0.0.1:9", AuthScheme::Bearer)
                .with_timeout(Duration::from_secs(5)),
        )
        .unwrap();

        let outcome = transport
            .send(&TransportRequest::get("/"), &Credential::new("x"))
            .await;
        assert!(matches!(outcome, RawOutcome::Failed(_)));
    }
}

use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

/// Minimal HTTP method set needed by provider clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Authentication strategy applied to outgoing HTTP requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuth {
    None,
    BearerToken(String),
    Header { name: String, value: String },
    /// Credential passed as a query parameter (`?key=...`).
    QueryParam { name: String, value: String },
}

impl HttpAuth {
    pub fn apply(&self, request: HttpRequest) -> HttpRequest {
        match self {
            Self::None => request,
            Self::BearerToken(token) => request.with_header("authorization", format!("Bearer {token}")),
            Self::Header { name, value } => request.with_header(name.as_str(), value.as_str()),
            Self::QueryParam { name, value } => request.with_query(name, value),
        }
    }
}

/// HTTP request envelope used by transport calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: 3_000,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Append a percent-encoded query parameter to the URL.
    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        self.url = format!(
            "{}{separator}{}={}",
            self.url,
            urlencoding::encode(name),
            urlencoding::encode(value)
        );
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_auth(self, auth: &HttpAuth) -> Self {
        auth.apply(self)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Category of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorKind {
    /// Connection refused, reset, or DNS failure.
    Connect,
    /// Connect, read, or write timeout.
    Timeout,
    /// The response body could not be read to the end.
    Body,
    /// Request could not be built or sent for another reason.
    Other,
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    kind: HttpErrorKind,
    message: String,
}

impl HttpError {
    pub fn new(kind: HttpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Connect, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Timeout, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(HttpErrorKind::Other, message)
    }

    pub const fn kind(&self) -> HttpErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Non-blocking transport contract.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse, HttpError>>;
}

/// Hook that rewrites a request before it reaches the transport.
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, request: HttpRequest) -> Result<HttpRequest, HttpError>;
}

impl RequestInterceptor for HttpAuth {
    fn intercept(&self, request: HttpRequest) -> Result<HttpRequest, HttpError> {
        Ok(self.apply(request))
    }
}

/// Supplies a currently valid access token.
///
/// Token refresh lives behind this trait; the client layer only asks for a token.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Result<String, HttpError>;
}

/// Adds `Authorization: Bearer <token>` from a [`TokenSource`] on every request.
pub struct BearerTokenInterceptor {
    tokens: Arc<dyn TokenSource>,
}

impl BearerTokenInterceptor {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self { tokens }
    }
}

impl RequestInterceptor for BearerTokenInterceptor {
    fn intercept(&self, request: HttpRequest) -> Result<HttpRequest, HttpError> {
        let token = self.tokens.access_token()?;
        Ok(request.with_auth(&HttpAuth::BearerToken(token)))
    }
}

/// Transport decorator that runs an interceptor chain in order.
pub struct InterceptedHttpClient {
    inner: Arc<dyn HttpClient>,
    chain: Vec<Arc<dyn RequestInterceptor>>,
}

impl InterceptedHttpClient {
    pub fn new(inner: Arc<dyn HttpClient>) -> Self {
        Self {
            inner,
            chain: Vec::new(),
        }
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn RequestInterceptor>) -> Self {
        self.chain.push(interceptor);
        self
    }
}

impl HttpClient for InterceptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        Box::pin(async move {
            let mut request = request;
            for interceptor in &self.chain {
                request = interceptor.intercept(request)?;
            }
            self.inner.execute(request).await
        })
    }
}

/// Timeouts and identity for the production transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub user_agent: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("laddertrack/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout_ms: 5_000,
            read_timeout_ms: 30_000,
        }
    }
}

/// Production HTTP client backed by a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Build a client with gzip enabled and the configured timeouts.
    pub fn new(config: &TransportConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .gzip(true)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .read_timeout(Duration::from_millis(config.read_timeout_ms))
            .build()
            .map_err(|error| HttpError::other(format!("failed to build http client: {error}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        Box::pin(async move {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
            };

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            builder = builder.timeout(request.timeout());

            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(classify_reqwest_error)?;

            let status = response.status().as_u16();
            let body = response.text().await.map_err(|error| {
                if error.is_timeout() {
                    HttpError::timeout(format!("response body timed out: {error}"))
                } else {
                    HttpError::new(
                        HttpErrorKind::Body,
                        format!("failed to read response body: {error}"),
                    )
                }
            })?;

            Ok(HttpResponse { status, body })
        })
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> HttpError {
    if error.is_timeout() {
        HttpError::timeout(format!("request timeout: {error}"))
    } else if error.is_connect() {
        HttpError::connect(format!("connection failed: {error}"))
    } else if error.is_body() || error.is_decode() {
        HttpError::new(HttpErrorKind::Body, format!("body error: {error}"))
    } else {
        HttpError::other(format!("request failed: {error}"))
    }
}

/// In-memory transport that replays a queue of canned results.
///
/// Every executed request is recorded. Once the script runs out the transport answers
/// with a connection error.
#[derive(Debug, Default)]
pub struct ScriptedHttpClient {
    script: Mutex<VecDeque<Result<HttpResponse, HttpError>>>,
    seen: Mutex<Vec<HttpRequest>>,
    latency: Option<Duration>,
}

impl ScriptedHttpClient {
    pub fn new(script: impl IntoIterator<Item = Result<HttpResponse, HttpError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    /// Delay every answer, useful to exercise timeouts and cancellation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push(&self, result: Result<HttpResponse, HttpError>) {
        self.script
            .lock()
            .expect("scripted transport lock is not poisoned")
            .push_back(result);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.seen
            .lock()
            .expect("scripted transport lock is not poisoned")
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.seen
            .lock()
            .expect("scripted transport lock is not poisoned")
            .len()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        Box::pin(async move {
            self.seen
                .lock()
                .expect("scripted transport lock is not poisoned")
                .push(request);

            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }

            self.script
                .lock()
                .expect("scripted transport lock is not poisoned")
                .pop_front()
                .unwrap_or_else(|| Err(HttpError::connect("script exhausted")))
        })
    }
}

/// Transport answering each request with a closure, for request-dependent fakes.
pub struct FnHttpClient<F> {
    handler: F,
}

impl<F> FnHttpClient<F>
where
    F: Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync,
{
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<F> HttpClient for FnHttpClient<F>
where
    F: Fn(&HttpRequest) -> Result<HttpResponse, HttpError> + Send + Sync,
{
    fn execute<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        let result = (self.handler)(&request);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticToken;

    impl TokenSource for StaticToken {
        fn access_token(&self) -> Result<String, HttpError> {
            Ok(String::from("token-123"))
        }
    }

    #[test]
    fn bearer_auth_populates_authorization_header() {
        let request = HttpRequest::get("https://eu.api.blizzard.com/sc2/ladder/season/2")
            .with_auth(&HttpAuth::BearerToken(String::from("token-123")));

        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer token-123")
        );
    }

    #[test]
    fn query_auth_is_percent_encoded() {
        let request = HttpRequest::get("https://aligulac.com/api/v1/player/?format=json")
            .with_auth(&HttpAuth::QueryParam {
                name: String::from("apikey"),
                value: String::from("a b&c"),
            });

        assert_eq!(
            request.url,
            "https://aligulac.com/api/v1/player/?format=json&apikey=a%20b%26c"
        );
    }

    #[tokio::test]
    async fn interceptor_chain_runs_before_transport() {
        let scripted = Arc::new(ScriptedHttpClient::new([Ok(HttpResponse::ok_json("{}"))]));
        let client = InterceptedHttpClient::new(scripted.clone())
            .with_interceptor(Arc::new(BearerTokenInterceptor::new(Arc::new(StaticToken))))
            .with_interceptor(Arc::new(HttpAuth::Header {
                name: String::from("Client-Id"),
                value: String::from("abc"),
            }));

        client
            .execute(HttpRequest::get("https://api.twitch.tv/helix/users"))
            .await
            .expect("response");

        let seen = scripted.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].headers.get("authorization").map(String::as_str),
            Some("Bearer token-123")
        );
        assert_eq!(seen[0].headers.get("client-id").map(String::as_str), Some("abc"));
    }

    #[tokio::test]
    async fn scripted_transport_fails_once_exhausted() {
        let client = ScriptedHttpClient::new([Ok(HttpResponse::new(503, ""))]);

        let first = client.execute(HttpRequest::get("https://x.test")).await;
        assert_eq!(first.map(|response| response.status), Ok(503));

        let second = client
            .execute(HttpRequest::get("https://x.test"))
            .await
            .expect_err("exhausted");
        assert_eq!(second.kind(), HttpErrorKind::Connect);
        assert_eq!(client.call_count(), 2);
    }
}

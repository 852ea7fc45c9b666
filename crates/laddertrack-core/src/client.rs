//! Generic provider client.
//!
//! One [`ProviderClient`] exists per external API. It owns the transport handle and
//! retry policy (both replaceable while requests are in flight), the immutable
//! [`ProviderConfig`], and the provider's [`HealthMonitor`].
//!
//! # Outcomes
//!
//! Every fetch operation distinguishes three results:
//!
//! | Result | Meaning |
//! |--------|---------|
//! | `Ok(Some(value))` | decoded value |
//! | `Ok(None)` | confirmed absent (status in the empty set) |
//! | `Err(error)` | failed after the retry policy gave up |
//!
//! Health is recorded once per logical operation, never per physical attempt.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use futures::future::BoxFuture;
use futures::stream::{self, Stream};
use serde::de::DeserializeOwned;

use crate::batch::{execute_plan, execute_plan_with, BatchErrorMode, BatchOutcome, BatchPlan};
use crate::classify::{classify_status, ResponseClass};
use crate::config::ProviderConfig;
use crate::error::ClientError;
use crate::health::{HealthMonitor, HealthRegistry};
use crate::http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpRequest, InterceptedHttpClient,
    ReqwestHttpClient,
};
use crate::retry::{AttemptOutcome, RetryDecision, RetryPolicy};
use crate::throttling::Throttle;
use crate::ProviderId;

/// Uniform fetch contract shared by every provider integration.
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn config(&self) -> &ProviderConfig;

    /// Execute `request` under the provider's retry and classification rules and
    /// return the raw body, or `None` for a confirmed-absent resource.
    fn fetch<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<Option<String>, ClientError>>;
}

pub struct ProviderClient {
    config: ProviderConfig,
    transport: ArcSwap<Arc<dyn HttpClient>>,
    retry_policy: ArcSwap<RetryPolicy>,
    health: Arc<HealthMonitor>,
    throttle: Option<Throttle>,
}

impl ProviderClient {
    pub fn new(
        config: ProviderConfig,
        transport: Arc<dyn HttpClient>,
        health: Arc<HealthMonitor>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let retry_policy = config.retry_policy();
        let throttle = config.rate_limit.map(Throttle::new);

        Ok(Self {
            config,
            transport: ArcSwap::from_pointee(transport),
            retry_policy: ArcSwap::from_pointee(retry_policy),
            health,
            throttle,
        })
    }

    /// Client reporting into the registry's monitor for `config.provider`.
    pub fn with_registry(
        config: ProviderConfig,
        transport: Arc<dyn HttpClient>,
        registry: &HealthRegistry,
    ) -> Result<Self, ClientError> {
        let health = registry.monitor(config.provider);
        Self::new(config, transport, health)
    }

    /// Production client: environment-overridden config over a `reqwest` transport,
    /// authenticated when `LADDERTRACK_<PROVIDER>_TOKEN` is set.
    pub fn from_env(provider: ProviderId, registry: &HealthRegistry) -> Result<Self, ClientError> {
        let config = ProviderConfig::from_env(provider)
            .map_err(|error| ClientError::invalid_configuration(error.to_string()))?;
        let reqwest = ReqwestHttpClient::new(&config.transport())
            .map_err(|error| ClientError::invalid_configuration(error.to_string()))?;

        let transport: Arc<dyn HttpClient> = match config.token_from_env() {
            Some(token) => Arc::new(
                InterceptedHttpClient::new(Arc::new(reqwest))
                    .with_interceptor(Arc::new(auth_for(provider, token))),
            ),
            None => Arc::new(reqwest),
        };

        Self::with_registry(config, transport, registry)
    }

    pub fn id(&self) -> ProviderId {
        self.config.provider
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Current transport handle.
    pub fn transport(&self) -> Arc<dyn HttpClient> {
        Arc::clone(&**self.transport.load())
    }

    /// Replace the transport. Operations already running keep the old one.
    pub fn set_transport(&self, transport: Arc<dyn HttpClient>) {
        self.transport.store(Arc::new(transport));
        tracing::info!(provider = %self.config.provider, "transport replaced");
    }

    pub fn retry_policy(&self) -> Arc<RetryPolicy> {
        self.retry_policy.load_full()
    }

    /// Replace the retry policy. Operations already running keep the old one.
    pub fn set_retry_policy(&self, policy: RetryPolicy) {
        self.retry_policy.store(Arc::new(policy));
    }

    pub fn url(&self, path: &str) -> String {
        self.config.url(path)
    }

    /// GET request for `path` carrying the configured per-attempt timeout.
    pub fn request(&self, path: &str) -> HttpRequest {
        HttpRequest::get(self.url(path)).with_timeout_ms(self.config.request_timeout_ms)
    }

    /// Run one logical operation: attempt, classify, retry per policy, record health.
    pub async fn execute<T, D>(&self, request: HttpRequest, decode: D) -> Result<Option<T>, ClientError>
    where
        D: Fn(&str) -> Result<T, String>,
    {
        let provider = self.config.provider;
        let transport = self.transport();
        let policy = self.retry_policy();
        let mut context = policy.context();

        let result = loop {
            let attempt = self.attempt(&*transport, &request, &decode).await;
            let outcome = match attempt.as_ref().err().map(attempt_outcome) {
                None => AttemptOutcome::Success,
                Some(Some(outcome)) => outcome,
                Some(None) => break attempt,
            };
            context.record(outcome);

            match (attempt, policy.decide(&context)) {
                (Ok(value), _) => break Ok(value),
                (Err(error), RetryDecision::Stop) => {
                    if error.retryable() {
                        tracing::warn!(
                            %provider,
                            attempts = context.attempt(),
                            %error,
                            "retries exhausted"
                        );
                    }
                    break Err(error);
                }
                (Err(error), RetryDecision::Retry { delay }) => {
                    tracing::debug!(
                        %provider,
                        attempt = context.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        };

        self.health.record(result.is_err());
        result
    }

    /// [`execute`](Self::execute) decoding the body as JSON.
    pub async fn execute_json<T>(&self, request: HttpRequest) -> Result<Option<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        self.execute(request, decode_json::<T>).await
    }

    /// Single entity at `path`.
    pub async fn fetch_one<T>(&self, path: &str) -> Result<Option<T>, ClientError>
    where
        T: DeserializeOwned,
    {
        self.execute_json(self.request(path)).await
    }

    /// Collected list at `path`.
    pub async fn fetch_all<T>(&self, path: &str) -> Result<Option<Vec<T>>, ClientError>
    where
        T: DeserializeOwned,
    {
        self.execute_json(self.request(path)).await
    }

    /// Lazily fetch pages `0, 1, 2, ...` built by `page_request`.
    ///
    /// Each page is one logical operation. The stream ends at the first empty page
    /// (empty list or empty status) and after yielding the first error.
    pub fn fetch_pages<'a, T, F>(
        &'a self,
        page_request: F,
    ) -> impl Stream<Item = Result<Vec<T>, ClientError>> + 'a
    where
        T: DeserializeOwned + 'a,
        F: Fn(u32) -> HttpRequest + 'a,
    {
        stream::unfold(Some((0_u32, page_request)), move |state| async move {
            let (page, page_request) = state?;
            let request = page_request(page);
            match self.execute_json::<Vec<T>>(request).await {
                Ok(Some(items)) if !items.is_empty() => {
                    Some((Ok(items), Some((page + 1, page_request))))
                }
                Ok(_) => None,
                Err(error) => Some((Err(error), None)),
            }
        })
    }

    /// Fetch a key set in provider-sized batches; each batch answers a JSON array.
    pub async fn fetch_batched<K, T, B>(
        &self,
        keys: impl IntoIterator<Item = K>,
        build: B,
    ) -> Result<Vec<T>, ClientError>
    where
        K: Eq + Hash + Clone,
        T: DeserializeOwned,
        B: Fn(&[K]) -> HttpRequest,
    {
        self.fetch_batched_by(keys, build, decode_json::<Vec<T>>).await
    }

    /// Batched fetch with a custom decoder for the per-batch body.
    pub async fn fetch_batched_by<K, T, B, D>(
        &self,
        keys: impl IntoIterator<Item = K>,
        build: B,
        decode: D,
    ) -> Result<Vec<T>, ClientError>
    where
        K: Eq + Hash + Clone,
        B: Fn(&[K]) -> HttpRequest,
        D: Fn(&str) -> Result<Vec<T>, String>,
    {
        let plan = self.plan(keys)?;
        let decode = &decode;
        execute_plan(plan, |keys| {
            let request = build(&keys);
            async move {
                self.execute(request, decode)
                    .await
                    .map(Option::unwrap_or_default)
            }
        })
        .await
    }

    /// Batched fetch that keeps going past failed batches under
    /// [`BatchErrorMode::Tolerate`].
    pub async fn fetch_batched_with<K, T, B>(
        &self,
        keys: impl IntoIterator<Item = K>,
        mode: BatchErrorMode,
        build: B,
    ) -> Result<BatchOutcome<K, T>, ClientError>
    where
        K: Eq + Hash + Clone,
        T: DeserializeOwned,
        B: Fn(&[K]) -> HttpRequest,
    {
        let plan = self.plan(keys)?;
        execute_plan_with(plan, mode, |keys| {
            let request = build(&keys);
            async move {
                self.execute_json::<Vec<T>>(request)
                    .await
                    .map(Option::unwrap_or_default)
            }
        })
        .await
    }

    fn plan<K>(&self, keys: impl IntoIterator<Item = K>) -> Result<BatchPlan<K>, ClientError>
    where
        K: Eq + Hash + Clone,
    {
        BatchPlan::new(
            keys,
            self.config.max_batch_size,
            self.config.batch_concurrency,
        )
    }

    async fn attempt<T, D>(
        &self,
        transport: &dyn HttpClient,
        request: &HttpRequest,
        decode: &D,
    ) -> Result<Option<T>, ClientError>
    where
        D: Fn(&str) -> Result<T, String>,
    {
        let provider = self.config.provider;
        if let Some(throttle) = &self.throttle {
            throttle.acquire().await;
        }

        let response =
            match tokio::time::timeout(request.timeout(), transport.execute(request.clone())).await {
                Ok(Ok(response)) => response,
                Ok(Err(error)) => return Err(transport_error(provider, error)),
                Err(_) => {
                    return Err(ClientError::Timeout {
                        provider,
                        message: format!("no response within {}ms", request.timeout_ms),
                    })
                }
            };

        match classify_status(response.status, &self.config.empty_statuses) {
            ResponseClass::Value => decode(&response.body)
                .map(Some)
                .map_err(|message| ClientError::MalformedResponse { provider, message }),
            ResponseClass::Empty => {
                tracing::debug!(%provider, status = response.status, url = %request.url, "empty response");
                Ok(None)
            }
            ResponseClass::FailFast => Err(ClientError::ClientRequest {
                provider,
                status: response.status,
            }),
            ResponseClass::Retry => Err(ClientError::ServerError {
                provider,
                status: response.status,
            }),
        }
    }
}

impl Provider for ProviderClient {
    fn id(&self) -> ProviderId {
        self.config.provider
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn fetch<'a>(
        &'a self,
        request: HttpRequest,
    ) -> BoxFuture<'a, Result<Option<String>, ClientError>> {
        Box::pin(self.execute(request, |body: &str| Ok(body.to_owned())))
    }
}

/// Run `operation` under an overall deadline.
///
/// When the deadline elapses the operation future is dropped, which aborts its
/// outstanding attempts and frees any batching slots it held.
pub async fn with_deadline<T, F>(deadline: Duration, operation: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    tokio::time::timeout(deadline, operation)
        .await
        .map_err(|_| ClientError::Cancelled {
            deadline_ms: deadline.as_millis() as u64,
        })?
}

pub fn decode_json<T: DeserializeOwned>(body: &str) -> Result<T, String> {
    serde_json::from_str(body).map_err(|error| error.to_string())
}

/// Credential style expected by each provider.
pub fn auth_for(provider: ProviderId, token: String) -> HttpAuth {
    match provider {
        ProviderId::Youtube => HttpAuth::QueryParam {
            name: String::from("key"),
            value: token,
        },
        ProviderId::Aligulac => HttpAuth::QueryParam {
            name: String::from("apikey"),
            value: token,
        },
        ProviderId::Discord => HttpAuth::Header {
            name: String::from("authorization"),
            value: format!("Bot {token}"),
        },
        _ => HttpAuth::BearerToken(token),
    }
}

fn transport_error(provider: ProviderId, error: HttpError) -> ClientError {
    let message = error.message().to_owned();
    match error.kind() {
        HttpErrorKind::Timeout => ClientError::Timeout { provider, message },
        HttpErrorKind::Body => ClientError::MalformedResponse { provider, message },
        HttpErrorKind::Connect | HttpErrorKind::Other => ClientError::Transport { provider, message },
    }
}

fn attempt_outcome(error: &ClientError) -> Option<AttemptOutcome> {
    match error {
        ClientError::Transport { .. } => Some(AttemptOutcome::TransportError),
        ClientError::Timeout { .. } => Some(AttemptOutcome::TimeoutError),
        ClientError::MalformedResponse { .. } => Some(AttemptOutcome::BodyError),
        ClientError::ClientRequest { status, .. } | ClientError::ServerError { status, .. } => {
            Some(AttemptOutcome::StatusError(*status))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde::Deserialize;

    use super::*;
    use crate::health::InMemoryVariableStore;
    use crate::http_client::{FnHttpClient, HttpResponse, ScriptedHttpClient};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Player {
        id: u32,
        tag: String,
    }

    fn client(script: Arc<ScriptedHttpClient>) -> ProviderClient {
        let config = ProviderConfig {
            max_batch_size: 2,
            batch_concurrency: 2,
            ..ProviderConfig::default_for(ProviderId::Aligulac)
        };
        let health = Arc::new(HealthMonitor::new(
            "aligulac",
            Arc::new(InMemoryVariableStore::new()),
        ));
        let client = ProviderClient::new(config, script, health).expect("client");
        client.set_retry_policy(RetryPolicy::immediate(3));
        client
    }

    #[tokio::test]
    async fn success_after_transient_failures() {
        let script = Arc::new(ScriptedHttpClient::new([
            Err(HttpError::connect("connection reset")),
            Ok(HttpResponse::new(502, "bad gateway")),
            Ok(HttpResponse::ok_json(r#"{"id":1,"tag":"Serral"}"#)),
        ]));
        let client = client(script.clone());

        let player = client.fetch_one::<Player>("player/1").await.expect("player");

        assert_eq!(
            player,
            Some(Player {
                id: 1,
                tag: String::from("Serral")
            })
        );
        assert_eq!(script.call_count(), 3);
        assert_eq!(client.health().pending(), (1, 0));
    }

    #[tokio::test]
    async fn exhausted_retries_surface_last_error_and_count_once() {
        let script = Arc::new(ScriptedHttpClient::new([
            Ok(HttpResponse::new(500, "")),
            Err(HttpError::timeout("read timeout")),
            Ok(HttpResponse::ok_json("{truncated")),
        ]));
        let client = client(script.clone());

        let error = client
            .fetch_one::<Player>("player/1")
            .await
            .expect_err("should fail");

        assert!(matches!(error, ClientError::MalformedResponse { .. }));
        assert_eq!(script.call_count(), 3);
        assert_eq!(client.health().pending(), (1, 1));
    }

    #[tokio::test]
    async fn empty_status_is_a_successful_absence() {
        let script = Arc::new(ScriptedHttpClient::new([Ok(HttpResponse::new(404, ""))]));
        let client = client(script.clone());

        let player = client.fetch_one::<Player>("player/404").await.expect("empty");

        assert_eq!(player, None);
        assert_eq!(script.call_count(), 1);
        assert_eq!(client.health().pending(), (1, 0));
    }

    #[tokio::test]
    async fn client_errors_fail_fast() {
        let script = Arc::new(ScriptedHttpClient::new([
            Ok(HttpResponse::new(401, "unauthorized")),
            Ok(HttpResponse::ok_json(r#"{"id":1,"tag":"x"}"#)),
        ]));
        let client = client(script.clone());

        let error = client
            .fetch_one::<Player>("player/1")
            .await
            .expect_err("should fail");

        assert!(matches!(error, ClientError::ClientRequest { status: 401, .. }));
        assert_eq!(script.call_count(), 1);
        assert_eq!(client.health().pending(), (1, 1));
    }

    #[tokio::test]
    async fn stalled_transport_times_out_per_attempt() {
        let script = Arc::new(
            ScriptedHttpClient::new([
                Ok(HttpResponse::ok_json("[]")),
                Ok(HttpResponse::ok_json("[]")),
            ])
            .with_latency(Duration::from_millis(200)),
        );
        let client = client(script.clone());
        client.set_retry_policy(RetryPolicy::immediate(2));

        let request = client.request("player").with_timeout_ms(10);
        let error = client
            .execute_json::<Vec<Player>>(request)
            .await
            .expect_err("timeout");

        assert!(matches!(error, ClientError::Timeout { .. }));
        assert_eq!(script.call_count(), 2);
    }

    #[tokio::test]
    async fn swapped_transport_is_used_by_new_operations() {
        let first = Arc::new(ScriptedHttpClient::new([Ok(HttpResponse::new(404, ""))]));
        let second = Arc::new(ScriptedHttpClient::new([Ok(HttpResponse::ok_json(
            r#"{"id":2,"tag":"Clem"}"#,
        ))]));
        let client = client(first.clone());

        assert_eq!(client.fetch_one::<Player>("player/2").await, Ok(None));
        client.set_transport(second.clone());
        let player = client.fetch_one::<Player>("player/2").await.expect("player");

        assert_eq!(player.map(|player| player.id), Some(2));
        assert_eq!(first.call_count(), 1);
        assert_eq!(second.call_count(), 1);
    }

    #[tokio::test]
    async fn batched_fetch_sends_provider_sized_requests() {
        let transport = Arc::new(FnHttpClient::new(|request: &HttpRequest| {
            let ids = request.url.rsplit("id__in=").next().unwrap_or_default();
            let body: Vec<String> = ids
                .split(',')
                .map(|id| format!(r#"{{"id":{id},"tag":"p{id}"}}"#))
                .collect();
            Ok(HttpResponse::ok_json(format!("[{}]", body.join(","))))
        }));
        let client = client(Arc::new(ScriptedHttpClient::default()));
        client.set_transport(transport);

        let players: Vec<Player> = client
            .fetch_batched([1_u32, 2, 3, 4, 5], |ids| {
                let ids: Vec<String> = ids.iter().map(u32::to_string).collect();
                client.request(&format!("player/?id__in={}", ids.join(",")))
            })
            .await
            .expect("players");

        let mut ids: Vec<u32> = players.iter().map(|player| player.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(client.health().pending(), (3, 0));
    }

    #[tokio::test]
    async fn pages_stop_at_first_empty_page() {
        let script = Arc::new(ScriptedHttpClient::new([
            Ok(HttpResponse::ok_json(r#"[{"id":1,"tag":"a"},{"id":2,"tag":"b"}]"#)),
            Ok(HttpResponse::ok_json(r#"[{"id":3,"tag":"c"}]"#)),
            Ok(HttpResponse::ok_json("[]")),
        ]));
        let client = client(script.clone());

        let pages: Vec<_> = client
            .fetch_pages::<Player, _>(|page| client.request(&format!("player/?page={page}")))
            .collect()
            .await;

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].as_ref().map(Vec::len), Ok(2));
        assert_eq!(script.call_count(), 3);
        assert!(script.requests()[2].url.ends_with("page=2"));
    }

    #[tokio::test]
    async fn deadline_cancels_outstanding_attempts() {
        let script = Arc::new(
            ScriptedHttpClient::new([Ok(HttpResponse::ok_json("{}"))])
                .with_latency(Duration::from_secs(5)),
        );
        let client = client(script);

        let error = with_deadline(
            Duration::from_millis(20),
            client.fetch_one::<Player>("player/1"),
        )
        .await
        .expect_err("deadline");

        assert_eq!(error, ClientError::Cancelled { deadline_ms: 20 });
        assert_eq!(client.health().pending(), (0, 0));
    }

    #[tokio::test]
    async fn provider_trait_returns_raw_body() {
        let script = Arc::new(ScriptedHttpClient::new([Ok(HttpResponse::ok_json("raw"))]));
        let client = client(script);
        let provider: &dyn Provider = &client;

        let body = provider
            .fetch(client.request("anything"))
            .await
            .expect("body");

        assert_eq!(body.as_deref(), Some("raw"));
        assert_eq!(provider.id(), ProviderId::Aligulac);
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = ProviderConfig {
            max_batch_size: 0,
            ..ProviderConfig::default_for(ProviderId::Twitch)
        };
        let health = Arc::new(HealthMonitor::new(
            "twitch",
            Arc::new(InMemoryVariableStore::new()),
        ));

        let result = ProviderClient::new(config, Arc::new(ScriptedHttpClient::default()), health);

        assert!(matches!(result, Err(ClientError::InvalidConfiguration(_))));
    }

    #[test]
    fn provider_specific_auth_styles() {
        assert_eq!(
            auth_for(ProviderId::Discord, String::from("abc")),
            HttpAuth::Header {
                name: String::from("authorization"),
                value: String::from("Bot abc"),
            }
        );
        assert_eq!(
            auth_for(ProviderId::Twitch, String::from("abc")),
            HttpAuth::BearerToken(String::from("abc"))
        );
    }
}

//! The work-item client.
//!
//! Every operation runs through the same path: build the native request,
//! send it under the retry engine and the target's circuit breaker, then
//! translate the response into the canonical model.

use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::adapters::{
    self, native_id, native_version, page_request, read_page, to_canonical, Page, PageCursor,
    PlatformMapping,
};
use crate::cancellation::CancellationToken;
use crate::config::{ClientConfig, ClientPolicy};
use crate::core::{ErrorKind, Failure, Outcome};
use crate::errors::WorkbridgeError;
use crate::idempotency::{payload_hash, DedupCache, DedupLookup, IdempotencyKey};
use crate::model::{
    BackendTarget, CanonicalState, CanonicalWorkItem, WorkItemDraft, WorkItemPatch, WorkItemQuery,
};
use crate::observability::{EventSink, NoOpEventSink};
use crate::resilience::{into_outcome, BreakerRegistry, BreakerSnapshot, RetryEngine};
use crate::transport::{AuthScheme, CredentialProvider, ResponseEnvelope, Transport, TransportRequest};

struct ClientInner {
    target: BackendTarget,
    target_id: String,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    retry: RetryEngine,
    breakers: Arc<BreakerRegistry>,
    dedup: DedupCache,
    sink: Arc<dyn EventSink>,
    page_size: u32,
}

/// A resilient client for one backend target.
///
/// Cheap to clone; clones share breaker state and the dedup cache.
#[derive(Clone)]
pub struct WorkItemClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for WorkItemClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItemClient")
            .field("target", &self.inner.target_id)
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}

/// Builds a [`WorkItemClient`].
pub struct WorkItemClientBuilder {
    target: BackendTarget,
    credentials: Option<Arc<dyn CredentialProvider>>,
    transport: Option<Arc<dyn Transport>>,
    auth: Option<AuthScheme>,
    policy: ClientPolicy,
    sink: Arc<dyn EventSink>,
    breakers: Option<Arc<BreakerRegistry>>,
    backoff_seed: Option<u64>,
}

impl WorkItemClientBuilder {
    /// Sets the credential provider, consulted once per attempt.
    #[must_use]
    pub fn credentials(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.credentials = Some(Arc::new(provider));
        self
    }

    /// Replaces the HTTP transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Overrides the backend's default auth scheme.
    #[must_use]
    pub fn auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth = Some(scheme);
        self
    }

    /// Sets retry, breaker and cache settings.
    #[must_use]
    pub fn policy(mut self, policy: ClientPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Routes lifecycle events to a sink.
    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Shares breaker state with other clients.
    #[must_use]
    pub fn breakers(mut self, registry: Arc<BreakerRegistry>) -> Self {
        self.breakers = Some(registry);
        self
    }

    /// Makes backoff jitter deterministic.
    #[must_use]
    pub fn backoff_seed(mut self, seed: u64) -> Self {
        self.backoff_seed = Some(seed);
        self
    }

    /// Validates the settings and builds the client.
    pub fn build(self) -> Result<WorkItemClient, WorkbridgeError> {
        let mut config = ClientConfig::new(self.target.backend, self.target.base_url.clone())
            .with_policy(self.policy);
        config.project = self.target.project.clone();
        config.auth = self.auth;
        let report = config.validate();
        for warning in &report.warnings {
            tracing::warn!(target_id = %self.target.target_id(), warning = %warning, "Client configuration warning");
        }
        report.into_result()?;

        let credentials = self.credentials.ok_or(WorkbridgeError::Missing("credential provider"))?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&config)?,
        };

        let mut backoff = self.policy.backoff();
        if let Some(seed) = self.backoff_seed {
            backoff = backoff.with_seed(seed);
        }
        let retry = RetryEngine::new(self.policy.retry_policy(), backoff).with_event_sink(self.sink.clone());
        let breakers = self.breakers.unwrap_or_else(|| {
            Arc::new(
                BreakerRegistry::new(self.policy.breaker_config()).with_event_sink(self.sink.clone()),
            )
        });

        let target_id = self.target.target_id();
        debug!(target_id = %target_id, "Work item client ready");

        Ok(WorkItemClient {
            inner: Arc::new(ClientInner {
                target: self.target,
                target_id,
                transport,
                credentials,
                retry,
                breakers,
                dedup: DedupCache::new(self.policy.dedup_ttl()),
                sink: self.sink,
                page_size: self.policy.page_size,
            }),
        })
    }
}

#[cfg(feature = "http")]
fn default_transport(config: &ClientConfig) -> Result<Arc<dyn Transport>, WorkbridgeError> {
    use crate::transport::{HttpTransport, HttpTransportConfig};

    let mut http = HttpTransportConfig::new(config.base_url.trim(), config.auth_scheme());
    if let Some(timeout) = config.policy.retry_policy().per_attempt_timeout {
        http = http.with_timeout(timeout);
    }
    Ok(Arc::new(HttpTransport::new(http)?))
}

#[cfg(not(feature = "http"))]
fn default_transport(_config: &ClientConfig) -> Result<Arc<dyn Transport>, WorkbridgeError> {
    Err(WorkbridgeError::Missing("transport"))
}

impl WorkItemClient {
    /// Starts a builder for `target`.
    #[must_use]
    pub fn builder(target: BackendTarget) -> WorkItemClientBuilder {
        WorkItemClientBuilder {
            target,
            credentials: None,
            transport: None,
            auth: None,
            policy: ClientPolicy::default(),
            sink: Arc::new(NoOpEventSink),
            breakers: None,
            backoff_seed: None,
        }
    }

    /// Creates an HTTP client for `target`.
    pub fn new(
        target: BackendTarget,
        credentials: impl CredentialProvider + 'static,
        policy: ClientPolicy,
    ) -> Result<Self, WorkbridgeError> {
        Self::builder(target).credentials(credentials).policy(policy).build()
    }

    /// Creates an HTTP client from a configuration document.
    pub fn from_config(
        config: &ClientConfig,
        credentials: impl CredentialProvider + 'static,
    ) -> Result<Self, WorkbridgeError> {
        let mut builder = Self::builder(config.target())
            .credentials(credentials)
            .policy(config.policy);
        if let Some(auth) = &config.auth {
            builder = builder.auth_scheme(auth.clone());
        }
        builder.build()
    }

    /// The target this client talks to.
    #[must_use]
    pub fn target(&self) -> &BackendTarget {
        &self.inner.target
    }

    /// Breaker state for diagnostics.
    #[must_use]
    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.inner.breakers.breaker(&self.inner.target_id).snapshot()
    }

    /// Creates a work item at most once per idempotency key.
    pub async fn create_work_item(
        &self,
        draft: &WorkItemDraft,
        key: &IdempotencyKey,
    ) -> Outcome<CanonicalWorkItem> {
        self.create(draft, key, None).await
    }

    /// [`Self::create_work_item`] with cancellation.
    pub async fn create_work_item_with_cancel(
        &self,
        draft: &WorkItemDraft,
        key: &IdempotencyKey,
        cancel: &CancellationToken,
    ) -> Outcome<CanonicalWorkItem> {
        self.create(draft, key, Some(cancel)).await
    }

    /// Applies `patch` if the item is still at `expected_version`.
    ///
    /// A stale version is a terminal `Conflict`.
    pub async fn update_work_item(
        &self,
        id: &str,
        patch: &WorkItemPatch,
        expected_version: &str,
    ) -> Outcome<CanonicalWorkItem> {
        self.apply_update(id, patch, expected_version, None).await
    }

    /// [`Self::update_work_item`] with cancellation.
    pub async fn update_work_item_with_cancel(
        &self,
        id: &str,
        patch: &WorkItemPatch,
        expected_version: &str,
        cancel: &CancellationToken,
    ) -> Outcome<CanonicalWorkItem> {
        self.apply_update(id, patch, expected_version, Some(cancel)).await
    }

    /// Writes every field of `item` back, guarded by `expected_version`.
    pub async fn update(
        &self,
        item: &CanonicalWorkItem,
        expected_version: &str,
    ) -> Outcome<CanonicalWorkItem> {
        self.apply_update(item.id(), &WorkItemPatch::from_item(item), expected_version, None)
            .await
    }

    /// [`Self::update`] with cancellation.
    pub async fn update_with_cancel(
        &self,
        item: &CanonicalWorkItem,
        expected_version: &str,
        cancel: &CancellationToken,
    ) -> Outcome<CanonicalWorkItem> {
        self.apply_update(item.id(), &WorkItemPatch::from_item(item), expected_version, Some(cancel))
            .await
    }

    /// Reads one work item.
    pub async fn get_work_item(&self, id: &str) -> Outcome<CanonicalWorkItem> {
        self.fetch(id, None).await
    }

    /// [`Self::get_work_item`] with cancellation.
    pub async fn get_work_item_with_cancel(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Outcome<CanonicalWorkItem> {
        self.fetch(id, Some(cancel)).await
    }

    /// Lists work items, fetching pages as the stream is polled.
    ///
    /// A page that fails after retries ends the stream with that failure.
    /// A single item that cannot be translated is yielded as a failure and
    /// the listing continues.
    #[must_use]
    pub fn list_work_items(&self, query: WorkItemQuery) -> BoxStream<'static, Outcome<CanonicalWorkItem>> {
        self.list(query, None)
    }

    /// [`Self::list_work_items`] with cancellation.
    #[must_use]
    pub fn list_work_items_with_cancel(
        &self,
        query: WorkItemQuery,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Outcome<CanonicalWorkItem>> {
        self.list(query, Some(cancel))
    }

    async fn create(
        &self,
        draft: &WorkItemDraft,
        key: &IdempotencyKey,
        cancel: Option<&CancellationToken>,
    ) -> Outcome<CanonicalWorkItem> {
        let hash = payload_hash(draft);
        match self.inner.dedup.lookup(key, &hash) {
            DedupLookup::Hit(item) => {
                info!(target_id = %self.inner.target_id, key = %key, id = item.id(), "Create replayed from dedup cache");
                self.inner.sink.try_emit(
                    "idempotency.replayed",
                    Some(json!({"target": self.inner.target_id, "key": key.as_str(), "id": item.id()})),
                );
                return Ok(item);
            }
            DedupLookup::Mismatch => {
                return Err(Failure::local(
                    ErrorKind::ValidationFailed,
                    format!("idempotency key '{key}' was already used with a different payload"),
                ));
            }
            DedupLookup::Miss => {}
        }

        let plan = adapters::create(&self.inner.target, draft, key.as_str())?;
        let response = self.send_create(&plan.request, key, cancel).await?;
        let created = self.materialize(response.body, None, cancel).await?;
        self.inner.dedup.store(key, hash.clone(), created.clone());
        info!(target_id = %self.inner.target_id, id = created.id(), "Work item created");

        let Some(status) = plan.transition else {
            return Ok(created);
        };
        let item = self.settle_status(created, &status, cancel).await?;
        self.inner.dedup.store(key, hash, item.clone());
        Ok(item)
    }

    async fn apply_update(
        &self,
        id: &str,
        patch: &WorkItemPatch,
        expected_version: &str,
        cancel: Option<&CancellationToken>,
    ) -> Outcome<CanonicalWorkItem> {
        if expected_version.trim().is_empty() {
            return Err(Failure::local(
                ErrorKind::ValidationFailed,
                "update requires the version token the caller last read",
            ));
        }

        let plan = adapters::update(&self.inner.target, id, patch, expected_version)?;
        if !PlatformMapping::of(self.inner.target.backend).conditional_writes {
            self.check_version(id, expected_version, cancel).await?;
        }
        let response = self.send("update", &plan.request, cancel).await?;

        let written = self.materialize(response.body, Some(id), cancel).await?;
        let item = match plan.transition {
            Some(status) => self.settle_status(written, &status, cancel).await?,
            None => written,
        };
        info!(
            target_id = %self.inner.target_id,
            id = item.id(),
            version = item.version_token(),
            "Work item updated"
        );
        Ok(item)
    }

    /// Fails with `Conflict` when the stored item has moved past
    /// `expected_version`. A write by another client between this read and
    /// the update is not detected.
    async fn check_version(
        &self,
        id: &str,
        expected_version: &str,
        cancel: Option<&CancellationToken>,
    ) -> Outcome<()> {
        let request = adapters::get(&self.inner.target, id)?;
        let current = self.send("version_check", &request, cancel).await?;
        let backend = self.inner.target.backend;
        let version = native_version(&current.body, backend).unwrap_or_default();
        if version == expected_version {
            return Ok(());
        }
        debug!(target_id = %self.inner.target_id, id, expected = expected_version, current = %version, "Stale version");
        Err(Failure::terminal(
            ErrorKind::Conflict,
            format!("{id} is at version '{version}', not '{expected_version}'"),
        ))
    }

    async fn fetch(&self, id: &str, cancel: Option<&CancellationToken>) -> Outcome<CanonicalWorkItem> {
        let request = adapters::get(&self.inner.target, id)?;
        let response = self.send("get", &request, cancel).await?;
        to_canonical(&response.body, self.inner.target.backend)
    }

    /// Turns a write response into an item, reading it back when the
    /// response is only a stub.
    async fn materialize(
        &self,
        body: Value,
        known_id: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> Outcome<CanonicalWorkItem> {
        let backend = self.inner.target.backend;
        if native_version(&body, backend).is_some() {
            return to_canonical(&body, backend);
        }

        let id = native_id(&body, backend)
            .or_else(|| known_id.map(str::to_string))
            .ok_or_else(|| {
                Failure::terminal(
                    ErrorKind::Unknown,
                    format!("{backend} write response carried neither an item nor its id"),
                )
            })?;
        debug!(target_id = %self.inner.target_id, id = %id, "Reading back stub write response");
        self.fetch(&id, cancel).await
    }

    /// Moves `item` to the native `status` unless it is already there.
    async fn settle_status(
        &self,
        item: CanonicalWorkItem,
        status: &str,
        cancel: Option<&CancellationToken>,
    ) -> Outcome<CanonicalWorkItem> {
        let mapping = PlatformMapping::of(self.inner.target.backend);
        let current = match item.state {
            CanonicalState::Unrecognized => item.native_state(),
            state => mapping.native_state(state),
        };
        if current.is_some_and(|current| current.eq_ignore_ascii_case(status)) {
            return Ok(item);
        }
        self.transition(item.id(), status, cancel).await?;
        self.fetch(item.id(), cancel).await
    }

    async fn transition(
        &self,
        id: &str,
        status: &str,
        cancel: Option<&CancellationToken>,
    ) -> Outcome<()> {
        let target = &self.inner.target;
        let listing = self
            .send("transitions", &adapters::jira_transitions(target, id)?, cancel)
            .await?;
        let transition_id = adapters::find_transition(&listing.body, status).ok_or_else(|| {
            Failure::terminal(
                ErrorKind::ValidationFailed,
                format!("no transition to '{status}' is available for {id}"),
            )
        })?;
        self.send("transition", &adapters::jira_transition(target, id, &transition_id)?, cancel)
            .await?;
        debug!(target_id = %self.inner.target_id, id, status, "Status transitioned");
        Ok(())
    }

    async fn send(
        &self,
        operation: &str,
        request: &TransportRequest,
        cancel: Option<&CancellationToken>,
    ) -> Outcome<ResponseEnvelope> {
        let inner = &self.inner;
        let breaker = inner.breakers.breaker(&inner.target_id);
        inner
            .retry
            .execute(operation, &breaker, cancel, |attempt| async move {
                let credential = inner.credentials.credential();
                trace!(operation, attempt, method = %request.method, path = %request.path, "Attempt");
                into_outcome(inner.transport.send(request, &credential).await)
            })
            .await
    }

    /// Sends a create. Every retry first looks for the item an earlier
    /// attempt may have created and answers with it when found.
    async fn send_create(
        &self,
        request: &TransportRequest,
        key: &IdempotencyKey,
        cancel: Option<&CancellationToken>,
    ) -> Outcome<ResponseEnvelope> {
        let inner = &self.inner;
        let backend = inner.target.backend;
        let marker = adapters::key_marker(key.as_str());
        let lookup = adapters::marker_lookup(&inner.target, &marker)?;
        let breaker = inner.breakers.breaker(&inner.target_id);
        let (marker, lookup) = (&marker, &lookup);

        inner
            .retry
            .execute("create", &breaker, cancel, |attempt| async move {
                let credential = inner.credentials.credential();
                if attempt > 1 {
                    trace!(attempt, path = %lookup.path, "Looking for an earlier create");
                    let found = into_outcome(inner.transport.send(lookup, &credential).await)?;
                    if let Some(native) = adapters::find_marked(backend, &found.body, marker) {
                        info!(target_id = %inner.target_id, key = %key, "Earlier create attempt landed");
                        return Ok(ResponseEnvelope::new(200, native));
                    }
                }
                trace!(attempt, method = %request.method, path = %request.path, "Attempt");
                into_outcome(inner.transport.send(request, &credential).await)
            })
            .await
    }

    async fn fetch_page(
        &self,
        query: &WorkItemQuery,
        cursor: &PageCursor,
        cancel: Option<&CancellationToken>,
    ) -> Outcome<Option<Page>> {
        let page_size = query.page_size.unwrap_or(self.inner.page_size);
        let Some(request) = page_request(&self.inner.target, query, cursor, page_size)? else {
            return Ok(None);
        };
        let response = self.send("list", &request, cancel).await?;
        read_page(self.inner.target.backend, cursor, page_size, &response).map(Some)
    }

    fn list(
        &self,
        query: WorkItemQuery,
        cancel: Option<CancellationToken>,
    ) -> BoxStream<'static, Outcome<CanonicalWorkItem>> {
        let state = Listing {
            client: self.clone(),
            query,
            cancel,
            cursor: PageCursor::Start,
            buffer: VecDeque::new(),
            yielded: 0,
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            let item = state.next_item().await?;
            Some((item, state))
        })
        .boxed()
    }
}

struct Listing {
    client: WorkItemClient,
    query: WorkItemQuery,
    cancel: Option<CancellationToken>,
    cursor: PageCursor,
    buffer: VecDeque<Value>,
    yielded: usize,
    finished: bool,
}

impl Listing {
    async fn next_item(&mut self) -> Option<Outcome<CanonicalWorkItem>> {
        let backend = self.client.inner.target.backend;
        loop {
            if self.finished || self.query.limit.is_some_and(|limit| self.yielded >= limit) {
                return None;
            }

            if let Some(native) = self.buffer.pop_front() {
                match to_canonical(&native, backend) {
                    Ok(item) if !self.query.matches(&item) => continue,
                    Ok(item) => {
                        self.yielded += 1;
                        return Some(Ok(item));
                    }
                    Err(failure) => return Some(Err(failure)),
                }
            }

            match self
                .client
                .fetch_page(&self.query, &self.cursor, self.cancel.as_ref())
                .await
            {
                Ok(Some(page)) => {
                    trace!(items = page.items.len(), "Page received");
                    self.buffer.extend(page.items);
                    self.cursor = page.next;
                }
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(failure) => {
                    self.finished = true;
                    return Some(Err(failure));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Backend, WorkItemType};
    use crate::transport::{Credential, Method, MockCredentialProvider};
    use crate::testing::ScriptedTransport;
    use pretty_assertions::assert_eq;

    fn github() -> BackendTarget {
        BackendTarget::new(Backend::GitHub, "https://api.github.com").with_project("octo/app")
    }

    fn issue(number: u64, updated_at: &str) -> Value {
        json!({
            "number": number,
            "title": "Flaky test",
            "state": "open",
            "updated_at": updated_at,
        })
    }

    #[test]
    fn test_build_requires_credentials() {
        let err = WorkItemClient::builder(github())
            .transport(Arc::new(ScriptedTransport::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, WorkbridgeError::Missing("credential provider")));
    }

    #[test]
    fn test_build_rejects_invalid_target() {
        let err = WorkItemClient::builder(BackendTarget::new(Backend::GitHub, "api.github.com"))
            .credentials(Credential::new("t"))
            .transport(Arc::new(ScriptedTransport::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, WorkbridgeError::Config(_)));
    }

    #[tokio::test]
    async fn test_credential_requested_per_attempt() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(ResponseEnvelope::new(502, Value::Null))
                .respond(ResponseEnvelope::new(200, issue(7, "2024-05-01T00:00:00Z"))),
        );
        let mut provider = MockCredentialProvider::new();
        provider
            .expect_credential()
            .times(2)
            .returning(|| Credential::new("rotating"));

        let policy = ClientPolicy {
            base_delay_ms: 1,
            max_delay_ms: 2,
            ..ClientPolicy::default()
        };
        let client = WorkItemClient::builder(github())
            .credentials(provider)
            .transport(transport.clone())
            .policy(policy)
            .build()
            .unwrap();

        let item = client.get_work_item("7").await.unwrap();
        assert_eq!(item.id(), "7");
        assert_eq!(item.item_type, WorkItemType::Issue);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_update_requires_version() {
        let transport = Arc::new(ScriptedTransport::new());
        let client = WorkItemClient::builder(github())
            .credentials(Credential::new("t"))
            .transport(transport.clone())
            .build()
            .unwrap();

        let failure = client
            .update_work_item("7", &WorkItemPatch::new().with_title("x"), " ")
            .await
            .unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::ValidationFailed);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_stub_update_response_is_read_back() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(ResponseEnvelope::new(200, issue(7, "2024-05-01T00:00:00Z")))
                .respond(ResponseEnvelope::new(204, Value::Null))
                .respond(ResponseEnvelope::new(200, issue(7, "2024-05-02T00:00:00Z"))),
        );
        let client = WorkItemClient::builder(github())
            .credentials(Credential::new("t"))
            .transport(transport.clone())
            .build()
            .unwrap();

        let item = client
            .update_work_item("7", &WorkItemPatch::new().with_title("x"), "2024-05-01T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(item.version_token(), "2024-05-02T00:00:00Z");

        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[1].method, Method::Patch);
        assert_eq!(requests[1].header("if-match"), Some("2024-05-01T00:00:00Z"));
        assert_eq!(requests[2].path, "/repos/octo/app/issues/7");
    }

    #[tokio::test]
    async fn test_stale_read_stops_update_before_write() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .respond(ResponseEnvelope::new(200, issue(7, "2024-05-03T00:00:00Z"))),
        );
        let client = WorkItemClient::builder(github())
            .credentials(Credential::new("t"))
            .transport(transport.clone())
            .build()
            .unwrap();

        let failure = client
            .update_work_item("7", &WorkItemPatch::new().with_title("x"), "2024-05-01T00:00:00Z")
            .await
            .unwrap_err();

        assert_eq!(failure.kind(), ErrorKind::Conflict);
        assert!(!failure.is_retryable());
        assert_eq!(transport.call_count(), 1);
        assert!(transport.requests().iter().all(|r| r.method == Method::Get));
    }
}

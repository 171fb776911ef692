//! The per-request hot path (spec §4.H): auth, shape classification,
//! guardrail anonymisation, limit clamping, candidate resolution, and
//! the candidate-traversal loop that applies cooldown/rate-limit/refresh
//! policy before handing off to a provider adapter.

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use relay_core::wire::{anthropic, openai};
use relay_core::{clamp_max_tokens, AuthKind, InboundShape, ProviderKind, Tier};
use relay_convert::{
    anthropic_to_openai_request, anthropic_to_openai_response, chat_completions_to_responses, openai_to_anthropic_request,
    openai_to_anthropic_response, responses_to_chat_completions,
};
use relay_guardrail::{anonymise_request, deanonymise_buffer, GuardrailConfig};
use relay_provider::response::{ResponseBody, UsageCounters};
use relay_router::{reorder_around_cooldowns, CooldownReason};
use serde_json::Value;

use crate::classify::classify_path;
use crate::context::Dispatcher;
use crate::error::DispatchError;
use crate::sse_pipeline::{self, UpstreamDialect};
use crate::{auth, usage};

pub type BoxByteStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

/// Everything a transport layer needs to hand a raw inbound request to
/// [`Dispatcher::dispatch`], independent of which HTTP framework reads
/// the bytes off the wire.
pub struct DispatchRequest {
    pub path: String,
    pub body: Bytes,
    pub x_api_key: Option<String>,
    pub authorization: Option<String>,
}

/// Diagnostics surfaced on `X-Proxy-*` response headers, spec §6.
#[derive(Debug, Clone)]
pub struct DispatchMeta {
    pub account_id: String,
    pub strategy: Option<String>,
    pub tenant_id: Option<String>,
}

pub struct BufferedOutcome {
    pub status: u16,
    pub body: String,
    pub meta: DispatchMeta,
}

pub struct StreamOutcome {
    pub status: u16,
    pub stream: BoxByteStream,
    pub meta: DispatchMeta,
}

pub enum DispatchOutcome {
    Buffered(BufferedOutcome),
    Stream(StreamOutcome),
}

fn parse_inbound(body: &[u8], inbound: InboundShape) -> Result<anthropic::Request, DispatchError> {
    match inbound {
        InboundShape::Anthropic => serde_json::from_slice(body).map_err(|e| DispatchError::InvalidRequest(e.to_string())),
        InboundShape::OpenAi => {
            let oreq: openai::Request = serde_json::from_slice(body).map_err(|e| DispatchError::InvalidRequest(e.to_string()))?;
            Ok(openai_to_anthropic_request(&oreq))
        }
    }
}

fn encode_for_provider(canonical: &anthropic::Request, provider: ProviderKind, target_model: &str) -> Result<Bytes, serde_json::Error> {
    match provider {
        ProviderKind::Anthropic => {
            let mut req = canonical.clone();
            req.model = target_model.to_owned();
            Ok(Bytes::from(serde_json::to_vec(&req)?))
        }
        ProviderKind::Openai | ProviderKind::OpenaiCompat | ProviderKind::Custom => {
            let mut oreq = anthropic_to_openai_request(canonical);
            oreq.model = target_model.to_owned();
            Ok(Bytes::from(serde_json::to_vec(&oreq)?))
        }
        ProviderKind::CodexSub => {
            let mut oreq = anthropic_to_openai_request(canonical);
            oreq.model = target_model.to_owned();
            Ok(Bytes::from(serde_json::to_vec(&chat_completions_to_responses(&oreq))?))
        }
    }
}

fn upstream_dialect_for(provider: ProviderKind) -> UpstreamDialect {
    match provider {
        ProviderKind::Anthropic => UpstreamDialect::Anthropic,
        ProviderKind::Openai | ProviderKind::OpenaiCompat | ProviderKind::Custom => UpstreamDialect::OpenAiChat,
        ProviderKind::CodexSub => UpstreamDialect::CodexResponses,
    }
}

/// Decode a buffered upstream body into the canonical Anthropic shape,
/// returning both the client-dialect JSON text and the usage counters
/// recovered from it.
fn decode_buffered(upstream_text: &str, provider: ProviderKind, inbound: InboundShape, target_model: &str) -> Result<(String, UsageCounters), DispatchError> {
    let canonical_response: anthropic::Response = match provider {
        ProviderKind::Anthropic => serde_json::from_str(upstream_text).map_err(|e| DispatchError::Internal(e.to_string()))?,
        ProviderKind::Openai | ProviderKind::OpenaiCompat | ProviderKind::Custom => {
            let oresp: openai::Response = serde_json::from_str(upstream_text).map_err(|e| DispatchError::Internal(e.to_string()))?;
            openai_to_anthropic_response(&oresp)
        }
        ProviderKind::CodexSub => {
            let value: Value = serde_json::from_str(upstream_text).map_err(|e| DispatchError::Internal(e.to_string()))?;
            let id = value.get("id").and_then(Value::as_str).unwrap_or_default();
            let oresp = responses_to_chat_completions(&value, id, target_model);
            openai_to_anthropic_response(&oresp)
        }
    };

    let counters = UsageCounters {
        input_tokens: canonical_response.usage.input_tokens,
        output_tokens: canonical_response.usage.output_tokens,
        model: Some(target_model.to_owned()),
    };

    let body_text = match inbound {
        InboundShape::Anthropic => serde_json::to_string(&canonical_response),
        InboundShape::OpenAi => serde_json::to_string(&anthropic_to_openai_response(&canonical_response)),
    }
    .map_err(|e| DispatchError::Internal(e.to_string()))?;

    Ok((body_text, counters))
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<i64> {
    headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?.parse::<i64>().ok()
}

/// Pull a human-readable message out of an upstream's buffered JSON error
/// body (spec §6: "the core repackages it ... preserving the message").
/// A streamed error body is left untouched -- draining it just to read a
/// status-code failure isn't worth the extra upstream round trip -- so
/// those fall back to `fallback`.
fn upstream_error_message(response: &relay_provider::response::ProviderResponse, fallback: &str) -> String {
    let ResponseBody::Buffered(text) = &response.body else { return fallback.to_owned() };
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.get("message").or(Some(e))).and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| fallback.to_owned())
}

/// Wrap a finished byte stream so `on_done` fires exactly once, after the
/// last chunk, regardless of whether the client reads to completion or
/// disconnects early (in the latter case `on_done` never fires, matching
/// "usage is only known once the SSE stream observed its terminal event").
fn wrap_with_usage_recording(inner: BoxByteStream, on_done: impl FnOnce() + Send + 'static) -> BoxByteStream {
    struct State {
        inner: BoxByteStream,
        on_done: Option<Box<dyn FnOnce() + Send>>,
    }
    Box::pin(stream::unfold(State { inner, on_done: Some(Box::new(on_done)) }, |mut state| async move {
        match state.inner.next().await {
            Some(item) => Some((item, state)),
            None => {
                if let Some(f) = state.on_done.take() {
                    f();
                }
                None
            }
        }
    }))
}

/// Accumulates the bits a request-log row needs (spec §4.H.9) as
/// [`Dispatcher::dispatch_inner`] learns them, so the public `dispatch`
/// wrapper can write the row after the fact regardless of which branch
/// (success, failover exhaustion, early rejection) the request took.
#[derive(Default)]
struct RequestLogContext {
    enabled: bool,
    tenant_id: Option<relay_core::TenantId>,
    account_id: Option<relay_core::AccountId>,
}

impl Dispatcher {
    /// Run one inbound request through the full pipeline, then append a
    /// request-log row if `request_logging` is enabled (global default or
    /// tenant-scoped override), timing the whole pipeline regardless of
    /// outcome.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, DispatchError> {
        let start = std::time::Instant::now();
        let path = request.path.clone();
        let mut log_ctx = RequestLogContext::default();
        let result = self.dispatch_inner(request, &mut log_ctx).await;

        if log_ctx.enabled {
            let status = match &result {
                Ok(DispatchOutcome::Buffered(b)) => b.status,
                Ok(DispatchOutcome::Stream(s)) => s.status,
                Err(e) => e.status(),
            };
            let record = relay_core::RequestLogRecord {
                id: uuid::Uuid::new_v4(),
                tenant_id: log_ctx.tenant_id,
                account_id: log_ctx.account_id,
                path,
                status,
                duration_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                created_at: chrono::Utc::now(),
            };
            usage::spawn_append_request_log(Arc::clone(&self.store), record);
        }

        result
    }

    /// The pipeline itself: auth, shape classification, guardrail
    /// anonymisation, limit clamping, routing, and the candidate-traversal
    /// loop described in spec §4.H.
    async fn dispatch_inner(&self, request: DispatchRequest, log: &mut RequestLogContext) -> Result<DispatchOutcome, DispatchError> {
        let inbound = classify_path(&request.path);
        let api_key = auth::extract_api_key(request.x_api_key.as_deref(), request.authorization.as_deref());
        let tenant = auth::authenticate(self.store.as_ref(), api_key.as_deref(), self.proxy_api_key.as_ref(), self.config.tenants_enabled).await?;

        log.enabled = tenant
            .as_ref()
            .map_or(self.config.request_logging_default, |t| t.setting_bool("request_logging", self.config.request_logging_default));
        log.tenant_id = tenant.as_ref().map(|t| t.id.clone());

        let mut canonical = parse_inbound(&request.body, inbound)?;

        let guardrails_enabled = tenant
            .as_ref()
            .map_or(self.config.guardrails_enabled_default, |t| t.setting_bool("guardrails_enabled", self.config.guardrails_enabled_default));
        if guardrails_enabled {
            anonymise_request(&mut canonical, &self.detectors, &GuardrailConfig::default(), &self.guardrail_codec, &self.reverse_map);
        }

        let limits = self.store.model_limits().await.map_err(|e| DispatchError::Internal(e.to_string()))?;
        if let Some(max_tokens) = canonical.max_tokens {
            canonical.max_tokens = Some(clamp_max_tokens(&limits, &canonical.model, max_tokens));
        }

        let original_model = canonical.model.clone();
        let resolved = self.router.resolve(&original_model, tenant.as_ref()).await;
        if resolved.candidates.is_empty() {
            return Err(DispatchError::Overloaded);
        }
        let strategy_name = resolved.strategy.map(relay_core::Strategy::as_str);
        let candidates = reorder_around_cooldowns(resolved.candidates, &self.cooldowns);

        if let Some(t) = &tenant {
            if let Some(cap) = t.rate_cap {
                if !self.rate_limiter.check_and_record(&t.rate_limit_key(), cap) {
                    return Err(DispatchError::RateLimited { retry_after_secs: None });
                }
            }
        }

        let tier = Tier::detect(&original_model);
        let tenant_id = tenant.as_ref().map(|t| t.id.clone());
        let mut last_status: Option<u16> = None;

        'candidates: for (attempt, candidate) in candidates.into_iter().enumerate() {
            let mut account = candidate.account;
            let target_model = candidate.target_model;
            log.account_id = Some(account.id.clone());

            if !self.rate_limiter.check_and_record(account.id.as_str(), account.rpm_cap) {
                continue;
            }

            self.refresher.ensure_fresh(&mut account).await;

            let is_stream = canonical.stream.unwrap_or(false);

            let mut resynced_once = false;
            let (response, status) = loop {
                let body_bytes = encode_for_provider(&canonical, account.provider, &target_model).map_err(|e| DispatchError::Internal(e.to_string()))?;
                let adapter = self.adapters.for_kind(account.provider);
                let response = match adapter.forward(&account, body_bytes, is_stream).await {
                    Ok(r) => r,
                    Err(err) => {
                        self.cooldowns.set(&account.id, CooldownReason::ConnectionError, None);
                        if self.config.auto_switch_on_error {
                            continue 'candidates;
                        }
                        return Err(DispatchError::Upstream { status: 502, message: err.to_string() });
                    }
                };
                let status = response.status.as_u16();

                // §4.H step 7 / §7: a 401 on an OAuth candidate's primary
                // attempt gets one forced resync-and-retry of the same
                // candidate before the usual failover rules apply.
                if status == 401 && account.auth == AuthKind::OAuth && attempt == 0 && !resynced_once {
                    resynced_once = true;
                    if self.refresher.force_resync(&mut account).await {
                        continue;
                    }
                }
                break (response, status);
            };

            if status == 429 {
                let retry_after = parse_retry_after(&response.headers);
                self.cooldowns.set(&account.id, CooldownReason::RateLimited, retry_after.map(chrono::Duration::seconds));
                last_status = Some(status);
                if self.config.auto_switch_on_rate_limit {
                    continue;
                }
                return Err(DispatchError::RateLimited { retry_after_secs: retry_after.map(|s| s.max(0) as u64) });
            }
            if (500..600).contains(&status) {
                self.cooldowns.set(&account.id, CooldownReason::ServerError, None);
                last_status = Some(status);
                if self.config.auto_switch_on_error {
                    continue;
                }
                let message = upstream_error_message(&response, "upstream server error");
                return Err(DispatchError::Upstream { status, message });
            }
            if status == 401 && account.auth == AuthKind::OAuth {
                self.cooldowns.set(&account.id, CooldownReason::ServerError, None);
                last_status = Some(status);
                continue;
            }
            if !(200..300).contains(&status) {
                let message = upstream_error_message(&response, &format!("upstream returned {status}"));
                return Err(DispatchError::Upstream { status, message });
            }

            self.cooldowns.clear(&account.id);
            let strategy = strategy_name.map(|name| if attempt == 0 { name.to_owned() } else { format!("{name}+failover") });
            let meta = DispatchMeta {
                account_id: account.id.as_str().to_owned(),
                strategy,
                tenant_id: tenant_id.as_ref().map(|t| t.as_str().to_owned()),
            };

            let store = Arc::clone(&self.store);
            let account_id = account.id.clone();
            let tenant_id_for_usage = tenant_id.clone();

            if response.is_stream {
                let usage_sink = response.usage_handle();
                let response_id = uuid::Uuid::new_v4().to_string();
                let upstream_dialect = upstream_dialect_for(account.provider);
                let ResponseBody::Stream(byte_stream) = response.body else { unreachable!("is_stream implies Stream body") };
                let inner: BoxByteStream = Box::pin(sse_pipeline::build(
                    byte_stream,
                    upstream_dialect,
                    inbound,
                    Arc::clone(&self.guardrail_codec),
                    Arc::clone(&self.reverse_map),
                    Arc::clone(&usage_sink),
                    response_id,
                    target_model.clone(),
                ));
                let original_model_for_usage = original_model.clone();
                let target_model_for_usage = target_model.clone();
                let wrapped = wrap_with_usage_recording(inner, move || {
                    let counters = usage_sink.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
                    if let Some(counters) = counters {
                        let record = usage::build_usage_record(account_id, None, tenant_id_for_usage, tier, original_model_for_usage, target_model_for_usage, &counters);
                        usage::spawn_record_usage(store, record);
                    }
                });
                return Ok(DispatchOutcome::Stream(StreamOutcome { status, stream: wrapped, meta }));
            }

            let ResponseBody::Buffered(upstream_text) = response.body else { unreachable!("!is_stream implies Buffered body") };
            let (body_text, counters) = decode_buffered(&upstream_text, account.provider, inbound, &target_model)?;
            let final_body = deanonymise_buffer(&body_text, &self.guardrail_codec, &self.reverse_map);

            let record = usage::build_usage_record(account_id, None, tenant_id_for_usage, tier, original_model.clone(), target_model.clone(), &counters);
            usage::spawn_record_usage(store, record);

            return Ok(DispatchOutcome::Buffered(BufferedOutcome { status, body: final_body, meta }));
        }

        Err(DispatchError::AllCandidatesFailed { last_status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{Account, AccountStatus, ModelLimits, ProviderKind as PK};
    use relay_crypto::{Key, TokenCodec};
    use relay_guardrail::{DetectorRegistry, ReverseMap};
    use relay_provider::AdapterRegistry;
    use relay_router::{CooldownStore, RateLimiter, Router, TokenRefresher};
    use relay_state::{ConfigStore, InMemoryConfigStore};
    use secrecy::SecretString;

    fn account(id: &str, base_url: String) -> Account {
        Account {
            id: id.into(),
            name: id.to_owned(),
            provider: PK::OpenaiCompat,
            auth: AuthKind::ApiKey,
            credential: SecretString::new("tok".into()),
            refresh: None,
            expires_at: None,
            base_url: Some(base_url),
            priority: 1,
            rpm_cap: 0,
            monthly_budget_usd: None,
            enabled: true,
            status: AccountStatus::Active,
            error_count: 0,
            last_used_at: None,
            chatgpt_account_id: None,
        }
    }

    async fn dispatcher_with_no_accounts() -> Dispatcher {
        let store: Arc<dyn ConfigStore> = Arc::new(InMemoryConfigStore::new().with_model_limits(Vec::<ModelLimits>::new()));
        let rate_limiter = Arc::new(RateLimiter::new());
        let router = Arc::new(Router::new(Arc::clone(&store), Arc::clone(&rate_limiter)));
        let refresher = Arc::new(TokenRefresher::new(Arc::clone(&store), reqwest::Client::new(), None));
        Dispatcher::new(
            store,
            router,
            Arc::new(CooldownStore::new()),
            rate_limiter,
            refresher,
            Arc::new(AdapterRegistry::new().unwrap()),
            Arc::new(DetectorRegistry::with_defaults()),
            Arc::new(TokenCodec::new(Key::from_bytes([7u8; 32]))),
            Arc::new(ReverseMap::new()),
            None,
            crate::context::DispatcherConfig::permissive(),
        )
    }

    #[tokio::test]
    async fn no_routable_account_returns_overloaded() {
        let dispatcher = dispatcher_with_no_accounts().await;
        let req = DispatchRequest {
            path: "/v1/messages".to_owned(),
            body: Bytes::from(r#"{"model":"claude-sonnet-4","messages":[{"role":"user","content":"hi"}]}"#),
            x_api_key: None,
            authorization: None,
        };
        let err = dispatcher.dispatch(req).await.unwrap_err();
        assert!(matches!(err, DispatchError::Overloaded));
    }

    #[tokio::test]
    async fn invalid_json_body_is_rejected_before_routing() {
        let dispatcher = dispatcher_with_no_accounts().await;
        let req = DispatchRequest { path: "/v1/messages".to_owned(), body: Bytes::from("not json"), x_api_key: None, authorization: None };
        let err = dispatcher.dispatch(req).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn wrong_api_key_is_rejected_when_global_key_configured() {
        let store: Arc<dyn ConfigStore> = Arc::new(InMemoryConfigStore::new().with_model_limits(Vec::<ModelLimits>::new()));
        let rate_limiter = Arc::new(RateLimiter::new());
        let router = Arc::new(Router::new(Arc::clone(&store), Arc::clone(&rate_limiter)));
        let refresher = Arc::new(TokenRefresher::new(Arc::clone(&store), reqwest::Client::new(), None));
        let dispatcher = Dispatcher::new(
            store,
            router,
            Arc::new(CooldownStore::new()),
            rate_limiter,
            refresher,
            Arc::new(AdapterRegistry::new().unwrap()),
            Arc::new(DetectorRegistry::with_defaults()),
            Arc::new(TokenCodec::new(Key::from_bytes([7u8; 32]))),
            Arc::new(ReverseMap::new()),
            Some(SecretString::new("right-key".into())),
            crate::context::DispatcherConfig::permissive(),
        );
        let req = DispatchRequest {
            path: "/v1/messages".to_owned(),
            body: Bytes::from(r#"{"model":"claude-sonnet-4","messages":[{"role":"user","content":"hi"}]}"#),
            x_api_key: Some("wrong-key".to_owned()),
            authorization: None,
        };
        let err = dispatcher.dispatch(req).await.unwrap_err();
        assert!(matches!(err, DispatchError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn no_config_fallback_forwards_buffered_response_and_deanonymises() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"id":"c1","object":"chat.completion","model":"gpt-4o","choices":[{"index":0,"message":{"role":"assistant","content":"hi"},"finish_reason":"stop"}],"usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
            ))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryConfigStore::new().with_model_limits(Vec::<ModelLimits>::new()));
        store.upsert_account(&account("a1", server.uri())).await.unwrap();
        let store: Arc<dyn ConfigStore> = store;
        let rate_limiter = Arc::new(RateLimiter::new());
        let router = Arc::new(Router::new(Arc::clone(&store), Arc::clone(&rate_limiter)));
        let refresher = Arc::new(TokenRefresher::new(Arc::clone(&store), reqwest::Client::new(), None));
        let dispatcher = Dispatcher::new(
            store,
            router,
            Arc::new(CooldownStore::new()),
            rate_limiter,
            refresher,
            Arc::new(AdapterRegistry::new().unwrap()),
            Arc::new(DetectorRegistry::with_defaults()),
            Arc::new(TokenCodec::new(Key::from_bytes([7u8; 32]))),
            Arc::new(ReverseMap::new()),
            None,
            crate::context::DispatcherConfig::permissive(),
        );

        let req = DispatchRequest {
            path: "/v1/messages".to_owned(),
            body: Bytes::from(r#"{"model":"claude-sonnet-4","messages":[{"role":"user","content":"reach me at bob@example.com"}]}"#),
            x_api_key: None,
            authorization: None,
        };
        let outcome = dispatcher.dispatch(req).await.unwrap();
        let DispatchOutcome::Buffered(buffered) = outcome else { panic!("expected buffered outcome") };
        assert_eq!(buffered.status, 200);
        assert!(buffered.body.contains("\"content\""));
    }
}

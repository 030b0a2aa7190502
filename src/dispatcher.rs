//! Tool dispatcher: the sole entry point exposed to the agent layer.
//!
//! Maps a tool name + arguments to the matching source adapter, routed
//! through the cache-aside orchestrator, and normalizes every failure into
//! the `ToolResult.error` contract - nothing thrown past this boundary.
//! Each invocation emits one `tool_started` trace event before dispatch and
//! exactly one terminal event (`tool_finished` or `tool_failed`) after.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::adapters::{
    CityQuery, CityResolver, FactsAdapter, PlanVisitAdapter, ProviderClient, SourceAdapter,
    TimeAdapter, WeatherAdapter,
};
use crate::cache::{CacheKey, CacheStore};
use crate::config::{Config, ConfigError};
use crate::error::ToolError;
use crate::orchestrator::{Orchestrator, ResultSource};

/// The closed set of tools the agent may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    Weather,
    Time,
    Facts,
    PlanVisit,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Weather => "weather",
            ToolName::Time => "time",
            ToolName::Facts => "facts",
            ToolName::PlanVisit => "plan_visit",
        }
    }

    pub fn parse(name: &str) -> Option<ToolName> {
        match name {
            "weather" => Some(ToolName::Weather),
            "time" => Some(ToolName::Time),
            "facts" => Some(ToolName::Facts),
            "plan_visit" => Some(ToolName::PlanVisit),
            _ => None,
        }
    }
}

/// Freshness policy per source, keyed by tool identity only and never
/// overridden per request. Kept in one place so policy changes are
/// auditable.
pub fn ttl_policy(tool: ToolName) -> Duration {
    match tool {
        ToolName::Weather => Duration::from_secs(30 * 60),
        ToolName::Time => Duration::from_secs(120 * 60),
        ToolName::Facts => Duration::from_secs(120 * 60),
        ToolName::PlanVisit => Duration::from_secs(60 * 60),
    }
}

/// One tool invocation as issued by the agent layer.
///
/// The tool name arrives as a raw string: validating it against the
/// [`ToolName`] enum is the dispatcher's job.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    pub arguments: Value,
    pub request_id: Uuid,
}

impl ToolRequest {
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            request_id: Uuid::new_v4(),
        }
    }
}

/// Outcome of one tool invocation. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub tool: String,
    pub arguments: Value,
    pub request_id: Uuid,
    pub output: Option<Value>,
    pub source: ResultSource,
    pub latency_ms: u64,
    pub error: Option<ToolError>,
}

impl ToolResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Lifecycle notification for one tool invocation, consumed by the
/// streaming layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    ToolStarted {
        request_id: Uuid,
        tool: String,
        arguments: Value,
    },
    ToolFinished {
        request_id: Uuid,
        tool: String,
        source: ResultSource,
        latency_ms: u64,
        output: Value,
    },
    ToolFailed {
        request_id: Uuid,
        tool: String,
        error: ToolError,
    },
}

impl TraceEvent {
    /// The invocation this event belongs to.
    pub fn request_id(&self) -> Uuid {
        match self {
            TraceEvent::ToolStarted { request_id, .. }
            | TraceEvent::ToolFinished { request_id, .. }
            | TraceEvent::ToolFailed { request_id, .. } => *request_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TraceEvent::ToolStarted { .. })
    }
}

/// Receives trace events. A sink must never block or fail the dispatch
/// path; implementations drop events they cannot deliver.
pub trait TraceSink: Send + Sync {
    fn emit(&self, event: TraceEvent);
}

impl TraceSink for mpsc::UnboundedSender<TraceEvent> {
    fn emit(&self, event: TraceEvent) {
        // The receiver may be gone (caller disconnected); that is fine.
        let _ = self.send(event);
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    weather: Arc<dyn SourceAdapter>,
    time: Arc<dyn SourceAdapter>,
    facts: Arc<dyn SourceAdapter>,
    plan_visit: Arc<dyn SourceAdapter>,
    trace: Option<Arc<dyn TraceSink>>,
}

impl Dispatcher {
    /// Build the dispatcher with the full adapter set wired to `config`'s
    /// providers and the given cache store.
    pub fn new(config: &Config, store: Arc<dyn CacheStore>) -> Result<Self, ConfigError> {
        let client = Arc::new(ProviderClient::new(&config.providers)?);
        let resolver = Arc::new(CityResolver::new(config.city_match_threshold));
        let orchestrator = Arc::new(Orchestrator::new(store));

        let weather = Arc::new(WeatherAdapter::new(
            &config.providers,
            client.clone(),
            resolver.clone(),
        ));
        let time = Arc::new(TimeAdapter::new(
            &config.providers,
            client.clone(),
            resolver.clone(),
        ));
        let facts = Arc::new(FactsAdapter::new(&config.providers, client, resolver));
        let plan_visit = Arc::new(PlanVisitAdapter::new(
            orchestrator.clone(),
            facts.clone(),
            weather.clone(),
            time.clone(),
        ));

        Ok(Self {
            orchestrator,
            weather,
            time,
            facts,
            plan_visit,
            trace: None,
        })
    }

    /// Attach a trace sink; typically one per streaming request on a clone
    /// of the dispatcher.
    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    /// Invoke one tool. Never fails past this boundary: every adapter or
    /// orchestrator failure is captured in `ToolResult.error`, and the
    /// caller decides whether it is conversationally recoverable.
    pub async fn invoke(&self, request: ToolRequest) -> ToolResult {
        let started = Instant::now();
        self.emit(TraceEvent::ToolStarted {
            request_id: request.request_id,
            tool: request.tool.clone(),
            arguments: request.arguments.clone(),
        });

        let outcome = self.dispatch(&request).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok((output, source)) => {
                debug!(tool = %request.tool, ?source, latency_ms, "tool finished");
                self.emit(TraceEvent::ToolFinished {
                    request_id: request.request_id,
                    tool: request.tool.clone(),
                    source,
                    latency_ms,
                    output: output.clone(),
                });
                ToolResult {
                    tool: request.tool,
                    arguments: request.arguments,
                    request_id: request.request_id,
                    output: Some(output),
                    source,
                    latency_ms,
                    error: None,
                }
            }
            Err(error) => {
                debug!(tool = %request.tool, %error, latency_ms, "tool failed");
                self.emit(TraceEvent::ToolFailed {
                    request_id: request.request_id,
                    tool: request.tool.clone(),
                    error: error.clone(),
                });
                ToolResult {
                    tool: request.tool,
                    arguments: request.arguments,
                    request_id: request.request_id,
                    output: None,
                    source: ResultSource::Live,
                    latency_ms,
                    error: Some(error),
                }
            }
        }
    }

    async fn dispatch(&self, request: &ToolRequest) -> Result<(Value, ResultSource), ToolError> {
        let tool = ToolName::parse(&request.tool).ok_or_else(|| ToolError::UnknownTool {
            name: request.tool.clone(),
        })?;
        let query = CityQuery::from_arguments(&request.arguments)?;

        let adapter = match tool {
            ToolName::Weather => self.weather.clone(),
            ToolName::Time => self.time.clone(),
            ToolName::Facts => self.facts.clone(),
            ToolName::PlanVisit => self.plan_visit.clone(),
        };

        // Keys fold the raw city text; fuzzy resolution happens inside the
        // adapter, so typo variants ("tokio" vs "tokyo") cache separately.
        let key = CacheKey::build(tool.as_str(), &query.as_arguments());
        let (result, source) = self
            .orchestrator
            .fetch(&key, ttl_policy(tool), || {
                let adapter = adapter.clone();
                let query = query.clone();
                async move { adapter.call(&query).await }
            })
            .await;

        match result {
            Ok(output) => Ok((output, source)),
            Err(err) => Err(ToolError::Upstream(err)),
        }
    }

    fn emit(&self, event: TraceEvent) {
        if let Some(sink) = &self.trace {
            sink.emit(event);
        }
    }

    #[cfg(test)]
    pub(crate) fn from_parts(
        orchestrator: Arc<Orchestrator>,
        weather: Arc<dyn SourceAdapter>,
        time: Arc<dyn SourceAdapter>,
        facts: Arc<dyn SourceAdapter>,
        plan_visit: Arc<dyn SourceAdapter>,
    ) -> Self {
        Self {
            orchestrator,
            weather,
            time,
            facts,
            plan_visit,
            trace: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryStore;
    use crate::error::{UpstreamError, UpstreamErrorKind};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubAdapter {
        payload: Value,
        failure: Option<UpstreamError>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl StubAdapter {
        fn ok(payload: Value) -> (Arc<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let adapter = Arc::new(Self {
                payload,
                failure: None,
                delay: Duration::ZERO,
                calls: calls.clone(),
            });
            (adapter, calls)
        }

        fn failing(failure: UpstreamError) -> (Arc<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let adapter = Arc::new(Self {
                payload: Value::Null,
                failure: Some(failure),
                delay: Duration::ZERO,
                calls: calls.clone(),
            });
            (adapter, calls)
        }

        fn slow(payload: Value, delay: Duration) -> (Arc<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let adapter = Arc::new(Self {
                payload,
                failure: None,
                delay,
                calls: calls.clone(),
            });
            (adapter, calls)
        }
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn call(&self, _query: &CityQuery) -> Result<Value, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay > Duration::ZERO {
                tokio::time::sleep(self.delay).await;
            }
            match &self.failure {
                Some(err) => Err(err.clone()),
                None => Ok(self.payload.clone()),
            }
        }
    }

    struct TestHarness {
        dispatcher: Dispatcher,
        store: InMemoryStore,
        weather_calls: Arc<AtomicUsize>,
        time_calls: Arc<AtomicUsize>,
    }

    fn harness(weather: Arc<StubAdapter>, time: Arc<StubAdapter>) -> TestHarness {
        let store = InMemoryStore::new();
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(store.clone())));
        let (facts, _) = StubAdapter::ok(json!({"city": "x"}));
        let (plan, _) = StubAdapter::ok(json!({"plan": true}));
        let weather_calls = weather.calls.clone();
        let time_calls = time.calls.clone();
        TestHarness {
            dispatcher: Dispatcher::from_parts(orchestrator, weather, time, facts, plan),
            store,
            weather_calls,
            time_calls,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TraceEvent>) -> Vec<TraceEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn unknown_tool_fails_without_touching_adapters_or_cache() {
        let (weather, _) = StubAdapter::ok(json!({"ok": true}));
        let (time, _) = StubAdapter::ok(json!({"ok": true}));
        let h = harness(weather, time);

        let result = h
            .dispatcher
            .invoke(ToolRequest::new("translate", json!({"city": "Tokyo"})))
            .await;

        assert_eq!(
            result.error,
            Some(ToolError::UnknownTool {
                name: "translate".to_string()
            })
        );
        assert!(result.output.is_none());
        assert_eq!(h.weather_calls.load(Ordering::SeqCst), 0);
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn missing_city_is_invalid_arguments() {
        let (weather, _) = StubAdapter::ok(json!({"ok": true}));
        let (time, _) = StubAdapter::ok(json!({"ok": true}));
        let h = harness(weather, time);

        let result = h
            .dispatcher
            .invoke(ToolRequest::new("weather", json!({})))
            .await;

        assert!(matches!(
            result.error,
            Some(ToolError::InvalidArguments { .. })
        ));
        assert_eq!(h.weather_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_request_is_served_from_cache() {
        let payload = json!({"city": "Tokyo", "temperature_c": 21.5});
        let (weather, _) = StubAdapter::ok(payload.clone());
        let (time, _) = StubAdapter::ok(json!({}));
        let h = harness(weather, time);

        let first = h
            .dispatcher
            .invoke(ToolRequest::new("weather", json!({"city": "Tokyo"})))
            .await;
        let second = h
            .dispatcher
            .invoke(ToolRequest::new("weather", json!({"city": "Tokyo"})))
            .await;

        assert_eq!(first.source, ResultSource::Live);
        assert_eq!(second.source, ResultSource::Cache);
        assert_eq!(first.output, second.output);
        assert_eq!(first.output, Some(payload));
        assert_eq!(h.weather_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn argument_spelling_variants_share_one_cache_entry() {
        let (weather, _) = StubAdapter::ok(json!({"ok": true}));
        let (time, _) = StubAdapter::ok(json!({}));
        let h = harness(weather, time);

        for city in ["Tokyo", "  tokyo ", "TOKYO"] {
            h.dispatcher
                .invoke(ToolRequest::new("weather", json!({ "city": city })))
                .await;
        }
        assert_eq!(h.weather_calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn exhausted_provider_is_not_cached() {
        let (weather, _) = StubAdapter::ok(json!({}));
        let (time, _) = StubAdapter::failing(UpstreamError::unavailable("provider returned 503"));
        let h = harness(weather, time);

        let request = ToolRequest::new("time", json!({"city": "Nairobi"}));
        let result = h.dispatcher.invoke(request).await;
        match result.error {
            Some(ToolError::Upstream(err)) => {
                assert_eq!(err.kind, UpstreamErrorKind::Unavailable)
            }
            other => panic!("expected upstream error, got {:?}", other),
        }
        assert!(h.store.is_empty().await, "failures must not be cached");

        // No negative caching: the next identical request attempts live.
        h.dispatcher
            .invoke(ToolRequest::new("time", json!({"city": "Nairobi"})))
            .await;
        assert_eq!(h.time_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn sequential_tools_emit_paired_events_in_order() {
        // A is slower than B in wall-clock time; issued sequentially the
        // event order must still be started(A), finished(A), started(B),
        // finished(B).
        let (weather, _) = StubAdapter::slow(json!({"a": 1}), Duration::from_millis(50));
        let (time, _) = StubAdapter::ok(json!({"b": 2}));
        let h = harness(weather, time);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = h.dispatcher.clone().with_trace_sink(Arc::new(tx));

        let a = ToolRequest::new("weather", json!({"city": "Tokyo"}));
        let b = ToolRequest::new("time", json!({"city": "Tokyo"}));
        let a_id = a.request_id;
        let b_id = b.request_id;

        dispatcher.invoke(a).await;
        dispatcher.invoke(b).await;

        let events = drain(&mut rx);
        let ids: Vec<(Uuid, bool)> = events
            .iter()
            .map(|e| (e.request_id(), e.is_terminal()))
            .collect();
        assert_eq!(
            ids,
            vec![(a_id, false), (a_id, true), (b_id, false), (b_id, true)]
        );
    }

    #[tokio::test]
    async fn concurrent_tools_keep_per_invocation_pairing() {
        let (weather, _) = StubAdapter::slow(json!({"a": 1}), Duration::from_millis(50));
        let (time, _) = StubAdapter::ok(json!({"b": 2}));
        let h = harness(weather, time);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = Arc::new(h.dispatcher.clone().with_trace_sink(Arc::new(tx)));

        let a = ToolRequest::new("weather", json!({"city": "Tokyo"}));
        let b = ToolRequest::new("time", json!({"city": "Tokyo"}));
        let a_id = a.request_id;
        let b_id = b.request_id;

        let d = dispatcher.clone();
        let slow = tokio::spawn(async move { d.invoke(a).await });
        let fast = tokio::spawn(async move { dispatcher.invoke(b).await });
        let _ = slow.await;
        let _ = fast.await;

        let events = drain(&mut rx);
        for id in [a_id, b_id] {
            let positions: Vec<usize> = events
                .iter()
                .enumerate()
                .filter(|(_, e)| e.request_id() == id)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(positions.len(), 2, "each invocation emits exactly two events");
            assert!(!events[positions[0]].is_terminal());
            assert!(events[positions[1]].is_terminal());
        }
    }

    #[test]
    fn ttl_policy_table() {
        assert_eq!(ttl_policy(ToolName::Weather), Duration::from_secs(1800));
        assert_eq!(ttl_policy(ToolName::Time), Duration::from_secs(7200));
        assert_eq!(ttl_policy(ToolName::Facts), Duration::from_secs(7200));
        assert_eq!(ttl_policy(ToolName::PlanVisit), Duration::from_secs(3600));
    }

    #[test]
    fn tool_names_round_trip() {
        for name in ["weather", "time", "facts", "plan_visit"] {
            assert_eq!(ToolName::parse(name).unwrap().as_str(), name);
        }
        assert!(ToolName::parse("translate").is_none());
    }
}

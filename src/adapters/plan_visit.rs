//! Composite visit-planning adapter.
//!
//! Gathers city facts, current weather, and local time for one city and
//! renders them into a structured plan. Each constituent goes through the
//! orchestrator under its own cache key and TTL, so a plan request warms
//! the same entries a direct `weather` or `facts` invocation would hit,
//! and vice versa. A failed constituent is recorded in its section and the
//! plan still renders; only when every source fails does the call error.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cache::CacheKey;
use crate::dispatcher::{ttl_policy, ToolName};
use crate::error::UpstreamError;
use crate::orchestrator::{FetchOutcome, Orchestrator, ResultSource};

use super::{CityQuery, SourceAdapter};

pub struct PlanVisitAdapter {
    orchestrator: Arc<Orchestrator>,
    facts: Arc<dyn SourceAdapter>,
    weather: Arc<dyn SourceAdapter>,
    time: Arc<dyn SourceAdapter>,
}

impl PlanVisitAdapter {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        facts: Arc<dyn SourceAdapter>,
        weather: Arc<dyn SourceAdapter>,
        time: Arc<dyn SourceAdapter>,
    ) -> Self {
        Self {
            orchestrator,
            facts,
            weather,
            time,
        }
    }

    /// Fetch one constituent through the orchestrator, sharing the cache
    /// key a direct invocation of the same tool would use.
    async fn constituent(
        &self,
        tool: ToolName,
        adapter: &Arc<dyn SourceAdapter>,
        query: &CityQuery,
    ) -> (FetchOutcome, ResultSource) {
        let key = CacheKey::build(tool.as_str(), &query.as_arguments());
        self.orchestrator
            .fetch(&key, ttl_policy(tool), || {
                let adapter = adapter.clone();
                let query = query.clone();
                async move { adapter.call(&query).await }
            })
            .await
    }
}

#[async_trait]
impl SourceAdapter for PlanVisitAdapter {
    fn name(&self) -> &'static str {
        "plan_visit"
    }

    async fn call(&self, query: &CityQuery) -> Result<Value, UpstreamError> {
        let (facts, weather, time) = tokio::join!(
            self.constituent(ToolName::Facts, &self.facts, query),
            self.constituent(ToolName::Weather, &self.weather, query),
            self.constituent(ToolName::Time, &self.time, query),
        );

        let sections = vec![
            section(ToolName::Facts, &facts),
            section(ToolName::Weather, &weather),
            section(ToolName::Time, &time),
        ];
        if sections.iter().all(|s| s["ok"] == false) {
            return Err(UpstreamError::unavailable(format!(
                "no source available to plan a visit to '{}'",
                query.city
            )));
        }

        let city = sections
            .iter()
            .find_map(|s| s["payload"]["city"].as_str())
            .unwrap_or(&query.city)
            .to_string();

        Ok(json!({
            "thinking": format!(
                "Planning a visit to {}: combining city facts, current weather, and local time.",
                city
            ),
            "sections": sections,
            "summary": summarize(&city, &sections),
        }))
    }
}

fn section(tool: ToolName, outcome: &(FetchOutcome, ResultSource)) -> Value {
    match outcome {
        (Ok(payload), source) => json!({
            "tool": tool.as_str(),
            "ok": true,
            "source": source,
            "payload": payload,
        }),
        (Err(err), _) => json!({
            "tool": tool.as_str(),
            "ok": false,
            "error": err,
        }),
    }
}

fn summarize(city: &str, sections: &[Value]) -> String {
    let payload = |tool: &str| -> Option<&Value> {
        sections
            .iter()
            .find(|s| s["tool"] == tool && s["ok"] == true)
            .map(|s| &s["payload"])
    };

    let mut lines = vec![format!("Visit plan for {}.", city)];

    if let Some(facts) = payload("facts") {
        let mut line = format!(
            "{} is in {}",
            city,
            facts["country"].as_str().unwrap_or("an unknown country")
        );
        if let Some(population) = facts["population"].as_u64() {
            line.push_str(&format!(", population {}", population));
        }
        line.push('.');
        lines.push(line);
    }

    if let Some(weather) = payload("weather") {
        if let (Some(description), Some(temp)) = (
            weather["description"].as_str(),
            weather["temperature_c"].as_f64(),
        ) {
            lines.push(format!(
                "Current weather: {}, {:.1}\u{00b0}C. Pack accordingly.",
                description, temp
            ));
        }
    } else {
        lines.push("Weather is unavailable right now; check again before heading out.".to_string());
    }

    if let Some(time) = payload("time") {
        if let Some(current) = time["current_time"].as_str() {
            lines.push(format!(
                "Local time is {} ({}).",
                current,
                time["timezone"].as_str().unwrap_or("unknown zone")
            ));
        }
    }

    lines.join(" ")
}

//! # City Assistant Core
//!
//! Tool orchestration and caching for a city-information assistant.
//!
//! This library provides:
//! - A dispatcher that routes tool calls (weather, time, facts, visit
//!   planning) to external source adapters
//! - A cache-aside orchestrator with per-key TTLs and in-flight request
//!   deduplication
//! - An ordered event stream for surfacing tool progress and model tokens
//!   to a streaming transport
//!
//! ## Architecture
//!
//! Every tool invocation follows the same path:
//! 1. Validate the tool name and arguments
//! 2. Build a canonical cache key from the normalized arguments
//! 3. Serve from cache if a fresh entry exists; otherwise attach to an
//!    in-flight fetch for the same key, or lead a new one
//! 4. On a live fetch, call the provider with bounded retries, normalize
//!    the payload, and write it back with the tool's TTL
//!
//! Failures never escape a tool invocation: they are captured in the
//! result and reported through the event stream.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use city_assistant::{Config, Dispatcher, InMemoryStore, ToolRequest};
//! use serde_json::json;
//!
//! let config = Config::from_env()?;
//! let dispatcher = Dispatcher::new(&config, Arc::new(InMemoryStore::new()))?;
//! let result = dispatcher
//!     .invoke(ToolRequest::new("weather", json!({"city": "Tokyo"})))
//!     .await;
//! ```

pub mod adapters;
pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod stream;

pub use cache::{store_from_config, CacheStore, InMemoryStore};
pub use config::Config;
pub use dispatcher::{Dispatcher, ToolName, ToolRequest, ToolResult, TraceEvent, TraceSink};
pub use error::{ToolError, UpstreamError, UpstreamErrorKind};
pub use orchestrator::{Orchestrator, ResultSource};
pub use stream::{channel, EmitterHandle, StreamEmitter, StreamEvent, UsageStats};

#[cfg(feature = "redis-store")]
pub use cache::RedisStore;

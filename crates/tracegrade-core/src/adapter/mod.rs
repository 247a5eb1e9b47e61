//! Backend adapters.
//!
//! An adapter owns the wire shapes of one backend family. It builds the request, decodes
//! synchronous bodies, and interprets stream records; it never performs I/O itself.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{EvalError, MalformedResponse};
use crate::model::{AdapterOptions, ExecutionTrace, TestCase, Terminal};
use crate::pricing;
use crate::trace::TraceBuilder;

pub mod crew;
pub mod http;
pub mod streaming;

pub use crew::CrewAdapter;
pub use http::HttpAdapter;
pub use streaming::StreamingAdapter;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Http,
    Streaming,
    Langgraph,
    Crew,
}

impl AdapterKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Http => "http",
            AdapterKind::Streaming => "streaming",
            AdapterKind::Langgraph => "langgraph",
            AdapterKind::Crew => "crew",
        }
    }

    pub fn build(self, options: &AdapterOptions) -> Box<dyn Adapter> {
        match self {
            AdapterKind::Http => Box::new(HttpAdapter::new(options.clone())),
            AdapterKind::Streaming => Box::new(StreamingAdapter::new(options.clone())),
            AdapterKind::Langgraph => Box::new(StreamingAdapter::langgraph(options.clone())),
            AdapterKind::Crew => Box::new(CrewAdapter::new(options.clone())),
        }
    }
}

impl FromStr for AdapterKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(AdapterKind::Http),
            "streaming" | "stream" | "ndjson" => Ok(AdapterKind::Streaming),
            "langgraph" => Ok(AdapterKind::Langgraph),
            "crew" | "crewai" => Ok(AdapterKind::Crew),
            other => Err(EvalError::config(format!(
                "unknown adapter '{}' (expected one of: http, streaming, langgraph, crew)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Sync,
    Stream,
}

/// Backend request produced by [`Adapter::build_request`]. Always a POST.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: serde_json::Value,
    pub mode: ResponseMode,
}

pub trait Adapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn response_mode(&self) -> ResponseMode;

    /// Model name used for cost estimation.
    fn model(&self) -> Option<&str> {
        None
    }

    fn build_request(&self, tc: &TestCase) -> Result<WireRequest, EvalError>;

    fn parse_sync_response(&self, _body: &[u8]) -> Result<ExecutionTrace, MalformedResponse> {
        Err(malformed(
            self.new_builder(),
            format!("adapter '{}' does not accept synchronous responses", self.name()),
        ))
    }

    fn consume_stream_event(&self, _line: &str, builder: &mut TraceBuilder) {
        builder.record_violation(format!(
            "adapter '{}' does not accept stream records",
            self.name()
        ));
    }

    fn new_builder(&self) -> TraceBuilder {
        TraceBuilder::new().with_pricing(self.model().and_then(pricing::lookup))
    }
}

/// Checks shared by every adapter before a request leaves the process.
pub(crate) fn check_request(tc: &TestCase, required_context: &[String]) -> Result<(), EvalError> {
    let endpoint = tc.endpoint.trim();
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(EvalError::config(format!(
            "test '{}': endpoint must be an http(s) URL, got '{}'",
            tc.id, tc.endpoint
        )));
    }
    if tc.input.query.trim().is_empty() {
        return Err(EvalError::config(format!("test '{}': input.query is empty", tc.id)));
    }
    let missing: Vec<&str> = required_context
        .iter()
        .filter(|k| tc.input.context.get(k.as_str()).map_or(true, |v| v.is_null()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(EvalError::config(format!(
            "test '{}': missing required context: {}",
            tc.id,
            missing.join(", ")
        )));
    }
    Ok(())
}

pub(crate) fn merged_headers(options: &AdapterOptions, mode: ResponseMode) -> BTreeMap<String, String> {
    let mut headers = BTreeMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    let accept = match mode {
        ResponseMode::Sync => "application/json",
        ResponseMode::Stream => "application/x-ndjson",
    };
    headers.insert("accept".to_string(), accept.to_string());
    for (k, v) in &options.headers {
        headers.insert(k.to_ascii_lowercase(), v.clone());
    }
    headers
}

pub(crate) fn malformed(builder: TraceBuilder, reason: impl Into<String>) -> MalformedResponse {
    let reason = reason.into();
    let mut builder = builder;
    builder.set_diagnostic(reason.clone());
    MalformedResponse {
        reason,
        partial: Box::new(builder.finish(Terminal::MalformedStream, 0)),
    }
}

/// Lossy text preview of a body for diagnostics.
pub(crate) fn preview(body: &[u8]) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > MAX {
        let cut: String = text.chars().take(MAX).collect();
        format!("{}...", cut)
    } else {
        text.into_owned()
    }
}

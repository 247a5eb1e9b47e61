use serde_json::{json, Value};

use super::{check_request, malformed, merged_headers, preview, Adapter, ResponseMode, WireRequest};
use crate::errors::{EvalError, MalformedResponse};
use crate::model::{AdapterOptions, ExecutionTrace, TestCase, Terminal, Usage};

/// Generic synchronous JSON backend.
///
/// Request: `{ "query", "context" }`.
/// Response: `{ "output" | "response": string, "metadata"?: { cost, tokens, steps } }`.
#[derive(Debug, Clone)]
pub struct HttpAdapter {
    options: AdapterOptions,
}

impl HttpAdapter {
    pub fn new(options: AdapterOptions) -> Self {
        Self { options }
    }
}

impl Adapter for HttpAdapter {
    fn name(&self) -> &'static str {
        "http"
    }

    fn response_mode(&self) -> ResponseMode {
        ResponseMode::Sync
    }

    fn model(&self) -> Option<&str> {
        self.options.model.as_deref()
    }

    fn build_request(&self, tc: &TestCase) -> Result<WireRequest, EvalError> {
        check_request(tc, &self.options.required_context)?;
        Ok(WireRequest {
            url: tc.endpoint.trim().to_string(),
            headers: merged_headers(&self.options, ResponseMode::Sync),
            body: json!({
                "query": tc.input.query,
                "context": tc.input.context,
            }),
            mode: ResponseMode::Sync,
        })
    }

    fn parse_sync_response(&self, body: &[u8]) -> Result<ExecutionTrace, MalformedResponse> {
        let mut builder = self.new_builder();
        let value: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                builder.set_output(String::from_utf8_lossy(body).into_owned());
                return Err(malformed(
                    builder,
                    format!("response is not JSON ({}): {}", e, preview(body)),
                ));
            }
        };
        let Some(obj) = value.as_object() else {
            return Err(malformed(builder, "response is not a JSON object"));
        };

        let mut problems = Vec::new();

        if let Some(meta) = obj.get("metadata").filter(|m| !m.is_null()) {
            match meta.as_object() {
                Some(meta) => read_metadata(meta, &mut builder, &mut problems),
                None => problems.push("metadata is not an object".to_string()),
            }
        }

        match obj.get("output").or_else(|| obj.get("response")) {
            Some(Value::String(s)) => builder.set_output(s.clone()),
            Some(other) => problems.push(format!("output is not a string: {}", other)),
            None => problems.push("missing 'output' or 'response' field".to_string()),
        }

        if problems.is_empty() {
            Ok(builder.finish(Terminal::Ok, 0))
        } else {
            Err(malformed(builder, problems.join("; ")))
        }
    }
}

fn read_metadata(
    meta: &serde_json::Map<String, Value>,
    builder: &mut crate::trace::TraceBuilder,
    problems: &mut Vec<String>,
) {
    if let Some(steps) = meta.get("steps").filter(|s| !s.is_null()) {
        match steps.as_array() {
            Some(steps) => {
                for step in steps {
                    match step {
                        Value::String(name) => {
                            builder.record_tool_call(name.clone(), Value::Null);
                        }
                        Value::Object(o) => match o.get("name").or_else(|| o.get("tool")).and_then(Value::as_str) {
                            Some(name) => {
                                let args = o.get("args").cloned().unwrap_or(Value::Null);
                                builder.record_tool_call(name, args);
                            }
                            None => problems.push(format!("step without a name: {}", step)),
                        },
                        other => problems.push(format!("unrecognized step: {}", other)),
                    }
                }
            }
            None => problems.push("metadata.steps is not an array".to_string()),
        }
    }

    if let Some(tokens) = meta.get("tokens").filter(|t| !t.is_null()) {
        match tokens.as_object() {
            Some(t) => {
                let mut field = |key: &str| -> u64 {
                    match t.get(key) {
                        None | Some(Value::Null) => 0,
                        Some(v) => v.as_u64().unwrap_or_else(|| {
                            problems.push(format!("metadata.tokens.{} is not a count", key));
                            0
                        }),
                    }
                };
                let usage = Usage::new(field("input"), field("output"), field("cached"));
                builder.record_usage(&usage, None);
            }
            None => problems.push("metadata.tokens is not an object".to_string()),
        }
    }

    match meta.get("cost") {
        None | Some(Value::Null) => {}
        Some(v) => match v.as_f64() {
            Some(c) if c >= 0.0 => builder.set_cost(c),
            _ => problems.push(format!("metadata.cost is not a non-negative number: {}", v)),
        },
    }
}

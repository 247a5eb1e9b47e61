use serde_json::{json, Map, Value};

use super::{check_request, malformed, merged_headers, preview, Adapter, ResponseMode, WireRequest};
use crate::errors::{EvalError, MalformedResponse};
use crate::model::{AdapterOptions, ExecutionTrace, TestCase, Terminal, Usage};
use crate::trace::TraceBuilder;

/// Multi-agent crew backends.
///
/// Request: `{ "inputs": { "query", ..context } }`. Each task in the response contributes its tool
/// invocations as call/result pairs followed by the task output as a message step.
#[derive(Debug, Clone)]
pub struct CrewAdapter {
    options: AdapterOptions,
}

impl CrewAdapter {
    pub fn new(options: AdapterOptions) -> Self {
        Self { options }
    }
}

impl Adapter for CrewAdapter {
    fn name(&self) -> &'static str {
        "crew"
    }

    fn response_mode(&self) -> ResponseMode {
        ResponseMode::Sync
    }

    fn model(&self) -> Option<&str> {
        self.options.model.as_deref()
    }

    fn build_request(&self, tc: &TestCase) -> Result<WireRequest, EvalError> {
        check_request(tc, &self.options.required_context)?;
        let mut inputs: Map<String, Value> = tc
            .input
            .context
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        inputs.insert("query".to_string(), Value::String(tc.input.query.clone()));
        Ok(WireRequest {
            url: tc.endpoint.trim().to_string(),
            headers: merged_headers(&self.options, ResponseMode::Sync),
            body: json!({ "inputs": inputs }),
            mode: ResponseMode::Sync,
        })
    }

    fn parse_sync_response(&self, body: &[u8]) -> Result<ExecutionTrace, MalformedResponse> {
        let mut builder = self.new_builder();
        let value: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                return Err(malformed(
                    builder,
                    format!("response is not JSON ({}): {}", e, preview(body)),
                ))
            }
        };
        let Some(obj) = value.as_object() else {
            return Err(malformed(builder, "response is not a JSON object"));
        };

        let mut problems = Vec::new();
        let mut last_task_output = None;

        match obj.get("tasks") {
            None | Some(Value::Null) => {}
            Some(Value::Array(tasks)) => {
                for (i, task) in tasks.iter().enumerate() {
                    match task.as_object() {
                        Some(task) => {
                            if let Some(out) = read_task(task, &mut builder, &mut problems) {
                                last_task_output = Some(out);
                            }
                        }
                        None => problems.push(format!("tasks[{}] is not an object", i)),
                    }
                }
            }
            Some(_) => problems.push("tasks is not an array".to_string()),
        }

        if let Some(usage) = obj.get("usage").or_else(|| obj.get("token_usage")) {
            read_usage(usage, &mut builder, &mut problems);
        }

        match obj.get("cost") {
            None | Some(Value::Null) => {}
            Some(v) => match v.as_f64() {
                Some(c) if c >= 0.0 => builder.set_cost(c),
                _ => problems.push(format!("cost is not a non-negative number: {}", v)),
            },
        }

        match obj
            .get("result")
            .or_else(|| obj.get("output"))
            .or_else(|| obj.get("raw"))
        {
            Some(Value::String(s)) => builder.set_output(s.clone()),
            Some(other) => problems.push(format!("result is not a string: {}", other)),
            None => {
                if let Some(out) = last_task_output {
                    builder.set_output(out);
                }
                problems.push("missing 'result' or 'output' field".to_string());
            }
        }

        if problems.is_empty() {
            Ok(builder.finish(Terminal::Ok, 0))
        } else {
            Err(malformed(builder, problems.join("; ")))
        }
    }
}

fn read_task(
    task: &Map<String, Value>,
    builder: &mut TraceBuilder,
    problems: &mut Vec<String>,
) -> Option<String> {
    let agent = task
        .get("agent")
        .and_then(Value::as_str)
        .unwrap_or("agent")
        .to_string();

    match task.get("tools") {
        None | Some(Value::Null) => {}
        Some(Value::Array(tools)) => {
            for tool in tools {
                let Some(name) = tool.get("name").and_then(Value::as_str) else {
                    problems.push(format!("tool without a name in task of '{}'", agent));
                    continue;
                };
                let input = tool.get("input").cloned().unwrap_or(Value::Null);
                let output = tool.get("output").cloned().filter(|v| !v.is_null());
                let ok = tool.get("success").and_then(Value::as_bool).unwrap_or(true);
                builder.record_tool_call(name, input);
                builder.record_tool_result(Some(name), output, ok);
            }
        }
        Some(_) => problems.push(format!("tools of '{}' is not an array", agent)),
    }

    let output = task.get("output").and_then(|o| match o {
        Value::String(s) => Some(s.clone()),
        Value::Object(m) => m.get("raw").and_then(Value::as_str).map(str::to_string),
        _ => None,
    })?;
    builder.record_message(agent, output.clone());
    Some(output)
}

fn read_usage(usage: &Value, builder: &mut TraceBuilder, problems: &mut Vec<String>) {
    if usage.is_null() {
        return;
    }
    let Some(u) = usage.as_object() else {
        problems.push("usage is not an object".to_string());
        return;
    };
    let mut count = |key: &str| -> u64 {
        match u.get(key) {
            None | Some(Value::Null) => 0,
            Some(v) => v.as_u64().unwrap_or_else(|| {
                problems.push(format!("usage.{} is not a count: {}", key, v));
                0
            }),
        }
    };
    builder.record_usage(
        &Usage::new(
            count("prompt_tokens"),
            count("completion_tokens"),
            count("cached_prompt_tokens"),
        ),
        None,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::test_support::case;
    use crate::adapter::AdapterKind;
    use crate::model::StepKind;

    #[test]
    fn inputs_flatten_context() {
        let mut tc = case(AdapterKind::Crew, "plan a trip");
        tc.input.context.insert("budget".into(), json!(500));
        let req = CrewAdapter::new(AdapterOptions::default()).build_request(&tc).unwrap();
        assert_eq!(req.body, json!({"inputs": {"query": "plan a trip", "budget": 500}}));
    }

    #[test]
    fn tasks_become_tool_pairs_and_messages() {
        let body = br#"{
            "result": "Trip planned",
            "tasks": [
                {"agent": "researcher", "description": "find flights", "output": "3 flights",
                 "tools": [{"name": "flight_search", "input": {"to": "NRT"}, "output": "[..]", "success": true}]},
                {"agent": "writer", "output": "Itinerary", "tools": []}
            ],
            "usage": {"prompt_tokens": 100, "completion_tokens": 40, "cached_prompt_tokens": 10}
        }"#;
        let t = CrewAdapter::new(AdapterOptions::default())
            .parse_sync_response(body)
            .unwrap();
        let kinds: Vec<_> = t.steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::ToolCall,
                StepKind::ToolResult,
                StepKind::Message,
                StepKind::Message
            ]
        );
        assert_eq!(t.tool_call_names(), vec!["flight_search"]);
        assert_eq!(t.steps[2].name, "researcher");
        assert_eq!(t.output, "Trip planned");
        assert_eq!(t.usage, Usage::new(100, 40, 10));
        assert!(t.violations.is_empty());
    }

    #[test]
    fn non_numeric_usage_is_malformed() {
        let body = br#"{
            "result": "done",
            "usage": {"prompt_tokens": "lots", "completion_tokens": 12}
        }"#;
        let err = CrewAdapter::new(AdapterOptions::default())
            .parse_sync_response(body)
            .unwrap_err();
        assert!(err.reason.contains("usage.prompt_tokens is not a count"), "{}", err.reason);
        assert_eq!(err.partial.output, "done");
        assert_eq!(err.partial.usage, Usage::new(0, 12, 0));
    }

    #[test]
    fn missing_result_falls_back_to_last_task_output() {
        let body = br#"{"tasks": [{"agent": "writer", "output": "draft"}]}"#;
        let err = CrewAdapter::new(AdapterOptions::default())
            .parse_sync_response(body)
            .unwrap_err();
        assert_eq!(err.partial.output, "draft");
        assert_eq!(err.partial.terminal, Terminal::MalformedStream);
    }
}

use serde_json::json;
use tracing::debug;

use super::{check_request, merged_headers, Adapter, ResponseMode, WireRequest};
use crate::errors::EvalError;
use crate::model::{AdapterOptions, TestCase, Usage};
use crate::trace::{StreamEvent, TraceBuilder};

const ASSISTANT_ID: &str = "assistant_id";

/// NDJSON event-stream backend (`start`, `tool_call`, `tool_result`, `usage`,
/// `message_complete`).
#[derive(Debug, Clone)]
pub struct StreamingAdapter {
    options: AdapterOptions,
    assistant_routing: bool,
}

impl StreamingAdapter {
    pub fn new(options: AdapterOptions) -> Self {
        Self {
            options,
            assistant_routing: false,
        }
    }

    /// Graph-style backends that route on an assistant identifier.
    pub fn langgraph(mut options: AdapterOptions) -> Self {
        if !options.required_context.iter().any(|k| k == ASSISTANT_ID) {
            options.required_context.push(ASSISTANT_ID.to_string());
        }
        Self {
            options,
            assistant_routing: true,
        }
    }
}

impl Adapter for StreamingAdapter {
    fn name(&self) -> &'static str {
        if self.assistant_routing {
            "langgraph"
        } else {
            "streaming"
        }
    }

    fn response_mode(&self) -> ResponseMode {
        ResponseMode::Stream
    }

    fn model(&self) -> Option<&str> {
        self.options.model.as_deref()
    }

    fn build_request(&self, tc: &TestCase) -> Result<WireRequest, EvalError> {
        check_request(tc, &self.options.required_context)?;
        let mut body = json!({
            "query": tc.input.query,
            "context": tc.input.context,
            "stream": true,
        });
        if self.assistant_routing {
            if let Some(id) = tc.input.context.get(ASSISTANT_ID) {
                body[ASSISTANT_ID] = id.clone();
            }
        }
        Ok(WireRequest {
            url: tc.endpoint.trim().to_string(),
            headers: merged_headers(&self.options, ResponseMode::Stream),
            body,
            mode: ResponseMode::Stream,
        })
    }

    fn consume_stream_event(&self, line: &str, builder: &mut TraceBuilder) {
        let event = match StreamEvent::parse_line(line) {
            Ok(Some(ev)) => ev,
            Ok(None) => {
                debug!(line = %line, "ignoring unknown stream record");
                return;
            }
            Err(reason) => {
                builder.record_bad_record(reason);
                return;
            }
        };
        match event {
            StreamEvent::Start(d) => builder.record_start(d.message),
            StreamEvent::ToolCall(d) => {
                builder.record_tool_call(d.name, d.args);
            }
            StreamEvent::ToolResult(d) => {
                builder.record_tool_result(d.name.as_deref(), d.result, d.success)
            }
            StreamEvent::Usage(d) => builder.record_usage(
                &Usage::new(d.input_tokens, d.output_tokens, d.cached_tokens),
                d.cost,
            ),
            StreamEvent::MessageComplete(d) => builder.complete(d.content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::test_support::case;
    use crate::adapter::AdapterKind;
    use crate::model::{StepKind, Terminal};

    fn feed(adapter: &StreamingAdapter, lines: &[&str]) -> crate::model::ExecutionTrace {
        let mut b = adapter.new_builder();
        for l in lines {
            adapter.consume_stream_event(l, &mut b);
        }
        let terminal = b.terminal_on_close();
        b.finish(terminal, 0)
    }

    #[test]
    fn request_sets_stream_flag() {
        let a = StreamingAdapter::new(AdapterOptions::default());
        let req = a.build_request(&case(AdapterKind::Streaming, "hi")).unwrap();
        assert_eq!(req.body["stream"], true);
        assert_eq!(req.headers["accept"], "application/x-ndjson");
    }

    #[test]
    fn langgraph_requires_assistant_id() {
        let a = StreamingAdapter::langgraph(AdapterOptions::default());
        let mut tc = case(AdapterKind::Langgraph, "hi");
        let err = a.build_request(&tc).unwrap_err();
        assert!(err.to_string().contains("assistant_id"));

        tc.input.context.insert("assistant_id".into(), json!("agent-7"));
        let req = a.build_request(&tc).unwrap();
        assert_eq!(req.body["assistant_id"], "agent-7");
    }

    #[test]
    fn assembles_full_stream() {
        let a = StreamingAdapter::new(AdapterOptions::default());
        let t = feed(
            &a,
            &[
                r#"{"type":"start","data":{"message":"weather?"}}"#,
                r#"{"type":"tool_call","data":{"name":"get_weather","args":{"city":"Paris"}}}"#,
                r#"{"type":"tool_result","data":{"result":{"temp":21},"success":true}}"#,
                r#"{"type":"usage","data":{"input_tokens":10,"output_tokens":5}}"#,
                r#"{"type":"usage","data":{"input_tokens":3,"output_tokens":2}}"#,
                r#"{"type":"message_complete","data":{"content":"Paris is sunny"}}"#,
            ],
        );
        assert_eq!(t.terminal, Terminal::Ok);
        assert_eq!(t.output, "Paris is sunny");
        assert_eq!(t.usage, Usage::new(13, 7, 0));
        let kinds: Vec<_> = t.steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![StepKind::ToolCall, StepKind::ToolResult, StepKind::Message]
        );
        assert_eq!(t.steps[1].name, "get_weather");
    }

    #[test]
    fn garbage_lines_are_violations_and_mark_stream_malformed() {
        let a = StreamingAdapter::new(AdapterOptions::default());
        let t = feed(
            &a,
            &[
                r#"{"type":"tool_call","data":{"name":"x"}}"#,
                "{not json",
                r#"{"type":"ping"}"#,
            ],
        );
        assert_eq!(t.terminal, Terminal::MalformedStream);
        assert_eq!(t.steps.len(), 1);
        assert!(t.violations.iter().any(|v| v.contains("unparseable")));
    }
}

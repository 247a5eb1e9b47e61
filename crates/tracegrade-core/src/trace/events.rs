use serde::{Deserialize, Serialize};

// --- NDJSON streaming wire format: one `{ "type": ..., "data": {...} }` per line ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Start(StartData),
    ToolCall(ToolCallData),
    ToolResult(ToolResultData),
    Usage(UsageData),
    MessageComplete(MessageCompleteData),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StartData {
    /// Echo of the query.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallData {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultData {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default = "default_success")]
    pub success: bool,
    /// Some backends name the tool on the result; otherwise it is taken from the paired call.
    #[serde(default)]
    pub name: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UsageData {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cached_tokens: u64,
    #[serde(default)]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MessageCompleteData {
    #[serde(default)]
    pub content: String,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl StreamEvent {
    /// Decode one NDJSON line.
    ///
    /// `Ok(None)` means the line was valid JSON with an event type this decoder does not know;
    /// such records are ignored. `Err` carries a human-readable reason for the violation log.
    pub fn parse_line(line: &str) -> Result<Option<StreamEvent>, String> {
        let raw: RawEvent =
            serde_json::from_str(line).map_err(|e| format!("unparseable record: {}", e))?;
        let data = if raw.data.is_null() {
            serde_json::Value::Object(Default::default())
        } else {
            raw.data
        };
        let decoded = match raw.kind.as_str() {
            "start" => serde_json::from_value(data).map(StreamEvent::Start),
            "tool_call" => serde_json::from_value(data).map(StreamEvent::ToolCall),
            "tool_result" => serde_json::from_value(data).map(StreamEvent::ToolResult),
            "usage" => serde_json::from_value(data).map(StreamEvent::Usage),
            "message_complete" => serde_json::from_value(data).map(StreamEvent::MessageComplete),
            _ => return Ok(None),
        };
        decoded
            .map(Some)
            .map_err(|e| format!("invalid '{}' record: {}", raw.kind, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_kinds() {
        let ev = StreamEvent::parse_line(r#"{"type":"tool_call","data":{"name":"search","args":{"q":"x"}}}"#)
            .unwrap()
            .unwrap();
        match ev {
            StreamEvent::ToolCall(d) => {
                assert_eq!(d.name, "search");
                assert_eq!(d.args["q"], "x");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn tool_result_defaults_to_success() {
        let ev = StreamEvent::parse_line(r#"{"type":"tool_result","data":{"result":"ok"}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            ev,
            StreamEvent::ToolResult(ToolResultData {
                result: Some(serde_json::json!("ok")),
                success: true,
                name: None,
            })
        );
    }

    #[test]
    fn unknown_kind_is_ignored() {
        assert_eq!(
            StreamEvent::parse_line(r#"{"type":"heartbeat","data":{}}"#).unwrap(),
            None
        );
    }

    #[test]
    fn missing_data_is_tolerated_for_optional_payloads() {
        let ev = StreamEvent::parse_line(r#"{"type":"start"}"#).unwrap().unwrap();
        assert_eq!(ev, StreamEvent::Start(StartData::default()));
    }

    #[test]
    fn garbage_and_bad_payloads_are_errors() {
        assert!(StreamEvent::parse_line("not json").is_err());
        let err = StreamEvent::parse_line(r#"{"type":"tool_call","data":{"args":{}}}"#).unwrap_err();
        assert!(err.contains("tool_call"), "{}", err);
    }
}

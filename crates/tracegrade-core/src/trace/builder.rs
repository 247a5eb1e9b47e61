use std::collections::VecDeque;

use serde_json::Value;
use tracing::warn;

use crate::model::{ExecutionTrace, Step, StepKind, Terminal, Usage};
use crate::pricing::ModelPrice;

/// Incremental trace assembly.
///
/// The builder is a plain state machine: it knows nothing about sockets or the runtime. The
/// collector advances the clock and feeds it events; adapters decide what each event means.
#[derive(Debug, Default)]
pub struct TraceBuilder {
    steps: Vec<Step>,
    usage: Usage,
    /// Usage from events that carried no cost of their own.
    unpriced_usage: Usage,
    /// Sum of per-event costs.
    reported_cost: Option<f64>,
    /// Whole-run cost from the backend. Overrides everything else.
    run_cost: Option<f64>,
    price: Option<ModelPrice>,
    output: Option<String>,
    echoed_query: Option<String>,
    pending_calls: VecDeque<usize>,
    violations: Vec<String>,
    diagnostic: Option<String>,
    clock_ms: u64,
    completed: bool,
    bad_records: usize,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Price used to estimate cost for usage no event put a price on.
    pub fn with_pricing(mut self, price: Option<ModelPrice>) -> Self {
        self.price = price;
        self
    }

    /// Move the step clock forward. Offsets never go backwards.
    pub fn advance_clock(&mut self, offset_ms: u64) {
        self.clock_ms = self.clock_ms.max(offset_ms);
    }

    pub fn record_start(&mut self, echoed_query: Option<String>) {
        if self.echoed_query.is_some() {
            self.record_violation("duplicate start record");
        }
        self.echoed_query = echoed_query;
    }

    /// Append a tool call and return its step index.
    pub fn record_tool_call(&mut self, name: impl Into<String>, args: Value) -> usize {
        let index = self.push_step(StepKind::ToolCall, name.into(), args, None, true);
        self.pending_calls.push_back(index);
        index
    }

    /// Append a tool result, pairing it with the oldest unmatched call.
    ///
    /// An orphan result is kept as a step and logged as a violation.
    pub fn record_tool_result(&mut self, name: Option<&str>, result: Option<Value>, ok: bool) {
        let call_name = match self.pending_calls.pop_front() {
            Some(call_idx) => Some(self.steps[call_idx].name.clone()),
            None => {
                let label = name.unwrap_or("<unnamed>");
                self.record_violation(format!(
                    "tool_result for '{}' without a preceding tool_call",
                    label
                ));
                None
            }
        };
        let resolved = name
            .map(str::to_string)
            .or(call_name)
            .unwrap_or_default();
        self.push_step(StepKind::ToolResult, resolved, Value::Null, result, ok);
    }

    pub fn record_message(&mut self, author: impl Into<String>, content: impl Into<String>) {
        self.push_step(
            StepKind::Message,
            author.into(),
            Value::Null,
            Some(Value::String(content.into())),
            true,
        );
    }

    pub fn record_usage(&mut self, usage: &Usage, cost: Option<f64>) {
        self.usage.add(usage);
        match cost {
            Some(c) => *self.reported_cost.get_or_insert(0.0) += c,
            None => self.unpriced_usage.add(usage),
        }
    }

    /// Logical end of the run. Later calls replace the output.
    pub fn complete(&mut self, content: impl Into<String>) {
        let content = content.into();
        self.record_message("assistant", content.clone());
        self.output = Some(content);
        self.completed = true;
    }

    /// Final output without a message step (synchronous responses).
    pub fn set_output(&mut self, output: impl Into<String>) {
        self.output = Some(output.into());
        self.completed = true;
    }

    pub fn set_cost(&mut self, cost: f64) {
        self.run_cost = Some(cost);
    }

    pub fn record_violation(&mut self, violation: impl Into<String>) {
        let violation = violation.into();
        warn!(violation = %violation, "protocol violation");
        self.violations.push(violation);
    }

    /// A record that could not be decoded at all.
    pub fn record_bad_record(&mut self, reason: impl Into<String>) {
        self.bad_records += 1;
        self.record_violation(reason);
    }

    pub fn set_diagnostic(&mut self, diagnostic: impl Into<String>) {
        self.diagnostic = Some(diagnostic.into());
    }

    pub fn is_complete(&self) -> bool {
        self.completed
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Terminal state for a stream that closed on its own.
    pub fn terminal_on_close(&self) -> Terminal {
        if self.completed {
            Terminal::Ok
        } else if self.bad_records > 0 {
            Terminal::MalformedStream
        } else {
            Terminal::Ok
        }
    }

    /// Freeze the trace.
    pub fn finish(mut self, terminal: Terminal, latency_ms: u64) -> ExecutionTrace {
        if !self.completed && terminal == Terminal::Ok {
            self.record_violation("stream closed without message_complete");
        }
        // Reported costs are taken as-is; the rest is estimated when the model has a price.
        let estimated = self.price.map_or(0.0, |p| p.cost(&self.unpriced_usage));
        let cost = self
            .run_cost
            .unwrap_or_else(|| self.reported_cost.unwrap_or(0.0) + estimated);
        ExecutionTrace {
            output: self.output.unwrap_or_default(),
            steps: self.steps,
            usage: self.usage,
            cost,
            latency_ms,
            terminal,
            violations: self.violations,
            diagnostic: self.diagnostic,
        }
    }

    fn push_step(
        &mut self,
        kind: StepKind,
        name: String,
        args: Value,
        result: Option<Value>,
        ok: bool,
    ) -> usize {
        let index = self.steps.len();
        self.steps.push(Step {
            index,
            kind,
            name,
            args,
            result,
            ok,
            ts_offset_ms: self.clock_ms,
        });
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn steps_keep_arrival_order_and_monotonic_offsets() {
        let mut b = TraceBuilder::new();
        b.advance_clock(5);
        b.record_tool_call("search", json!({"q": "weather"}));
        b.advance_clock(3);
        b.record_tool_result(None, Some(json!("sunny")), true);
        b.advance_clock(12);
        b.complete("It is sunny");

        let t = b.finish(Terminal::Ok, 20);
        let offsets: Vec<u64> = t.steps.iter().map(|s| s.ts_offset_ms).collect();
        assert_eq!(offsets, vec![5, 5, 12]);
        assert_eq!(t.steps[1].name, "search");
        assert_eq!(t.output, "It is sunny");
        assert!(t.violations.is_empty());
    }

    #[test]
    fn orphan_tool_result_is_kept_and_recorded() {
        let mut b = TraceBuilder::new();
        b.record_tool_result(Some("lookup"), None, false);
        b.complete("done");
        let t = b.finish(Terminal::Ok, 1);
        assert_eq!(t.steps.len(), 2);
        assert_eq!(t.steps[0].kind, StepKind::ToolResult);
        assert_eq!(t.tool_calls().count(), 0);
        assert_eq!(t.violations.len(), 1);
        assert!(t.violations[0].contains("lookup"));
    }

    #[test]
    fn results_pair_with_oldest_pending_call() {
        let mut b = TraceBuilder::new();
        b.record_tool_call("a", Value::Null);
        b.record_tool_call("b", Value::Null);
        b.record_tool_result(None, None, true);
        b.record_tool_result(None, None, true);
        let t = b.finish(Terminal::Timeout, 0);
        let names: Vec<_> = t.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "a", "b"]);
    }

    #[test]
    fn mixed_usage_adds_estimate_for_unpriced_events() {
        let mut b = TraceBuilder::new().with_pricing(Some(ModelPrice::new(2.0, 4.0, 0.0)));
        b.record_usage(&Usage::new(1_000_000, 500_000, 0), None);
        b.record_usage(&Usage::new(3, 2, 0), Some(0.25));
        b.complete("x");
        let t = b.finish(Terminal::Ok, 0);
        assert_eq!(t.usage, Usage::new(1_000_003, 500_002, 0));
        assert!((t.cost - 4.25).abs() < 1e-9, "{}", t.cost);
    }

    #[test]
    fn unpriced_model_counts_only_reported_cost() {
        let mut b = TraceBuilder::new();
        b.record_usage(&Usage::new(10, 5, 0), None);
        b.record_usage(&Usage::new(3, 2, 0), Some(0.25));
        let t = b.finish(Terminal::Ok, 0);
        assert_eq!(t.cost, 0.25);
    }

    #[test]
    fn whole_run_cost_overrides_event_costs() {
        let mut b = TraceBuilder::new().with_pricing(Some(ModelPrice::new(2.0, 4.0, 0.0)));
        b.record_usage(&Usage::new(1_000_000, 0, 0), None);
        b.record_usage(&Usage::new(0, 0, 0), Some(0.5));
        b.set_cost(0.1);
        let t = b.finish(Terminal::Ok, 0);
        assert_eq!(t.cost, 0.1);
    }

    #[test]
    fn cost_is_estimated_without_reported_cost() {
        let mut b = TraceBuilder::new().with_pricing(Some(ModelPrice::new(2.0, 4.0, 0.0)));
        b.record_usage(&Usage::new(1_000_000, 500_000, 0), None);
        b.complete("x");
        let t = b.finish(Terminal::Ok, 0);
        assert!((t.cost - 4.0).abs() < 1e-9);
    }

    #[test]
    fn close_without_completion() {
        let mut b = TraceBuilder::new();
        b.record_tool_call("a", Value::Null);
        assert_eq!(b.terminal_on_close(), Terminal::Ok);
        let t = b.finish(Terminal::Ok, 0);
        assert!(t.violations.iter().any(|v| v.contains("message_complete")));

        let mut b = TraceBuilder::new();
        b.record_bad_record("unparseable record");
        assert_eq!(b.terminal_on_close(), Terminal::MalformedStream);
    }

    #[test]
    fn latest_completion_wins() {
        let mut b = TraceBuilder::new();
        b.complete("first");
        b.complete("second");
        let t = b.finish(Terminal::Ok, 0);
        assert_eq!(t.output, "second");
    }
}

//! Trace collection: the only place that talks to agent backends.
//!
//! Every failure after the request is built (connect errors, non-2xx statuses, undecodable
//! bodies, the total deadline) is folded into the returned trace's terminal state.

use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::time::timeout_at;
use tracing::{debug, warn};

use crate::adapter::{preview, Adapter, ResponseMode, WireRequest};
use crate::errors::EvalError;
use crate::model::{ExecutionTrace, TestCase, Terminal};
use crate::trace::TraceBuilder;

mod lines;

use lines::LineBuffer;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub connect_timeout: Duration,
    /// Hard bound on the whole exchange, from send until the terminal event.
    pub total_timeout: Duration,
    /// Gaps between stream chunks longer than this are logged.
    pub idle_warn: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            total_timeout: Duration::from_secs(120),
            idle_warn: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TraceCollector {
    client: reqwest::Client,
    config: CollectorConfig,
}

impl TraceCollector {
    pub fn new(config: CollectorConfig) -> Result<Self, EvalError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("tracegrade/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EvalError::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    /// Build the request and collect a trace.
    ///
    /// Only request-building problems are returned as `Err`, before any I/O happens.
    pub async fn run(&self, adapter: &dyn Adapter, tc: &TestCase) -> Result<ExecutionTrace, EvalError> {
        let request = adapter.build_request(tc)?;
        Ok(self.collect(adapter, &tc.id, &request).await)
    }

    pub async fn collect(
        &self,
        adapter: &dyn Adapter,
        test_id: &str,
        request: &WireRequest,
    ) -> ExecutionTrace {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.total_timeout;

        debug!(
            test_id,
            adapter = adapter.name(),
            endpoint = %request.url,
            "sending request"
        );

        let mut http = self.client.post(&request.url);
        for (name, value) in &request.headers {
            http = http.header(name.as_str(), value.as_str());
        }
        let http = http.json(&request.body);

        let response = match timeout_at(deadline, http.send()).await {
            Err(_) => return self.timed_out(adapter.new_builder(), test_id, started),
            Ok(Err(e)) => {
                return self.backend_error(
                    adapter.new_builder(),
                    test_id,
                    &request.url,
                    describe(&e),
                    started,
                )
            }
            Ok(Ok(r)) => r,
        };

        let status = response.status();
        if !status.is_success() {
            let body = match timeout_at(deadline, response.text()).await {
                Ok(Ok(text)) => text,
                _ => String::new(),
            };
            return self.backend_error(
                adapter.new_builder(),
                test_id,
                &request.url,
                format!("HTTP {}: {}", status, preview(body.as_bytes())),
                started,
            );
        }

        match request.mode {
            ResponseMode::Sync => {
                self.read_sync(adapter, test_id, &request.url, response, deadline, started)
                    .await
            }
            ResponseMode::Stream => {
                self.read_stream(adapter, test_id, &request.url, response, deadline, started)
                    .await
            }
        }
    }

    async fn read_sync(
        &self,
        adapter: &dyn Adapter,
        test_id: &str,
        url: &str,
        response: reqwest::Response,
        deadline: tokio::time::Instant,
        started: Instant,
    ) -> ExecutionTrace {
        let body = match timeout_at(deadline, response.bytes()).await {
            Err(_) => return self.timed_out(adapter.new_builder(), test_id, started),
            Ok(Err(e)) => {
                return self.backend_error(
                    adapter.new_builder(),
                    test_id,
                    url,
                    format!("failed to read response body: {}", describe(&e)),
                    started,
                )
            }
            Ok(Ok(b)) => b,
        };
        let latency_ms = elapsed_ms(started);

        let mut trace = match adapter.parse_sync_response(&body) {
            Ok(t) => t,
            Err(malformed) => {
                warn!(
                    test_id,
                    adapter = adapter.name(),
                    reason = %malformed.reason,
                    "malformed response"
                );
                *malformed.partial
            }
        };
        trace.latency_ms = latency_ms;
        for step in &mut trace.steps {
            step.ts_offset_ms = latency_ms;
        }
        log_collected(test_id, &trace);
        trace
    }

    async fn read_stream(
        &self,
        adapter: &dyn Adapter,
        test_id: &str,
        url: &str,
        response: reqwest::Response,
        deadline: tokio::time::Instant,
        started: Instant,
    ) -> ExecutionTrace {
        let mut builder = adapter.new_builder();
        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut last_chunk = Instant::now();

        loop {
            let next = match timeout_at(deadline, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    // Dropping the stream tears down the connection.
                    drop(stream);
                    return self.timed_out(builder, test_id, started);
                }
            };

            match next {
                None => {
                    if let Some(line) = lines.finish() {
                        builder.advance_clock(elapsed_ms(started));
                        adapter.consume_stream_event(&line, &mut builder);
                    }
                    let terminal = builder.terminal_on_close();
                    if terminal == Terminal::MalformedStream {
                        builder.set_diagnostic("stream closed after undecodable records");
                    }
                    let trace = builder.finish(terminal, elapsed_ms(started));
                    log_collected(test_id, &trace);
                    return trace;
                }
                Some(Err(e)) => {
                    return self.backend_error(
                        builder,
                        test_id,
                        url,
                        format!("stream interrupted: {}", describe(&e)),
                        started,
                    )
                }
                Some(Ok(chunk)) => {
                    let gap = last_chunk.elapsed();
                    if gap >= self.config.idle_warn {
                        warn!(
                            test_id,
                            gap_ms = u64::try_from(gap.as_millis()).unwrap_or(u64::MAX),
                            steps = builder.step_count(),
                            "stream stalled"
                        );
                    }
                    last_chunk = Instant::now();

                    for line in lines.push(&chunk) {
                        builder.advance_clock(elapsed_ms(started));
                        debug!(test_id, record = %line, "stream record");
                        adapter.consume_stream_event(&line, &mut builder);
                        if builder.is_complete() {
                            let trace = builder.finish(Terminal::Ok, elapsed_ms(started));
                            log_collected(test_id, &trace);
                            return trace;
                        }
                    }
                }
            }
        }
    }

    fn timed_out(&self, mut builder: TraceBuilder, test_id: &str, started: Instant) -> ExecutionTrace {
        let after_ms = u64::try_from(self.config.total_timeout.as_millis()).unwrap_or(u64::MAX);
        let diagnostic = EvalError::Timeout { after_ms };
        warn!(
            test_id,
            elapsed_ms = elapsed_ms(started),
            steps = builder.step_count(),
            "{}",
            diagnostic
        );
        builder.set_diagnostic(diagnostic.to_string());
        builder.finish(Terminal::Timeout, elapsed_ms(started))
    }

    fn backend_error(
        &self,
        mut builder: TraceBuilder,
        test_id: &str,
        endpoint: &str,
        message: String,
        started: Instant,
    ) -> ExecutionTrace {
        let diagnostic = EvalError::connection(endpoint, message);
        warn!(test_id, endpoint, error = %diagnostic, "backend error");
        builder.set_diagnostic(diagnostic.to_string());
        builder.finish(Terminal::BackendError, elapsed_ms(started))
    }
}

fn log_collected(test_id: &str, trace: &ExecutionTrace) {
    debug!(
        test_id,
        terminal = %trace.terminal,
        elapsed_ms = trace.latency_ms,
        steps = trace.steps.len(),
        "trace collected"
    );
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// reqwest hides the root cause behind "error sending request"; walk the source chain.
fn describe(err: &reqwest::Error) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    if err.is_connect() {
        format!("connect failed: {}", text)
    } else {
        text
    }
}

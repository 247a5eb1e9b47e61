//! Execution-trace collection and scoring engine for agent backends.
//!
//! A [`model::TestCase`] is sent to a backend through an [`adapter::Adapter`], the
//! [`collector::TraceCollector`] assembles the canonical [`model::ExecutionTrace`], the
//! [`scoring::Scorer`] turns it into a [`model::Verdict`], and [`baseline::compare`] diffs it
//! against a stored golden run. [`engine::Evaluator`] wires the pipeline together.

pub mod adapter;
pub mod baseline;
pub mod collector;
pub mod config;
pub mod engine;
pub mod errors;
pub mod judge;
pub mod model;
pub mod pricing;
pub mod report;
pub mod scoring;
pub mod trace;

pub use engine::{ComparedEvaluation, Evaluation, Evaluator};
pub use errors::{EvalError, EvalErrorKind};

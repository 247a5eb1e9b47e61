//! Hosted-judge plumbing.
//!
//! - `prompt`: system and user prompt assembly
//! - `client`: provider request shapes, status mapping and text extraction
//! - `parse`: score extraction from free-form model text

pub(crate) mod client;
pub(crate) mod parse;
pub(crate) mod prompt;

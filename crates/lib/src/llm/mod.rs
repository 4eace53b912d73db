//! Remote language model client.
//!
//! Supports one-shot and streaming generation against the Gemini API.

mod gemini;

pub use gemini::{Content, GeminiClient, GeminiError, GenerateRequest, Part};

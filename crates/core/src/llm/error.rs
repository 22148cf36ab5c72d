use crate::llm::Provider;
use std::fmt;
use thiserror::Error;

/// Cleaned model output is not a brace-delimited JSON object.
#[derive(Debug, Error)]
#[error("model response is not a JSON object: {detail}")]
pub struct MalformedResponseError {
    pub detail: String,
}

/// Cleaned text looked like JSON but did not parse. This is a model-quality
/// failure, never retried as a network error.
#[derive(Debug, Error)]
#[error("model response failed to parse as JSON: {detail}")]
pub struct JsonParseError {
    pub detail: String,
}

#[derive(Debug, Error)]
#[error("model response is missing required section '{section}'")]
pub struct MissingRequiredSectionError {
    pub section: String,
}

/// Terminal generation failure with everything an operator needs to see:
/// which provider, which stage, and the raw output that failed to validate.
#[derive(Debug)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub detail: String,
    pub raw_output: Option<String>,
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

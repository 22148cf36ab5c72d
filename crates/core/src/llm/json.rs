use crate::domain::artifact::AnalysisArtifact;
use crate::domain::contract::LlmAnalysisArtifact;
use crate::llm::error::{JsonParseError, MalformedResponseError, MissingRequiredSectionError};
use chrono::NaiveDate;

/// Reduce raw model output to the bare JSON object it should contain:
/// trim, drop Markdown fences in any casing, and cut everything outside the
/// first `{` and the last `}`. Pure and idempotent: cleaning an already
/// clean object returns it unchanged.
pub fn clean_model_output(raw: &str) -> Result<String, MalformedResponseError> {
    let mut text = raw.trim();

    if text.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```, any tag casing).
        if let Some(after_first_line) = text.splitn(2, '\n').nth(1) {
            text = after_first_line;
        }
        if let Some(end) = text.rfind("```") {
            text = &text[..end];
        }
        text = text.trim();
    }

    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(MalformedResponseError {
            detail: "no JSON object delimiters found".to_string(),
        });
    };
    if end < start {
        return Err(MalformedResponseError {
            detail: "closing brace precedes opening brace".to_string(),
        });
    }

    Ok(text[start..=end].to_string())
}

/// Clean, parse, structurally check, and convert one raw model response.
/// Each failure mode keeps its own type so callers can tell model-quality
/// failures apart from network ones.
pub fn parse_artifact(
    raw: &str,
    expected_date: NaiveDate,
    session: &str,
    base_lang: &str,
) -> anyhow::Result<AnalysisArtifact> {
    let cleaned = clean_model_output(raw)?;

    let parsed: LlmAnalysisArtifact =
        serde_json::from_str(&cleaned).map_err(|err| JsonParseError {
            detail: err.to_string(),
        })?;

    let Some(base) = parsed.languages.get(base_lang) else {
        return Err(MissingRequiredSectionError {
            section: format!("languages.{base_lang}"),
        }
        .into());
    };
    if base.details.is_none() {
        return Err(MissingRequiredSectionError {
            section: format!("languages.{base_lang}.details"),
        }
        .into());
    }

    parsed.validate_and_into_artifact(expected_date, session, base_lang)
}

use crate::config::Settings;
use crate::domain::artifact::AnalysisArtifact;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{json, GenerateInput, LlmClient, Provider};
use crate::resilience::{
    is_transient, with_retry, with_timeout, CircuitBreaker, HttpStatusError, RetryOptions,
};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 8192;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 45;
const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    call_timeout: Duration,
    retry: RetryOptions,
    breaker: Arc<CircuitBreaker>,
}

impl AnthropicClient {
    /// The breaker is owned by the pipeline and handed in here; the client
    /// never constructs its own.
    pub fn from_settings(settings: &Settings, breaker: Arc<CircuitBreaker>) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let http_timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

        let call_timeout_secs = std::env::var("ANTHROPIC_CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CALL_TIMEOUT_SECS);

        let max_retries = std::env::var("ANTHROPIC_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(http_timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
            call_timeout: Duration::from_secs(call_timeout_secs),
            retry: RetryOptions {
                max_retries,
                base_delay: Duration::from_secs(2),
                backoff_multiplier: 3.0,
                max_delay: Duration::from_secs(30),
            },
            breaker,
        })
    }

    async fn create_message(&self, req: CreateMessageRequest) -> anyhow::Result<CreateMessageResponse> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            return Err(HttpStatusError::new(status, text).into());
        }

        serde_json::from_str::<CreateMessageResponse>(&text)
            .with_context(|| format!("failed to decode Anthropic response: {text}"))
    }

    /// One generation call behind the full guard stack:
    /// timeout -> circuit breaker -> retry (transient conditions only).
    async fn guarded_request(
        &self,
        req: &CreateMessageRequest,
    ) -> anyhow::Result<CreateMessageResponse> {
        with_retry(
            || {
                self.breaker.execute(|| {
                    with_timeout(
                        self.create_message(req.clone()),
                        self.call_timeout,
                        "anthropic-generate",
                    )
                })
            },
            &self.retry,
            is_transient,
            |err, attempt| {
                tracing::warn!(attempt, error = %err, "Anthropic call failed; will retry");
                Ok(())
            },
        )
        .await
    }

    fn system_prompt(languages: &[String]) -> String {
        let language_list = languages.join(", ");
        [
            "You are a market analyst writing the daily commentary for a Korean retail-investor site covering the US market.".to_string(),
            "Return ONLY a single valid JSON object. Do not wrap it in markdown. Do not add any prose before or after it.".to_string(),
            "No trailing commas. No comments. Use double quotes for all JSON strings.".to_string(),
            format!("The top-level \"languages\" object MUST contain exactly these keys: {language_list}."),
            "Each language value MUST have the identical nested structure, with all prose written in that language.".to_string(),
            "Output schema:".to_string(),
            "{".to_string(),
            "  \"date\": \"YYYY-MM-DD\",".to_string(),
            "  \"session\": \"morning|afternoon\",".to_string(),
            "  \"languages\": {".to_string(),
            "    \"<lang>\": {".to_string(),
            "      \"summary\": {\"evaluation\": \"Buy|Sell|Neutral\", \"score\": 1-10 integer, \"headline\": \"...\", \"text\": \"...\"},".to_string(),
            "      \"dashboard\": {".to_string(),
            "        \"breadth\": {\"advancers\": int >= 0, \"decliners\": int >= 0, \"summary\": \"...\"},".to_string(),
            "        \"sentimentIndex\": {\"value\": 0-100, \"summary\": \"...\"},".to_string(),
            "        \"priceLevels\": {\"resistance\": {\"value\": number, \"description\": \"...\"}, \"support\": {\"value\": number, \"description\": \"...\"}},".to_string(),
            "        \"putCallRatio\": {\"dailyValue\": number, \"movingAverage\": number, \"status\": \"...\", \"summary\": \"...\"}".to_string(),
            "      },".to_string(),
            "      \"details\": {".to_string(),
            "        \"internals\": {\"headline\": \"...\", \"text\": \"...\", \"chart\": {\"labels\": [\"...\"], \"series\": [{\"name\": \"...\", \"values\": [number]}]}},".to_string(),
            "        \"technicals\": {\"headline\": \"...\", \"text\": \"...\", \"chart\": {\"labels\": [\"...\"], \"series\": [{\"name\": \"...\", \"values\": [number]}]}},".to_string(),
            "        \"fundamentals\": {\"headline\": \"...\", \"text\": \"...\", \"vix\": {\"value\": number, \"summary\": \"...\"}, \"survey\": {\"bullish\": number, \"bearish\": number, \"summary\": \"...\"}, \"bullets\": [\"...\"]},".to_string(),
            "        \"strategy\": {\"headline\": \"...\", \"text\": \"...\"}".to_string(),
            "      },".to_string(),
            "      \"marketOverview\": [{\"name\": \"...\", \"value\": \"...\", \"change\": \"...\", \"isDown\": bool}],".to_string(),
            "      \"hotStocks\": [{\"name\": \"...\", \"price\": \"...\", \"description\": \"...\", \"isDown\": bool}]".to_string(),
            "    }".to_string(),
            "  }".to_string(),
            "}".to_string(),
            "Rules:".to_string(),
            "- score reflects evaluation: Buy >= 7, Neutral 4-6, Sell <= 3".to_string(),
            "- chart labels and every series values array must have the same length".to_string(),
            "- ground every number in the provided snapshot; do not invent prices".to_string(),
        ]
        .join("\n")
    }

    fn user_prompt(input: &GenerateInput) -> String {
        format!(
            "Task: Write the {session} session commentary for {date}.\n\n\
             Market snapshot:\n{snapshot}\n\n\
             Web evidence (may be partial):\n{evidence}",
            session = input.session,
            date = input.as_of_date,
            snapshot = input.snapshot.prompt_lines(),
            evidence = input.evidence,
        )
    }

    fn repair_prompt(previous_output: &str, input: &GenerateInput) -> String {
        format!(
            "Your previous message was NOT a valid analysis JSON object.\n\n\
             TASK: Output ONLY a single JSON object that exactly matches the schema from the system prompt.\n\
             - Do NOT include any markdown, prose, or code fences.\n\
             - The JSON MUST have date=\"{date}\" and a languages key for each of: {languages}.\n\
             - languages.{base}.details MUST contain internals, technicals, fundamentals and strategy.\n\n\
             INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}",
            date = input.as_of_date,
            languages = input.languages.join(", "),
            base = input.base_lang(),
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            match block {
                ContentBlock::Text { text } => {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(text);
                }
                ContentBlock::Thinking { .. }
                | ContentBlock::RedactedThinking { .. }
                | ContentBlock::Unknown => {
                    // Ignore.
                }
            }
        }
        out
    }

    fn make_request(&self, input: &GenerateInput, max_tokens: u32) -> CreateMessageRequest {
        CreateMessageRequest {
            model: self.model.clone(),
            max_tokens,
            system: Some(Self::system_prompt(&input.languages)),
            messages: vec![Message {
                role: "user",
                content: Self::user_prompt(input),
            }],
        }
    }

    async fn generate_inner(&self, input: &GenerateInput) -> anyhow::Result<AnalysisArtifact> {
        let mut res = self.guarded_request(&self.make_request(input, self.max_tokens)).await?;

        // If the model hit max_tokens, retry once with a higher ceiling.
        if matches!(res.stop_reason.as_deref(), Some("max_tokens")) {
            let bumped = self.max_tokens.saturating_mul(2);
            tracing::warn!(
                %input.as_of_date,
                from = self.max_tokens,
                to = bumped,
                "Anthropic stop_reason=max_tokens; retrying once with higher max_tokens"
            );
            res = self.guarded_request(&self.make_request(input, bumped)).await?;
        }

        let text = Self::response_text(&res);
        let first_err = match json::parse_artifact(
            &text,
            input.as_of_date,
            &input.session,
            input.base_lang(),
        ) {
            Ok(artifact) => return Ok(artifact),
            Err(err) => err,
        };

        // Model-quality failure: exactly one repair attempt with the invalid
        // output quoted back, then give up. Retrying the same prompt in a
        // loop is a token-burning coin flip.
        tracing::warn!(
            %input.as_of_date,
            error = %first_err,
            "model output invalid; attempting one repair"
        );

        let repair_req = CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(Self::system_prompt(&input.languages)),
            messages: vec![Message {
                role: "user",
                content: Self::repair_prompt(&text, input),
            }],
        };

        let repair_res = self.guarded_request(&repair_req).await?;
        let repair_text = Self::response_text(&repair_res);
        match json::parse_artifact(
            &repair_text,
            input.as_of_date,
            &input.session,
            input.base_lang(),
        ) {
            Ok(artifact) => Ok(artifact),
            Err(err) => Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "parse_after_repair",
                detail: format!("first_error={first_err:#}; final_error={err:#}"),
                raw_output: Some(repair_text),
            }
            .into()),
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate_analysis(&self, input: GenerateInput) -> anyhow::Result<AnalysisArtifact> {
        self.generate_inner(&input).await
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,

    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "thinking")]
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        signature: String,
    },

    #[serde(rename = "redacted_thinking")]
    RedactedThinking {
        #[serde(default)]
        data: String,
    },

    #[serde(other)]
    Unknown,
}

//! Remote analysis hook using OpenAI-compatible APIs
//!
//! Implements the AnalysisHook trait over HTTP. Works against any
//! OpenAI-compatible endpoint with configurable URL, model, and API key via
//! environment variable.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisHook, Assessment};
use crate::config::AnalysisConfig;
use crate::error::{MemoryError, Result};

const ASSESSMENT_PROMPT: &str = r#"Evaluate the following statement and respond with JSON only,
no prose, in the shape {"truthful": <bool>, "importance": <float 0..1>}.
"truthful" is whether the statement is plausibly factual; "importance" is
how valuable it is to remember long-term.

Statement: {content}
{context_section}"#;

/// Remote analyzer using OpenAI-compatible HTTP APIs
#[derive(Debug)]
pub struct RemoteAnalyzer {
    client: Client,
    config: AnalysisConfig,
    api_key: String,
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

impl RemoteAnalyzer {
    /// Create a new remote analyzer with the given configuration
    ///
    /// Reads the API key from the environment variable specified in
    /// config.api_key_env. Returns an error if the variable is not set.
    pub fn new(config: &AnalysisConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            MemoryError::Config(format!(
                "API key env var '{}' not set",
                config.api_key_env
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MemoryError::Analysis(e.to_string()))?;

        info!(
            "RemoteAnalyzer initialized with model: {}, api_url: {}",
            config.model, config.api_url
        );

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }

    /// Call the remote API with exponential backoff for rate limiting
    ///
    /// Makes up to 3 retries with backoff delays of 1s, 2s, 4s on 429 errors.
    async fn call_api(&self, prompt: &str) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: "You are a precise content evaluator.".to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.0,
            max_tokens: 128,
        };

        let url = format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'));
        debug!("Calling analysis API at: {}", url);

        let mut last_error = None;
        let mut delay = Duration::from_secs(1);
        const MAX_RETRIES: u32 = 3;

        for attempt in 0..MAX_RETRIES {
            match self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status == 429 {
                        warn!(
                            "Rate limited on attempt {}/{}, waiting {:?}",
                            attempt + 1,
                            MAX_RETRIES,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2; // Exponential backoff
                        continue;
                    }

                    if !status.is_success() {
                        let error_text = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(MemoryError::Analysis(format!(
                            "API returned {status}: {error_text}"
                        )));
                    }

                    let completion: ChatCompletionResponse = response
                        .json()
                        .await
                        .map_err(|e| MemoryError::Serialization(e.to_string()))?;

                    return completion
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .ok_or_else(|| MemoryError::Analysis("Empty response".to_string()));
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    last_error = Some(err_msg.clone());
                    if attempt < MAX_RETRIES - 1 {
                        warn!(
                            "Request failed on attempt {}/{}, retrying: {}",
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(MemoryError::Analysis(format!(
            "Failed after {} retries: {}",
            MAX_RETRIES,
            last_error.unwrap_or_else(|| "Unknown error".to_string())
        )))
    }

    fn build_prompt(content: &str, context: Option<&str>) -> String {
        let context_section = match context {
            Some(ctx) => format!("Context: {ctx}"),
            None => String::new(),
        };
        ASSESSMENT_PROMPT
            .replace("{content}", content)
            .replace("{context_section}", &context_section)
    }

    fn parse_verdict(response: &str) -> Result<Assessment> {
        let trimmed = response.trim();
        // Tolerate fenced responses from chattier models
        let json = trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        let mut assessment: Assessment = serde_json::from_str(json).map_err(|e| {
            MemoryError::Serialization(format!("Failed to parse verdict JSON: {e}"))
        })?;
        assessment.importance = assessment.importance.clamp(0.0, 1.0);
        Ok(assessment)
    }
}

#[async_trait]
impl AnalysisHook for RemoteAnalyzer {
    async fn assess(&self, content: &str, context: Option<&str>) -> Result<Assessment> {
        let prompt = Self::build_prompt(content, context);
        let response = self.call_api(&prompt).await?;
        debug!("Assessment response: {}", response);
        Self::parse_verdict(&response)
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

//! OpenAI-compatible chat completions client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::prompt::{build_user_prompt, ANALYST_SYSTEM_PROMPT};
use super::{AnalysisAgent, AnalysisError};
use crate::config::LlmConfig;

pub struct OpenAiAgent {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiAgent {
    pub fn new(cfg: &LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

fn first_choice_text(body: &str) -> Result<String, AnalysisError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::analysis(format!("Failed to parse OpenAI response: {e}")))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| AnalysisError::analysis("No text in OpenAI response"))
}

#[async_trait]
impl AnalysisAgent for OpenAiAgent {
    async fn produce_analysis(
        &self,
        document_text: &str,
        query: &str,
    ) -> Result<String, AnalysisError> {
        let user_prompt = build_user_prompt(document_text, query);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: ANALYST_SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &user_prompt,
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AnalysisError::analysis(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::analysis(format!("OpenAI response unreadable: {e}")))?;

        if !status.is_success() {
            return Err(AnalysisError::analysis(format!(
                "OpenAI generation failed ({status}): {body}"
            )));
        }

        first_choice_text(&body)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{SummaryProvider, SummaryRequest};

pub const DEFAULT_SUMMARIZER_URL: &str =
    "https://router.huggingface.co/hf-inference/models/facebook/bart-large-cnn";

/// Remote summarizer speaking the hosted-inference JSON protocol
/// (`{"inputs": .., "parameters": ..}` in, `[{"summary_text": ..}]` out).
pub struct RemoteSummarizer {
    api_url: String,
    api_token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl RemoteSummarizer {
    pub fn new(api_url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_token: api_token.filter(|t| !t.is_empty()),
            // Hosted models are slow to cold-start
            timeout: Duration::from_secs(120),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Duration::from_secs(timeout_secs);
        self
    }
}

#[async_trait::async_trait]
impl SummaryProvider for RemoteSummarizer {
    async fn summarize(&self, request: SummaryRequest) -> Result<String> {
        let req_body = InferenceRequest {
            inputs: request.input,
            parameters: InferenceParameters {
                max_length: request.max_length,
                min_length: request.min_length,
                do_sample: false,
            },
            options: InferenceOptions { wait_for_model: true },
        };

        let mut builder = self
            .client
            .post(&self.api_url)
            .header("Content-Type", "application/json")
            .json(&req_body);
        if let Some(token) = &self.api_token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }

        let response = tokio::time::timeout(self.timeout, builder.send())
            .await
            .context("summarization request timed out")?
            .context("summarization HTTP request failed")?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            anyhow::bail!("summarization model is still loading ({})", status);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(100).collect();
            anyhow::bail!("summarization API error {}: {}", status, snippet);
        }

        let body: Vec<InferenceSummary> = tokio::time::timeout(self.timeout, response.json())
            .await
            .context("summarization response timed out")?
            .context("Failed to parse summarization response")?;

        let summary = body
            .into_iter()
            .next()
            .map(|s| s.summary_text.trim().to_string())
            .filter(|s| !s.is_empty())
            .context("summarization response has no summary_text")?;

        Ok(summary)
    }
}

#[derive(Debug, Serialize)]
struct InferenceRequest {
    inputs: String,
    parameters: InferenceParameters,
    options: InferenceOptions,
}

#[derive(Debug, Serialize)]
struct InferenceParameters {
    max_length: usize,
    min_length: usize,
    do_sample: bool,
}

#[derive(Debug, Serialize)]
struct InferenceOptions {
    wait_for_model: bool,
}

#[derive(Debug, Deserialize)]
struct InferenceSummary {
    #[serde(default)]
    summary_text: String,
}

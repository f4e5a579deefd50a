use anyhow::Result;

/// Core trait for abstractive summarization backends
#[async_trait::async_trait]
pub trait SummaryProvider: Send + Sync {
    /// Produce a synopsis of `request.input`. Any failure is an `Err`; callers fall back.
    async fn summarize(&self, request: SummaryRequest) -> Result<String>;
}

/// Request structure for a summarization call
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub input: String,
    pub min_length: usize,
    pub max_length: usize,
}

/// Bounds applied to every remote summarization request
#[derive(Debug, Clone, Copy)]
pub struct SummaryOptions {
    /// Only this many leading chars of the article are sent
    pub input_chars: usize,
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for SummaryOptions {
    fn default() -> Self {
        Self {
            input_chars: 4000,
            min_length: 500,
            max_length: 1500,
        }
    }
}

pub mod remote;
pub mod summarizer;

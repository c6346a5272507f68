//! The document analysis function: file path + query in, analysis text out.
//!
//! Text extraction and the model call are collaborators behind traits
//! ([`TextExtractor`], [`AnalysisAgent`]); one call to [`DocumentAnalyzer::analyze`]
//! either yields text or fails, with no retries of its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{LlmConfig, LlmProvider};

pub mod agent;
pub mod extract;
pub mod gemini;
pub mod openai;
pub mod prompt;

#[cfg(test)]
pub(crate) mod fakes;

pub use agent::AnalysisAgent;
pub use extract::{PdfTextExtractor, TextExtractor};
pub use gemini::GeminiAgent;
pub use openai::OpenAiAgent;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// Missing, unreadable or unparseable input document.
    #[error("{0}")]
    Input(String),

    /// The model collaborator failed (auth, timeout, upstream error, empty output).
    #[error("{0}")]
    Analysis(String),
}

impl AnalysisError {
    pub fn input(msg: impl Into<String>) -> Self {
        AnalysisError::Input(msg.into())
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        AnalysisError::Analysis(msg.into())
    }

    pub fn is_input(&self) -> bool {
        matches!(self, AnalysisError::Input(_))
    }
}

pub struct DocumentAnalyzer {
    extractor: Arc<dyn TextExtractor>,
    agent: Arc<dyn AnalysisAgent>,
    max_document_chars: usize,
    extract_timeout: Duration,
}

pub const DEFAULT_EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

impl DocumentAnalyzer {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        agent: Arc<dyn AnalysisAgent>,
        max_document_chars: usize,
    ) -> Self {
        Self {
            extractor,
            agent,
            max_document_chars: max_document_chars.max(1),
            extract_timeout: DEFAULT_EXTRACT_TIMEOUT,
        }
    }

    /// Upper bound on one text extraction. The blocking parse cannot be
    /// interrupted; on timeout it is abandoned and the document is rejected.
    pub fn with_extract_timeout(mut self, limit: Duration) -> Self {
        self.extract_timeout = limit;
        self
    }

    /// PDF extraction plus the agent picked by `cfg.provider`.
    pub fn from_config(cfg: &LlmConfig) -> anyhow::Result<Self> {
        let agent: Arc<dyn AnalysisAgent> = match cfg.provider {
            LlmProvider::OpenAi => Arc::new(OpenAiAgent::new(cfg)?),
            LlmProvider::Gemini => Arc::new(GeminiAgent::new(cfg)?),
        };

        Ok(Self::new(
            Arc::new(PdfTextExtractor::new()),
            agent,
            cfg.max_document_chars,
        )
        .with_extract_timeout(cfg.extract_timeout))
    }

    pub fn agent_name(&self) -> &str {
        self.agent.name()
    }

    pub fn model(&self) -> &str {
        self.agent.model()
    }

    pub async fn analyze(&self, file_path: &Path, query: &str) -> Result<String, AnalysisError> {
        ensure_readable(file_path).await?;

        let text = self.extract(file_path.to_path_buf()).await?;
        let text = truncate_chars(&text, self.max_document_chars);

        tracing::debug!(
            path = %file_path.display(),
            chars = text.chars().count(),
            agent = self.agent.name(),
            "document text extracted"
        );

        let analysis = self.agent.produce_analysis(text, query).await?;
        let analysis = analysis.trim();
        if analysis.is_empty() {
            return Err(AnalysisError::analysis("model returned an empty analysis"));
        }

        Ok(analysis.to_string())
    }

    // Parsing is CPU-bound and some PDFs make the parser panic or hang; all of it
    // stays off the runtime threads.
    async fn extract(&self, path: PathBuf) -> Result<String, AnalysisError> {
        let extractor = Arc::clone(&self.extractor);
        let path_display = path.display().to_string();
        let limit = self.extract_timeout;

        let handle = tokio::task::spawn_blocking(move || extractor.extract_text(&path));

        match tokio::time::timeout(limit, handle).await {
            Ok(Ok(res)) => res,
            Ok(Err(e)) if e.is_panic() => Err(AnalysisError::input(format!(
                "Failed to parse PDF {path_display}: parser crashed"
            ))),
            Ok(Err(e)) => Err(AnalysisError::analysis(format!(
                "text extraction was cancelled: {e}"
            ))),
            Err(_) => {
                tracing::error!(
                    path = %path_display,
                    timeout_secs = limit.as_secs_f64(),
                    "pdf extraction timed out"
                );
                Err(AnalysisError::input(format!(
                    "Failed to parse PDF {path_display}: extraction timed out after {}s",
                    limit.as_secs_f64()
                )))
            }
        }
    }
}

async fn ensure_readable(path: &Path) -> Result<(), AnalysisError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        _ => {
            return Err(AnalysisError::input(format!(
                "File not found: {}",
                path.display()
            )))
        }
    }

    tokio::fs::File::open(path)
        .await
        .map(|_| ())
        .map_err(|e| AnalysisError::input(format!("Cannot read {}: {e}", path.display())))
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

use async_trait::async_trait;

use super::AnalysisError;

/// The orchestration collaborator seen as a single capability: produce one
/// textual analysis of a document for a query.
///
/// Implementations:
/// - `OpenAiAgent`: OpenAI-compatible chat completions
/// - `GeminiAgent`: Google Gemini `generateContent`
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    async fn produce_analysis(
        &self,
        document_text: &str,
        query: &str,
    ) -> Result<String, AnalysisError>;

    /// Provider name for logging
    fn name(&self) -> &str;

    fn model(&self) -> &str;
}

//! Deterministic collaborators for tests.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{AnalysisAgent, AnalysisError, TextExtractor};

/// Accepts files that start with `%PDF`, returns whatever follows the 5-byte header.
/// A body containing `PANIC` makes it panic, like a parser hitting a bad font table.
pub struct StubExtractor;

impl TextExtractor for StubExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, AnalysisError> {
        let bytes = std::fs::read(path)
            .map_err(|e| AnalysisError::input(format!("Cannot read {}: {e}", path.display())))?;

        if !bytes.starts_with(b"%PDF") {
            return Err(AnalysisError::input(format!(
                "Failed to parse PDF {}: missing %PDF header",
                path.display()
            )));
        }

        let body = String::from_utf8_lossy(&bytes[bytes.len().min(5)..]).to_string();
        if body.contains("PANIC") {
            panic!("stub extractor asked to panic");
        }
        Ok(body)
    }
}

/// Blocks the calling thread, like a parser stuck on a pathological font.
pub struct HangingExtractor {
    hang: Duration,
}

impl HangingExtractor {
    pub fn new(hang: Duration) -> Self {
        Self { hang }
    }
}

impl TextExtractor for HangingExtractor {
    fn extract_text(&self, _path: &Path) -> Result<String, AnalysisError> {
        std::thread::sleep(self.hang);
        Ok("late text".to_string())
    }
}

enum Behaviour {
    Echo,
    Fixed(String),
    Fail(String),
}

pub struct StubAgent {
    behaviour: Behaviour,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl StubAgent {
    pub fn echo() -> Self {
        Self::with(Behaviour::Echo)
    }

    pub fn fixed(text: &str) -> Self {
        Self::with(Behaviour::Fixed(text.to_string()))
    }

    pub fn failing(msg: &str) -> Self {
        Self::with(Behaviour::Fail(msg.to_string()))
    }

    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl AnalysisAgent for StubAgent {
    async fn produce_analysis(
        &self,
        document_text: &str,
        query: &str,
    ) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behaviour {
            Behaviour::Echo => Ok(format!(
                "query={query} chars={}\n{document_text}",
                document_text.chars().count()
            )),
            Behaviour::Fixed(text) => Ok(text.clone()),
            Behaviour::Fail(msg) => Err(AnalysisError::analysis(msg.clone())),
        }
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-model"
    }
}

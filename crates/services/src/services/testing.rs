//! Scripted [`AiProvider`] for tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use super::ai_client::{AiError, AiProvider};

/// Replays queued chat replies and embeds text as keyword counts.
///
/// Embedding dimension `i` is the number of times `keywords[i]` occurs in the
/// lowercased input, so texts sharing keywords are cosine-similar.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    replies: Arc<Mutex<VecDeque<Result<String, AiError>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    keywords: Vec<String>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_lowercase()).collect();
        self
    }

    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.push_reply(Ok(reply.into()));
        self
    }

    pub fn with_error(self, error: AiError) -> Self {
        self.push_reply(Err(error));
        self
    }

    pub fn push_reply(&self, reply: Result<String, AiError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    /// Every prompt received by `chat`, in order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        self.keywords
            .iter()
            .map(|k| text.matches(k.as_str()).count() as f32)
            .collect()
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    async fn chat(&self, _system: Option<&str>, prompt: &str, _max_tokens: u32) -> Result<String, AiError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::Http {
                status: 500,
                body: "no scripted reply left".to_string(),
            }))
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        Ok(inputs.iter().map(|i| self.embed_one(i)).collect())
    }
}

//! Scripted text generator for tests: replays canned replies in order.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm_client::{LlmError, ResponseFormat, SnapshotStream, TextGenerator};

/// Replies are consumed one per call. An exhausted script fails every call.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    /// Stream replies as cumulative snapshots of this many chars.
    stream_chunk: Option<usize>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            ..Self::default()
        }
    }

    pub fn streaming(mut self, chunk_chars: usize) -> Self {
        self.stream_chunk = Some(chunk_chars.max(1));
        self
    }

    /// Appends a reply that fails with an API error.
    pub fn then_fail(self, message: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn then_reply(self, reply: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// System prompts seen so far, in call order.
    pub fn system_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next_reply(&self, system: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(system.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(LlmError::Api {
                status: 500,
                message,
            }),
            None => Err(LlmError::EmptyContent),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(
        &self,
        system: &str,
        _prompt: &str,
        _format: ResponseFormat,
    ) -> Result<String, LlmError> {
        self.next_reply(system)
    }

    async fn complete_stream(
        &self,
        system: &str,
        _prompt: &str,
        _format: ResponseFormat,
    ) -> Result<SnapshotStream, LlmError> {
        let text = self.next_reply(system)?;
        let Some(size) = self.stream_chunk else {
            return Ok(Box::pin(stream::iter(vec![Ok(text)])));
        };
        let chars: Vec<char> = text.chars().collect();
        let snapshots: Vec<Result<String, LlmError>> = (1..=chars.len().div_ceil(size))
            .map(|i| Ok(chars[..(i * size).min(chars.len())].iter().collect()))
            .collect();
        Ok(Box::pin(stream::iter(snapshots)))
    }
}

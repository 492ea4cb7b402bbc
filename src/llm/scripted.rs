//! A chat model that replays pre-configured replies, for tests.

use super::{ChatModel, CompletionRequest, ModelReply};
use crate::error::{BaristaError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays a fixed sequence of replies and records every request it receives.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<ModelReply, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    /// Create a model that answers with `replies` in order.
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a model whose every call fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from(vec![Err(message.to_string())])),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply> {
        self.requests.lock().unwrap().push(request.clone());
        let mut replies = self.replies.lock().unwrap();
        match replies.pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => {
                // Failures repeat so retries see the same outage.
                replies.push_front(Err(message.clone()));
                Err(BaristaError::OpenAI(message))
            }
            None => Err(BaristaError::Model("Script exhausted".to_string())),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

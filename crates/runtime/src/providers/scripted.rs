//! Backend that replays canned assistant messages.

use crate::model::{Backend, Message, ModelError, ModelRequest, ModelResponse, Role, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays queued assistant messages in order, one per call.
///
/// Used by tests and by the CLI's offline mode. Every request it receives is
/// kept so tests can assert on what the loop sent.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Message>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedBackend {
    pub fn new(replies: impl IntoIterator<Item = Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue another reply.
    pub fn push(&self, reply: Message) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Replies not yet consumed.
    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Message histories received so far, one per call.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Backend for ScriptedBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let served = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| ModelError::Unavailable("script lock poisoned".into()))?;
            requests.push(request.messages.to_vec());
            requests.len() - 1
        };

        let mut message = self
            .replies
            .lock()
            .map_err(|_| ModelError::Unavailable("script lock poisoned".into()))?
            .pop_front()
            .ok_or(ModelError::ScriptExhausted(served))?;
        message.role = Role::Assistant;

        Ok(ModelResponse {
            message,
            usage: Usage::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_in_order_then_exhausts() {
        let backend = ScriptedBackend::new([Message::assistant("one")]);
        backend.push(Message::assistant("two"));
        let history = [Message::user("hi")];
        let request = || ModelRequest {
            messages: &history,
            tools: &[],
        };

        assert_eq!(backend.call(request()).await.unwrap().message.text(), "one");
        assert_eq!(backend.call(request()).await.unwrap().message.text(), "two");
        let err = backend.call(request()).await.unwrap_err();
        assert!(matches!(err, ModelError::ScriptExhausted(2)));
        assert_eq!(backend.requests().len(), 3);
    }
}

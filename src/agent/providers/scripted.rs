//! Scripted reasoning provider for tests: replays a canned reply sequence,
//! cycling once it runs out.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::agent::model::{ReasoningProvider, ReasoningReply, ReasoningRequest};

#[derive(Debug, Clone)]
pub struct ScriptedReasoner {
    replies: Vec<ReasoningReply>,
    cursor: Arc<Mutex<usize>>,
    /// Requests observed, for asserting on what the loop presented.
    requests_seen: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedReasoner {
    pub fn new(replies: Vec<ReasoningReply>) -> Self {
        assert!(!replies.is_empty(), "a script needs at least one reply");
        Self {
            replies,
            cursor: Arc::new(Mutex::new(0)),
            requests_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of reasoning calls made so far.
    pub fn calls(&self) -> usize {
        self.requests_seen.lock().unwrap().len()
    }

    fn next_reply(&self) -> ReasoningReply {
        let mut cursor = self.cursor.lock().unwrap();
        let reply = self.replies[*cursor % self.replies.len()].clone();
        *cursor += 1;
        reply
    }
}

#[async_trait]
impl ReasoningProvider for ScriptedReasoner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn reason(&self, request: &ReasoningRequest) -> anyhow::Result<ReasoningReply> {
        self.requests_seen.lock().unwrap().push(request.tools.len());
        Ok(self.next_reply())
    }
}

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Mutex;

/// Bounded, ordered record of one user's recent questions. Rendered into the
/// generation prompt so the model can resolve back-references ("that", "it").
pub struct ConversationMemory {
    max_turns: usize,
    history: Mutex<VecDeque<String>>,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends a question, evicting the oldest once capacity is exceeded.
    pub async fn add(&self, question: &str) {
        let mut history = self.history.lock().await;
        history.push_back(question.to_owned());
        while history.len() > self.max_turns {
            history.pop_front();
        }
    }

    /// Newline-joined history, oldest first, or "None" when empty. The
    /// placeholder is substituted verbatim into the prompt template.
    pub async fn snapshot(&self) -> String {
        let history = self.history.lock().await;
        if history.is_empty() {
            "None".to_owned()
        } else {
            history.iter().cloned().collect::<Vec<_>>().join("\n")
        }
    }

    pub async fn clear(&self) {
        self.history.lock().await.clear();
    }
}

/// Explicit session map handed to the orchestrator, keyed by user id.
/// Each user's memory is an independent unit; different users mutate
/// concurrently without contention beyond the map lookup.
pub struct SessionRegistry {
    max_turns: usize,
    sessions: Mutex<HashMap<String, Arc<ConversationMemory>>>,
}

impl SessionRegistry {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn memory_for(&self, user_id: &str) -> Arc<ConversationMemory> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(user_id.to_owned())
            .or_insert_with(|| Arc::new(ConversationMemory::new(self.max_turns)))
            .clone()
    }

    pub async fn clear_user(&self, user_id: &str) {
        let memory = {
            let sessions = self.sessions.lock().await;
            sessions.get(user_id).cloned()
        };
        if let Some(memory) = memory {
            memory.clear().await;
        }
    }
}

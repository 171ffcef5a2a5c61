//! The turn engine never talks to storage directly — it persists through
//! this trait, which has a session-store-backed implementation and an
//! in-memory one for sessions created without a store binding.

use std::sync::Mutex;

use broker_context::HistoryMessage;

pub trait History: Send + Sync {
    fn add(&self, role: &str, content: &str, token_count: u32);
    fn all(&self) -> Vec<HistoryMessage>;
    fn recent(&self, limit: usize) -> Vec<HistoryMessage>;
    fn count(&self) -> usize;
}

/// Backs a session onto `broker_memory`'s on-disk conversation log.
pub struct PersistentHistory {
    log: broker_memory::ConversationLog,
}

impl PersistentHistory {
    pub fn new(log: broker_memory::ConversationLog) -> Self {
        Self { log }
    }
}

impl History for PersistentHistory {
    fn add(&self, role: &str, content: &str, token_count: u32) {
        if let Err(e) = self.log.add(role, content, token_count, None) {
            tracing::warn!(error = %e, "failed to persist conversation message");
        }
    }

    fn all(&self) -> Vec<HistoryMessage> {
        self.log.get_all().unwrap_or_default().into_iter().map(to_history_message).collect()
    }

    fn recent(&self, limit: usize) -> Vec<HistoryMessage> {
        self.log.get_recent(limit as u32).unwrap_or_default().into_iter().map(to_history_message).collect()
    }

    fn count(&self) -> usize {
        self.log.count().unwrap_or(0) as usize
    }
}

fn to_history_message(m: broker_memory::Message) -> HistoryMessage {
    HistoryMessage::new(m.role, m.content, m.token_count)
}

/// A session not bound to a store: history lives only for the life of the
/// process, in a plain `Vec` guarded by a mutex.
#[derive(Default)]
pub struct EphemeralHistory {
    messages: Mutex<Vec<HistoryMessage>>,
}

impl EphemeralHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl History for EphemeralHistory {
    fn add(&self, role: &str, content: &str, token_count: u32) {
        self.messages.lock().unwrap().push(HistoryMessage::new(role, content, token_count));
    }

    fn all(&self) -> Vec<HistoryMessage> {
        self.messages.lock().unwrap().clone()
    }

    fn recent(&self, limit: usize) -> Vec<HistoryMessage> {
        let messages = self.messages.lock().unwrap();
        let start = messages.len().saturating_sub(limit);
        messages[start..].to_vec()
    }

    fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_history_keeps_only_the_most_recent_n() {
        let history = EphemeralHistory::new();
        for i in 0..5 {
            history.add("user", &format!("m{i}"), 1);
        }
        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "m3");
        assert_eq!(recent[1].content, "m4");
    }

    #[test]
    fn ephemeral_history_counts_added_messages() {
        let history = EphemeralHistory::new();
        history.add("user", "hi", 1);
        history.add("assistant", "hello", 1);
        assert_eq!(history.count(), 2);
    }
}

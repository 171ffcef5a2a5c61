mod pricing;

pub use pricing::{estimated_cost, pricing_for, Pricing};

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::params;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, TokenError>;

/// One recorded request's token usage.
#[derive(Debug, Clone)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn estimated_cost(&self) -> f64 {
        estimated_cost(&self.model, self.input_tokens, self.output_tokens)
    }
}

/// Aggregate usage for a session, as reported by `tokens.get`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SessionTokenStats {
    pub total_input: u32,
    pub total_output: u32,
    pub total_cost: f64,
    pub request_count: u32,
}

impl SessionTokenStats {
    pub fn total_tokens(&self) -> u32 {
        self.total_input + self.total_output
    }

    /// Cost rounded to 4 decimal places, matching what callers should surface.
    pub fn rounded_cost(&self) -> f64 {
        (self.total_cost * 10_000.0).round() / 10_000.0
    }
}

type Listener = Box<dyn Fn(&TokenUsage) + Send + Sync>;

/// Tracks token usage for one session: persists every recorded request to
/// the shared `token_usage` table, caches the aggregate until the next
/// write invalidates it, and optionally enforces a token budget.
pub struct TokenLedger {
    session_id: String,
    conn: Arc<Mutex<rusqlite::Connection>>,
    budget: Option<u32>,
    cache: Mutex<Option<SessionTokenStats>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener_id: Mutex<u64>,
}

impl TokenLedger {
    pub fn new(session_id: impl Into<String>, conn: Arc<Mutex<rusqlite::Connection>>, budget: Option<u32>) -> Self {
        Self {
            session_id: session_id.into(),
            conn,
            budget,
            cache: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: Mutex::new(0),
        }
    }

    pub fn record(&self, usage: TokenUsage, message_id: Option<i64>) -> Result<()> {
        let cost = usage.estimated_cost();
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO token_usage
                 (session_id, message_id, input_tokens, output_tokens, model, cost_usd, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    self.session_id,
                    message_id,
                    usage.input_tokens,
                    usage.output_tokens,
                    usage.model,
                    cost,
                    usage.timestamp.to_rfc3339(),
                ],
            )?;
        }
        *self.cache.lock().unwrap() = None;
        self.notify(&usage);
        Ok(())
    }

    pub fn get_session_stats(&self) -> Result<SessionTokenStats> {
        if let Some(cached) = *self.cache.lock().unwrap() {
            return Ok(cached);
        }
        let conn = self.conn.lock().unwrap();
        let stats = conn.query_row(
            "SELECT
                COALESCE(SUM(input_tokens), 0),
                COALESCE(SUM(output_tokens), 0),
                COALESCE(SUM(cost_usd), 0.0),
                COUNT(*)
             FROM token_usage WHERE session_id = ?1",
            params![self.session_id],
            |row| {
                Ok(SessionTokenStats {
                    total_input: row.get(0)?,
                    total_output: row.get(1)?,
                    total_cost: row.get(2)?,
                    request_count: row.get(3)?,
                })
            },
        )?;
        *self.cache.lock().unwrap() = Some(stats);
        Ok(stats)
    }

    pub fn get_budget_remaining(&self) -> Result<Option<u32>> {
        let Some(budget) = self.budget else {
            return Ok(None);
        };
        let stats = self.get_session_stats()?;
        Ok(Some(budget.saturating_sub(stats.total_tokens())))
    }

    pub fn get_budget_percentage(&self) -> Result<Option<f64>> {
        let Some(budget) = self.budget else {
            return Ok(None);
        };
        let stats = self.get_session_stats()?;
        if budget == 0 {
            return Ok(Some(100.0));
        }
        Ok(Some((stats.total_tokens() as f64 / budget as f64 * 100.0).min(100.0)))
    }

    pub fn is_over_budget(&self) -> Result<bool> {
        Ok(matches!(self.get_budget_remaining()?, Some(0)))
    }

    /// Registers a listener invoked after every successful `record`. Returns
    /// an id that can be passed to [`Self::unsubscribe`].
    pub fn subscribe<F>(&self, callback: F) -> u64
    where
        F: Fn(&TokenUsage) + Send + Sync + 'static,
    {
        let mut next_id = self.next_listener_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        self.listeners.lock().unwrap().push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.listeners.lock().unwrap().retain(|(listener_id, _)| *listener_id != id);
    }

    /// Notifies listeners; a panicking listener is caught and logged, never
    /// allowed to break the ledger for its siblings or the caller.
    fn notify(&self, usage: &TokenUsage) {
        let listeners = self.listeners.lock().unwrap();
        for (id, listener) in listeners.iter() {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| listener(usage)));
            if result.is_err() {
                tracing::warn!(listener_id = id, "token usage listener panicked, ignoring");
            }
        }
    }

    pub fn get_usage_history(&self, limit: u32) -> Result<Vec<TokenUsage>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT input_tokens, output_tokens, model, created_at
             FROM token_usage WHERE session_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![self.session_id, limit], |row| {
            let created_at: String = row.get(3)?;
            Ok(TokenUsage {
                input_tokens: row.get(0)?,
                output_tokens: row.get(1)?,
                model: row.get(2)?,
                timestamp: DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ledger_with_store() -> (broker_memory::Store, TokenLedger) {
        let store = broker_memory::Store::open_in_memory().unwrap();
        let session = store.sessions().create(None, None, None).unwrap();
        let ledger = TokenLedger::new(session.id, store.raw_connection(), None);
        (store, ledger)
    }

    fn usage(input: u32, output: u32, model: &str) -> TokenUsage {
        TokenUsage { input_tokens: input, output_tokens: output, model: model.to_string(), timestamp: Utc::now() }
    }

    #[test]
    fn record_then_stats_aggregates_across_requests() {
        let (_store, ledger) = ledger_with_store();
        ledger.record(usage(100, 50, "gpt-4o-mini"), None).unwrap();
        ledger.record(usage(200, 75, "gpt-4o-mini"), None).unwrap();
        let stats = ledger.get_session_stats().unwrap();
        assert_eq!(stats.total_input, 300);
        assert_eq!(stats.total_output, 125);
        assert_eq!(stats.request_count, 2);
    }

    #[test]
    fn cache_is_invalidated_after_each_record() {
        let (_store, ledger) = ledger_with_store();
        ledger.record(usage(10, 10, "gpt-4o-mini"), None).unwrap();
        let first = ledger.get_session_stats().unwrap();
        ledger.record(usage(10, 10, "gpt-4o-mini"), None).unwrap();
        let second = ledger.get_session_stats().unwrap();
        assert!(second.total_tokens() > first.total_tokens());
    }

    #[test]
    fn budget_remaining_saturates_at_zero() {
        let store = broker_memory::Store::open_in_memory().unwrap();
        let session = store.sessions().create(None, None, None).unwrap();
        let ledger = TokenLedger::new(session.id, store.raw_connection(), Some(50));
        ledger.record(usage(100, 100, "gpt-4o-mini"), None).unwrap();
        assert_eq!(ledger.get_budget_remaining().unwrap(), Some(0));
        assert!(ledger.is_over_budget().unwrap());
    }

    #[test]
    fn subscribe_is_notified_and_unsubscribe_stops_notifications() {
        let (_store, ledger) = ledger_with_store();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let id = ledger.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        ledger.record(usage(1, 1, "gpt-4o-mini"), None).unwrap();
        ledger.unsubscribe(id);
        ledger.record(usage(1, 1, "gpt-4o-mini"), None).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_listener_does_not_break_recording() {
        let (_store, ledger) = ledger_with_store();
        ledger.subscribe(|_| panic!("boom"));
        ledger.record(usage(1, 1, "gpt-4o-mini"), None).unwrap();
        assert_eq!(ledger.get_session_stats().unwrap().request_count, 1);
    }

    #[test]
    fn usage_history_is_ordered_most_recent_first() {
        let (_store, ledger) = ledger_with_store();
        ledger.record(usage(1, 1, "model-a"), None).unwrap();
        ledger.record(usage(2, 2, "model-b"), None).unwrap();
        let history = ledger.get_usage_history(10).unwrap();
        assert_eq!(history[0].model, "model-b");
        assert_eq!(history[1].model, "model-a");
    }
}

use std::sync::{Arc, Mutex};

use broker_config::Config;
use broker_memory::Store;
use broker_rag::IndexRouter;
use broker_tokens::TokenLedger;

use crate::model_switch::SwitchableModel;

/// Everything a handler needs, shared across every request on the
/// connection. There is exactly one `AppState` per `brokerd` process; no
/// handler holds state of its own beyond what it reads from here.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub index_router: Arc<IndexRouter>,
    pub model: Arc<SwitchableModel>,
    pub turn_engine: broker_core::TurnEngine,
    current_session: Mutex<Option<String>>,
    current_codebase_path: Mutex<Option<String>>,
    budget: Mutex<Option<u32>>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Store,
        index_router: Arc<IndexRouter>,
        model: Arc<SwitchableModel>,
        turn_engine: broker_core::TurnEngine,
    ) -> Self {
        let budget = config.token_budget;
        Self {
            config,
            store,
            index_router,
            model,
            turn_engine,
            current_session: Mutex::new(None),
            current_codebase_path: Mutex::new(None),
            budget: Mutex::new(budget),
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.current_session.lock().unwrap().clone()
    }

    pub fn set_session(&self, id: Option<String>) {
        *self.current_session.lock().unwrap() = id;
    }

    pub fn codebase_path(&self) -> Option<String> {
        self.current_codebase_path.lock().unwrap().clone()
    }

    pub fn set_codebase_path(&self, path: Option<String>) {
        *self.current_codebase_path.lock().unwrap() = path;
    }

    pub fn budget(&self) -> Option<u32> {
        *self.budget.lock().unwrap()
    }

    pub fn set_budget(&self, budget: Option<u32>) {
        *self.budget.lock().unwrap() = budget;
    }

    /// A fresh ledger bound to `session_id`, using whatever budget is
    /// currently in effect. Cheap enough to build per call: its cache is
    /// only a memoization layer over the `token_usage` table, not a source
    /// of truth, so starting empty on every request is harmless.
    pub fn ledger_for(&self, session_id: &str) -> TokenLedger {
        TokenLedger::new(session_id.to_string(), self.store.raw_connection(), self.budget())
    }

    /// Switches the active codebase collection to `abs_path` and remembers
    /// it for `rag.status`. A no-op on the index side if `abs_path` is
    /// already the active collection.
    pub fn switch_codebase(&self, abs_path: &str) -> Arc<dyn broker_rag::Index> {
        let index = self.index_router.switch_to(abs_path);
        self.set_codebase_path(Some(abs_path.to_string()));
        index
    }
}

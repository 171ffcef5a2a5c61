//! The stdio-facing half of `brokerd`: turns JSON-RPC frames into calls
//! against the turn engine, session store, token ledger and RAG index, and
//! turns their results back into frames.

mod dispatcher;
mod errors;
mod handlers;
mod model_switch;
mod sink;
mod state;

pub use dispatcher::Dispatcher;
pub use model_switch::SwitchableModel;
pub use state::AppState;

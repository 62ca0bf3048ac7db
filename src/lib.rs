//! Purpose: Client runtime for a remotely hosted, append-only channel log.
//! Exports: `api` (client, handles, events, config), `core` (models, engine boundary), `logging`.
//! Role: Library crate; applications embed it and supply an `Engine`.
//! Invariants: All handle state hangs off a `Client`; there is no process-global table.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
pub mod core;
pub mod logging;

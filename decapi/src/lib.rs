//! HTTP wrapper around an external binary decompiler.
//!
//! A client uploads a binary to `POST /decompile/`; the service stages it in a
//! scoped temporary file, runs the decompiler against it and relays the
//! captured stdout/stderr as JSON.
//!
//! - [`decompile`]: temp-file staging and subprocess execution.
//! - [`routes`]: the axum router and handlers.
//! - [`state`]: startup configuration shared by handlers.
//! - [`reload`]: restart-on-rebuild watcher used by `--reload`.
//! - [`logging`]: tracing subscriber setup.

pub mod decompile;
pub mod logging;
pub mod reload;
pub mod routes;
pub mod state;

pub mod assignments;
pub mod attendance;
pub mod core;
pub mod grades;
pub mod reports;
pub mod roster;
pub mod setup;
pub mod student_reports;

use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;

/// Runs `f` against the open workspace and wraps its result in the envelope.
fn with_conn<F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

/// Everything except health checks, workspace selection and the login call
/// itself runs behind the login gate.
fn requires_auth(method: &str) -> bool {
    !matches!(method, "health" | "workspace.select" | "auth.login")
}

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if requires_auth(&req.method) && !state.authed {
        return err(&req.id, "not_authed", "log in first", None);
    }

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::auth::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::students::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::payments::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::invoices::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::results::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::backup_exchange::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn credential_matches(
    conn: &Connection,
    username: &str,
    password: &str,
) -> Result<bool, HandlerErr> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT password FROM users WHERE username = ?",
            [username],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;
    Ok(stored.map(|hash| hash == db::sha256_hex(password)).unwrap_or(false))
}

fn login(conn: &Connection, params: &serde_json::Value) -> Result<String, HandlerErr> {
    let username = get_required_str(params, "username")?;
    let password = get_required_str(params, "password")?;
    if !credential_matches(conn, &username, &password)? {
        return Err(HandlerErr {
            code: "bad_credentials",
            message: "invalid username or password".to_string(),
            details: None,
        });
    }
    Ok(username)
}

fn change_password(conn: &Connection, params: &serde_json::Value) -> Result<(), HandlerErr> {
    let username = get_required_str(params, "username")?;
    let old_password = get_required_str(params, "oldPassword")?;
    let new_password = get_required_str(params, "newPassword")?;
    if new_password.trim().is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "new password must not be empty".to_string(),
            details: None,
        });
    }
    if !credential_matches(conn, &username, &old_password)? {
        return Err(HandlerErr {
            code: "bad_credentials",
            message: "invalid username or password".to_string(),
            details: None,
        });
    }
    conn.execute(
        "UPDATE users SET password = ? WHERE username = ?",
        (db::sha256_hex(&new_password), &username),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "users" })),
    })?;
    Ok(())
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match login(conn, &req.params) {
        Ok(username) => {
            state.authed = true;
            ok(&req.id, json!({ "username": username }))
        }
        Err(error) => error.response(&req.id),
    }
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.authed = false;
    ok(&req.id, json!({}))
}

fn handle_change_password(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match change_password(conn, &req.params) {
        Ok(()) => ok(&req.id, json!({})),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.changePassword" => Some(handle_change_password(state, req)),
        _ => None,
    }
}

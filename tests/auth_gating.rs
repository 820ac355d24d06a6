mod test_support;

use serde_json::json;
use test_support::{error_code, request_ok, request_raw, spawn_daemon, temp_workspace};

#[test]
fn methods_behind_the_login_gate_require_auth() {
    let workspace = temp_workspace("feebook-auth-gate");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request_raw(&mut stdin, &mut reader, "l0", "students.list", json!({}));
    assert_eq!(error_code(&resp), "not_authed");

    // Health stays reachable without a login.
    let health = request_ok(&mut stdin, &mut reader, "h1", "health", json!({}));
    assert_eq!(health.get("authed").and_then(|v| v.as_bool()), Some(false));

    let _ = child.kill();
}

#[test]
fn default_admin_credential_works_and_bad_ones_do_not() {
    let workspace = temp_workspace("feebook-auth-login");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let resp = request_raw(
        &mut stdin,
        &mut reader,
        "bad",
        "auth.login",
        json!({ "username": "admin", "password": "wrong" }),
    );
    assert_eq!(error_code(&resp), "bad_credentials");

    let resp = request_raw(
        &mut stdin,
        &mut reader,
        "nouser",
        "auth.login",
        json!({ "username": "nobody", "password": "admin123" }),
    );
    assert_eq!(error_code(&resp), "bad_credentials");

    let result = request_ok(
        &mut stdin,
        &mut reader,
        "good",
        "auth.login",
        json!({ "username": "admin", "password": "admin123" }),
    );
    assert_eq!(result.get("username").and_then(|v| v.as_str()), Some("admin"));

    let list = request_ok(&mut stdin, &mut reader, "l1", "students.list", json!({}));
    assert_eq!(list.get("count").and_then(|v| v.as_u64()), Some(0));

    let _ = child.kill();
}

#[test]
fn logout_closes_the_gate_again() {
    let workspace = temp_workspace("feebook-auth-logout");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "login",
        "auth.login",
        json!({ "username": "admin", "password": "admin123" }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "out", "auth.logout", json!({}));

    let resp = request_raw(&mut stdin, &mut reader, "l1", "students.list", json!({}));
    assert_eq!(error_code(&resp), "not_authed");

    let _ = child.kill();
}

#[test]
fn password_change_invalidates_the_old_credential() {
    let workspace = temp_workspace("feebook-auth-chpw");
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "login",
        "auth.login",
        json!({ "username": "admin", "password": "admin123" }),
    );

    let resp = request_raw(
        &mut stdin,
        &mut reader,
        "chpw-bad",
        "auth.changePassword",
        json!({ "username": "admin", "oldPassword": "wrong", "newPassword": "s3cret" }),
    );
    assert_eq!(error_code(&resp), "bad_credentials");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "chpw",
        "auth.changePassword",
        json!({ "username": "admin", "oldPassword": "admin123", "newPassword": "s3cret" }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "out", "auth.logout", json!({}));

    let resp = request_raw(
        &mut stdin,
        &mut reader,
        "old",
        "auth.login",
        json!({ "username": "admin", "password": "admin123" }),
    );
    assert_eq!(error_code(&resp), "bad_credentials");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "new",
        "auth.login",
        json!({ "username": "admin", "password": "s3cret" }),
    );

    let _ = child.kill();
}

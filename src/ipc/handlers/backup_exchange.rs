use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn get_required_path(params: &serde_json::Value, key: &str) -> Option<PathBuf> {
    params.get(key).and_then(|v| v.as_str()).map(PathBuf::from)
}

fn handle_export_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(out_path) = get_required_path(&req.params, "outPath") else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };

    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
                "outPath": out_path.to_string_lossy()
            }),
        ),
        Err(e) => err(&req.id, "export_failed", format!("{e:?}"), None),
    }
}

fn handle_import_bundle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(bundle_path) = get_required_path(&req.params, "bundlePath") else {
        return err(&req.id, "bad_params", "missing bundlePath", None);
    };

    // The restore replaces the database file, so the open connection must go
    // first and a fresh one is opened afterwards.
    state.db = None;
    let summary = match backup::import_workspace_bundle(&bundle_path, &workspace) {
        Ok(summary) => summary,
        Err(e) => {
            // A failed restore leaves the old database in place; reopen it so
            // the session keeps working.
            state.db = db::open_db(&workspace).ok();
            return err(&req.id, "import_failed", format!("{e:?}"), None);
        }
    };
    match db::open_db(&workspace) {
        Ok(conn) => {
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "bundleFormatDetected": summary.bundle_format_detected,
                    "workspacePath": workspace.to_string_lossy()
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportBundle" => Some(handle_export_bundle(state, req)),
        "backup.importBundle" => Some(handle_import_bundle(state, req)),
        _ => None,
    }
}

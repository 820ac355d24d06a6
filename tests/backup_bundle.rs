mod test_support;

use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
use test_support::{error_code, open_and_login, request_ok, request_raw, spawn_daemon, temp_workspace};

#[test]
fn bundle_round_trip_carries_students_and_balances() {
    let source = temp_workspace("feebook-bundle-src");
    let target = temp_workspace("feebook-bundle-dst");
    let bundle = std::env::temp_dir().join(format!(
        "feebook-bundle-{}.zip",
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    let (mut child, mut stdin, mut reader) = spawn_daemon();

    open_and_login(&mut stdin, &mut reader, &source);
    let admitted = request_ok(
        &mut stdin,
        &mut reader,
        "admit",
        "students.admit",
        json!({
            "firstName": "Aman",
            "lastName": "Khan",
            "motherName": "Nazia Khan",
            "fatherName": "Imran Khan",
            "className": "5"
        }),
    );
    let student_id = admitted
        .get("studentId")
        .and_then(|v| v.as_str())
        .expect("studentId")
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "pay",
        "payments.record",
        json!({ "studentId": student_id, "schoolFee": 1200.0, "busFee": 500.0, "amount": 1000.0 }),
    );

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "exp",
        "backup.exportBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("feebook-workspace-v1")
    );
    assert!(bundle.is_file());

    // Switching workspaces drops the session, so the import side logs in
    // again before restoring.
    open_and_login(&mut stdin, &mut reader, &target);
    let empty = request_ok(&mut stdin, &mut reader, "empty", "students.list", json!({}));
    assert_eq!(empty.get("count").and_then(|v| v.as_u64()), Some(0));

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "imp",
        "backup.importBundle",
        json!({ "bundlePath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        imported.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("feebook-workspace-v1")
    );

    let restored = request_ok(&mut stdin, &mut reader, "list", "students.list", json!({}));
    assert_eq!(restored.get("count").and_then(|v| v.as_u64()), Some(1));
    let row = &restored.get("students").and_then(|v| v.as_array()).unwrap()[0];
    assert_eq!(
        row.get("studentId").and_then(|v| v.as_str()),
        Some(student_id.as_str())
    );
    assert!(
        (row.get("outstandingBalance").and_then(|v| v.as_f64()).unwrap() - 700.0).abs() < 1e-6
    );

    let _ = child.kill();
}

#[test]
fn import_rejects_a_bundle_without_a_manifest() {
    let workspace = temp_workspace("feebook-bundle-bad");
    let bogus = workspace.join("not-a-bundle.zip");
    std::fs::write(&bogus, b"this is not a zip archive").expect("write bogus bundle");

    let (mut child, mut stdin, mut reader) = spawn_daemon();
    open_and_login(&mut stdin, &mut reader, &workspace);

    let resp = request_raw(
        &mut stdin,
        &mut reader,
        "imp",
        "backup.importBundle",
        json!({ "bundlePath": bogus.to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), "import_failed");

    // The daemon reopens the workspace database after a failed import and
    // stays usable.
    let listed = request_ok(&mut stdin, &mut reader, "list", "students.list", json!({}));
    assert_eq!(listed.get("count").and_then(|v| v.as_u64()), Some(0));

    let _ = child.kill();
}

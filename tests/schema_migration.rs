mod test_support;

use rusqlite::Connection;
use serde_json::json;
use std::path::Path;
use test_support::{assert_money, num, open_and_login, request_ok, spawn_daemon, temp_workspace};

// Schema as the pre-rework tool left it: per-student fee columns, no
// roll_number, no extra_balance.
fn seed_legacy_database(workspace: &Path) {
    let conn = Connection::open(workspace.join("school.sqlite3")).expect("create legacy db");
    conn.execute_batch(
        "CREATE TABLE students(
            student_id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            middle_name TEXT DEFAULT '',
            last_name TEXT NOT NULL,
            mother_name TEXT NOT NULL,
            father_name TEXT NOT NULL,
            address TEXT,
            email TEXT,
            mobile_number TEXT,
            dob TEXT,
            class_name TEXT,
            whatsapp_no TEXT,
            gender TEXT,
            doa TEXT,
            tuition_fee REAL,
            bus_fee REAL,
            total_amount REAL,
            outstanding_balance REAL
         );
         INSERT INTO students(
            student_id, first_name, last_name, mother_name, father_name,
            class_name, tuition_fee, bus_fee, total_amount, outstanding_balance)
         VALUES('EPS1001', 'Aman', 'Khan', 'Nazia Khan', 'Imran Khan',
                '5', 1200.0, 500.0, 1700.0, 700.0);",
    )
    .expect("seed legacy schema");
}

fn student_columns(workspace: &Path) -> Vec<String> {
    let conn = Connection::open(workspace.join("school.sqlite3")).expect("open migrated db");
    let mut stmt = conn
        .prepare("PRAGMA table_info(students)")
        .expect("table_info");
    stmt.query_map([], |r| r.get::<_, String>(1))
        .expect("query columns")
        .collect::<Result<Vec<_>, _>>()
        .expect("collect columns")
}

#[test]
fn legacy_fee_columns_are_rebuilt_away_and_balances_survive() {
    let workspace = temp_workspace("feebook-migrate-legacy");
    seed_legacy_database(&workspace);

    let (mut child, mut stdin, mut reader) = spawn_daemon();
    open_and_login(&mut stdin, &mut reader, &workspace);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "get",
        "students.get",
        json!({ "studentId": "EPS1001" }),
    );
    let student = res.get("student").expect("student");
    assert_money(num(student, "outstandingBalance"), 700.0);
    assert_money(num(student, "extraBalance"), 0.0);
    assert!(student
        .get("rollNumber")
        .map(|v| v.is_null())
        .unwrap_or(true));

    let columns = student_columns(&workspace);
    assert!(!columns.iter().any(|c| c == "tuition_fee"), "{:?}", columns);
    assert!(!columns.iter().any(|c| c == "bus_fee"), "{:?}", columns);
    assert!(!columns.iter().any(|c| c == "total_amount"), "{:?}", columns);
    assert!(columns.iter().any(|c| c == "roll_number"), "{:?}", columns);
    assert!(columns.iter().any(|c| c == "extra_balance"), "{:?}", columns);

    // The allocator keeps counting from the migrated rows.
    let admitted = request_ok(
        &mut stdin,
        &mut reader,
        "admit",
        "students.admit",
        json!({
            "firstName": "Sana",
            "lastName": "Begum",
            "motherName": "Rukhsana Begum",
            "fatherName": "Aslam Ansari"
        }),
    );
    assert_eq!(
        admitted.get("studentId").and_then(|v| v.as_str()),
        Some("EPS1002")
    );

    let _ = child.kill();
}

#[test]
fn migrated_balances_feed_the_payment_ledger() {
    let workspace = temp_workspace("feebook-migrate-ledger");
    seed_legacy_database(&workspace);

    let (mut child, mut stdin, mut reader) = spawn_daemon();
    open_and_login(&mut stdin, &mut reader, &workspace);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "pay",
        "payments.record",
        json!({ "studentId": "EPS1001", "schoolFee": 1000.0, "busFee": 0.0, "amount": 300.0 }),
    );
    assert_money(num(&res, "transactionOutstanding"), 700.0);
    assert_money(num(&res, "totalOutstanding"), 1400.0);
    assert_money(num(&res, "totalExtra"), 0.0);

    let _ = child.kill();
}

#[test]
fn reopening_a_migrated_workspace_is_idempotent() {
    let workspace = temp_workspace("feebook-migrate-reopen");
    seed_legacy_database(&workspace);

    let (mut child, mut stdin, mut reader) = spawn_daemon();
    open_and_login(&mut stdin, &mut reader, &workspace);
    open_and_login(&mut stdin, &mut reader, &workspace);

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "get",
        "students.get",
        json!({ "studentId": "EPS1001" }),
    );
    let student = res.get("student").expect("student");
    assert_money(num(student, "outstandingBalance"), 700.0);

    let _ = child.kill();
}
